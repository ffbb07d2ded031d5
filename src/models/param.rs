use chrono::{DateTime, Utc};

/// What a single batch element does to its mirror row
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorOp<R> {
    /// Insert the row, or overwrite every non-identity column if the key exists
    Upsert(R),
    /// Physically remove the row carrying the key; absent rows are a no-op
    Delete,
}

/// Normalized element handed to the upsert executor.
///
/// Upsert and delete are variants of one enum, so an element can never request
/// both or neither.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchParam<R> {
    pub simplehash_kafka_key: String,
    pub op: MirrorOp<R>,
}

impl<R> BatchParam<R> {
    pub fn upsert(key: impl Into<String>, row: R) -> Self {
        Self {
            simplehash_kafka_key: key.into(),
            op: MirrorOp::Upsert(row),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            simplehash_kafka_key: key.into(),
            op: MirrorOp::Delete,
        }
    }

    pub fn should_upsert(&self) -> bool {
        matches!(self.op, MirrorOp::Upsert(_))
    }

    pub fn should_delete(&self) -> bool {
        matches!(self.op, MirrorOp::Delete)
    }

    pub fn row(&self) -> Option<&R> {
        match &self.op {
            MirrorOp::Upsert(row) => Some(row),
            MirrorOp::Delete => None,
        }
    }
}

/// Source coordinates stamped on every upserted mirror row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaAudit {
    pub kafka_offset: i64,
    pub kafka_partition: i32,
    pub kafka_timestamp: Option<DateTime<Utc>>,
}
