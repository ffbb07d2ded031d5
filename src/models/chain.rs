use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chains mirrored from the upstream feed. Each one maps to its own Postgres schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Base,
    Zora,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Ethereum, Chain::Base, Chain::Zora];

    /// Postgres schema holding this chain's mirror tables
    pub fn schema(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Base => "base",
            Chain::Zora => "zora",
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(self, Chain::Ethereum | Chain::Base | Chain::Zora)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema())
    }
}

impl FromStr for Chain {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ethereum" => Ok(Chain::Ethereum),
            "base" => Ok(Chain::Base),
            "zora" => Ok(Chain::Zora),
            other => Err(TopicError::UnknownChain(other.to_string())),
        }
    }
}

/// Record family carried by a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Owner,
    Token,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Owner, RecordKind::Token];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Owner => "owner",
            RecordKind::Token => "token",
        }
    }

    /// Mirror table fed by this kind of record
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Owner => "owners",
            RecordKind::Token => "tokens",
        }
    }
}

impl FromStr for RecordKind {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(RecordKind::Owner),
            "token" => Ok(RecordKind::Token),
            other => Err(TopicError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    Malformed(String),
    UnknownChain(String),
    UnknownKind(String),
}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicError::Malformed(topic) => {
                write!(f, "Malformed topic '{}', expected chain.kind.vN", topic)
            }
            TopicError::UnknownChain(chain) => write!(f, "Unknown chain: {}", chain),
            TopicError::UnknownKind(kind) => write!(f, "Unknown record kind: {}", kind),
        }
    }
}

impl std::error::Error for TopicError {}

/// Topic of the form `{chain}.{kind}.v{N}`, e.g. `ethereum.owner.v4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopicName {
    pub chain: Chain,
    pub kind: RecordKind,
    pub version: u32,
}

impl TopicName {
    pub fn new(chain: Chain, kind: RecordKind, version: u32) -> Self {
        Self {
            chain,
            kind,
            version,
        }
    }

    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        let parts: Vec<&str> = topic.split('.').collect();
        if parts.len() != 3 {
            return Err(TopicError::Malformed(topic.to_string()));
        }

        let chain = parts[0].parse::<Chain>()?;
        let kind = parts[1].parse::<RecordKind>()?;
        let version = parts[2]
            .strip_prefix('v')
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(|| TopicError::Malformed(topic.to_string()))?;

        Ok(Self::new(chain, kind, version))
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.v{}", self.chain, self.kind.as_str(), self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topic() {
        let topic = TopicName::parse("ethereum.owner.v4").unwrap();
        assert_eq!(topic.chain, Chain::Ethereum);
        assert_eq!(topic.kind, RecordKind::Owner);
        assert_eq!(topic.version, 4);
        assert_eq!(topic.to_string(), "ethereum.owner.v4");
    }

    #[test]
    fn test_parse_topic_rejects_garbage() {
        assert_eq!(
            TopicName::parse("solana.owner.v4"),
            Err(TopicError::UnknownChain("solana".to_string()))
        );
        assert_eq!(
            TopicName::parse("base.listing.v1"),
            Err(TopicError::UnknownKind("listing".to_string()))
        );
        assert!(matches!(
            TopicName::parse("zora.token.4"),
            Err(TopicError::Malformed(_))
        ));
        assert!(matches!(
            TopicName::parse("zora.token"),
            Err(TopicError::Malformed(_))
        ));
    }

    #[test]
    fn test_chain_tables() {
        assert_eq!(Chain::Base.schema(), "base");
        assert_eq!(RecordKind::Token.table(), "tokens");
        assert!(Chain::ALL.iter().all(|c| c.is_evm()));
    }
}
