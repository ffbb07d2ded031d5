// src/lib.rs

pub mod config;
pub mod models;

pub mod services {
    pub mod schema_registry;
    pub mod decoder;
    pub mod normalizer;
    pub mod batcher;
    pub mod mirror_store;
    pub mod consumer;
}

pub mod jobs {
    pub mod topic_worker;
    pub mod supervisor;
    pub mod roster;
}

pub mod handlers {
    pub mod health;
}

#[cfg(test)]
pub mod test_utils;
