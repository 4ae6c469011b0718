//! Embedded SQL migrations
//!
//! Migrations are embedded at compile time using include_str!

/// Migration metadata
pub struct Migration {
    pub id: &'static str,
    pub sql: &'static str,
}

/// Get all embedded migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            id: "001_core_schema",
            sql: include_str!("../../migrations/001_core_schema.sql"),
        },
        Migration {
            id: "002_state_cache",
            sql: include_str!("../../migrations/002_state_cache.sql"),
        },
        Migration {
            id: "003_immutability_triggers",
            sql: include_str!("../../migrations/003_immutability_triggers.sql"),
        },
    ]
}
