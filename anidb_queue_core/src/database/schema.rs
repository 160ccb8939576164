//! Database schema definitions

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Command queue and entity documents
pub const SCHEMA_V1: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- Persisted commands; (command_type, command_key) identifies equivalent work
CREATE TABLE IF NOT EXISTS command_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    partition TEXT NOT NULL,
    command_type TEXT NOT NULL,
    command_key TEXT NOT NULL,
    priority INTEGER NOT NULL CHECK (priority BETWEEN 1 AND 11),
    payload TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    error_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    claimed_at INTEGER,
    UNIQUE(command_type, command_key)
);

-- Entity documents served to the repositories
CREATE TABLE IF NOT EXISTS entities (
    kind TEXT NOT NULL,
    key TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (kind, key)
);
"#;

/// Claim-order index
pub const SCHEMA_V2: &str = r#"
CREATE INDEX IF NOT EXISTS idx_command_requests_claim
    ON command_requests(partition, status, priority, created_at, id);
"#;
