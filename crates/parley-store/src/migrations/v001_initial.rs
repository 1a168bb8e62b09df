//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `conversations`, `messages`,
//! `friend_requests`, and the durable ingestion queue `chat_queue`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    user1      TEXT NOT NULL,               -- as originally submitted
    user2      TEXT NOT NULL,
    pair_key   TEXT NOT NULL UNIQUE,        -- normalized unordered pair
    created_at TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    sender          TEXT NOT NULL,
    content         TEXT NOT NULL,
    timestamp       TEXT NOT NULL,              -- ISO-8601, server-assigned
    channel         TEXT,                       -- legacy channel routing, may be empty
    conversation_id TEXT,                       -- nullable FK -> conversations(id)

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, timestamp);

CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages(channel);

CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender);

-- ----------------------------------------------------------------
-- Friend requests
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friend_requests (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    from_user  TEXT NOT NULL,
    to_user    TEXT NOT NULL,
    pair_key   TEXT NOT NULL,               -- normalized unordered pair
    status     TEXT NOT NULL,               -- PENDING / ACCEPTED / REJECTED
    created_at TEXT NOT NULL
);

-- At most one PENDING request per unordered pair, either direction.
CREATE UNIQUE INDEX IF NOT EXISTS idx_friend_requests_pending
    ON friend_requests(pair_key) WHERE status = 'PENDING';

CREATE INDEX IF NOT EXISTS idx_friend_requests_pair_status
    ON friend_requests(pair_key, status);

CREATE INDEX IF NOT EXISTS idx_friend_requests_to
    ON friend_requests(to_user, status);

CREATE INDEX IF NOT EXISTS idx_friend_requests_from
    ON friend_requests(from_user, status);

-- ----------------------------------------------------------------
-- Durable ingestion queue
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_queue (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    exchange    TEXT NOT NULL,
    routing_key TEXT NOT NULL,
    payload     TEXT NOT NULL,              -- serialized ChatMessage (JSON)
    attempts    INTEGER NOT NULL DEFAULT 0,
    enqueued_at TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
