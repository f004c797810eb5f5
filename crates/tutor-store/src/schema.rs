use rusqlite::Connection;

use crate::error::Result;

/// Initialise every table this crate owns. Safe to call on every startup —
/// `CREATE TABLE IF NOT EXISTS` throughout, following the reference's
/// `db::init_db` convention.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    create_users_table(conn)?;
    create_chat_sessions_table(conn)?;
    create_chat_messages_table(conn)?;
    create_daily_token_usage_table(conn)?;
    create_uploaded_files_table(conn)?;
    Ok(())
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                            TEXT PRIMARY KEY NOT NULL,
            display_name                  TEXT NOT NULL,
            email                         TEXT NOT NULL UNIQUE,
            programming_level             INTEGER NOT NULL DEFAULT 3,
            maths_level                   INTEGER NOT NULL DEFAULT 3,
            effective_programming_level   REAL NOT NULL DEFAULT 2.5,
            effective_maths_level         REAL NOT NULL DEFAULT 2.5,
            last_embedding                TEXT,
            last_embedding_at             TEXT,
            created_at                    TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn create_chat_sessions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_sessions (
            id           TEXT PRIMARY KEY NOT NULL,
            user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            session_type TEXT NOT NULL DEFAULT 'general',
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_chat_sessions_user_type
            ON chat_sessions(user_id, session_type);",
    )?;
    Ok(())
}

fn create_chat_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_messages (
            id                  TEXT PRIMARY KEY NOT NULL,
            session_id          TEXT NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
            role                TEXT NOT NULL,
            content             TEXT NOT NULL,
            hint_level_used     INTEGER,
            problem_difficulty  INTEGER,
            maths_difficulty    INTEGER,
            input_tokens        INTEGER,
            output_tokens       INTEGER,
            attachments_json    TEXT,
            created_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_chat_messages_session_created
            ON chat_messages(session_id, created_at);",
    )?;
    Ok(())
}

fn create_daily_token_usage_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS daily_token_usage (
            id                  TEXT PRIMARY KEY NOT NULL,
            user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            usage_date          TEXT NOT NULL,
            input_tokens_used   INTEGER NOT NULL DEFAULT 0,
            output_tokens_used  INTEGER NOT NULL DEFAULT 0
        );
        CREATE UNIQUE INDEX IF NOT EXISTS ix_daily_token_usage_user_date
            ON daily_token_usage(user_id, usage_date);",
    )?;
    Ok(())
}

fn create_uploaded_files_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS uploaded_files (
            id                  TEXT PRIMARY KEY NOT NULL,
            user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            original_filename   TEXT NOT NULL,
            stored_filename     TEXT NOT NULL,
            content_type        TEXT NOT NULL,
            file_type           TEXT NOT NULL,
            size_bytes          INTEGER NOT NULL,
            storage_path        TEXT NOT NULL,
            extracted_text      TEXT,
            expires_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_uploaded_files_user_expiry
            ON uploaded_files(user_id, expires_at);",
    )?;
    Ok(())
}
