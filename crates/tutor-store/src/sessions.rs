use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{ChatSession, SessionSummary};

/// Return the given session (if it exists and belongs to `user_id`) or
/// create a new `general` session (`get_or_create_session`).
#[instrument(skip(conn))]
pub fn get_or_create_session(conn: &Connection, user_id: &str, session_id: Option<&str>) -> Result<ChatSession> {
    if let Some(id) = session_id {
        if let Some(session) = get_session(conn, user_id, id)? {
            return Ok(session);
        }
    }

    let id = Uuid::now_v7().to_string();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO chat_sessions (id, user_id, session_type, created_at) VALUES (?1, ?2, 'general', ?3)",
        params![id, user_id, now.to_rfc3339()],
    )?;

    Ok(ChatSession {
        id,
        user_id: user_id.to_string(),
        session_type: "general".to_string(),
        created_at: now,
    })
}

pub fn get_session(conn: &Connection, user_id: &str, session_id: &str) -> Result<Option<ChatSession>> {
    conn.query_row(
        "SELECT id, user_id, session_type, created_at FROM chat_sessions WHERE id = ?1 AND user_id = ?2",
        params![session_id, user_id],
        row_to_session,
    )
    .optional()
    .map_err(Into::into)
}

/// All sessions for a user, newest first, each with a preview of its first
/// user message.
#[instrument(skip(conn))]
pub fn list_sessions_for_user(conn: &Connection, user_id: &str) -> Result<Vec<SessionSummary>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.created_at,
                (SELECT m.content FROM chat_messages m
                 WHERE m.session_id = s.id AND m.role = 'user'
                 ORDER BY m.created_at ASC LIMIT 1) AS first_message
         FROM chat_sessions s
         WHERE s.user_id = ?1
         ORDER BY s.created_at DESC, s.id DESC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        let id: String = row.get(0)?;
        let created_at: String = row.get(1)?;
        let first_message: Option<String> = row.get(2)?;
        let preview = first_message
            .map(|m| m.chars().take(80).collect::<String>())
            .unwrap_or_else(|| "New conversation".to_string());
        Ok(SessionSummary {
            id,
            preview,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Deletes a session and its messages (cascade); returns `true` if a row
/// was actually owned and deleted.
#[instrument(skip(conn))]
pub fn delete_session(conn: &Connection, user_id: &str, session_id: &str) -> Result<bool> {
    let rows_changed = conn.execute(
        "DELETE FROM chat_sessions WHERE id = ?1 AND user_id = ?2",
        params![session_id, user_id],
    )?;
    Ok(rows_changed > 0)
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSession> {
    let created_at: String = row.get(3)?;
    Ok(ChatSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_type: row.get(2)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;
    use crate::users::get_or_create_user;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        get_or_create_user(&conn, "u1", "Ada", "ada@example.com").unwrap();
        conn
    }

    #[test]
    fn creates_session_when_none_given() {
        let conn = conn();
        let session = get_or_create_session(&conn, "u1", None).unwrap();
        assert_eq!(session.user_id, "u1");
    }

    #[test]
    fn reuses_existing_session_for_owner() {
        let conn = conn();
        let created = get_or_create_session(&conn, "u1", None).unwrap();
        let reused = get_or_create_session(&conn, "u1", Some(&created.id)).unwrap();
        assert_eq!(created.id, reused.id);
    }

    #[test]
    fn non_owner_cannot_reuse_session() {
        let conn = conn();
        get_or_create_user(&conn, "u2", "Bob", "bob@example.com").unwrap();
        let created = get_or_create_session(&conn, "u1", None).unwrap();
        let result = get_or_create_session(&conn, "u2", Some(&created.id)).unwrap();
        assert_ne!(created.id, result.id);
    }

    #[test]
    fn delete_session_removes_row() {
        let conn = conn();
        let created = get_or_create_session(&conn, "u1", None).unwrap();
        assert!(delete_session(&conn, "u1", &created.id).unwrap());
        assert!(get_session(&conn, "u1", &created.id).unwrap().is_none());
    }
}
