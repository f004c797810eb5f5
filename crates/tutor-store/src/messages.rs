use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::types::ChatMessage;

/// Persists a chat message (`save_message`). Messages are
/// immutable after insert (invariant 4 of the data model).
#[allow(clippy::too_many_arguments)]
#[instrument(skip(conn, content))]
pub fn save_message(
    conn: &Connection,
    session_id: &str,
    role: &str,
    content: &str,
    hint_level_used: Option<u8>,
    problem_difficulty: Option<u8>,
    maths_difficulty: Option<u8>,
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    attachment_ids: &[String],
) -> Result<ChatMessage> {
    let id = Uuid::now_v7().to_string();
    let now = Utc::now();
    let attachments_json = if attachment_ids.is_empty() {
        None
    } else {
        Some(serde_json::to_string(attachment_ids).unwrap_or_default())
    };

    conn.execute(
        "INSERT INTO chat_messages
         (id, session_id, role, content, hint_level_used, problem_difficulty,
          maths_difficulty, input_tokens, output_tokens, attachments_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            session_id,
            role,
            content,
            hint_level_used,
            problem_difficulty,
            maths_difficulty,
            input_tokens,
            output_tokens,
            attachments_json,
            now.to_rfc3339(),
        ],
    )?;

    Ok(ChatMessage {
        id,
        session_id: session_id.to_string(),
        role: role.to_string(),
        content: content.to_string(),
        hint_level_used,
        problem_difficulty,
        maths_difficulty,
        input_tokens,
        output_tokens,
        attachment_ids: attachment_ids.to_vec(),
        created_at: now,
    })
}

/// Plain `{role, content}` history for one session, chronological — the
/// shape the context builder and LLM adapter consume.
#[instrument(skip(conn))]
pub fn get_chat_history(conn: &Connection, session_id: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT role, content FROM chat_messages WHERE session_id = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![session_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Full message detail for a session, used by the REST "load conversation"
/// endpoint.
#[instrument(skip(conn))]
pub fn get_session_messages(conn: &Connection, session_id: &str) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, role, content, hint_level_used, problem_difficulty,
                maths_difficulty, input_tokens, output_tokens, attachments_json, created_at
         FROM chat_messages WHERE session_id = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![session_id], row_to_message)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let attachments_json: Option<String> = row.get(9)?;
    let attachment_ids: Vec<String> = attachments_json
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    let created_at: String = row.get(10)?;

    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        hint_level_used: row.get::<_, Option<i64>>(4)?.map(|v| v as u8),
        problem_difficulty: row.get::<_, Option<i64>>(5)?.map(|v| v as u8),
        maths_difficulty: row.get::<_, Option<i64>>(6)?.map(|v| v as u8),
        input_tokens: row.get::<_, Option<i64>>(7)?.map(|v| v as u32),
        output_tokens: row.get::<_, Option<i64>>(8)?.map(|v| v as u32),
        attachment_ids,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;
    use crate::sessions::get_or_create_session;
    use crate::users::get_or_create_user;

    fn conn_with_session() -> (Connection, String) {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        get_or_create_user(&conn, "u1", "Ada", "ada@example.com").unwrap();
        let session = get_or_create_session(&conn, "u1", None).unwrap();
        (conn, session.id)
    }

    #[test]
    fn save_and_read_history_preserves_order() {
        let (conn, session_id) = conn_with_session();
        save_message(&conn, &session_id, "user", "hi", None, None, None, None, None, &[]).unwrap();
        save_message(&conn, &session_id, "assistant", "hello", None, None, None, Some(3), Some(5), &[]).unwrap();
        let history = get_chat_history(&conn, &session_id).unwrap();
        assert_eq!(history, vec![("user".to_string(), "hi".to_string()), ("assistant".to_string(), "hello".to_string())]);
    }

    #[test]
    fn attachment_ids_round_trip() {
        let (conn, session_id) = conn_with_session();
        let ids = vec!["att-1".to_string(), "att-2".to_string()];
        save_message(&conn, &session_id, "user", "see attached", None, None, None, None, None, &ids).unwrap();
        let messages = get_session_messages(&conn, &session_id).unwrap();
        assert_eq!(messages[0].attachment_ids, ids);
    }

    #[test]
    fn message_without_attachments_has_empty_list() {
        let (conn, session_id) = conn_with_session();
        save_message(&conn, &session_id, "user", "no attachments", None, None, None, None, None, &[]).unwrap();
        let messages = get_session_messages(&conn, &session_id).unwrap();
        assert!(messages[0].attachment_ids.is_empty());
    }
}
