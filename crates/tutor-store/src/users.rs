use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::error::{Result, StoreError};
use crate::types::User;

/// Return the user identified by `sub` (the JWT subject, also the user's
/// stable id), creating a row with default effective levels if none exists.
#[instrument(skip(conn))]
pub fn get_or_create_user(conn: &Connection, id: &str, display_name: &str, email: &str) -> Result<User> {
    if let Some(user) = get_user(conn, id)? {
        return Ok(user);
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR IGNORE INTO users (id, display_name, email, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![id, display_name, email, now],
    )?;

    get_user(conn, id)?.ok_or_else(|| StoreError::NotFound {
        kind: "user",
        id: id.to_string(),
    })
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    conn.query_row(
        "SELECT id, display_name, email, programming_level, maths_level,
                effective_programming_level, effective_maths_level,
                last_embedding, last_embedding_at, created_at
         FROM users WHERE id = ?1",
        params![id],
        row_to_user,
    )
    .optional()
    .map_err(StoreError::Database)
}

/// Persists the pedagogy engine's updated effective levels and combined
/// embedding for a user ("state update").
#[instrument(skip(conn, embedding))]
pub fn update_student_state(
    conn: &Connection,
    user_id: &str,
    effective_programming_level: f32,
    effective_maths_level: f32,
    embedding: Option<&[f32]>,
) -> Result<()> {
    let embedding_json = embedding.map(|e| serde_json::to_string(e).unwrap_or_default());
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE users
         SET effective_programming_level = ?1,
             effective_maths_level = ?2,
             last_embedding = COALESCE(?3, last_embedding),
             last_embedding_at = CASE WHEN ?3 IS NOT NULL THEN ?4 ELSE last_embedding_at END
         WHERE id = ?5",
        params![
            effective_programming_level,
            effective_maths_level,
            embedding_json,
            now,
            user_id
        ],
    )?;
    Ok(())
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let last_embedding: Option<String> = row.get(7)?;
    let last_embedding = last_embedding.and_then(|s| serde_json::from_str(&s).ok());
    let last_embedding_at: Option<String> = row.get(8)?;
    let last_embedding_at = last_embedding_at.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc));
    let created_at: String = row.get(9)?;

    Ok(User {
        id: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        programming_level: row.get::<_, i64>(3)? as u8,
        maths_level: row.get::<_, i64>(4)? as u8,
        effective_programming_level: row.get(5)?,
        effective_maths_level: row.get(6)?,
        last_embedding,
        last_embedding_at,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let conn = conn();
        let first = get_or_create_user(&conn, "u1", "Ada", "ada@example.com").unwrap();
        let second = get_or_create_user(&conn, "u1", "Ada", "ada@example.com").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.effective_programming_level, 2.5);
    }

    #[test]
    fn update_student_state_persists_embedding() {
        let conn = conn();
        get_or_create_user(&conn, "u1", "Ada", "ada@example.com").unwrap();
        update_student_state(&conn, "u1", 3.1, 2.9, Some(&[0.1, 0.2])).unwrap();
        let user = get_user(&conn, "u1").unwrap().unwrap();
        assert_eq!(user.effective_programming_level, 3.1);
        assert_eq!(user.last_embedding, Some(vec![0.1, 0.2]));
    }
}
