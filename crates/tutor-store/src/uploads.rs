use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection};
use tracing::{instrument, warn};
use tutor_uploads::SavedUpload;

use crate::error::Result;
use crate::types::UploadedFileRow;

/// Inserts the rows for a batch already written to disk by `tutor_uploads::save_uploaded_files`.
#[instrument(skip(conn, saved))]
pub fn insert_uploaded_files(conn: &Connection, user_id: &str, saved: &[SavedUpload]) -> Result<()> {
    for file in saved {
        let file_type = match file.file_type {
            tutor_uploads::FileKind::Image => "image",
            tutor_uploads::FileKind::Document => "document",
        };
        conn.execute(
            "INSERT INTO uploaded_files
             (id, user_id, original_filename, stored_filename, content_type, file_type,
              size_bytes, storage_path, extracted_text, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                file.id.to_string(),
                user_id,
                file.original_filename,
                file.stored_filename,
                file.content_type,
                file_type,
                file.size_bytes as i64,
                file.storage_path,
                file.extracted_text,
                file.expires_at.to_rfc3339(),
            ],
        )?;
    }
    Ok(())
}

/// Returns the unexpired uploads owned by `user_id` among `ids` — attachments
/// must be owned and unexpired at storage time.
#[instrument(skip(conn, ids))]
pub fn get_user_uploads_by_ids(conn: &Connection, user_id: &str, ids: &[String]) -> Result<Vec<UploadedFileRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = ids.iter().enumerate().map(|(i, _)| format!("?{}", i + 3)).collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT id, user_id, original_filename, stored_filename, content_type, file_type,
                size_bytes, storage_path, extracted_text, expires_at
         FROM uploaded_files
         WHERE user_id = ?1 AND expires_at >= ?2 AND id IN ({placeholders})"
    );

    let mut stmt = conn.prepare(&sql)?;
    let now = Utc::now().to_rfc3339();
    let mut bound: Vec<&dyn rusqlite::ToSql> = vec![&user_id, &now];
    for id in ids {
        bound.push(id);
    }
    let rows = stmt.query_map(params_from_iter(bound), row_to_upload)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Deletes expired rows and their on-disk files. Run opportunistically at
/// the start of each save.
#[instrument(skip(conn))]
pub fn sweep_expired_uploads(conn: &Connection) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    let mut stmt = conn.prepare("SELECT storage_path FROM uploaded_files WHERE expires_at < ?1")?;
    let paths: Vec<String> = stmt
        .query_map(params![now], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();

    for path in &paths {
        tutor_uploads::delete_file_safely(path);
    }

    let deleted = conn.execute("DELETE FROM uploaded_files WHERE expires_at < ?1", params![now])?;
    if deleted > 0 {
        warn!(deleted, "swept expired uploads");
    }
    Ok(deleted)
}

fn row_to_upload(row: &rusqlite::Row<'_>) -> rusqlite::Result<UploadedFileRow> {
    let expires_at: String = row.get(9)?;
    Ok(UploadedFileRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        original_filename: row.get(2)?,
        stored_filename: row.get(3)?,
        content_type: row.get(4)?,
        file_type: row.get(5)?,
        size_bytes: row.get::<_, i64>(6)? as u64,
        storage_path: row.get(7)?,
        extracted_text: row.get(8)?,
        expires_at: chrono::DateTime::parse_from_rfc3339(&expires_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;
    use crate::users::get_or_create_user;
    use chrono::Duration;
    use tutor_uploads::FileKind;
    use uuid::Uuid;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        get_or_create_user(&conn, "u1", "Ada", "ada@example.com").unwrap();
        conn
    }

    fn saved(expires_in_hours: i64) -> SavedUpload {
        SavedUpload {
            id: Uuid::new_v4(),
            original_filename: "notes.txt".to_string(),
            stored_filename: "abc.txt".to_string(),
            content_type: "text/plain".to_string(),
            file_type: FileKind::Document,
            size_bytes: 5,
            storage_path: "/tmp/does-not-exist-abc.txt".to_string(),
            extracted_text: Some("hello".to_string()),
            expires_at: Utc::now() + Duration::hours(expires_in_hours),
        }
    }

    #[test]
    fn unexpired_upload_is_returned_when_owned() {
        let conn = conn();
        let file = saved(24);
        insert_uploaded_files(&conn, "u1", std::slice::from_ref(&file)).unwrap();
        let rows = get_user_uploads_by_ids(&conn, "u1", &[file.id.to_string()]).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn expired_upload_is_excluded() {
        let conn = conn();
        let file = saved(-1);
        insert_uploaded_files(&conn, "u1", std::slice::from_ref(&file)).unwrap();
        let rows = get_user_uploads_by_ids(&conn, "u1", &[file.id.to_string()]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn other_users_upload_is_not_returned() {
        let conn = conn();
        get_or_create_user(&conn, "u2", "Bob", "bob@example.com").unwrap();
        let file = saved(24);
        insert_uploaded_files(&conn, "u2", std::slice::from_ref(&file)).unwrap();
        let rows = get_user_uploads_by_ids(&conn, "u1", &[file.id.to_string()]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn sweep_deletes_expired_rows() {
        let conn = conn();
        let file = saved(-1);
        insert_uploaded_files(&conn, "u1", std::slice::from_ref(&file)).unwrap();
        let deleted = sweep_expired_uploads(&conn).unwrap();
        assert_eq!(deleted, 1);
    }
}
