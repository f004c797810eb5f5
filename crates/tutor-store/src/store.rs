use std::sync::Mutex;

use rusqlite::Connection;
use tutor_uploads::SavedUpload;

use crate::error::Result;
use crate::schema::init_db;
use crate::types::{ChatMessage, ChatSession, DailyTokenUsage, SessionSummary, UploadedFileRow, User};
use crate::{messages, sessions, uploads, usage, users};

/// Thread-safe SQLite-backed store for everything the chat pipeline
/// persists: users' pedagogical state, sessions, messages, daily usage, and
/// uploaded files. Wraps a single connection in a `Mutex`, matching the
/// reference's single-node `SessionManager` shape.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the SQLite database at `path` and runs schema init.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store for tests and ephemeral local runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn get_or_create_user(&self, id: &str, display_name: &str, email: &str) -> Result<User> {
        let conn = self.conn.lock().unwrap();
        users::get_or_create_user(&conn, id, display_name, email)
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        users::get_user(&conn, id)
    }

    pub fn update_student_state(
        &self,
        user_id: &str,
        effective_programming_level: f32,
        effective_maths_level: f32,
        embedding: Option<&[f32]>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        users::update_student_state(&conn, user_id, effective_programming_level, effective_maths_level, embedding)
    }

    pub fn get_or_create_session(&self, user_id: &str, session_id: Option<&str>) -> Result<ChatSession> {
        let conn = self.conn.lock().unwrap();
        sessions::get_or_create_session(&conn, user_id, session_id)
    }

    pub fn list_sessions_for_user(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        let conn = self.conn.lock().unwrap();
        sessions::list_sessions_for_user(&conn, user_id)
    }

    pub fn get_session(&self, user_id: &str, session_id: &str) -> Result<Option<ChatSession>> {
        let conn = self.conn.lock().unwrap();
        sessions::get_session(&conn, user_id, session_id)
    }

    pub fn delete_session(&self, user_id: &str, session_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        sessions::delete_session(&conn, user_id, session_id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn save_message(
        &self,
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
        let conn = self.conn.lock().unwrap();
        messages::save_message(
            &conn,
            session_id,
            role,
            content,
            hint_level_used,
            problem_difficulty,
            maths_difficulty,
            input_tokens,
            output_tokens,
            attachment_ids,
        )
    }

    pub fn get_chat_history(&self, session_id: &str) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock().unwrap();
        messages::get_chat_history(&conn, session_id)
    }

    pub fn get_session_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().unwrap();
        messages::get_session_messages(&conn, session_id)
    }

    pub fn get_daily_usage(&self, user_id: &str) -> Result<DailyTokenUsage> {
        let conn = self.conn.lock().unwrap();
        usage::get_daily_usage(&conn, user_id)
    }

    pub fn increment_token_usage(&self, user_id: &str, input_delta: u64, output_delta: u64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        usage::increment_token_usage(&conn, user_id, input_delta, output_delta)
    }

    pub fn check_daily_limit(&self, user_id: &str, input_limit: u64, output_limit: u64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        usage::check_daily_limit(&conn, user_id, input_limit, output_limit)
    }

    pub fn get_user_uploads_by_ids(&self, user_id: &str, ids: &[String]) -> Result<Vec<UploadedFileRow>> {
        let conn = self.conn.lock().unwrap();
        uploads::get_user_uploads_by_ids(&conn, user_id, ids)
    }

    /// Sweeps expired upload rows (and their files) then persists a freshly
    /// saved batch — mirrors `save_uploaded_files`' "sweep, then insert"
    /// ordering
    pub fn insert_uploaded_files(&self, user_id: &str, saved: &[SavedUpload]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        uploads::sweep_expired_uploads(&conn)?;
        uploads::insert_uploaded_files(&conn, user_id, saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_initialises_schema() {
        let store = Store::open_in_memory().unwrap();
        let user = store.get_or_create_user("u1", "Ada", "ada@example.com").unwrap();
        assert_eq!(user.id, "u1");
    }

    #[test]
    fn session_and_message_round_trip() {
        let store = Store::open_in_memory().unwrap();
        store.get_or_create_user("u1", "Ada", "ada@example.com").unwrap();
        let session = store.get_or_create_session("u1", None).unwrap();
        store
            .save_message(&session.id, "user", "hello", None, None, None, None, None, &[])
            .unwrap();
        let history = store.get_chat_history(&session.id).unwrap();
        assert_eq!(history, vec![("user".to_string(), "hello".to_string())]);
    }
}
