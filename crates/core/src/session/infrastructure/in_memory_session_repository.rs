use crate::emotion::domain::emotion::Emotion;
use crate::session::domain::session::{EmotionLog, SessionId, SessionRecord, UserId, UserStats};
use crate::session::domain::session_repository::{RepositoryError, SessionRepository};
use crate::session::infrastructure::session_tables::SessionTables;

/// Keeps everything in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct InMemorySessionRepository {
    tables: SessionTables,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn create_session(&mut self, user: &UserId) -> Result<SessionId, RepositoryError> {
        Ok(self.tables.create_session(user))
    }

    fn record_session_end(
        &mut self,
        id: SessionId,
        total_faces: usize,
        dominant: Emotion,
        logs: &[EmotionLog],
    ) -> Result<(), RepositoryError> {
        self.tables.record_session_end(id, total_faces, dominant, logs)
    }

    fn update_user_aggregates(
        &mut self,
        user: &UserId,
        faces_delta: usize,
        session_dominant: Emotion,
    ) -> Result<(), RepositoryError> {
        self.tables
            .update_user_aggregates(user, faces_delta, session_dominant);
        Ok(())
    }

    fn user_stats(&self, user: &UserId) -> Result<Option<UserStats>, RepositoryError> {
        Ok(self.tables.user_stats(user))
    }

    fn sessions_for(&self, user: &UserId) -> Result<Vec<SessionRecord>, RepositoryError> {
        Ok(self.tables.sessions_for(user))
    }

    fn emotion_logs(
        &self,
        user: &UserId,
        session: Option<SessionId>,
    ) -> Result<Vec<EmotionLog>, RepositoryError> {
        Ok(self.tables.emotion_logs(user, session))
    }
}
