use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::emotion::domain::emotion::Emotion;
use crate::session::domain::session::{EmotionLog, SessionId, SessionRecord, UserId, UserStats};
use crate::session::domain::session_repository::{most_common, RepositoryError};

/// The three record kinds behind every repository, kept as plain rows so
/// the file-backed store serializes them directly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionTables {
    next_session: u64,
    users: Vec<UserStats>,
    sessions: Vec<SessionRecord>,
    emotion_logs: Vec<EmotionLog>,
}

impl SessionTables {
    pub fn create_session(&mut self, user: &UserId) -> SessionId {
        let now = Utc::now();
        if !self.users.iter().any(|u| &u.user == user) {
            self.users.push(UserStats::new(user.clone(), now));
        }
        self.next_session += 1;
        let id = SessionId(self.next_session);
        self.sessions.push(SessionRecord {
            id,
            user: user.clone(),
            start_time: now,
            end_time: None,
            total_faces: 0,
            most_common_emotion: None,
        });
        id
    }

    pub fn record_session_end(
        &mut self,
        id: SessionId,
        total_faces: usize,
        dominant: Emotion,
        logs: &[EmotionLog],
    ) -> Result<(), RepositoryError> {
        let record = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(RepositoryError::UnknownSession(id))?;
        record.end_time = Some(Utc::now());
        record.total_faces = total_faces;
        record.most_common_emotion = Some(dominant);
        self.emotion_logs.extend_from_slice(logs);
        Ok(())
    }

    pub fn update_user_aggregates(
        &mut self,
        user: &UserId,
        faces_delta: usize,
        session_dominant: Emotion,
    ) {
        let historical = most_common(
            self.emotion_logs
                .iter()
                .filter(|l| &l.user == user)
                .map(|l| l.emotion),
        );
        let index = match self.users.iter().position(|u| &u.user == user) {
            Some(index) => index,
            None => {
                self.users.push(UserStats::new(user.clone(), Utc::now()));
                self.users.len() - 1
            }
        };
        let stats = &mut self.users[index];
        stats.total_sessions += 1;
        stats.total_faces_detected += faces_delta;
        stats.most_common_emotion = historical.unwrap_or(session_dominant);
    }

    pub fn user_stats(&self, user: &UserId) -> Option<UserStats> {
        self.users.iter().find(|u| &u.user == user).cloned()
    }

    pub fn sessions_for(&self, user: &UserId) -> Vec<SessionRecord> {
        let mut sessions: Vec<SessionRecord> = self
            .sessions
            .iter()
            .filter(|s| &s.user == user)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        sessions
    }

    pub fn emotion_logs(&self, user: &UserId, session: Option<SessionId>) -> Vec<EmotionLog> {
        self.emotion_logs
            .iter()
            .filter(|l| &l.user == user && session.map_or(true, |id| l.session == id))
            .cloned()
            .collect()
    }
}
