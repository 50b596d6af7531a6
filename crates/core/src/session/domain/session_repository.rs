use std::collections::BTreeMap;

use thiserror::Error;

use crate::emotion::domain::emotion::Emotion;
use crate::session::domain::session::{EmotionLog, SessionId, SessionRecord, UserId, UserStats};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("session store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session store is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Durable record of sessions, per-face emotion logs and per-user totals.
pub trait SessionRepository: Send {
    /// Opens a session record stamped with the current time.
    fn create_session(&mut self, user: &UserId) -> Result<SessionId, RepositoryError>;

    /// Stamps the end time and final tallies, and stores one log row per
    /// labelled face.
    fn record_session_end(
        &mut self,
        id: SessionId,
        total_faces: usize,
        dominant: Emotion,
        logs: &[EmotionLog],
    ) -> Result<(), RepositoryError>;

    /// Counts one more session and `faces_delta` more faces for `user`, and
    /// recomputes the user's most common emotion over every log on record.
    /// `session_dominant` is used when the user has no logs at all.
    fn update_user_aggregates(
        &mut self,
        user: &UserId,
        faces_delta: usize,
        session_dominant: Emotion,
    ) -> Result<(), RepositoryError>;

    fn user_stats(&self, user: &UserId) -> Result<Option<UserStats>, RepositoryError>;

    /// The user's sessions, newest first.
    fn sessions_for(&self, user: &UserId) -> Result<Vec<SessionRecord>, RepositoryError>;

    /// Logs for the user, optionally narrowed to one session.
    fn emotion_logs(
        &self,
        user: &UserId,
        session: Option<SessionId>,
    ) -> Result<Vec<EmotionLog>, RepositoryError>;

    /// Log counts per label over the whole vocabulary, zeros included.
    fn emotion_distribution(
        &self,
        user: &UserId,
        session: Option<SessionId>,
    ) -> Result<BTreeMap<Emotion, usize>, RepositoryError> {
        let logs = self.emotion_logs(user, session)?;
        Ok(distribution(logs.iter().map(|l| l.emotion)))
    }
}

pub fn distribution(emotions: impl IntoIterator<Item = Emotion>) -> BTreeMap<Emotion, usize> {
    let mut counts: BTreeMap<Emotion, usize> = Emotion::ALL.iter().map(|&e| (e, 0)).collect();
    for e in emotions {
        *counts.entry(e).or_insert(0) += 1;
    }
    counts
}

/// Most frequent label; ties go to the earlier vocabulary entry.
pub fn most_common(emotions: impl IntoIterator<Item = Emotion>) -> Option<Emotion> {
    let counts = distribution(emotions);
    let mut best: Option<(Emotion, usize)> = None;
    for (emotion, count) in counts {
        if count > 0 && best.map_or(true, |(_, c)| count > c) {
            best = Some((emotion, count));
        }
    }
    best.map(|(e, _)| e)
}
