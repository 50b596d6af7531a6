use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::emotion::domain::emotion::Emotion;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whoever a session is recorded against.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One recorded session. `end_time` stays `None` until the session stops.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub user: UserId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_faces: usize,
    pub most_common_emotion: Option<Emotion>,
}

/// The last label of one tracked face, written when its session stops.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmotionLog {
    pub session: SessionId,
    pub user: UserId,
    pub identity: u32,
    pub emotion: Emotion,
    pub recorded_at: DateTime<Utc>,
}

/// Running totals across all of a user's sessions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user: UserId,
    pub created_at: DateTime<Utc>,
    pub total_sessions: usize,
    pub total_faces_detected: usize,
    pub most_common_emotion: Emotion,
}

impl UserStats {
    pub fn new(user: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            user,
            created_at,
            total_sessions: 0,
            total_faces_detected: 0,
            most_common_emotion: Emotion::Neutral,
        }
    }
}

/// What a stopped session handed to persistence.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionReport {
    pub session: SessionId,
    pub user: UserId,
    pub total_faces: usize,
    pub dominant_emotion: Emotion,
    pub logs: Vec<EmotionLog>,
    /// Whether the session end and the user totals were both stored.
    pub persisted: bool,
    /// Whether both workers finished within the join timeout.
    pub workers_joined: bool,
}
