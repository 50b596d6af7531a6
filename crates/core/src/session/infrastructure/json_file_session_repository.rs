use std::fs;
use std::path::{Path, PathBuf};

use crate::emotion::domain::emotion::Emotion;
use crate::session::domain::session::{EmotionLog, SessionId, SessionRecord, UserId, UserStats};
use crate::session::domain::session_repository::{RepositoryError, SessionRepository};
use crate::session::infrastructure::session_tables::SessionTables;

/// Stores all records as one JSON document.
///
/// Every change is applied to a copy, written to `<path>.part` and renamed
/// over the store, so the file on disk is always a complete document and a
/// failed write leaves the in-memory state unchanged.
pub struct JsonFileSessionRepository {
    path: PathBuf,
    tables: SessionTables,
}

impl JsonFileSessionRepository {
    /// Loads the store at `path`, or starts empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        let tables = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            SessionTables::default()
        };
        log::debug!("Opened session store {}", path.display());
        Ok(Self { path, tables })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn commit(&mut self, next: SessionTables) -> Result<(), RepositoryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let part = part_path(&self.path);
        let json = serde_json::to_string_pretty(&next)?;
        fs::write(&part, json)?;
        if let Err(e) = fs::rename(&part, &self.path) {
            let _ = fs::remove_file(&part);
            return Err(e.into());
        }
        self.tables = next;
        Ok(())
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

impl SessionRepository for JsonFileSessionRepository {
    fn create_session(&mut self, user: &UserId) -> Result<SessionId, RepositoryError> {
        let mut next = self.tables.clone();
        let id = next.create_session(user);
        self.commit(next)?;
        Ok(id)
    }

    fn record_session_end(
        &mut self,
        id: SessionId,
        total_faces: usize,
        dominant: Emotion,
        logs: &[EmotionLog],
    ) -> Result<(), RepositoryError> {
        let mut next = self.tables.clone();
        next.record_session_end(id, total_faces, dominant, logs)?;
        self.commit(next)
    }

    fn update_user_aggregates(
        &mut self,
        user: &UserId,
        faces_delta: usize,
        session_dominant: Emotion,
    ) -> Result<(), RepositoryError> {
        let mut next = self.tables.clone();
        next.update_user_aggregates(user, faces_delta, session_dominant);
        self.commit(next)
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> PathBuf {
        dir.path().join("sessions.json")
    }

    #[test]
    fn test_missing_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let repo = JsonFileSessionRepository::open(store_in(&dir)).unwrap();
        assert!(repo.user_stats(&UserId::new("ada")).unwrap().is_none());
        assert!(!repo.path().exists());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = store_in(&dir);
        let user = UserId::new("ada");

        let id = {
            let mut repo = JsonFileSessionRepository::open(&path).unwrap();
            let id = repo.create_session(&user).unwrap();
            let logs = vec![EmotionLog {
                session: id,
                user: user.clone(),
                identity: 0,
                emotion: Emotion::Surprise,
                recorded_at: Utc::now(),
            }];
            repo.record_session_end(id, 1, Emotion::Surprise, &logs).unwrap();
            repo.update_user_aggregates(&user, 1, Emotion::Surprise).unwrap();
            id
        };

        let repo = JsonFileSessionRepository::open(&path).unwrap();
        let stats = repo.user_stats(&user).unwrap().unwrap();
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.most_common_emotion, Emotion::Surprise);
        assert_eq!(repo.sessions_for(&user).unwrap()[0].id, id);
        assert_eq!(repo.emotion_logs(&user, Some(id)).unwrap().len(), 1);
    }

    #[test]
    fn test_ids_continue_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = store_in(&dir);
        let user = UserId::new("ada");
        let first = JsonFileSessionRepository::open(&path)
            .unwrap()
            .create_session(&user)
            .unwrap();
        let second = JsonFileSessionRepository::open(&path)
            .unwrap()
            .create_session(&user)
            .unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_no_part_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = store_in(&dir);
        let mut repo = JsonFileSessionRepository::open(&path).unwrap();
        repo.create_session(&UserId::new("ada")).unwrap();
        assert!(path.exists());
        assert!(!part_path(&path).exists());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = store_in(&dir);
        fs::write(&path, "{ not json").unwrap();
        let err = JsonFileSessionRepository::open(&path).err().unwrap();
        assert!(matches!(err, RepositoryError::Serialization(_)));
    }

    #[test]
    fn test_failed_end_leaves_store_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = store_in(&dir);
        let mut repo = JsonFileSessionRepository::open(&path).unwrap();
        repo.create_session(&UserId::new("ada")).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        assert!(repo
            .record_session_end(SessionId(42), 0, Emotion::Neutral, &[])
            .is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/sessions.json");
        let mut repo = JsonFileSessionRepository::open(&path).unwrap();
        repo.create_session(&UserId::new("ada")).unwrap();
        assert!(path.exists());
    }
}
