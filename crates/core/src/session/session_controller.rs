use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use thiserror::Error;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::annotation::infrastructure::box_annotator::BoxAnnotator;
use crate::detection::domain::face_detector::FaceDetector;
use crate::emotion::domain::emotion::Emotion;
use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::emotion::domain::emotion_summary::EmotionSummary;
use crate::pipeline::frame_processor::{
    lock, FrameProcessor, SharedAnnotator, SharedClassifier, SharedDetector,
};
use crate::pipeline::frame_stream::FrameStream;
use crate::pipeline::infrastructure::threaded_session_pipeline::{SessionWorkers, SharedSource};
use crate::pipeline::live_feed::{LiveFeed, Published};
use crate::pipeline::pipeline_config::{ConfigError, PipelineConfig};
use crate::pipeline::pipeline_logger::{LogPipelineLogger, PipelineLogger};
use crate::session::domain::session::{EmotionLog, SessionId, SessionReport, UserId};
use crate::session::domain::session_repository::{RepositoryError, SessionRepository};
use crate::video::domain::frame_source::{FrameSource, FrameSourceError};
use crate::video::domain::image_encoder::ImageEncoder;
use crate::video::infrastructure::jpeg_image_encoder::JpegImageEncoder;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
}

#[derive(Error, Debug)]
pub enum StartError {
    #[error("a session is already active")]
    AlreadyActive,
    #[error("camera unavailable: {0}")]
    Camera(#[from] FrameSourceError),
    #[error("could not create session record: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("could not start session workers: {0}")]
    Workers(#[from] std::io::Error),
}

#[derive(Debug)]
pub enum StopOutcome {
    Stopped(SessionReport),
    NotActive,
}

pub type LoggerFactory = Box<dyn Fn() -> Box<dyn PipelineLogger> + Send + Sync>;

#[derive(Clone, Copy, Debug)]
struct Status {
    state: SessionState,
    session: Option<SessionId>,
}

struct ActiveSession {
    id: SessionId,
    user: UserId,
    feed: Arc<LiveFeed>,
    workers: SessionWorkers,
}

/// Owns the camera, the models and the session store, and runs at most one
/// live session at a time.
///
/// Start and stop are serialized by one transition lock. Readers
/// (`state`, `current_summary`, `frame_stream`) never take that lock, so
/// they stay responsive while a transition waits on the workers.
pub struct SessionController {
    source: SharedSource,
    detector: SharedDetector,
    classifier: SharedClassifier,
    annotator: SharedAnnotator,
    encoder: Arc<dyn ImageEncoder>,
    repository: Mutex<Box<dyn SessionRepository>>,
    logger_factory: LoggerFactory,
    config: PipelineConfig,
    transition: Mutex<Option<ActiveSession>>,
    status: Published<Status>,
    feed: RwLock<Arc<LiveFeed>>,
}

impl SessionController {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn FaceDetector>,
        classifier: Box<dyn EmotionClassifier>,
        repository: Box<dyn SessionRepository>,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let every = config.log_every_frames;
        Ok(Self {
            source: Arc::new(Mutex::new(source)),
            detector: Arc::new(Mutex::new(detector)),
            classifier: Arc::new(Mutex::new(classifier)),
            annotator: Arc::new(BoxAnnotator::new()),
            encoder: Arc::new(JpegImageEncoder::default()),
            repository: Mutex::new(repository),
            logger_factory: Box::new(move || Box::new(LogPipelineLogger::new(every))),
            config,
            transition: Mutex::new(None),
            status: Published::new(Status {
                state: SessionState::Idle,
                session: None,
            }),
            feed: RwLock::new(LiveFeed::idle()),
        })
    }

    pub fn with_annotator(mut self, annotator: Arc<dyn FrameAnnotator>) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn ImageEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_logger_factory(mut self, factory: LoggerFactory) -> Self {
        self.logger_factory = factory;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.status.load().state
    }

    pub fn active_session(&self) -> Option<SessionId> {
        let status = self.status.load();
        match status.state {
            SessionState::Active => status.session,
            _ => None,
        }
    }

    /// Latest sampled summary of the running session; the zero value when
    /// idle or before the first sampled frame.
    pub fn current_summary(&self) -> EmotionSummary {
        self.current_feed().summary().as_ref().clone()
    }

    /// Annotated frames of the session running now. Ends when that session
    /// stops; empty if called while idle.
    pub fn frame_stream(&self) -> FrameStream {
        FrameStream::new(
            self.current_feed(),
            self.encoder.clone(),
            self.config.stream_interval,
        )
    }

    /// Read access to the session store.
    pub fn with_repository<R>(&self, f: impl FnOnce(&dyn SessionRepository) -> R) -> R {
        let repo = lock(&self.repository);
        f(repo.as_ref())
    }

    pub fn start_session(&self, user: &UserId) -> Result<SessionId, StartError> {
        let mut active = lock(&self.transition);
        if active.is_some() {
            return Err(StartError::AlreadyActive);
        }
        self.set_status(SessionState::Starting, None);

        match self.launch(user) {
            Ok(session) => {
                let id = session.id;
                self.set_feed(session.feed.clone());
                *active = Some(session);
                self.set_status(SessionState::Active, Some(id));
                log::info!("Session {id} started for {user}");
                Ok(id)
            }
            Err(e) => {
                self.set_status(SessionState::Idle, None);
                log::error!("Could not start session for {user}: {e}");
                Err(e)
            }
        }
    }

    fn launch(&self, user: &UserId) -> Result<ActiveSession, StartError> {
        lock(&self.source).open()?;

        let id = match lock(&self.repository).create_session(user) {
            Ok(id) => id,
            Err(e) => {
                lock(&self.source).close();
                return Err(e.into());
            }
        };

        let feed = LiveFeed::running();
        let processor = FrameProcessor::new(
            self.detector.clone(),
            self.classifier.clone(),
            self.annotator.clone(),
            self.config.clone(),
        );
        let workers = match SessionWorkers::spawn(
            self.source.clone(),
            processor,
            feed.clone(),
            &self.config,
            (self.logger_factory)(),
        ) {
            Ok(workers) => workers,
            Err(e) => {
                feed.stop();
                lock(&self.source).close();
                if let Err(persist) =
                    lock(&self.repository).record_session_end(id, 0, Emotion::Neutral, &[])
                {
                    log::warn!("Could not close session record {id}: {persist}");
                }
                return Err(e.into());
            }
        };

        Ok(ActiveSession {
            id,
            user: user.clone(),
            feed,
            workers,
        })
    }

    /// Stops the running session and stores its final tallies. Persistence
    /// failures are logged, never returned. Calling it while idle is a no-op.
    ///
    /// Waits at most `join_timeout` per worker. The capturer releases the
    /// camera as it exits; one detached mid-read releases it once that read
    /// returns.
    pub fn stop_session(&self) -> StopOutcome {
        let mut active = lock(&self.transition);
        let Some(ActiveSession {
            id,
            user,
            feed,
            workers,
        }) = active.take()
        else {
            return StopOutcome::NotActive;
        };
        self.set_status(SessionState::Stopping, Some(id));

        feed.stop();
        let workers_joined = workers.join(self.config.join_timeout);
        if !workers_joined {
            log::warn!("Session {id} workers still running; camera is released when they exit");
        }

        let summary = feed.summary();
        let total_faces = summary.total_faces;
        let dominant_emotion = summary.dominant().unwrap_or_default();
        let now = Utc::now();
        let logs: Vec<EmotionLog> = feed
            .tracks()
            .values()
            .filter_map(|face| {
                face.emotion.map(|emotion| EmotionLog {
                    session: id,
                    user: user.clone(),
                    identity: face.identity,
                    emotion,
                    recorded_at: now,
                })
            })
            .collect();

        let persisted = self.persist_end(id, &user, total_faces, dominant_emotion, &logs);

        self.set_feed(LiveFeed::idle());
        self.set_status(SessionState::Idle, None);
        log::info!("Session {id} stopped: {total_faces} faces, mostly {dominant_emotion}");

        StopOutcome::Stopped(SessionReport {
            session: id,
            user,
            total_faces,
            dominant_emotion,
            logs,
            persisted,
            workers_joined,
        })
    }

    fn persist_end(
        &self,
        id: SessionId,
        user: &UserId,
        total_faces: usize,
        dominant: Emotion,
        logs: &[EmotionLog],
    ) -> bool {
        let mut repo = lock(&self.repository);
        let mut persisted = true;
        if let Err(e) = repo.record_session_end(id, total_faces, dominant, logs) {
            log::error!("Could not record end of session {id}: {e}");
            persisted = false;
        }
        if let Err(e) = repo.update_user_aggregates(user, total_faces, dominant) {
            log::error!("Could not update totals for {user}: {e}");
            persisted = false;
        }
        persisted
    }

    fn set_status(&self, state: SessionState, session: Option<SessionId>) {
        self.status.publish(Status { state, session });
    }

    fn set_feed(&self, feed: Arc<LiveFeed>) {
        *self.feed.write().unwrap_or_else(PoisonError::into_inner) = feed;
    }

    fn current_feed(&self) -> Arc<LiveFeed> {
        self.feed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let StopOutcome::Stopped(report) = self.stop_session() {
            log::info!("Session {} stopped on shutdown", report.session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::domain::session::{SessionRecord, UserStats};
    use crate::session::infrastructure::in_memory_session_repository::InMemorySessionRepository;
    use crate::shared::face_box::FaceBox;
    use crate::testing::{CyclingClassifier, FixedDetector, Probe, ScriptedSource, SharedBoxesDetector};
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use std::thread;
    use std::time::{Duration, Instant};

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            capture_interval: Duration::from_millis(2),
            idle_poll_interval: Duration::from_millis(1),
            stream_interval: Duration::from_millis(1),
            join_timeout: Duration::from_secs(2),
            ..PipelineConfig::default()
        }
    }

    fn controller_with(
        source: ScriptedSource,
        detector: Box<dyn FaceDetector>,
        repository: Box<dyn SessionRepository>,
        config: PipelineConfig,
    ) -> SessionController {
        SessionController::new(
            Box::new(source),
            detector,
            Box::new(CyclingClassifier::new(vec![Emotion::Happy])),
            repository,
            config,
        )
        .unwrap()
        .with_logger_factory(Box::new(|| Box::new(NullPipelineLogger)))
    }

    fn one_face_controller(config: PipelineConfig) -> SessionController {
        controller_with(
            ScriptedSource::new(320, 240),
            Box::new(FixedDetector::new(vec![FaceBox::new(100, 80, 40, 40)])),
            Box::new(InMemorySessionRepository::new()),
            config,
        )
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn ada() -> UserId {
        UserId::new("ada")
    }

    /// Wraps the in-memory store with switchable failures.
    struct FlakyRepository {
        inner: InMemorySessionRepository,
        fail_create: bool,
        fail_end: bool,
    }

    impl FlakyRepository {
        fn new(fail_create: bool, fail_end: bool) -> Self {
            Self {
                inner: InMemorySessionRepository::new(),
                fail_create,
                fail_end,
            }
        }
    }

    impl SessionRepository for FlakyRepository {
        fn create_session(&mut self, user: &UserId) -> Result<SessionId, RepositoryError> {
            if self.fail_create {
                return Err(RepositoryError::Unavailable("database down".into()));
            }
            self.inner.create_session(user)
        }

        fn record_session_end(
            &mut self,
            id: SessionId,
            total_faces: usize,
            dominant: Emotion,
            logs: &[EmotionLog],
        ) -> Result<(), RepositoryError> {
            if self.fail_end {
                return Err(RepositoryError::Unavailable("database down".into()));
            }
            self.inner.record_session_end(id, total_faces, dominant, logs)
        }

        fn update_user_aggregates(
            &mut self,
            user: &UserId,
            faces_delta: usize,
            session_dominant: Emotion,
        ) -> Result<(), RepositoryError> {
            self.inner
                .update_user_aggregates(user, faces_delta, session_dominant)
        }

        fn user_stats(&self, user: &UserId) -> Result<Option<UserStats>, RepositoryError> {
            self.inner.user_stats(user)
        }

        fn sessions_for(&self, user: &UserId) -> Result<Vec<SessionRecord>, RepositoryError> {
            self.inner.sessions_for(user)
        }

        fn emotion_logs(
            &self,
            user: &UserId,
            session: Option<SessionId>,
        ) -> Result<Vec<EmotionLog>, RepositoryError> {
            self.inner.emotion_logs(user, session)
        }
    }

    #[test]
    fn test_new_controller_is_idle_with_zero_summary() {
        let c = one_face_controller(fast_config());
        assert_eq!(c.state(), SessionState::Idle);
        assert_eq!(c.active_session(), None);
        assert_eq!(c.current_summary(), EmotionSummary::default());
        assert_eq!(c.frame_stream().count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SessionController::new(
            Box::new(ScriptedSource::new(320, 240)),
            Box::new(FixedDetector::new(vec![])),
            Box::new(CyclingClassifier::new(vec![Emotion::Happy])),
            Box::new(InMemorySessionRepository::new()),
            PipelineConfig {
                skip_interval: 0,
                ..PipelineConfig::default()
            },
        );
        assert!(matches!(result, Err(ConfigError::SkipInterval)));
    }

    #[test]
    fn test_single_face_session_is_summarized_and_persisted() {
        let c = one_face_controller(fast_config());
        let id = c.start_session(&ada()).unwrap();
        assert_eq!(c.state(), SessionState::Active);
        assert_eq!(c.active_session(), Some(id));

        wait_until(|| !c.current_summary().is_empty());
        let summary = c.current_summary();
        assert_eq!(summary.total_faces, 1);
        assert_eq!(summary.emotions.len(), 1);
        assert_eq!(summary.emotions[&Emotion::Happy], 1);

        let StopOutcome::Stopped(report) = c.stop_session() else {
            panic!("expected an active session");
        };
        assert_eq!(report.session, id);
        assert_eq!(report.total_faces, 1);
        assert_eq!(report.dominant_emotion, Emotion::Happy);
        assert_eq!(report.logs.len(), 1);
        assert_eq!(report.logs[0].identity, 0);
        assert!(report.persisted);
        assert!(report.workers_joined);

        c.with_repository(|repo| {
            let stats = repo.user_stats(&ada()).unwrap().unwrap();
            assert_eq!(stats.total_sessions, 1);
            assert_eq!(stats.total_faces_detected, 1);
            assert_eq!(stats.most_common_emotion, Emotion::Happy);
            let sessions = repo.sessions_for(&ada()).unwrap();
            assert_eq!(sessions[0].most_common_emotion, Some(Emotion::Happy));
            assert!(sessions[0].end_time.is_some());
        });
    }

    #[test]
    fn test_faces_moving_slightly_keep_identities() {
        // Centroids (100,100) and (400,400) at display resolution.
        let boxes = Arc::new(Mutex::new(vec![
            FaceBox::new(30, 30, 40, 40),
            FaceBox::new(180, 180, 40, 40),
        ]));
        let c = controller_with(
            ScriptedSource::new(320, 240),
            Box::new(SharedBoxesDetector {
                boxes: boxes.clone(),
            }),
            Box::new(InMemorySessionRepository::new()),
            PipelineConfig {
                skip_interval: 1,
                ..fast_config()
            },
        );
        c.start_session(&ada()).unwrap();
        wait_until(|| c.current_feed().tracks().len() == 2);
        let before = c.current_feed().tracks();

        // 2-3 capture pixels is roughly 5 display pixels.
        *boxes.lock().unwrap() = vec![
            FaceBox::new(32, 33, 40, 40),
            FaceBox::new(182, 183, 40, 40),
        ];
        wait_until(|| {
            c.current_feed()
                .tracks()
                .values()
                .any(|f| f.face_box.x == 64)
        });
        let after = c.current_feed().tracks();

        for identity in [0u32, 1] {
            let moved = after[&identity].centroid.distance(&before[&identity].centroid);
            assert!(moved < 10.0, "identity {identity} jumped {moved}px");
        }
        c.stop_session();
    }

    #[test]
    fn test_camera_failure_leaves_controller_idle_and_retryable() {
        let source = ScriptedSource::new(320, 240).failing_open();
        let probe = source.probe();
        let c = controller_with(
            source,
            Box::new(FixedDetector::new(vec![])),
            Box::new(InMemorySessionRepository::new()),
            fast_config(),
        );

        assert!(matches!(c.start_session(&ada()), Err(StartError::Camera(_))));
        assert_eq!(c.state(), SessionState::Idle);
        assert!(matches!(c.start_session(&ada()), Err(StartError::Camera(_))));
        assert_eq!(Probe::get(&probe.opens), 2);
        c.with_repository(|repo| assert!(repo.sessions_for(&ada()).unwrap().is_empty()));
    }

    #[test]
    fn test_failed_session_record_releases_camera() {
        let source = ScriptedSource::new(320, 240);
        let probe = source.probe();
        let c = controller_with(
            source,
            Box::new(FixedDetector::new(vec![])),
            Box::new(FlakyRepository::new(true, false)),
            fast_config(),
        );

        assert!(matches!(c.start_session(&ada()), Err(StartError::Persistence(_))));
        assert_eq!(c.state(), SessionState::Idle);
        assert_eq!(Probe::get(&probe.opens), 1);
        assert_eq!(Probe::get(&probe.closes), 1);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let c = one_face_controller(fast_config());
        let id = c.start_session(&ada()).unwrap();
        assert!(matches!(c.start_session(&ada()), Err(StartError::AlreadyActive)));
        assert_eq!(c.active_session(), Some(id));
        c.stop_session();
    }

    #[test]
    fn test_double_stop_reports_not_active() {
        let c = one_face_controller(fast_config());
        c.start_session(&ada()).unwrap();
        assert!(matches!(c.stop_session(), StopOutcome::Stopped(_)));
        assert!(matches!(c.stop_session(), StopOutcome::NotActive));
        assert_eq!(c.state(), SessionState::Idle);
        assert_eq!(c.current_summary(), EmotionSummary::default());
    }

    #[test]
    fn test_stop_while_idle_is_not_active() {
        let c = one_face_controller(fast_config());
        assert!(matches!(c.stop_session(), StopOutcome::NotActive));
    }

    #[test]
    fn test_stop_releases_camera() {
        let source = ScriptedSource::new(320, 240);
        let probe = source.probe();
        let c = controller_with(
            source,
            Box::new(FixedDetector::new(vec![])),
            Box::new(InMemorySessionRepository::new()),
            fast_config(),
        );
        c.start_session(&ada()).unwrap();
        c.stop_session();
        assert_eq!(Probe::get(&probe.closes), 1);
    }

    #[test]
    fn test_persistence_failure_at_stop_is_swallowed() {
        let c = controller_with(
            ScriptedSource::new(320, 240),
            Box::new(FixedDetector::new(vec![FaceBox::new(100, 80, 40, 40)])),
            Box::new(FlakyRepository::new(false, true)),
            fast_config(),
        );
        c.start_session(&ada()).unwrap();
        let StopOutcome::Stopped(report) = c.stop_session() else {
            panic!("expected an active session");
        };
        assert!(!report.persisted);
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[test]
    fn test_session_without_faces_stores_neutral() {
        let c = controller_with(
            ScriptedSource::new(320, 240),
            Box::new(FixedDetector::new(vec![])),
            Box::new(InMemorySessionRepository::new()),
            fast_config(),
        );
        c.start_session(&ada()).unwrap();
        let StopOutcome::Stopped(report) = c.stop_session() else {
            panic!("expected an active session");
        };
        assert_eq!(report.total_faces, 0);
        assert_eq!(report.dominant_emotion, Emotion::Neutral);
        assert!(report.logs.is_empty());
        c.with_repository(|repo| {
            let stats = repo.user_stats(&ada()).unwrap().unwrap();
            assert_eq!(stats.most_common_emotion, Emotion::Neutral);
        });
    }

    #[test]
    fn test_restart_gets_new_session_and_fresh_summary() {
        let c = one_face_controller(fast_config());
        let first = c.start_session(&ada()).unwrap();
        wait_until(|| !c.current_summary().is_empty());
        c.stop_session();

        let second = c.start_session(&ada()).unwrap();
        assert_ne!(first, second);
        assert_eq!(c.current_summary(), EmotionSummary::default());
        c.stop_session();
        c.with_repository(|repo| {
            assert_eq!(repo.user_stats(&ada()).unwrap().unwrap().total_sessions, 2);
        });
    }

    #[test]
    fn test_stream_yields_frames_and_ends_with_session() {
        let c = Arc::new(one_face_controller(fast_config()));
        c.start_session(&ada()).unwrap();
        let mut stream = c.frame_stream();

        let chunk = stream.next().unwrap();
        assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));

        let stopper = {
            let c = c.clone();
            thread::spawn(move || c.stop_session())
        };
        assert!(matches!(stopper.join().unwrap(), StopOutcome::Stopped(_)));
        assert!(stream.next().is_none());
        assert_eq!(c.frame_stream().count(), 0);
    }

    #[test]
    fn test_stream_from_old_session_does_not_follow_new_one() {
        let c = one_face_controller(fast_config());
        c.start_session(&ada()).unwrap();
        let mut old = c.frame_stream();
        c.stop_session();
        c.start_session(&ada()).unwrap();
        assert!(old.next().is_none());
        c.stop_session();
    }

    #[test]
    fn test_drop_stops_active_session() {
        let source = ScriptedSource::new(320, 240);
        let probe = source.probe();
        let c = controller_with(
            source,
            Box::new(FixedDetector::new(vec![])),
            Box::new(InMemorySessionRepository::new()),
            fast_config(),
        );
        c.start_session(&ada()).unwrap();
        drop(c);
        assert_eq!(Probe::get(&probe.closes), 1);
    }

    #[test]
    fn test_stop_counts_faces_from_last_sampled_summary() {
        let c = one_face_controller(PipelineConfig {
            skip_interval: 1_000_000,
            ..fast_config()
        });
        c.start_session(&ada()).unwrap();
        wait_until(|| c.current_feed().tracks().len() == 1);

        let StopOutcome::Stopped(report) = c.stop_session() else {
            panic!("expected an active session");
        };
        assert_eq!(report.total_faces, 0);
        assert_eq!(report.dominant_emotion, Emotion::Neutral);
        assert!(report.logs.is_empty());
        c.with_repository(|repo| {
            let stats = repo.user_stats(&ada()).unwrap().unwrap();
            assert_eq!(stats.total_faces_detected, 0);
        });
    }

    #[test]
    fn test_stalled_camera_read_does_not_hold_up_stop() {
        let source = ScriptedSource::new(320, 240).stalling_on(3, Duration::from_millis(1500));
        let probe = source.probe();
        let c = controller_with(
            source,
            Box::new(FixedDetector::new(vec![])),
            Box::new(InMemorySessionRepository::new()),
            PipelineConfig {
                join_timeout: Duration::from_millis(200),
                ..fast_config()
            },
        );
        c.start_session(&ada()).unwrap();
        wait_until(|| Probe::get(&probe.reads) >= 3);

        let started = Instant::now();
        let StopOutcome::Stopped(report) = c.stop_session() else {
            panic!("expected an active session");
        };
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert!(!report.workers_joined);
        assert_eq!(c.state(), SessionState::Idle);
        assert_eq!(Probe::get(&probe.closes), 0);

        wait_until(|| Probe::get(&probe.closes) == 1);
        assert_eq!(Probe::get(&probe.reads), 3);
    }
}
