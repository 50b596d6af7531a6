use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::pipeline::frame_channel::{frame_channel, FrameReceiver, FrameSender, PushOutcome};
use crate::pipeline::frame_processor::{lock, FrameProcessor};
use crate::pipeline::live_feed::LiveFeed;
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::video::domain::frame_source::FrameSource;

/// The camera is shared between the controller, which opens it, and the
/// capturer, which reads from it and closes it when its session stops.
pub type SharedSource = Arc<Mutex<Box<dyn FrameSource>>>;

/// A named background thread that can be joined with a deadline.
///
/// The thread signals completion through a channel when its closure
/// returns or unwinds, so the owner can wait with a timeout and detach a
/// thread that overstays instead of blocking on `JoinHandle::join`.
pub struct Worker {
    name: String,
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

struct DoneGuard(Sender<()>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

impl Worker {
    pub fn spawn<F>(name: &str, body: F) -> std::io::Result<Worker>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = DoneGuard(done_tx);
                body();
            })?;
        Ok(Worker {
            name: name.to_string(),
            handle,
            done: done_rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits up to `timeout` for the thread to finish. Returns `false` and
    /// detaches the thread when it does not.
    pub fn join_timeout(self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    log::error!("{} worker panicked", self.name);
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "{} worker did not finish within {timeout:?}; detaching it",
                    self.name
                );
                false
            }
        }
    }
}

/// The capturer and processor threads of one live session.
pub struct SessionWorkers {
    capturer: Worker,
    processor: Worker,
}

impl SessionWorkers {
    /// Wires a fresh frame channel between a capturer reading `source` and a
    /// processor running `processor`, both bound to `feed`.
    pub fn spawn(
        source: SharedSource,
        processor: FrameProcessor,
        feed: Arc<LiveFeed>,
        config: &PipelineConfig,
        logger: Box<dyn PipelineLogger>,
    ) -> std::io::Result<SessionWorkers> {
        let (tx, rx) = frame_channel(config.channel_capacity);
        let capturer = spawn_capturer(source, tx, feed.clone(), config)?;
        let processor = match spawn_processor(processor, rx, feed.clone(), config, logger) {
            Ok(worker) => worker,
            Err(e) => {
                feed.stop();
                capturer.join_timeout(config.join_timeout);
                return Err(e);
            }
        };
        Ok(SessionWorkers {
            capturer,
            processor,
        })
    }

    /// Joins both workers, each bounded by `timeout`. Returns `true` when
    /// both finished in time. The feed must already be stopped.
    pub fn join(self, timeout: Duration) -> bool {
        let capturer = self.capturer.join_timeout(timeout);
        let processor = self.processor.join_timeout(timeout);
        capturer && processor
    }
}

/// Reads frames while `feed` is running, downsamples them to the capture
/// resolution and offers them to the channel, dropping frames the processor
/// has no room for. Failed reads are skipped.
///
/// The capturer closes the source when its session stops. The close happens
/// under the same lock as the last read, so a capturer that overstays its
/// join can never close a source a later session has reopened.
pub fn spawn_capturer(
    source: SharedSource,
    tx: FrameSender,
    feed: Arc<LiveFeed>,
    config: &PipelineConfig,
) -> std::io::Result<Worker> {
    let (cw, ch) = config.capture_size;
    let interval = config.capture_interval;

    Worker::spawn("capturer", move || {
        let mut captured = 0usize;
        let mut dropped = 0usize;
        let mut failed = 0usize;

        loop {
            let read = {
                let mut camera = lock(&source);
                if !feed.is_running() {
                    camera.close();
                    break;
                }
                let read = camera.read();
                if !feed.is_running() {
                    camera.close();
                    break;
                }
                read
            };
            match read {
                Ok(frame) => {
                    let frame = frame.resized(cw, ch).with_index(captured);
                    captured += 1;
                    // Disconnected only once the processor has seen the stop.
                    match tx.try_push(frame) {
                        PushOutcome::Queued => {}
                        PushOutcome::Dropped | PushOutcome::Disconnected => dropped += 1,
                    }
                }
                Err(e) => {
                    failed += 1;
                    log::debug!("Skipping failed camera read: {e}");
                }
            }
            thread::sleep(interval);
        }

        log::info!(
            "Capturer stopped: {captured} frames captured, {dropped} dropped, {failed} failed reads"
        );
    })
}

/// Drains the channel while `feed` is running. A panic inside one frame's
/// processing abandons that frame only.
pub fn spawn_processor(
    mut processor: FrameProcessor,
    rx: FrameReceiver,
    feed: Arc<LiveFeed>,
    config: &PipelineConfig,
    mut logger: Box<dyn PipelineLogger>,
) -> std::io::Result<Worker> {
    let idle = config.idle_poll_interval;

    Worker::spawn("processor", move || {
        while feed.is_running() {
            let Some(frame) = rx.try_pop() else {
                thread::sleep(idle);
                continue;
            };
            logger.metric("channel_depth", rx.len() as f64);

            let index = frame.index();
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                processor.process(frame, &feed, &mut *logger)
            }));
            if let Err(payload) = result {
                log::error!(
                    "Abandoned frame {index}: processing panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }

        logger.summary();
        log::info!(
            "Processor stopped after {} frames",
            processor.frames_processed()
        );
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
