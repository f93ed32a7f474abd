//! Capture-classify controller.
//!
//! The controller is a re-entrant state machine driven by trigger events:
//!
//! ```text
//!          trigger                capture ok
//!   Idle ──────────▶ Capturing ──────────────▶ Classifying
//!    ▲                   │                         │
//!    └───────────────────┴─────── result / failure ┘
//! ```
//!
//! At most one cycle is in flight. A trigger that arrives while the state
//! is not [`PipelineState::Idle`] is rejected with [`Notification::Busy`]
//! rather than queued, so the single engine instance is never used
//! concurrently.
//!
//! Capture and inference run on a dedicated worker thread. Everything the
//! caller needs to know arrives as [`Notification`]s on the channel given to
//! [`Controller::start`]; notifications are sent while holding the state
//! lock, so none can be delivered after [`Controller::shutdown`] returns.

use crate::camera::{save_snapshot, CameraSource};
use crate::engine::ClassifierEngine;
use crate::error::{AppError, CaptureError, CycleError, InferenceError};
use crate::labels::LabelSet;
use crate::lifecycle::ReleaseGuard;
use crate::preprocess::Preprocessor;
use crate::ranker::{rank, DEFAULT_TOP_K};
use crate::types::RecognitionResult;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use serde::Deserialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, info_span, warn};

/// Where the pipeline currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Capturing,
    Classifying,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Capturing => write!(f, "capturing"),
            PipelineState::Classifying => write!(f, "classifying"),
        }
    }
}

/// What to do with a cycle that failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Deliver [`Notification::Failed`] before returning to idle.
    #[default]
    Surface,
    /// Log the failure and return to idle without a notification.
    Suppress,
}

/// Asynchronous output of the controller.
#[derive(Debug)]
pub enum Notification {
    /// A trigger was rejected because a cycle is in flight.
    Busy,
    StateChanged(PipelineState),
    Recognized(RecognitionResult),
    Failed(CycleError),
}

/// Immediate answer to [`Controller::trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    Busy,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Number of recognitions per result
    pub top_k: usize,
    pub failure_policy: FailurePolicy,
    /// Keep the last capture at this path
    pub snapshot: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            failure_policy: FailurePolicy::default(),
            snapshot: None,
        }
    }
}

enum Job {
    Capture,
}

struct Inner {
    state: PipelineState,
    open: bool,
    notify: Sender<Notification>,
}

impl Inner {
    fn emit(&self, notification: Notification) {
        if self.open {
            // A dropped receiver only means nobody is listening any more.
            let _ = self.notify.send(notification);
        }
    }

    fn set_state(&mut self, state: PipelineState) {
        self.state = state;
        debug!(%state, "Pipeline state");
        self.emit(Notification::StateChanged(state));
    }
}

struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `state` unless the controller has been shut down.
    fn transition(&self, state: PipelineState) -> bool {
        let mut inner = self.lock();
        if !inner.open {
            return false;
        }
        inner.set_state(state);
        true
    }
}

/// Handle to the running pipeline.
pub struct Controller {
    shared: Arc<Shared>,
    jobs: Mutex<Option<Sender<Job>>>,
    stopped: Receiver<()>,
}

impl Controller {
    /// Take ownership of the camera and engine and start the worker.
    ///
    /// Both are released by the worker when it exits after
    /// [`shutdown`](Self::shutdown), or right away if starting fails.
    pub fn start(
        camera: Box<dyn CameraSource>,
        engine: Box<dyn ClassifierEngine>,
        labels: Arc<LabelSet>,
        config: ControllerConfig,
        notify: Sender<Notification>,
    ) -> Result<Self, AppError> {
        let input_shape = engine.input_shape();
        let camera = ReleaseGuard::new("camera", camera);
        let engine = ReleaseGuard::new("classifier engine", engine);
        let preprocessor = Preprocessor::new(input_shape)?;

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: PipelineState::Idle,
                open: true,
                notify,
            }),
        });
        let (jobs, queue) = unbounded();
        let (done, stopped) = bounded::<()>(0);

        info!(
            input = %input_shape,
            top_k = config.top_k,
            failure_policy = ?config.failure_policy,
            snapshot = ?config.snapshot,
            "Starting controller"
        );
        let worker = Worker {
            shared: Arc::clone(&shared),
            camera,
            engine,
            preprocessor,
            labels,
            top_k: config.top_k,
            failure_policy: config.failure_policy,
            snapshot: config.snapshot,
            cycles: 0,
            _done: done,
        };
        thread::Builder::new()
            .name("capture-classify".to_string())
            .spawn(move || worker.run(queue))?;

        Ok(Self {
            shared,
            jobs: Mutex::new(Some(jobs)),
            stopped,
        })
    }

    /// Start a cycle, or report busy if one is in flight.
    ///
    /// Returns immediately; the result arrives as a notification.
    pub fn trigger(&self) -> TriggerOutcome {
        let mut inner = self.shared.lock();
        if !inner.open {
            return TriggerOutcome::Closed;
        }
        if inner.state != PipelineState::Idle {
            debug!(state = %inner.state, "Trigger rejected");
            inner.emit(Notification::Busy);
            return TriggerOutcome::Busy;
        }

        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let sent = jobs
            .as_ref()
            .is_some_and(|jobs| jobs.send(Job::Capture).is_ok());
        if !sent {
            warn!("Capture worker is gone");
            return TriggerOutcome::Closed;
        }
        inner.set_state(PipelineState::Capturing);
        TriggerOutcome::Started
    }

    pub fn state(&self) -> PipelineState {
        self.shared.lock().state
    }

    /// Stop delivering notifications and let the worker wind down.
    ///
    /// Does not wait for an in-flight capture or inference; its outcome is
    /// discarded and the worker releases the camera and the engine once it
    /// returns. Safe to call more than once.
    pub fn shutdown(&self) {
        {
            let mut inner = self.shared.lock();
            if !inner.open {
                return;
            }
            inner.open = false;
        }
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        info!("Controller shut down");
    }

    /// Wait up to `timeout` for the worker to release its resources.
    ///
    /// Returns false if the worker is still busy when the time runs out.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        matches!(
            self.stopped.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("Controller")
            .field("state", &inner.state)
            .field("open", &inner.open)
            .finish()
    }
}

struct Worker {
    shared: Arc<Shared>,
    camera: ReleaseGuard<Box<dyn CameraSource>>,
    engine: ReleaseGuard<Box<dyn ClassifierEngine>>,
    preprocessor: Preprocessor,
    labels: Arc<LabelSet>,
    top_k: usize,
    failure_policy: FailurePolicy,
    snapshot: Option<PathBuf>,
    cycles: u64,
    // Declared last so it disconnects after the guards have released.
    _done: Sender<()>,
}

impl Worker {
    fn run(mut self, queue: Receiver<Job>) {
        while let Ok(Job::Capture) = queue.recv() {
            self.cycles += 1;
            let span = info_span!("recognition", cycle = self.cycles);
            let _enter = span.enter();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.cycle()))
                .unwrap_or_else(|payload| {
                    Err(CycleError::Panicked(panic_message(payload.as_ref())))
                });
            self.finish(outcome);
        }
        debug!(cycles = self.cycles, "Capture worker exiting");
    }

    /// One capture-classify pass. `Ok(None)` means shutdown interrupted it.
    fn cycle(&mut self) -> Result<Option<RecognitionResult>, CycleError> {
        let camera = self.camera.get_mut().ok_or(CaptureError::Released)?;
        let image = camera.request_capture()?;
        debug!(width = image.width, height = image.height, "Captured");
        if let Some(path) = &self.snapshot {
            if let Err(e) = save_snapshot(&image, path) {
                warn!(path = %path.display(), error = %e, "Failed to save capture");
            }
        }

        if !self.shared.transition(PipelineState::Classifying) {
            return Ok(None);
        }

        let input = self.preprocessor.preprocess(&image)?;
        drop(image);
        let engine = self.engine.get_mut().ok_or(InferenceError::Closed)?;
        let confidences = engine.infer(&input)?;
        let result = rank(&confidences, &self.labels, self.top_k)?;
        Ok(Some(result))
    }

    fn finish(&self, outcome: Result<Option<RecognitionResult>, CycleError>) {
        let mut inner = self.shared.lock();
        if !inner.open {
            debug!("Discarding cycle outcome after shutdown");
            return;
        }
        match outcome {
            Ok(Some(result)) => {
                info!(%result, "Recognized");
                inner.emit(Notification::Recognized(result));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "Recognition cycle failed");
                if self.failure_policy == FailurePolicy::Surface {
                    inner.emit(Notification::Failed(err));
                }
            }
        }
        inner.set_state(PipelineState::Idle);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
