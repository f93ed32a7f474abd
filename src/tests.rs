#[cfg(test)]
mod tests {
    use crate::camera::CameraSource;
    use crate::controller::{
        Controller, ControllerConfig, FailurePolicy, Notification, PipelineState, TriggerOutcome,
    };
    use crate::engine::ClassifierEngine;
    use crate::error::{CaptureError, CycleError, InferenceError, RankError};
    use crate::labels::LabelSet;
    use crate::types::{
        ClassifierInput, ConfidenceVector, InputShape, PixelFormat, RawImage, Recognition,
    };
    use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);
    const QUIET: Duration = Duration::from_millis(100);

    /// Camera that blocks each capture until the gate opens (or is dropped).
    struct FakeCamera {
        captures: Arc<AtomicUsize>,
        gate: Receiver<()>,
        fail: bool,
        released: Sender<&'static str>,
    }

    impl CameraSource for FakeCamera {
        fn request_capture(&mut self) -> Result<RawImage, CaptureError> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            let _ = self.gate.recv();
            if self.fail {
                return Err(CaptureError::Unavailable("lens cap on".to_string()));
            }
            Ok(RawImage::new(4, 4, PixelFormat::Rgb8, vec![100; 48]))
        }

        fn release(&mut self) -> Result<(), CaptureError> {
            let _ = self.released.send("camera");
            Ok(())
        }
    }

    /// Engine that optionally blocks each inference until its gate opens.
    struct FakeEngine {
        scores: Vec<u8>,
        gate: Option<Receiver<()>>,
        panics: bool,
        released: Sender<&'static str>,
    }

    impl ClassifierEngine for FakeEngine {
        fn input_shape(&self) -> InputShape {
            InputShape::new(2, 2, 3)
        }

        fn label_count(&self) -> usize {
            3
        }

        fn infer(&mut self, input: &ClassifierInput) -> Result<ConfidenceVector, InferenceError> {
            assert_eq!(input.len(), 12);
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            if self.panics {
                panic!("interpreter crashed");
            }
            Ok(ConfidenceVector::new(self.scores.clone()))
        }

        fn close(&mut self) -> Result<(), InferenceError> {
            let _ = self.released.send("engine");
            Ok(())
        }
    }

    struct Harness {
        controller: Controller,
        notifications: Receiver<Notification>,
        gate: Option<Sender<()>>,
        engine_gate: Option<Sender<()>>,
        captures: Arc<AtomicUsize>,
        released: Receiver<&'static str>,
    }

    struct Setup {
        policy: FailurePolicy,
        gated: bool,
        gated_engine: bool,
        fail_capture: bool,
        panicking_engine: bool,
        scores: Vec<u8>,
        snapshot: Option<PathBuf>,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                policy: FailurePolicy::Surface,
                gated: false,
                gated_engine: false,
                fail_capture: false,
                panicking_engine: false,
                scores: vec![10, 200, 200],
                snapshot: None,
            }
        }
    }

    fn start(setup: Setup) -> Harness {
        let (gate_tx, gate_rx) = unbounded();
        let (engine_gate_tx, engine_gate_rx) = unbounded();
        let (released_tx, released) = unbounded();
        let (notify, notifications) = unbounded();
        let captures = Arc::new(AtomicUsize::new(0));

        let camera = FakeCamera {
            captures: Arc::clone(&captures),
            gate: gate_rx,
            fail: setup.fail_capture,
            released: released_tx.clone(),
        };
        let engine = FakeEngine {
            scores: setup.scores,
            gate: setup.gated_engine.then_some(engine_gate_rx),
            panics: setup.panicking_engine,
            released: released_tx,
        };
        let labels = Arc::new(LabelSet::new(["cat", "dog", "fish"]).unwrap());
        let config = ControllerConfig {
            top_k: 2,
            failure_policy: setup.policy,
            snapshot: setup.snapshot,
        };
        let controller =
            Controller::start(Box::new(camera), Box::new(engine), labels, config, notify)
                .unwrap();

        Harness {
            controller,
            notifications,
            gate: setup.gated.then_some(gate_tx),
            engine_gate: setup.gated_engine.then_some(engine_gate_tx),
            captures,
            released,
        }
    }

    impl Harness {
        fn next(&self) -> Notification {
            self.notifications
                .recv_timeout(WAIT)
                .expect("Expected a notification")
        }

        fn expect_state(&self, expected: PipelineState) {
            match self.next() {
                Notification::StateChanged(state) => assert_eq!(state, expected),
                other => panic!("Expected StateChanged({expected:?}), got {other:?}"),
            }
        }

        fn expect_quiet(&self) {
            match self.notifications.recv_timeout(QUIET) {
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
                Ok(other) => panic!("Unexpected notification {other:?}"),
            }
        }

        fn open_gate(&self) {
            self.gate.as_ref().unwrap().send(()).unwrap();
        }

        fn open_engine_gate(&self) {
            self.engine_gate.as_ref().unwrap().send(()).unwrap();
        }

        fn released(&self) -> Vec<&'static str> {
            let mut released = vec![
                self.released.recv_timeout(WAIT).unwrap(),
                self.released.recv_timeout(WAIT).unwrap(),
            ];
            released.sort();
            released
        }
    }

    #[test]
    fn test_successful_cycle() {
        let h = start(Setup::default());
        assert_eq!(h.controller.state(), PipelineState::Idle);
        assert_eq!(h.controller.trigger(), TriggerOutcome::Started);

        h.expect_state(PipelineState::Capturing);
        h.expect_state(PipelineState::Classifying);
        match h.next() {
            Notification::Recognized(result) => {
                let recognitions: Vec<_> = result.iter().cloned().collect();
                assert_eq!(
                    recognitions,
                    vec![Recognition::new("dog", 200), Recognition::new("fish", 200)]
                );
            }
            other => panic!("Expected Recognized, got {other:?}"),
        }
        h.expect_state(PipelineState::Idle);
        h.expect_quiet();
        assert_eq!(h.captures.load(Ordering::SeqCst), 1);
        assert_eq!(h.controller.state(), PipelineState::Idle);
    }

    #[test]
    fn test_back_to_back_triggers_run_one_cycle() {
        let h = start(Setup {
            gated: true,
            ..Setup::default()
        });

        assert_eq!(h.controller.trigger(), TriggerOutcome::Started);
        assert_eq!(h.controller.trigger(), TriggerOutcome::Busy);
        h.expect_state(PipelineState::Capturing);
        assert!(matches!(h.next(), Notification::Busy));

        h.open_gate();
        h.expect_state(PipelineState::Classifying);
        assert!(matches!(h.next(), Notification::Recognized(_)));
        h.expect_state(PipelineState::Idle);
        h.expect_quiet();
        assert_eq!(h.captures.load(Ordering::SeqCst), 1);

        // Idle again, so the next trigger is accepted.
        assert_eq!(h.controller.trigger(), TriggerOutcome::Started);
        h.open_gate();
        h.expect_state(PipelineState::Capturing);
        h.expect_state(PipelineState::Classifying);
        assert!(matches!(h.next(), Notification::Recognized(_)));
        h.expect_state(PipelineState::Idle);
        assert_eq!(h.captures.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_trigger_while_classifying_is_busy() {
        let h = start(Setup {
            gated_engine: true,
            ..Setup::default()
        });

        assert_eq!(h.controller.trigger(), TriggerOutcome::Started);
        h.expect_state(PipelineState::Capturing);
        h.expect_state(PipelineState::Classifying);

        assert_eq!(h.controller.trigger(), TriggerOutcome::Busy);
        assert!(matches!(h.next(), Notification::Busy));
        assert_eq!(h.controller.state(), PipelineState::Classifying);

        h.open_engine_gate();
        assert!(matches!(h.next(), Notification::Recognized(_)));
        h.expect_state(PipelineState::Idle);
        h.expect_quiet();
        assert_eq!(h.captures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_during_inference() {
        let h = start(Setup {
            gated_engine: true,
            ..Setup::default()
        });
        assert_eq!(h.controller.trigger(), TriggerOutcome::Started);
        h.expect_state(PipelineState::Capturing);
        h.expect_state(PipelineState::Classifying);

        h.controller.shutdown();
        assert_eq!(h.controller.trigger(), TriggerOutcome::Closed);
        assert!(!h.controller.wait_stopped(QUIET));

        // Inference finishes after shutdown; no result is delivered.
        h.open_engine_gate();
        assert_eq!(h.released(), vec!["camera", "engine"]);
        assert!(h.controller.wait_stopped(WAIT));
        h.expect_quiet();
    }

    #[test]
    fn test_engine_panic_fails_the_cycle() {
        let h = start(Setup {
            panicking_engine: true,
            ..Setup::default()
        });

        for _ in 0..2 {
            assert_eq!(h.controller.trigger(), TriggerOutcome::Started);
            h.expect_state(PipelineState::Capturing);
            h.expect_state(PipelineState::Classifying);
            match h.next() {
                Notification::Failed(CycleError::Panicked(msg)) => {
                    assert_eq!(msg, "interpreter crashed")
                }
                other => panic!("Expected panic failure, got {other:?}"),
            }
            h.expect_state(PipelineState::Idle);
        }
        assert_eq!(h.captures.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_last_capture_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last.png");
        let h = start(Setup {
            snapshot: Some(path.clone()),
            ..Setup::default()
        });

        h.controller.trigger();
        h.expect_state(PipelineState::Capturing);
        h.expect_state(PipelineState::Classifying);
        assert!(matches!(h.next(), Notification::Recognized(_)));
        h.expect_state(PipelineState::Idle);

        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (4, 4));
        assert_eq!(saved.get_pixel(0, 0).0, [100, 100, 100]);
    }

    #[test]
    fn test_unwritable_snapshot_does_not_fail_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let h = start(Setup {
            snapshot: Some(dir.path().join("missing").join("last.png")),
            ..Setup::default()
        });

        h.controller.trigger();
        h.expect_state(PipelineState::Capturing);
        h.expect_state(PipelineState::Classifying);
        assert!(matches!(h.next(), Notification::Recognized(_)));
        h.expect_state(PipelineState::Idle);
    }

    #[test]
    fn test_capture_failure_is_surfaced() {
        let h = start(Setup {
            fail_capture: true,
            ..Setup::default()
        });
        h.controller.trigger();

        h.expect_state(PipelineState::Capturing);
        match h.next() {
            Notification::Failed(CycleError::Capture(CaptureError::Unavailable(msg))) => {
                assert_eq!(msg, "lens cap on")
            }
            other => panic!("Expected capture failure, got {other:?}"),
        }
        h.expect_state(PipelineState::Idle);
        h.expect_quiet();
    }

    #[test]
    fn test_capture_failure_is_suppressed() {
        let h = start(Setup {
            fail_capture: true,
            policy: FailurePolicy::Suppress,
            ..Setup::default()
        });
        h.controller.trigger();

        h.expect_state(PipelineState::Capturing);
        h.expect_state(PipelineState::Idle);
        h.expect_quiet();
    }

    #[test]
    fn test_label_mismatch_fails_ranking() {
        let h = start(Setup {
            scores: vec![1, 2],
            ..Setup::default()
        });
        h.controller.trigger();

        h.expect_state(PipelineState::Capturing);
        h.expect_state(PipelineState::Classifying);
        assert!(matches!(
            h.next(),
            Notification::Failed(CycleError::Rank(RankError::LengthMismatch {
                confidences: 2,
                labels: 3
            }))
        ));
        h.expect_state(PipelineState::Idle);
    }

    #[test]
    fn test_shutdown_during_capture() {
        let h = start(Setup {
            gated: true,
            ..Setup::default()
        });
        assert_eq!(h.controller.trigger(), TriggerOutcome::Started);
        h.expect_state(PipelineState::Capturing);

        h.controller.shutdown();
        h.controller.shutdown();
        assert_eq!(h.controller.trigger(), TriggerOutcome::Closed);

        // The capture completes after shutdown; its outcome goes nowhere.
        h.open_gate();
        assert_eq!(h.released(), vec!["camera", "engine"]);
        assert!(h.controller.wait_stopped(WAIT));
        h.expect_quiet();
        assert_eq!(h.captures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_resources() {
        let h = start(Setup::default());
        let Harness {
            controller,
            released,
            notifications,
            ..
        } = h;
        drop(controller);

        let mut got = vec![
            released.recv_timeout(WAIT).unwrap(),
            released.recv_timeout(WAIT).unwrap(),
        ];
        got.sort();
        assert_eq!(got, vec!["camera", "engine"]);
        assert!(notifications.try_recv().is_err());
    }
}
