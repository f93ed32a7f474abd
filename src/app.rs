//! Application wiring and event loop.
//!
//! Startup brings up the required pieces (labels, engine, camera,
//! controller) and fails if any of them is missing, then adds the optional
//! peripherals (sensors, button, keyboard) and carries on without each one
//! that is unavailable. The loop then multiplexes triggers, sensor events,
//! controller notifications and the shutdown request onto one thread that
//! owns the status display.

use crate::camera::open_camera;
use crate::config::{AppConfig, SensorConfig};
use crate::controller::{Controller, Notification, PipelineState, TriggerOutcome};
use crate::engine::RunnerEngine;
use crate::error::AppError;
use crate::input::{listen_keyboard, GpioButton, InputEvent};
use crate::labels::LabelSet;
use crate::lifecycle::{ReleaseGuard, Subscription};
use crate::presenter::{self, StatusPresenter};
use crate::sensors::{IioSensorFeed, SensorEvent, SensorFeed, SensorKind};
use crate::types::EnvironmentReading;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long shutdown waits for an in-flight cycle to let go of the camera
/// and the engine.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns controller and sensor events into status texts.
#[derive(Debug)]
pub struct StatusView<P: StatusPresenter> {
    presenter: P,
    greeting: Option<String>,
    environment: EnvironmentReading,
    state: PipelineState,
    /// Whether the current cycle has shown a result or failure yet
    cycle_reported: bool,
}

impl<P: StatusPresenter> StatusView<P> {
    pub fn new(presenter: P, greeting: Option<String>) -> Self {
        Self {
            presenter,
            greeting,
            environment: EnvironmentReading::default(),
            state: PipelineState::Idle,
            cycle_reported: false,
        }
    }

    pub fn render(&mut self, text: &str) {
        self.presenter.render(text);
    }

    pub fn environment(&self) -> &EnvironmentReading {
        &self.environment
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn handle_notification(&mut self, notification: Notification) {
        match notification {
            Notification::Busy => self.presenter.render(presenter::BUSY),
            Notification::StateChanged(state) => {
                self.state = state;
                match state {
                    PipelineState::Capturing => {
                        self.cycle_reported = false;
                        self.presenter.render(presenter::RUNNING);
                    }
                    PipelineState::Classifying => {}
                    PipelineState::Idle => {
                        if !self.cycle_reported {
                            self.presenter.render(presenter::HELP);
                        }
                    }
                }
            }
            Notification::Recognized(result) => {
                self.cycle_reported = true;
                self.presenter.render(&presenter::result_text(&result));
            }
            Notification::Failed(error) => {
                self.cycle_reported = true;
                self.presenter.render(&presenter::failure_text(&error));
            }
        }
    }

    pub fn handle_sensor(&mut self, event: SensorEvent) {
        match event {
            SensorEvent::Connected(kind) => info!(sensor = %kind, "Sensor connected"),
            SensorEvent::Disconnected(kind) => warn!(sensor = %kind, "Sensor disconnected"),
            SensorEvent::Reading { kind, value } => debug!(sensor = %kind, value, "Reading"),
        }
        if self.environment.apply(&event) && self.state == PipelineState::Idle {
            let text = presenter::environment_text(self.greeting.as_deref(), &self.environment);
            self.presenter.render(&text);
        }
    }
}

/// Subscribe to every sensor kind the configured device offers.
///
/// Returns no subscriptions when the sensor is disabled or missing.
pub fn start_sensors(config: &SensorConfig, events: &Sender<SensorEvent>) -> Vec<Subscription> {
    if !config.enabled {
        debug!("Sensors disabled");
        return Vec::new();
    }
    let feed = match IioSensorFeed::discover(
        &config.iio_root,
        config.device_names.as_slice(),
        config.poll_interval(),
    ) {
        Ok(feed) => feed,
        Err(e) => {
            warn!(error = %e, "Environmental sensor unavailable, continuing without it");
            return Vec::new();
        }
    };

    SensorKind::ALL
        .into_iter()
        .filter_map(|kind| match feed.subscribe(kind, events.clone()) {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(sensor = %kind, error = %e, "Sensor subscription failed");
                None
            }
        })
        .collect()
}

/// Trigger sources that are up and running.
///
/// Fields drop in order, so listeners stop before the button is unexported.
#[derive(Debug, Default)]
pub struct Inputs {
    listeners: Vec<Subscription>,
    button: Option<ReleaseGuard<GpioButton>>,
}

impl Inputs {
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn has_button(&self) -> bool {
        self.button.is_some()
    }
}

/// Bring up the button and the keyboard, skipping whichever fails.
pub fn start_inputs(config: &AppConfig, events: &Sender<InputEvent>) -> Inputs {
    let mut inputs = Inputs::default();

    if let Some(button_config) = &config.button {
        match GpioButton::open(button_config) {
            Ok(button) => match button.listen(events.clone()) {
                Ok(listener) => {
                    inputs.listeners.push(listener);
                    inputs.button = Some(ReleaseGuard::new("button", button));
                }
                Err(e) => {
                    warn!(error = %e, "Button listener failed, use the keyboard instead");
                    ReleaseGuard::new("button", button).release();
                }
            },
            Err(e) => warn!(error = %e, "Button unavailable, use the keyboard instead"),
        }
    }

    if config.keyboard {
        match listen_keyboard(BufReader::new(std::io::stdin()), events.clone()) {
            Ok(listener) => inputs.listeners.push(listener),
            Err(e) => warn!(error = %e, "Keyboard listener failed"),
        }
    }

    if inputs.is_empty() {
        warn!("No trigger input available, pictures cannot be taken");
    }
    inputs
}

/// Run the application until `shutdown` fires.
pub fn run<P: StatusPresenter>(
    config: &AppConfig,
    display: P,
    shutdown: Receiver<()>,
) -> Result<(), AppError> {
    let mut view = StatusView::new(display, config.greeting.clone());
    view.render(presenter::INITIALIZING);

    let (sensor_tx, sensor_events) = unbounded();
    let sensors = start_sensors(&config.sensors, &sensor_tx);

    let labels = Arc::new(LabelSet::from_file(&config.model.labels)?);
    let engine = RunnerEngine::load(&config.model.runner_config(), &labels, config.model.input)?;
    let camera = open_camera(&config.camera)?;

    let (notify, notifications) = unbounded();
    let controller = Controller::start(
        camera,
        Box::new(engine),
        labels,
        config.controller_config(),
        notify,
    )?;

    let (input_tx, triggers) = unbounded();
    let inputs = start_inputs(config, &input_tx);
    view.render(presenter::HELP);
    info!(
        sensors = sensors.len(),
        button = inputs.has_button(),
        keyboard = config.keyboard,
        "Ready"
    );

    loop {
        select! {
            recv(triggers) -> event => match event {
                Ok(InputEvent::Trigger) => {
                    if controller.trigger() == TriggerOutcome::Closed {
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(sensor_events) -> event => {
                if let Ok(event) = event {
                    view.handle_sensor(event);
                }
            },
            recv(notifications) -> notification => match notification {
                Ok(notification) => view.handle_notification(notification),
                Err(_) => break,
            },
            recv(shutdown) -> _ => {
                info!("Shutdown requested");
                break;
            },
        }
    }

    drop(inputs);
    drop(sensors);
    controller.shutdown();
    if !controller.wait_stopped(RELEASE_TIMEOUT) {
        warn!("Recognition still in progress, exiting without waiting for it");
    }
    Ok(())
}
