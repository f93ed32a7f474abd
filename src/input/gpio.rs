//! Debounced push-button on a sysfs GPIO line.
//!
//! ## Hardware
//!
//! Momentary switch to ground with a pull-up (active-low) by default. The
//! line is exported through `/sys/class/gpio/export`, set as input, and its
//! `value` file is polled.
//!
//! ## Gesture
//!
//! | Step      | Condition                              |
//! |-----------|----------------------------------------|
//! | Settling  | line reads pressed                     |
//! | Pressed   | still pressed after the debounce time  |
//! | Trigger   | released after a debounced press       |
//!
//! Firing on release mirrors a key-up event, so holding the button does not
//! repeat.

use super::InputEvent;
use crate::error::ResourceError;
use crate::lifecycle::{Release, Subscription};
use crossbeam_channel::{RecvTimeoutError, Sender};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// How long to wait for udev to create the pin directory after export.
const EXPORT_SETTLE: Duration = Duration::from_millis(500);

fn default_gpio_root() -> PathBuf {
    PathBuf::from(DEFAULT_GPIO_ROOT)
}

fn default_active_low() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_poll_ms() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ButtonConfig {
    /// GPIO line number
    pub pin: u32,
    /// Pressed reads as 0
    #[serde(default = "default_active_low")]
    pub active_low: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,
}

impl ButtonConfig {
    pub fn new(pin: u32) -> Self {
        Self {
            pin,
            active_low: default_active_low(),
            debounce_ms: default_debounce_ms(),
            poll_ms: default_poll_ms(),
            gpio_root: default_gpio_root(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebounceState {
    Released,
    Settling { since: Instant },
    Pressed,
}

/// Press/release debouncer, fed with raw line samples.
#[derive(Debug)]
pub struct Debouncer {
    debounce: Duration,
    state: DebounceState,
}

impl Debouncer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            state: DebounceState::Released,
        }
    }

    pub fn update(&mut self, pressed: bool, now: Instant) -> Option<InputEvent> {
        match (self.state, pressed) {
            (DebounceState::Released, true) => {
                self.state = DebounceState::Settling { since: now };
                None
            }
            (DebounceState::Settling { .. }, false) => {
                self.state = DebounceState::Released;
                None
            }
            (DebounceState::Settling { since }, true) => {
                if now.duration_since(since) >= self.debounce {
                    self.state = DebounceState::Pressed;
                }
                None
            }
            (DebounceState::Pressed, false) => {
                self.state = DebounceState::Released;
                Some(InputEvent::Trigger)
            }
            (DebounceState::Released, false) | (DebounceState::Pressed, true) => None,
        }
    }
}

/// An exported GPIO input line.
#[derive(Debug)]
pub struct GpioButton {
    config: ButtonConfig,
    pin_dir: PathBuf,
    exported: bool,
}

impl GpioButton {
    pub fn open(config: &ButtonConfig) -> Result<Self, ResourceError> {
        let root = &config.gpio_root;
        if !root.is_dir() {
            return Err(ResourceError::unavailable(
                "button",
                format!("{} is not a GPIO sysfs directory", root.display()),
            ));
        }

        let pin_dir = root.join(format!("gpio{}", config.pin));
        let mut exported = false;
        if !pin_dir.exists() {
            fs::write(root.join("export"), config.pin.to_string()).map_err(|e| {
                ResourceError::unavailable("button", format!("export gpio{}: {e}", config.pin))
            })?;
            exported = true;
            wait_for_dir(&pin_dir, EXPORT_SETTLE);
        }

        let mut button = Self {
            config: config.clone(),
            pin_dir,
            exported,
        };
        if let Err(e) = button.configure() {
            if let Err(release_err) = button.release() {
                warn!(pin = config.pin, error = %release_err, "Failed to unexport after setup error");
            }
            return Err(e);
        }
        info!(pin = config.pin, "Button ready");
        Ok(button)
    }

    fn configure(&self) -> Result<(), ResourceError> {
        let direction = self.pin_dir.join("direction");
        if direction.exists() {
            fs::write(&direction, "in").map_err(|e| {
                ResourceError::unavailable("button", format!("set gpio{} input: {e}", self.config.pin))
            })?;
        }
        self.read_pressed()?;
        Ok(())
    }

    pub fn pin(&self) -> u32 {
        self.config.pin
    }

    pub fn read_pressed(&self) -> Result<bool, ResourceError> {
        read_level(&self.pin_dir.join("value"), self.config.active_low)
    }

    /// Start polling the line, sending a trigger on each debounced release.
    pub fn listen(&self, events: Sender<InputEvent>) -> Result<Subscription, ResourceError> {
        let value = self.pin_dir.join("value");
        let active_low = self.config.active_low;
        let interval = Duration::from_millis(self.config.poll_ms);
        let mut debouncer = Debouncer::new(Duration::from_millis(self.config.debounce_ms));
        let pin = self.config.pin;

        let subscription = Subscription::spawn(format!("gpio{pin}"), move |stop| {
            let mut failing = false;
            loop {
                match read_level(&value, active_low) {
                    Ok(pressed) => {
                        failing = false;
                        if let Some(event) = debouncer.update(pressed, Instant::now()) {
                            debug!(pin, "Button released");
                            if events.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) if !failing => {
                        warn!(pin, error = %e, "Button read failed");
                        failing = true;
                    }
                    Err(_) => {}
                }
                match stop.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => return,
                }
            }
        })?;
        Ok(subscription)
    }
}

impl Release for GpioButton {
    type Error = std::io::Error;

    fn release(&mut self) -> Result<(), std::io::Error> {
        if std::mem::replace(&mut self.exported, false) {
            fs::write(
                self.config.gpio_root.join("unexport"),
                self.config.pin.to_string(),
            )?;
            debug!(pin = self.config.pin, "Unexported");
        }
        Ok(())
    }
}

fn read_level(path: &Path, active_low: bool) -> Result<bool, ResourceError> {
    let text = fs::read_to_string(path)?;
    let high = match text.trim() {
        "1" => true,
        "0" => false,
        other => {
            return Err(ResourceError::unavailable(
                "button",
                format!("unexpected level {other:?}"),
            ))
        }
    };
    Ok(high != active_low)
}

fn wait_for_dir(dir: &Path, timeout: Duration) {
    let start = Instant::now();
    while !dir.exists() && start.elapsed() < timeout {
        thread::sleep(Duration::from_millis(10));
    }
}
