//! Trigger inputs that start a recognition cycle.
//!
//! - **GPIO button**: a push-button on a sysfs GPIO line, debounced,
//!   firing on release.
//! - **Keyboard**: the Enter key on standard input, usable when no button
//!   is wired up.

pub mod gpio;
pub mod keyboard;

pub use gpio::{ButtonConfig, GpioButton};
pub use keyboard::listen_keyboard;

/// User input delivered to the application loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Take a picture and classify it.
    Trigger,
}
