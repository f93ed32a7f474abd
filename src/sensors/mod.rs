//! Environmental sensor feeds.
//!
//! A feed is subscribed to once per sensor kind and then delivers
//! [`SensorEvent`]s over a channel until the returned [`Subscription`] is
//! dropped:
//!
//! ```text
//!   SensorFeed::subscribe(kind, tx) ──▶ Subscription (poll thread)
//!                                          │
//!                                          ▼
//!                     Connected / Reading{kind, value} / Disconnected
//! ```
//!
//! - **IIO feed**: Linux Industrial I/O sysfs devices such as the BMP280
//!   barometer found on many single-board hats.

use crate::error::ResourceError;
use crate::lifecycle::Subscription;
use crossbeam_channel::Sender;
use std::fmt;

pub mod iio;

pub use iio::IioSensorFeed;

/// Physical quantity reported by a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Ambient temperature in degrees Celsius
    Temperature,
    /// Barometric pressure in hectopascal
    Pressure,
}

impl SensorKind {
    pub const ALL: [SensorKind; 2] = [SensorKind::Temperature, SensorKind::Pressure];
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Temperature => write!(f, "temperature"),
            SensorKind::Pressure => write!(f, "pressure"),
        }
    }
}

/// Notification from a subscribed sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorEvent {
    Connected(SensorKind),
    Disconnected(SensorKind),
    Reading { kind: SensorKind, value: f32 },
}

/// Source of sensor events.
pub trait SensorFeed {
    /// Start delivering events for `kind` to `events`.
    ///
    /// Delivery stops when the returned subscription is dropped or when the
    /// receiving end of `events` goes away.
    fn subscribe(
        &self,
        kind: SensorKind,
        events: Sender<SensorEvent>,
    ) -> Result<Subscription, ResourceError>;
}
