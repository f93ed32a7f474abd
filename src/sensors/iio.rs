//! Linux Industrial I/O sensor feed.
//!
//! Barometer drivers such as `bmp280` expose their channels under
//! `/sys/bus/iio/devices/iio:deviceN/`:
//!
//! | Channel  | File                | Unit   |
//! |----------|---------------------|--------|
//! | Temp     | `in_temp_input`     | m°C    |
//! | Pressure | `in_pressure_input` | kPa    |
//!
//! Each subscription polls its channel file on a dedicated thread and
//! reports changes. A device that disappears (module unloaded, hat removed)
//! shows up as read errors and is reported as disconnected until reads
//! succeed again.

use super::{SensorEvent, SensorFeed, SensorKind};
use crate::error::ResourceError;
use crate::lifecycle::Subscription;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default sysfs location of IIO devices.
pub const DEFAULT_IIO_ROOT: &str = "/sys/bus/iio/devices";

/// Driver names recognised as environmental sensors.
pub const DEFAULT_DEVICE_NAMES: &[&str] = &["bmp280", "bme280", "bmp180", "bmp085"];

fn channel_file(kind: SensorKind) -> &'static str {
    match kind {
        SensorKind::Temperature => "in_temp_input",
        SensorKind::Pressure => "in_pressure_input",
    }
}

/// Convert a raw sysfs value to the unit of [`SensorKind`].
fn scale(kind: SensorKind, raw: f64) -> f32 {
    match kind {
        SensorKind::Temperature => (raw / 1000.0) as f32,
        SensorKind::Pressure => (raw * 10.0) as f32,
    }
}

fn read_channel(path: &Path, kind: SensorKind) -> std::io::Result<f32> {
    let text = fs::read_to_string(path)?;
    let raw: f64 = text.trim().parse().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("bad {kind} value {:?}: {e}", text.trim()),
        )
    })?;
    Ok(scale(kind, raw))
}

#[derive(Debug, Clone)]
pub struct IioSensorFeed {
    device_dir: PathBuf,
    poll_interval: Duration,
}

impl IioSensorFeed {
    pub fn new(device_dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            device_dir: device_dir.into(),
            poll_interval,
        }
    }

    /// Find the first device under `root` whose driver name is in `names`.
    pub fn discover<S: AsRef<str>>(
        root: impl AsRef<Path>,
        names: &[S],
        poll_interval: Duration,
    ) -> Result<Self, ResourceError> {
        let root = root.as_ref();
        let entries = fs::read_dir(root).map_err(|e| {
            ResourceError::unavailable("sensor", format!("{}: {e}", root.display()))
        })?;

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect();
        candidates.sort();

        for dir in candidates {
            let Ok(name) = fs::read_to_string(dir.join("name")) else {
                continue;
            };
            let name = name.trim();
            if names.iter().any(|n| n.as_ref() == name) {
                info!(device = %dir.display(), driver = name, "Found environmental sensor");
                return Ok(Self::new(dir, poll_interval));
            }
        }

        Err(ResourceError::unavailable(
            "sensor",
            format!("no matching IIO device under {}", root.display()),
        ))
    }

    pub fn device_dir(&self) -> &Path {
        &self.device_dir
    }

    /// Whether the device exposes a channel for `kind`.
    pub fn supports(&self, kind: SensorKind) -> bool {
        self.device_dir.join(channel_file(kind)).exists()
    }
}

impl SensorFeed for IioSensorFeed {
    fn subscribe(
        &self,
        kind: SensorKind,
        events: Sender<SensorEvent>,
    ) -> Result<Subscription, ResourceError> {
        let path = self.device_dir.join(channel_file(kind));
        if !path.exists() {
            return Err(ResourceError::unavailable(
                "sensor",
                format!("{} has no {kind} channel", self.device_dir.display()),
            ));
        }

        let interval = self.poll_interval;
        let mut poller = ChannelPoller::new(kind);
        let subscription = Subscription::spawn(format!("iio-{kind}"), move |stop| loop {
            let read = read_channel(&path, kind);
            for event in poller.update(read) {
                if events.send(event).is_err() {
                    debug!(sensor = %kind, "Event receiver gone, stopping poll");
                    return;
                }
            }
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                _ => return,
            }
        })?;
        Ok(subscription)
    }
}

/// Turns successive channel reads into connect/reading/disconnect events.
#[derive(Debug)]
struct ChannelPoller {
    kind: SensorKind,
    connected: bool,
    last: Option<f32>,
}

impl ChannelPoller {
    fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            connected: false,
            last: None,
        }
    }

    fn update(&mut self, read: std::io::Result<f32>) -> Vec<SensorEvent> {
        let mut events = Vec::new();
        match read {
            Ok(value) => {
                if !self.connected {
                    self.connected = true;
                    events.push(SensorEvent::Connected(self.kind));
                }
                if self.last != Some(value) {
                    self.last = Some(value);
                    events.push(SensorEvent::Reading {
                        kind: self.kind,
                        value,
                    });
                }
            }
            Err(e) => {
                if self.connected {
                    warn!(sensor = %self.kind, error = %e, "Sensor disconnected");
                    self.connected = false;
                    self.last = None;
                    events.push(SensorEvent::Disconnected(self.kind));
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn fake_device(root: &Path, dir: &str, name: &str) -> PathBuf {
        let device = root.join(dir);
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("name"), format!("{name}\n")).unwrap();
        device
    }

    #[test]
    fn test_discover_matches_driver_name() {
        let root = tempfile::tempdir().unwrap();
        fake_device(root.path(), "iio:device0", "mcp3008");
        let bmp = fake_device(root.path(), "iio:device1", "bmp280");

        let feed =
            IioSensorFeed::discover(root.path(), DEFAULT_DEVICE_NAMES, Duration::from_millis(10))
                .unwrap();
        assert_eq!(feed.device_dir(), bmp.as_path());
    }

    #[test]
    fn test_discover_without_device() {
        let root = tempfile::tempdir().unwrap();
        fake_device(root.path(), "iio:device0", "mcp3008");
        let result =
            IioSensorFeed::discover(root.path(), DEFAULT_DEVICE_NAMES, Duration::from_millis(10));
        assert!(matches!(result, Err(ResourceError::Unavailable { .. })));

        let missing = IioSensorFeed::discover(
            root.path().join("absent"),
            DEFAULT_DEVICE_NAMES,
            Duration::from_millis(10),
        );
        assert!(missing.is_err());
    }

    #[test]
    fn test_channel_units() {
        let root = tempfile::tempdir().unwrap();
        let device = fake_device(root.path(), "iio:device0", "bmp280");
        fs::write(device.join("in_temp_input"), "23450\n").unwrap();
        fs::write(device.join("in_pressure_input"), "101.325\n").unwrap();

        let t = read_channel(&device.join("in_temp_input"), SensorKind::Temperature).unwrap();
        let p = read_channel(&device.join("in_pressure_input"), SensorKind::Pressure).unwrap();
        assert!((t - 23.45).abs() < 1e-4);
        assert!((p - 1013.25).abs() < 1e-3);
    }

    #[test]
    fn test_poller_reports_changes_only() {
        let mut poller = ChannelPoller::new(SensorKind::Temperature);
        assert_eq!(
            poller.update(Ok(20.0)),
            vec![
                SensorEvent::Connected(SensorKind::Temperature),
                SensorEvent::Reading {
                    kind: SensorKind::Temperature,
                    value: 20.0
                }
            ]
        );
        assert!(poller.update(Ok(20.0)).is_empty());
        assert_eq!(poller.update(Ok(20.5)).len(), 1);
        let gone = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(
            poller.update(Err(gone)),
            vec![SensorEvent::Disconnected(SensorKind::Temperature)]
        );
        let still_gone = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(poller.update(Err(still_gone)).is_empty());
    }

    #[test]
    fn test_subscription_delivers_readings() {
        let root = tempfile::tempdir().unwrap();
        let device = fake_device(root.path(), "iio:device0", "bmp280");
        fs::write(device.join("in_pressure_input"), "100.0\n").unwrap();

        let feed = IioSensorFeed::new(&device, Duration::from_millis(5));
        assert!(feed.supports(SensorKind::Pressure));
        assert!(!feed.supports(SensorKind::Temperature));

        let (tx, rx) = unbounded();
        let subscription = feed.subscribe(SensorKind::Pressure, tx).unwrap();

        let timeout = Duration::from_secs(5);
        assert_eq!(
            rx.recv_timeout(timeout).unwrap(),
            SensorEvent::Connected(SensorKind::Pressure)
        );
        assert_eq!(
            rx.recv_timeout(timeout).unwrap(),
            SensorEvent::Reading {
                kind: SensorKind::Pressure,
                value: 1000.0
            }
        );
        drop(subscription);
        // The poll thread has been joined, nothing else arrives.
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(30)).is_err());
    }

    #[test]
    fn test_subscribe_missing_channel() {
        let root = tempfile::tempdir().unwrap();
        let device = fake_device(root.path(), "iio:device0", "bmp280");
        let feed = IioSensorFeed::new(device, Duration::from_millis(5));
        let (tx, _rx) = unbounded();
        assert!(feed.subscribe(SensorKind::Temperature, tx).is_err());
    }
}
