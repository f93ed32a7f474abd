//! Resource lifetimes.
//!
//! [`ReleaseGuard`] owns a resource and releases it exactly once, either
//! explicitly or on drop. A failing or panicking release is logged and
//! contained, so guards dropped together never block each other.
//!
//! [`Subscription`] owns a background polling thread and stops it when
//! dropped.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Something that holds an external resource needing explicit teardown.
pub trait Release {
    type Error: fmt::Display;

    fn release(&mut self) -> Result<(), Self::Error>;
}

pub struct ReleaseGuard<T: Release> {
    name: &'static str,
    inner: Option<T>,
}

impl<T: Release> ReleaseGuard<T> {
    pub fn new(name: &'static str, resource: T) -> Self {
        Self {
            name,
            inner: Some(resource),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Release now instead of at drop. Later calls are no-ops.
    pub fn release(&mut self) {
        let Some(mut resource) = self.inner.take() else {
            return;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| resource.release()));
        match outcome {
            Ok(Ok(())) => debug!(resource = self.name, "Released"),
            Ok(Err(e)) => warn!(resource = self.name, error = %e, "Release failed"),
            Err(_) => warn!(resource = self.name, "Release panicked"),
        }
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    /// The resource, unless it has been released.
    pub fn get(&self) -> Option<&T> {
        self.inner.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.inner.as_mut()
    }
}

impl<T: Release> Drop for ReleaseGuard<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Release> fmt::Debug for ReleaseGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseGuard")
            .field("name", &self.name)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Handle to a background listener thread.
///
/// The thread receives a stop channel that disconnects when the handle is
/// dropped. Joinable subscriptions are joined on drop; detached ones (for
/// threads parked in blocking reads) are left to exit on their own.
pub struct Subscription {
    name: String,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    detached: bool,
}

impl Subscription {
    pub fn spawn<F>(name: impl Into<String>, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        Self::start(name.into(), body, false)
    }

    pub fn spawn_detached<F>(name: impl Into<String>, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        Self::start(name.into(), body, true)
    }

    fn start<F>(name: String, body: F, detached: bool) -> std::io::Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (stop, stopped) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(stopped))?;
        debug!(subscription = %name, "Subscribed");
        Ok(Self {
            name,
            stop: Some(stop),
            handle: Some(handle),
            detached,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the listener. Dropping the handle does the same.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Disconnecting the stop channel wakes the listener.
        self.stop.take();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.detached || handle.thread().id() == thread::current().id() {
            debug!(subscription = %self.name, "Unsubscribed (detached)");
            return;
        }
        if handle.join().is_err() {
            warn!(subscription = %self.name, "Listener thread panicked");
        } else {
            debug!(subscription = %self.name, "Unsubscribed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("detached", &self.detached)
            .finish()
    }
}
