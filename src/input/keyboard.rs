use super::InputEvent;
use crate::lifecycle::Subscription;
use crossbeam_channel::{Sender, TryRecvError};
use std::io::BufRead;
use tracing::{debug, warn};

/// Emit [`InputEvent::Trigger`] for every line read from `reader`.
///
/// The listener thread blocks in `read_line`, so the subscription is
/// detached: it exits at the next line or at end of input after being
/// dropped.
pub fn listen_keyboard<R>(reader: R, events: Sender<InputEvent>) -> std::io::Result<Subscription>
where
    R: BufRead + Send + 'static,
{
    Subscription::spawn_detached("keyboard", move |stop| {
        let mut reader = reader;
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    debug!("Keyboard input closed");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Keyboard read failed");
                    return;
                }
            }
            if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
                return;
            }
            if events.send(InputEvent::Trigger).is_err() {
                return;
            }
        }
    })
}
