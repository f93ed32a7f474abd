//! Status texts and where they are shown.

use crate::error::CycleError;
use crate::types::{EnvironmentReading, RecognitionResult};
use std::io::Write;
use tracing::{info, warn};

pub const INITIALIZING: &str = "Initializing...";
pub const HELP: &str = "Press the button or Enter to take a picture";
pub const BUSY: &str = "Still processing, please wait";
pub const RUNNING: &str = "Running photo recognition";
pub const NOT_UNDERSTOOD: &str = "I don't understand what I see";

/// A display surface for one line (or block) of status text.
pub trait StatusPresenter {
    fn render(&mut self, text: &str);
}

/// Writes each status to a terminal, separated by a blank line.
pub struct TerminalPresenter<W: Write> {
    out: W,
}

impl TerminalPresenter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatusPresenter for TerminalPresenter<W> {
    fn render(&mut self, text: &str) {
        info!(status = %text.trim_end(), "Status");
        let written = writeln!(self.out, "{}\n", text.trim_end()).and_then(|()| self.out.flush());
        if let Err(e) = written {
            warn!(error = %e, "Failed to write status");
        }
    }
}

/// Text for a finished recognition.
pub fn result_text(result: &RecognitionResult) -> String {
    if result.is_empty() {
        NOT_UNDERSTOOD.to_string()
    } else {
        result.to_string()
    }
}

pub fn failure_text(error: &CycleError) -> String {
    format!("Recognition failed: {error}")
}

/// Environment summary, optionally preceded by a greeting line.
pub fn environment_text(greeting: Option<&str>, reading: &EnvironmentReading) -> String {
    match greeting {
        Some(greeting) => format!("{greeting}\n{reading}"),
        None => reading.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RankError;
    use crate::types::Recognition;

    #[test]
    fn test_result_text() {
        let result = RecognitionResult::new(vec![
            Recognition::new("dog", 200),
            Recognition::new("fish", 200),
        ]);
        assert_eq!(result_text(&result), "dog or fish");
        assert_eq!(result_text(&RecognitionResult::default()), NOT_UNDERSTOOD);
    }

    #[test]
    fn test_failure_text() {
        let err = CycleError::from(RankError::EmptyConfidences);
        assert_eq!(
            failure_text(&err),
            "Recognition failed: Ranking failed: Confidence vector is empty"
        );
    }

    #[test]
    fn test_environment_text_with_greeting() {
        let reading = EnvironmentReading {
            temperature: Some(22.0),
            pressure: None,
        };
        assert_eq!(
            environment_text(Some("Hello!"), &reading),
            "Hello!\nOnboard Temperature: 22.00 °C.\nBarometric Pressure: n/a.\n"
        );
    }

    #[test]
    fn test_terminal_presenter_writes_blocks() {
        let mut presenter = TerminalPresenter::new(Vec::new());
        presenter.render(INITIALIZING);
        presenter.render("a\nb\n");
        let out = String::from_utf8(presenter.into_inner()).unwrap();
        assert_eq!(out, "Initializing...\n\na\nb\n\n");
    }
}
