//! Image classifier
//!
//! Takes a picture whenever the button is pressed (or Enter is hit) and
//! shows what the model thinks is in it.
//!
//! Usage:
//!   image-classifier --config classifier.json
//!   image-classifier --runner <runner> --model <model.tflite> --labels <labels.txt> [--image <file-or-dir>]

use clap::Parser;
use crossbeam_channel::bounded;
use image_classifier::camera::CameraConfig;
use image_classifier::input::ButtonConfig;
use image_classifier::presenter::TerminalPresenter;
use image_classifier::{app, AppConfig, AppError, FailurePolicy};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Command line parameters, overriding the configuration file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model runner executable
    #[arg(long)]
    runner: Option<PathBuf>,

    /// Quantized model file
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Labels file, one label per line
    #[arg(short, long)]
    labels: Option<PathBuf>,

    /// Use an image file or directory instead of the camera
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Number of labels shown per picture
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// GPIO line of the push-button
    #[arg(long)]
    button_pin: Option<u32>,

    /// Do not take pictures on Enter
    #[arg(long, default_value_t = false)]
    no_keyboard: bool,

    /// Do not look for environmental sensors
    #[arg(long, default_value_t = false)]
    no_sensors: bool,

    /// Keep the last picture taken at this path (.png or .jpg)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Return to the prompt without showing failed recognitions
    #[arg(long, default_value_t = false)]
    suppress_failures: bool,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,
}

impl Args {
    fn into_config(self) -> Result<AppConfig, AppError> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };

        if let Some(runner) = self.runner {
            config.model.runner = runner;
        }
        if let Some(model) = self.model {
            config.model.model = model;
        }
        if let Some(labels) = self.labels {
            config.model.labels = labels;
        }
        if let Some(path) = self.image {
            config.camera = CameraConfig::Still { path };
        }
        if let Some(top_k) = self.top_k {
            config.model.top_k = top_k;
        }
        if let Some(pin) = self.button_pin {
            let mut button = config.button.take().unwrap_or_else(|| ButtonConfig::new(pin));
            button.pin = pin;
            config.button = Some(button);
        }
        if self.no_keyboard {
            config.keyboard = false;
        }
        if self.no_sensors {
            config.sensors.enabled = false;
        }
        if let Some(path) = self.snapshot {
            config.snapshot = Some(path);
        }
        if self.suppress_failures {
            config.failure_policy = FailurePolicy::Suppress;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config = args.into_config()?;

    // The loop stops once the channel disconnects, so keep a sender here
    // even if the handler cannot be installed.
    let (shutdown_tx, shutdown) = bounded::<()>(1);
    let handler_tx = shutdown_tx.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = handler_tx.try_send(());
    }) {
        warn!("Failed to install Ctrl+C handler: {err}");
    }

    let result = app::run(&config, TerminalPresenter::stdout(), shutdown);
    drop(shutdown_tx);
    result
}
