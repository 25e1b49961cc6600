//! Terminal implementations of the pipeline's collaborator traits.

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::thread;

use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use preflight::services::{
    ConfirmRequest, ContentLoader, Decision, DecisionPrompt, PreloadEvent, ProgressSink,
};

/// Resolution of the progress bar's position scale.
const BAR_SCALE: u64 = 1000;

/// Progress display backed by an indicatif bar.
pub struct IndicatifProgressSink {
    bar: ProgressBar,
}

impl IndicatifProgressSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new(BAR_SCALE);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {percent:>3}% {msg}")
                .expect("static template is valid"),
        );
        Self { bar }
    }

    /// Remove the bar from the terminal once the pipeline finishes.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for IndicatifProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for IndicatifProgressSink {
    fn report(&self, ratio: f64, human_text: &str) {
        self.bar
            .set_position((ratio.clamp(0.0, 1.0) * BAR_SCALE as f64) as u64);
        self.bar.set_message(human_text.to_string());
    }
}

/// Confirm/cancel prompt on the controlling terminal.
///
/// The question runs on its own thread so the pipeline keeps ticking while
/// the user decides; the reply lands in the requesting state's channel.
#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl DecisionPrompt for ConsolePrompt {
    fn confirm(&self, request: ConfirmRequest, reply: Sender<Decision>) {
        thread::spawn(move || {
            println!();
            println!("{}", style(&request.title).bold());
            let prompt = format!(
                "{} ({} / {})",
                request.message, request.confirm_label, request.cancel_label
            );
            let confirmed = Confirm::new()
                .with_prompt(prompt)
                .default(true)
                .interact()
                .unwrap_or(false);
            let decision = if confirmed {
                Decision::Confirmed
            } else {
                Decision::Cancelled
            };
            // The pipeline may have been shut down while we waited.
            let _ = reply.send(decision);
        });
    }
}

/// Preloads configured files from disk.
pub struct FileContentLoader {
    paths: Vec<PathBuf>,
}

impl FileContentLoader {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl ContentLoader for FileContentLoader {
    fn begin_preload(&self, events: Sender<PreloadEvent>) -> usize {
        let paths = self.paths.clone();
        let count = paths.len();
        thread::spawn(move || {
            for path in paths {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                let event = match fs::read(&path) {
                    Ok(data) => {
                        debug!(name, bytes = data.len(), "preloaded file");
                        PreloadEvent::ItemLoaded { name }
                    }
                    Err(e) => PreloadEvent::ItemFailed {
                        name,
                        message: e.to_string(),
                    },
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        });
        count
    }
}
