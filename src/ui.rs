//! Terminal output for the `transcribe` command: spinner and colored summary.
//!
//! Uses `indicatif` for the spinner and `console` for styling.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::jobs::{JobStatus, ProviderStatus};
use crate::providers::Transcript;
use crate::query::{JobView, ProviderResultView};

/// Tracks a running job in the terminal.
///
/// The spinner shows per-provider progress while the job runs; the final
/// summary prints successes in green and failures in red.
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl JobProgress {
    pub fn start(file_name: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        // The template is a constant; fall back to the default spinner rather than fail.
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Submitting {file_name}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Refresh the spinner from the latest snapshot of the job.
    pub fn update(&self, view: &JobView) {
        let detail = match &view.provider_results {
            Some(results) => results
                .iter()
                .map(|(id, r)| format!("{id}: {}", provider_label(r.status)))
                .collect::<Vec<_>>()
                .join(", "),
            None => view
                .providers
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        };
        self.pb.set_message(format!("{} [{detail}]", view.status));
    }

    /// Stop the spinner and print the job outcome.
    pub fn finish(&self, view: &JobView) {
        self.pb.finish_and_clear();

        match view.status {
            JobStatus::Completed => println!(
                "  {} Job {} completed",
                self.green.apply_to("✓"),
                view.job_id
            ),
            _ => println!(
                "  {} Job {} {}",
                self.red.apply_to("✗"),
                view.job_id,
                view.status
            ),
        }

        if let Some(transcript) = &view.result {
            self.print_transcript(transcript);
        }
        if let Some(error) = &view.error {
            println!("    {}", self.red.apply_to(error));
        }
        if let Some(results) = &view.provider_results {
            for (id, result) in results {
                println!();
                println!("{}", self.yellow.apply_to(format!("─── {id} ───")));
                self.print_provider(result);
            }
        }
    }

    /// Stop the spinner and print the job as pretty JSON.
    pub fn finish_json(&self, view: &JobView) {
        self.pb.finish_and_clear();
        println!("{}", serde_json::to_string_pretty(view).unwrap_or_default());
    }

    fn print_provider(&self, result: &ProviderResultView) {
        match (&result.transcript, &result.error) {
            (Some(transcript), _) => self.print_transcript(transcript),
            (None, Some(error)) => println!("  {} {error}", self.red.apply_to("✗")),
            (None, None) => println!("  {}", self.dim.apply_to(provider_label(result.status))),
        }
    }

    fn print_transcript(&self, transcript: &Transcript) {
        let mut meta = vec![format!("{} ms", transcript.processing_time_ms)];
        if let Some(model) = &transcript.model {
            meta.push(model.clone());
        }
        if let Some(confidence) = transcript.confidence {
            meta.push(format!("confidence {confidence:.2}"));
        }
        if let Some(language) = &transcript.detected_language {
            meta.push(format!("language {language}"));
        }
        println!("  {}", self.dim.apply_to(meta.join(" · ")));
        println!("  {}", transcript.text);
    }
}

fn provider_label(status: ProviderStatus) -> &'static str {
    match status {
        ProviderStatus::Pending => "pending",
        ProviderStatus::Completed => "done",
        ProviderStatus::Failed => "failed",
    }
}
