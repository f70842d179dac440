// UI module for consistent terminal output with progress bars and styling
//
// A `Ui` value is created once in `main` and handed to every component that
// reports to the user, so nothing in the pipeline reaches for global output
// state.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use console::{Term, style};
use indicatif::{HumanBytes, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Spinner style similar to uv/pnpm
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Percentage step between progress lines when output is not a terminal.
const PLAIN_PERCENT_STEP: u64 = 10;

/// Byte step between progress lines when the size is unknown (16 MiB).
const PLAIN_BYTES_STEP: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct Ui {
    interactive: bool,
}

impl Default for Ui {
    fn default() -> Self {
        Self::detect()
    }
}

impl Ui {
    /// Interactive when stderr is a TTY.
    pub fn detect() -> Self {
        Self {
            interactive: Term::stderr().is_term(),
        }
    }

    /// Plain line output with no progress bars, for tests and CI logs.
    pub fn plain() -> Self {
        Self { interactive: false }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Print a success message with checkmark
    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    /// Print an info/action message with arrow
    pub fn action(&self, message: &str) {
        println!("{} {}", style("→").cyan(), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        eprintln!("{} {}", style("⚠").yellow(), message);
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    /// Print a header/section message
    pub fn header(&self, message: &str) {
        println!("{}", style(message).bold());
    }

    /// Print a dimmed/secondary message
    pub fn dim(&self, message: &str) {
        println!("{}", style(message).dim());
    }

    /// Print a status message with a highlighted prefix
    pub fn status(&self, prefix: &str, message: &str) {
        println!("{} {}", style(prefix).cyan().bold(), message);
    }

    /// Create a styled spinner for long-running subprocesses
    pub fn spinner(&self, message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if !self.interactive {
            pb.set_draw_target(ProgressDrawTarget::hidden());
            self.action(message);
        }
        pb.set_style(
            ProgressStyle::default_spinner()
                .tick_chars(SPINNER_CHARS)
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        pb.set_message(message.to_string());
        if self.interactive {
            pb.enable_steady_tick(Duration::from_millis(80));
        }
        pb
    }

    /// Finish a spinner with success
    pub fn finish_spinner_success(&self, pb: &ProgressBar, message: &str) {
        let msg = format!("{} {}", style("✓").green(), message);
        if self.interactive {
            pb.set_style(ProgressStyle::default_spinner().template("{msg}").unwrap());
            pb.finish_with_message(msg);
        } else {
            pb.finish_and_clear();
            println!("{}", msg);
        }
    }

    /// Finish a spinner with error
    pub fn finish_spinner_error(&self, pb: &ProgressBar, message: &str) {
        let msg = format!("{} {}", style("✗").red(), message);
        if self.interactive {
            pb.set_style(ProgressStyle::default_spinner().template("{msg}").unwrap());
            pb.finish_with_message(msg);
        } else {
            pb.finish_and_clear();
            eprintln!("{}", msg);
        }
    }

    /// Progress reporting for one download
    pub fn download_progress(&self, name: &str, total: Option<u64>) -> DownloadProgress {
        let bar = if self.interactive {
            let pb = match total {
                Some(size) => {
                    let pb = ProgressBar::new(size);
                    pb.set_style(
                        ProgressStyle::default_bar()
                            .template(
                                "{spinner:.cyan} {msg} [{bar:25.cyan/dim}] {bytes}/{total_bytes} ({bytes_per_sec})",
                            )
                            .unwrap()
                            .tick_chars(SPINNER_CHARS)
                            .progress_chars("━━╺"),
                    );
                    pb
                }
                None => {
                    let pb = ProgressBar::new_spinner();
                    pb.set_style(
                        ProgressStyle::default_spinner()
                            .tick_chars(SPINNER_CHARS)
                            .template("{spinner:.cyan} {msg} {bytes} ({bytes_per_sec})")
                            .unwrap(),
                    );
                    pb.enable_steady_tick(Duration::from_millis(80));
                    pb
                }
            };
            pb.set_message(name.to_string());
            Some(pb)
        } else {
            None
        };

        DownloadProgress {
            ui: *self,
            bar,
            total,
            received: 0,
            last_reported: 0,
        }
    }
}

/// Download progress: an indicatif bar on a terminal, periodic plain lines
/// otherwise (percentage when the size is known, running bytes when not).
pub struct DownloadProgress {
    ui: Ui,
    bar: Option<ProgressBar>,
    total: Option<u64>,
    received: u64,
    last_reported: u64,
}

impl DownloadProgress {
    pub fn advance(&mut self, bytes: u64) {
        self.received += bytes;

        if let Some(bar) = &self.bar {
            bar.inc(bytes);
            return;
        }

        match self.total {
            Some(total) if total > 0 => {
                let percent = (self.received.min(total) * 100) / total;
                let step = percent / PLAIN_PERCENT_STEP * PLAIN_PERCENT_STEP;
                if step > self.last_reported {
                    self.last_reported = step;
                    self.ui.dim(&format!(
                        "  {}% ({} / {})",
                        step,
                        HumanBytes(self.received),
                        HumanBytes(total)
                    ));
                }
            }
            _ => {
                if self.received - self.last_reported >= PLAIN_BYTES_STEP {
                    self.last_reported = self.received;
                    self.ui
                        .dim(&format!("  {} downloaded", HumanBytes(self.received)));
                }
            }
        }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
