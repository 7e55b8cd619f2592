use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Redraw rate cap for the progress display.
const DRAW_HZ: u8 = 10;

/// Progress reporting for body downloads written to a file.
///
/// A bar when the content length is known, a bouncing spinner otherwise.
/// Draws to stderr at no more than 10 Hz and clears its line when done.
/// Disabled entirely when stderr is not a terminal, when --silent is set,
/// or for empty bodies.
pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    pub fn for_download(content_length: Option<u64>, silent: bool) -> Progress {
        let enabled =
            std::io::stderr().is_terminal() && !silent && content_length != Some(0);
        if !enabled {
            return Progress { bar: None };
        }

        let target = ProgressDrawTarget::stderr_with_hz(DRAW_HZ);
        let bar = match content_length {
            Some(len) => {
                let bar = ProgressBar::with_draw_target(Some(len), target);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{bytes}/{total_bytes} [{bar:30}] {bytes_per_sec} eta {eta}",
                    )
                    .expect("progress template is valid")
                    .progress_chars("=> "),
                );
                bar
            }
            None => {
                let bar = ProgressBar::with_draw_target(None, target);
                bar.set_style(
                    ProgressStyle::with_template("{spinner} {bytes} {bytes_per_sec}")
                        .expect("progress template is valid"),
                );
                bar.enable_steady_tick(std::time::Duration::from_millis(100));
                bar
            }
        };
        Progress { bar: Some(bar) }
    }

    /// A progress handle that never draws.
    pub fn disabled() -> Progress {
        Progress { bar: None }
    }

    pub fn inc(&self, n: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(n);
        }
    }

    /// Clear the progress line.
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}
