use std::process::{Child, Command, Stdio};

/// A running pager: formatted output is written to its stdin and the
/// process is awaited after the stream ends.
pub struct Pager {
    child: Child,
}

impl Pager {
    /// Spawn `$PAGER` (or `less -R`). Returns the pager and its stdin, or
    /// `None` when no pager can be started; the caller then writes to
    /// stdout directly.
    pub fn spawn() -> Option<(Pager, Box<dyn std::io::Write + Send>)> {
        let (program, args) = pager_command();
        let mut child = match Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                log::debug!("pager '{program}' unavailable: {err}");
                return None;
            }
        };
        let stdin = child.stdin.take()?;
        Some((Pager { child }, Box::new(stdin)))
    }

    /// Wait for the pager to exit. The stdin handle must have been dropped
    /// first so the pager sees end-of-input.
    pub async fn wait(mut self) {
        let _ = tokio::task::spawn_blocking(move || self.child.wait()).await;
    }
}

/// The pager command: `$PAGER` split on whitespace, else `less -R` (the
/// -R keeps ANSI colors intact).
fn pager_command() -> (String, Vec<String>) {
    if let Ok(pager) = std::env::var("PAGER") {
        let mut parts = pager.split_whitespace().map(str::to_string);
        if let Some(program) = parts.next() {
            return (program, parts.collect());
        }
    }
    ("less".to_string(), vec!["-R".to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pager_is_less_with_color() {
        std::env::remove_var("PAGER");
        let (program, args) = pager_command();
        assert_eq!(program, "less");
        assert_eq!(args, vec!["-R"]);
    }

    #[test]
    fn pager_env_is_split() {
        std::env::set_var("PAGER", "more -f");
        let (program, args) = pager_command();
        assert_eq!(program, "more");
        assert_eq!(args, vec!["-f"]);
        std::env::remove_var("PAGER");
    }
}
