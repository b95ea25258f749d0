use std::time::Duration;

use botcall_types::{Phase, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Everything the session tells the outside world. Implementations only render; they
/// never call back into the session.
#[cfg_attr(test, mockall::automock)]
pub trait Presenter: Send + Sync {
    fn render_status(&self, phase: Phase, label: &str);

    fn append_transcript_entry(&self, sender: Sender, text: &str);

    fn render_elapsed(&self, elapsed: Duration);

    /// A dismissible notification.
    fn notify(&self, message: &str, severity: Severity);

    /// Live text from a recognition result that is not final yet.
    fn render_interim(&self, _text: &str) {}

    fn render_voice_status(&self, _text: &str) {}
}

/// Formats an elapsed duration as `mm:ss`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00");
        assert_eq!(format_elapsed(Duration::from_millis(65_900)), "01:05");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "60:00");
    }
}
