//! Terminal output for human and `--json` runs
//!
//! Human runs get marked status lines. JSON runs keep stdout machine
//! readable: only structured results and one-line status objects are
//! printed, and informational chatter is dropped.

use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        self == OutputFormat::Json
    }
}

/// What a status line reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Success,
    Failure,
    Warning,
    Note,
}

impl Status {
    fn to_stderr(self) -> bool {
        matches!(self, Status::Failure | Status::Warning)
    }
}

/// Render one status line, or `None` when the format drops it
fn render(format: OutputFormat, status: Status, message: &str) -> Option<String> {
    match (format, status) {
        (OutputFormat::Human, Status::Success) => Some(format!("\u{2713} {message}")),
        (OutputFormat::Human, Status::Failure) => Some(format!("\u{2717} Error: {message}")),
        (OutputFormat::Human, Status::Warning) => Some(format!("\u{26a0} Warning: {message}")),
        (OutputFormat::Human, Status::Note) => Some(format!("  {message}")),
        (OutputFormat::Json, Status::Success) => {
            Some(serde_json::json!({"success": true, "message": message}).to_string())
        }
        (OutputFormat::Json, Status::Failure) => {
            Some(serde_json::json!({"success": false, "error": message}).to_string())
        }
        (OutputFormat::Json, Status::Warning) => {
            Some(serde_json::json!({"level": "warning", "message": message}).to_string())
        }
        (OutputFormat::Json, Status::Note) => None,
    }
}

/// Where a command writes what it has to say
#[derive(Debug, Clone, Copy)]
pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn success(&self, message: impl Display) {
        self.emit(Status::Success, &message.to_string());
    }

    pub fn error(&self, message: impl Display) {
        self.emit(Status::Failure, &message.to_string());
    }

    pub fn warn(&self, message: impl Display) {
        self.emit(Status::Warning, &message.to_string());
    }

    pub fn info(&self, message: impl Display) {
        self.emit(Status::Note, &message.to_string());
    }

    /// Aligned `label: value` line
    pub fn field(&self, label: &str, value: impl Display) {
        self.info(format_args!("{:<14} {value}", format!("{label}:")));
    }

    /// Print a structured result; human runs print their own summary instead
    pub fn json(&self, value: &serde_json::Value) {
        if self.format.is_json() {
            println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_default()
            );
        }
    }

    fn emit(&self, status: Status, message: &str) {
        match render(self.format, status, message) {
            Some(line) if status.to_stderr() => eprintln!("{line}"),
            Some(line) => println!("{line}"),
            None => {}
        }
    }
}
