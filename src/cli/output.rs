//! Output handlers for CLI commands
//!
//! Supports console (summary), JSON, and quiet output modes.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

impl FromStr for OutputMode {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to console
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "quiet" => Self::Quiet,
            _ => Self::Console,
        })
    }
}

/// Progress events emitted while a command runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    CommandStart { command: String, repo: Option<String> },
    Warning { message: String },
    Info { message: String },
    Debug { message: String },
}

/// Final output of one command
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub command: &'static str,
    pub success: bool,
    /// Short human-readable lines for console output
    #[serde(skip)]
    pub summary: Vec<String>,
    pub data: serde_json::Value,
}

impl Report {
    pub fn new<T: Serialize>(command: &'static str, data: &T) -> serde_json::Result<Self> {
        Ok(Self {
            command,
            success: true,
            summary: Vec::new(),
            data: serde_json::to_value(data)?,
        })
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.summary.push(line.into());
        self
    }

    pub fn lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.summary.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }

    pub fn exit_code(&self) -> i32 {
        if self.success { 0 } else { 1 }
    }
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Emit an event
    fn emit(&self, event: OutputEvent);

    /// Write the final report
    fn report(&self, report: &Report);
}

/// Console handler: progress on stderr, summary lines on stdout
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::CommandStart { command, repo } => match repo {
                Some(repo) => eprintln!("Running {} for {}", command, repo),
                None => eprintln!("Running {}", command),
            },
            OutputEvent::Warning { message } => {
                eprintln!("Warning: {}", message);
            }
            OutputEvent::Info { message } => {
                eprintln!("{}", message);
            }
            OutputEvent::Debug { message } => {
                if self.debug {
                    eprintln!("[debug] {}", message);
                }
            }
        }
    }

    fn report(&self, report: &Report) {
        for line in &report.summary {
            println!("{}", line);
        }
    }
}

/// JSON output handler
pub struct JsonHandler {
    pretty: bool,
}

impl JsonHandler {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        match json {
            Ok(s) => println!("{}", s),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize output"),
        }
    }
}

impl OutputHandler for JsonHandler {
    /// Events go to the log; stdout carries only the report document
    fn emit(&self, event: OutputEvent) {
        tracing::debug!(?event, "Output event");
    }

    fn report(&self, report: &Report) {
        self.print_json(report);
    }
}

/// Quiet handler: no progress, summary only
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, _event: OutputEvent) {}

    fn report(&self, report: &Report) {
        for line in &report.summary {
            println!("{}", line);
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Box::new(JsonHandler::new(true)),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_mode_from_str() {
        assert_eq!("json".parse::<OutputMode>().unwrap(), OutputMode::Json);
        assert_eq!("quiet".parse::<OutputMode>().unwrap(), OutputMode::Quiet);
        assert_eq!("console".parse::<OutputMode>().unwrap(), OutputMode::Console);
        assert_eq!("unknown".parse::<OutputMode>().unwrap(), OutputMode::Console);
    }

    #[test]
    fn test_report_serializes_without_summary() {
        let report = Report::new("repos", &vec!["acme/api"])
            .unwrap()
            .line("acme/api");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["command"], "repos");
        assert_eq!(json["success"], true);
        assert_eq!(json["data"][0], "acme/api");
        assert!(json.get("summary").is_none());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.failed().exit_code(), 1);
    }

    #[test]
    fn test_create_handler() {
        let _ = create_handler(OutputMode::Console, false);
        let _ = create_handler(OutputMode::Json, false);
        let _ = create_handler(OutputMode::Quiet, false);
    }
}
