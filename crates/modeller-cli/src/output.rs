//! Terminal output for engine calls.
//!
//! Printed text from tools goes to stdout so it can be piped. Progress is
//! drawn on stderr and the call outcome is printed last.

use std::io::{self, Write};

use modeller_bridge::{MessageSink, Result};
use serde::Serialize;

use crate::colors;

/// Forwards engine print messages to stdout unchanged.
pub struct StdoutSink;

impl MessageSink for StdoutSink {
    fn print(&mut self, text: &str) {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes()).ok();
        stdout.flush().ok();
    }
}

/// Single-line progress indicator, redrawn in place on stderr.
pub struct ProgressBar {
    label: String,
    last: Option<u32>,
}

impl ProgressBar {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            last: None,
        }
    }

    /// Redraw when the whole percentage changes.
    pub fn update(&mut self, fraction: f32) {
        let percent = percent(fraction);
        if self.last == Some(percent) {
            return;
        }
        self.last = Some(percent);
        eprint!(
            "\r{}{}{} {}{:>3}%{}",
            colors::CYAN,
            self.label,
            colors::RESET,
            colors::DIM,
            percent,
            colors::RESET
        );
        colors::flush_stderr();
    }

    /// Terminate the progress line if anything was drawn.
    pub fn finish(&mut self) {
        if self.last.take().is_some() {
            eprintln!();
        }
    }
}

/// Engine progress is a fraction; out-of-range and NaN values are clamped.
fn percent(fraction: f32) -> u32 {
    if fraction.is_nan() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u32
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Outcome {
    pub success: bool,
    pub value: Option<String>,
}

/// Print the result of a tool run.
///
/// With `json` set, engine-reported failures are printed as an unsuccessful
/// outcome instead of being returned, so scripts always get a JSON document.
/// Bridge failures are returned either way.
pub fn report(result: Result<Option<String>>, json: bool) -> Result<()> {
    let outcome = match result {
        Ok(value) => Outcome {
            success: true,
            value,
        },
        Err(err) if json && err.engine_message().is_some() => Outcome {
            success: false,
            value: err.engine_message().map(str::to_string),
        },
        Err(err) => return Err(err),
    };

    if json {
        match serde_json::to_string(&outcome) {
            Ok(text) => println!("{}", text),
            Err(err) => tracing::error!("Failed to serialize outcome: {}", err),
        }
    } else if let Some(value) = &outcome.value {
        println!("{}", value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_and_clamps() {
        assert_eq!(percent(0.0), 0);
        assert_eq!(percent(0.424), 42);
        assert_eq!(percent(0.995), 100);
        assert_eq!(percent(1.7), 100);
        assert_eq!(percent(-0.2), 0);
        assert_eq!(percent(f32::NAN), 0);
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = Outcome {
            success: true,
            value: Some("12.5".to_string()),
        };
        assert_eq!(
            serde_json::to_string(&outcome).unwrap(),
            r#"{"success":true,"value":"12.5"}"#
        );

        let outcome = Outcome {
            success: true,
            value: None,
        };
        assert_eq!(
            serde_json::to_string(&outcome).unwrap(),
            r#"{"success":true,"value":null}"#
        );
    }

    #[test]
    fn test_report_passes_bridge_errors_through() {
        let err = report(Err(modeller_bridge::Error::Disconnected), true).unwrap_err();
        assert!(matches!(err, modeller_bridge::Error::Disconnected));

        let err = report(
            Err(modeller_bridge::Error::Parameter("bad".to_string())),
            false,
        )
        .unwrap_err();
        assert_eq!(err.engine_message(), Some("bad"));

        report(
            Err(modeller_bridge::Error::Runtime("boom".to_string())),
            true,
        )
        .unwrap();
    }
}
