use std::fmt::Display;

use chrono::{Local, SecondsFormat, Utc};
use log::debug;
use serde_derive::{Deserialize, Serialize};

/// Timestamped trail of one run, in chronological order
#[derive(Debug, Default, Clone)]
pub struct ProbeLog {
    entries: Vec<String>,
}

impl ProbeLog {
    pub fn new() -> ProbeLog {
        ProbeLog::default()
    }

    /// Appends `[<UTC time with milliseconds>] text`
    pub fn push(&mut self, text: impl Display) {
        let entry = format!(
            "[{}] {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            text
        );
        debug!("{}", entry);
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn into_entries(self) -> Vec<String> {
        self.entries
    }
}

/// Verdict of one run, as returned to callers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Whether the test message was accepted
    pub success: bool,
    /// One line summary
    pub message: String,
    /// `[timestamp] text` entries
    pub logs: Vec<String>,
    /// Local completion time, `h:mm:ss AM/PM`
    pub timestamp: String,
}

impl ProbeResult {
    /// Successful run
    pub fn success(log: ProbeLog, message: impl Into<String>) -> ProbeResult {
        ProbeResult::finish(true, log, message.into())
    }

    /// Failed run
    pub fn failure(log: ProbeLog, message: impl Into<String>) -> ProbeResult {
        ProbeResult::finish(false, log, message.into())
    }

    fn finish(success: bool, log: ProbeLog, message: String) -> ProbeResult {
        ProbeResult {
            success,
            message,
            logs: log.into_entries(),
            timestamp: Local::now().format("%-I:%M:%S %p").to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::{DateTime, NaiveTime};

    use super::*;

    #[test]
    fn test_log_entry_format() {
        let mut log = ProbeLog::new();
        log.push("Starting SMTP test for mx:25");
        log.push(format_args!("Email subject: {}", "hi"));

        assert_eq!(log.len(), 2);
        let entry = &log.entries()[0];
        assert!(entry.starts_with('['));
        let (stamp, text) = entry[1..].split_once("] ").unwrap();
        assert_eq!(text, "Starting SMTP test for mx:25");
        assert!(stamp.ends_with('Z'));
        // e.g. 2024-05-01T12:34:56.789Z
        assert_eq!(stamp.len(), 24);
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
        assert!(log.entries()[1].ends_with("] Email subject: hi"));
    }

    #[test]
    fn test_result_timestamp_and_json() {
        let mut log = ProbeLog::new();
        log.push("ERROR: nope");
        let result = ProbeResult::failure(log, "Failed");

        assert!(!result.success);
        assert_eq!(result.logs.len(), 1);
        assert!(NaiveTime::parse_from_str(&result.timestamp, "%I:%M:%S %p").is_ok());
        assert!(result.timestamp.ends_with("AM") || result.timestamp.ends_with("PM"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Failed");
        assert!(json["logs"].is_array());
        assert!(json["timestamp"].is_string());
    }
}
