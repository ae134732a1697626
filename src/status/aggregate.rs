use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::proto::{StatusInformation, StatusKey};

/// Sub key reserved for log records
pub const RECENT_LOGS: &str = "Recent Logs";

static SEVERITY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((debug|info|warning|error)\)").expect("valid severity regex"));

/// Last known state of one remote service, as pushed to dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroserviceStatus {
    pub name: String,
    pub status: Vec<String>,
    pub logs: Vec<String>,
    /// Milliseconds since the Unix epoch
    pub last_update_time_stamp: i64,
    pub received_last_response: bool,
    pub viewed_time_stamp: i64,
}

impl MicroserviceStatus {
    /// Placeholder for a service that has not been polled yet
    pub fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: Vec::new(),
            logs: Vec::new(),
            last_update_time_stamp: 0,
            received_last_response: false,
            viewed_time_stamp: 0,
        }
    }

    /// Status recorded after a failed poll
    pub fn unavailable(name: &str) -> Self {
        Self {
            last_update_time_stamp: Utc::now().timestamp_millis(),
            ..Self::unknown(name)
        }
    }
}

/// One "main - sub : status" line per (main, sub) pair, log records excluded.
///
/// A repeated pair keeps the position of its first occurrence and the value
/// of its last.
pub fn aggregate_status(records: &[StatusKey]) -> Vec<String> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut lines: Vec<String> = Vec::new();

    for record in records.iter().filter(|r| r.sub() != RECENT_LOGS) {
        let line = format!("{} - {} : {}", record.main(), record.sub(), record.first_status());
        match index.get(&(record.main(), record.sub())) {
            Some(&i) => lines[i] = line,
            None => {
                index.insert((record.main(), record.sub()), lines.len());
                lines.push(line);
            }
        }
    }

    lines
}

/// Log entries in chronological order.
///
/// Services report their log records newest first, each record holding a
/// block of lines. A line carrying a severity tag starts a new entry and any
/// untagged line is appended to the entry before it. An untagged line with
/// no entry before it starts one of its own, without a leading newline.
pub fn aggregate_logs(records: &[StatusKey], max_lines: usize) -> Vec<String> {
    let mut logs: Vec<String> = Vec::new();

    for record in records.iter().rev().filter(|r| r.sub() == RECENT_LOGS) {
        let text = record.first_status();
        if text.is_empty() {
            continue;
        }
        for line in text.split('\n') {
            match logs.last_mut() {
                Some(entry) if !SEVERITY_TAG.is_match(line) => {
                    entry.push('\n');
                    entry.push_str(line);
                }
                _ => logs.push(line.trim().to_string()),
            }
        }
    }

    if logs.len() > max_lines {
        logs.drain(..logs.len() - max_lines);
    }
    logs
}

/// Builds the status a successful reply stands for
pub fn process_status_reply(name: &str, reply: &StatusInformation, max_log_lines: usize) -> MicroserviceStatus {
    MicroserviceStatus {
        name: name.to_string(),
        status: aggregate_status(&reply.record),
        logs: aggregate_logs(&reply.record, max_log_lines),
        last_update_time_stamp: Utc::now().timestamp_millis(),
        received_last_response: true,
        viewed_time_stamp: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::proto::StatusItem;

    fn record(main: &str, sub: &str, status: &str) -> StatusKey {
        StatusKey {
            main_key: Some(main.to_string()),
            sub_key: Some(sub.to_string()),
            status: vec![StatusItem {
                timestamp: Some("1700000000000".to_string()),
                status: Some(status.to_string()),
                error_flag: Some(false),
            }],
        }
    }

    #[test]
    fn test_aggregate_logs_groups_continuations() {
        let records = vec![record(
            "Locator",
            RECENT_LOGS,
            "(info) A - a : ok\ncontinuation\n(error) B - b : bad",
        )];

        assert_eq!(
            aggregate_logs(&records, 100),
            vec![
                "(info) A - a : ok\ncontinuation".to_string(),
                "(error) B - b : bad".to_string()
            ]
        );
    }

    #[test]
    fn test_aggregate_logs_orders_records_oldest_first() {
        let records = vec![
            record("Locator", RECENT_LOGS, "(warning) newer"),
            record("Locator", RECENT_LOGS, "(debug) older"),
        ];
        assert_eq!(aggregate_logs(&records, 100), vec!["(debug) older", "(warning) newer"]);
    }

    #[test]
    fn test_aggregate_logs_keeps_most_recent_lines() {
        let records = vec![record("Locator", RECENT_LOGS, "(info) 1\n(info) 2\n(info) 3")];
        assert_eq!(aggregate_logs(&records, 2), vec!["(info) 2", "(info) 3"]);
    }

    #[test]
    fn test_aggregate_logs_untagged_first_line_starts_entry() {
        let records = vec![record("Locator", RECENT_LOGS, "stack frame\n(error) B - b : bad")];
        assert_eq!(
            aggregate_logs(&records, 100),
            vec!["stack frame".to_string(), "(error) B - b : bad".to_string()]
        );
    }

    #[test]
    fn test_aggregate_status_last_write_wins() {
        let records = vec![
            record("Locator", "State", "starting"),
            record("Locator", RECENT_LOGS, "(info) ignored"),
            record("Trigger", "Queue", "3"),
            record("Locator", "State", "running"),
        ];

        assert_eq!(
            aggregate_status(&records),
            vec!["Locator - State : running", "Trigger - Queue : 3"]
        );
    }

    #[test]
    fn test_process_status_reply_marks_response() {
        let reply = StatusInformation {
            record: vec![record("Locator", "State", "running")],
        };
        let status = process_status_reply("Locator", &reply, 100);
        assert!(status.received_last_response);
        assert_eq!(status.status.len(), 1);
        assert!(status.logs.is_empty());
        assert!(status.last_update_time_stamp > 0);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let value = serde_json::to_value(MicroserviceStatus::unknown("Locator")).unwrap();
        assert_eq!(value["receivedLastResponse"], false);
        assert_eq!(value["lastUpdateTimeStamp"], 0);
        assert_eq!(value["viewedTimeStamp"], 0);
    }
}
