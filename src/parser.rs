/// Apache access log line parsing (Common and Combined Log Format).
///
/// Only the timestamp is needed for RPS, but the other fields are captured
/// so callers can inspect them. Lines that do not match the grammar are
/// reported as `None` and skipped by the pipeline.
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use std::sync::LazyLock;

/// Timestamp layout inside the square brackets, e.g. `10/Oct/2023:13:55:36 -0700`.
pub const TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// `host ident user [timestamp] "request" status bytes` with optional
/// `"referer" "user-agent"` for Combined Log Format.
static LOG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?P<host>\S+) \S+ \S+ \[(?P<ts>\d{2}/[A-Za-z]{3}/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d{4})\] "(?P<request>[^"]+)" (?P<status>\d+) (?P<bytes>\S+)(?: "(?P<referer>[^"]*)" "(?P<agent>[^"]*)")?"#,
    )
    .unwrap()
});

/// One successfully parsed access log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    /// Request time with the offset written in the log.
    pub timestamp: DateTime<FixedOffset>,
    pub host: String,
    pub request: String,
    pub status: u16,
    /// Response size; `None` when the log wrote `-`.
    pub bytes: Option<u64>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
}

/// Parse a single log line. Returns `None` for anything unparseable.
pub fn parse_line(line: &str) -> Option<ParsedRecord> {
    let line = line.trim_end_matches(['\r', '\n']);
    let caps = LOG_LINE.captures(line)?;

    let timestamp = parse_timestamp(&caps["ts"])?;
    let status = caps["status"].parse::<u16>().ok()?;
    let bytes = match &caps["bytes"] {
        "-" => None,
        other => other.parse::<u64>().ok(),
    };

    Some(ParsedRecord {
        timestamp,
        host: caps["host"].to_string(),
        request: caps["request"].to_string(),
        status,
        bytes,
        referer: caps.name("referer").map(|m| m.as_str().to_string()),
        user_agent: caps.name("agent").map(|m| m.as_str().to_string()),
    })
}

/// Parse only the bracketed timestamp text (without the brackets).
pub fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    match DateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
        Ok(ts) => Some(ts),
        Err(e) => {
            tracing::trace!(error = %e, text, "unparseable timestamp");
            None
        }
    }
}
