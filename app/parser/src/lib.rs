use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// One exported log record from the aggregation backend. The `message`
/// field carries the raw firewall text; everything else is opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLogLine {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub message: String,
}

impl RawLogLine {
    /// Builds a record from a JSON export entry. The backend nests the
    /// fields under a `message` object; mock exports keep them flat.
    /// Both shapes are accepted.
    pub fn from_value(value: &Value) -> Self {
        let fields = match value.get("message") {
            Some(inner) if inner.is_object() => inner,
            _ => value,
        };
        let text = |key: &str| {
            fields
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            timestamp: text("timestamp"),
            source: text("source"),
            message: text("message"),
        }
    }
}

/// A single blocked packet, extracted from a line matching the
/// WAN-to-gateway drop signature. Exists only when both `src_ip` and
/// `dst_ip` were present in the line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDropEvent {
    pub timestamp: String,
    pub rule_id: String,
    pub description: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub proto: String,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub raw_message: String,
}

impl ParsedDropEvent {
    /// `/24` prefix of the source address, `None` when `src_ip` is empty.
    /// Recomputed on demand, never cached.
    pub fn src_subnet(&self) -> Option<String> {
        if self.src_ip.is_empty() {
            return None;
        }
        Some(subnet24(&self.src_ip))
    }

    /// Parses the carried timestamp string as RFC 3339. Malformed
    /// timestamps yield `None` rather than an error.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// First three octets joined with `.0/24`.
pub fn subnet24(ip: &str) -> String {
    let octets: Vec<&str> = ip.split('.').take(3).collect();
    format!("{}.0/24", octets.join("."))
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("invalid drop signature pattern: {0}")]
    Pattern(#[from] regex::Error),
}

// Permissive by design: only the rule tag, description, and SRC/DST are
// required. Everything after DST= is optional so truncated lines still
// produce a record, and unknown tokens between MAC= and SRC= are skipped.
const DROP_SIGNATURE: &str = concat!(
    r#"\[WAN_LOCAL-D-(?P<rule_id>\d+)\].*?"#,
    r#"DESCR="(?P<descr>[^"]+)"\s*"#,
    r"IN=\S*\s*OUT=\S*\s*",
    r"(?:MAC=[^ ]+\s*)?",
    r"(?:.*?)",
    r"SRC=(?P<src_ip>[^ ]+)\s*",
    r"DST=(?P<dst_ip>[^ ]+)\s*",
    r"(?:LEN=\d+\s+TOS=\S+\s+PREC=\S+\s+TTL=\d+\s+ID=\d+\s+DF\s+)?",
    r"(?:PROTO=(?P<proto>\S+)\s*)?",
    r"(?:SPT=(?P<src_port>\d+)\s*)?",
    r"(?:DPT=(?P<dst_port>\d+)\s*)?",
);

/// Matches raw log lines against the WAN-to-gateway drop signature.
pub struct DropLineParser {
    signature: Regex,
}

impl DropLineParser {
    pub fn new() -> Result<Self, ParserError> {
        Ok(Self {
            signature: Regex::new(DROP_SIGNATURE)?,
        })
    }

    /// Extracts a drop event from one raw line, or `None` when the line
    /// does not carry the drop signature. Only the first occurrence in
    /// the line is used.
    pub fn parse_line(&self, line: &RawLogLine) -> Option<ParsedDropEvent> {
        let caps = self.signature.captures(&line.message)?;
        Some(ParsedDropEvent {
            timestamp: line.timestamp.clone(),
            rule_id: caps["rule_id"].to_string(),
            description: caps["descr"].to_string(),
            src_ip: caps["src_ip"].to_string(),
            dst_ip: caps["dst_ip"].to_string(),
            proto: caps
                .name("proto")
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            src_port: caps.name("src_port").and_then(|m| m.as_str().parse().ok()),
            dst_port: caps.name("dst_port").and_then(|m| m.as_str().parse().ok()),
            raw_message: line.message.clone(),
        })
    }

    /// Parses a batch, preserving input order. Lines that fail to match
    /// are skipped silently; they are noise, not errors.
    pub fn parse_batch(&self, raw: &[RawLogLine]) -> Vec<ParsedDropEvent> {
        let parsed: Vec<ParsedDropEvent> =
            raw.iter().filter_map(|line| self.parse_line(line)).collect();
        if parsed.is_empty() && !raw.is_empty() {
            warn!(sample = %raw[0].message, "no lines matched the drop signature");
        } else {
            debug!(raw = raw.len(), parsed = parsed.len(), "parsed drop batch");
        }
        parsed
    }
}
