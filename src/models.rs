use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Cached query result for one endpoint. `Snapshot::default()` is the empty
/// state every endpoint starts from and falls back to after a failed query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub token_valid: bool,
    pub unlimited_quota: bool,
    pub total_granted: i64,
    pub total_used: i64,
    pub total_available: i64,
    /// Epoch seconds, `0` means the token never expires.
    pub expires_at: i64,
    pub token_name: String,
    pub logs: Vec<LogEntry>,
}

/// Log ids arrive as numbers from most relays but are not guaranteed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogId {
    Number(i64),
    Text(String),
}

impl Default for LogId {
    fn default() -> Self {
        LogId::Number(0)
    }
}

impl LogId {
    fn as_number(&self) -> Option<i64> {
        match self {
            LogId::Number(n) => Some(*n),
            LogId::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogId::Number(n) => write!(f, "{n}"),
            LogId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    #[serde(deserialize_with = "null_as_default")]
    pub id: LogId,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub token_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub model_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub use_time: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub is_stream: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub prompt_tokens: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub completion_tokens: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub quota: i64,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(deserialize_with = "null_as_default")]
    pub other: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl LogEntry {
    /// Consume/error-style rows that carry per-token accounting.
    pub fn has_billing(&self) -> bool {
        self.kind == 0 || self.kind == 2
    }

    /// Midjourney-style job rows carry no per-token accounting.
    pub fn is_opaque_job(&self) -> bool {
        self.model_name.starts_with("mj_")
    }

    /// Pricing multipliers stashed in `other`; `None` when it is not a JSON
    /// object. An empty string reads as an empty object.
    pub fn price_ratios(&self) -> Option<PriceRatios> {
        let raw = if self.other.trim().is_empty() {
            "{}"
        } else {
            self.other.as_str()
        };
        serde_json::from_str(raw).ok()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct PriceRatios {
    pub model_ratio: Option<f64>,
    pub model_price: Option<f64>,
    pub completion_ratio: Option<f64>,
    pub group_ratio: Option<f64>,
}

/// Most recent first; equal timestamps fall back to the id, numerically when
/// both ids are numbers, otherwise by their text. Numeric ids rank ahead of
/// text ids so the order stays total on mixed input.
pub fn newest_first(a: &LogEntry, b: &LogEntry) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| {
        match (a.id.as_number(), b.id.as_number()) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b.id.to_string().cmp(&a.id.to_string()),
        }
    })
}

pub fn sort_newest_first(logs: &mut [LogEntry]) {
    logs.sort_by(newest_first);
}

/// `data` of the balance endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub unlimited_quota: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub total_granted: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub total_used: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub total_available: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub expires_at: i64,
}

impl Snapshot {
    pub fn apply_usage(&mut self, usage: TokenUsage) {
        self.unlimited_quota = usage.unlimited_quota;
        self.total_granted = usage.total_granted;
        self.total_used = usage.total_used;
        self.total_available = usage.total_available;
        self.expires_at = usage.expires_at;
        self.token_name = usage.name;
        self.token_valid = true;
    }
}
