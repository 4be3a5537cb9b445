use chrono::{DateTime, NaiveDate};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize};

use crate::env::PageContext;

/// Opaque event payload. The recorder never inspects it.
pub type EventData = serde_json::Map<String, serde_json::Value>;

/// A single captured analytics event, as persisted and exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "data_or_empty")]
    pub data: EventData,
    pub timestamp: i64,
    pub session_id: String,
    #[serde(flatten)]
    pub context: PageContext,
}

fn data_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<EventData, D::Error> {
    Ok(Option::<EventData>::deserialize(deserializer)?.unwrap_or_default())
}

/// Coerce arbitrary JSON into a payload. Objects pass through, `null` becomes
/// empty, anything else is wrapped as `{"value": ...}`.
pub fn into_event_data(value: serde_json::Value) -> EventData {
    match value {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => EventData::new(),
        other => {
            let mut data = EventData::new();
            data.insert("value".to_string(), other);
            data
        }
    }
}

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Generates session and event ids: `<prefix>_<ms>_<9 base36 chars>`.
///
/// Seeded by the host so the core never needs OS entropy.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    rng: SmallRng,
}

impl IdGenerator {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn session_id(&mut self, now: i64) -> String {
        format!("session_{now}_{}", self.suffix())
    }

    pub fn event_id(&mut self, now: i64) -> String {
        format!("event_{now}_{}", self.suffix())
    }

    fn suffix(&mut self) -> String {
        (0..SUFFIX_LEN)
            .map(|_| BASE36[self.rng.gen_range(0..BASE36.len())] as char)
            .collect()
    }
}

/// Errors from building an [`EventFilter`].
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid date '{0}': expected RFC 3339 or YYYY-MM-DD")]
    InvalidDate(String),
}

/// Query filters. All bounds are inclusive; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Case-sensitive substring of the event name.
    pub name_contains: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        self.name_contains = (!fragment.is_empty()).then_some(fragment);
        self
    }

    pub fn with_start(mut self, ms: i64) -> Self {
        self.start = Some(ms);
        self
    }

    pub fn with_end(mut self, ms: i64) -> Self {
        self.end = Some(ms);
        self
    }

    /// Lower bound from an RFC 3339 instant or a date (start of that UTC day).
    pub fn with_start_date(self, date: &str) -> Result<Self, FilterError> {
        let ms = parse_date(date, false)?;
        Ok(self.with_start(ms))
    }

    /// Upper bound from an RFC 3339 instant or a date (end of that UTC day).
    pub fn with_end_date(self, date: &str) -> Result<Self, FilterError> {
        let ms = parse_date(date, true)?;
        Ok(self.with_end(ms))
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref fragment) = self.name_contains {
            if !event.name.contains(fragment.as_str()) {
                return false;
            }
        }
        if self.start.is_some_and(|start| event.timestamp < start) {
            return false;
        }
        if self.end.is_some_and(|end| event.timestamp > end) {
            return false;
        }
        true
    }
}

fn parse_date(input: &str, end_of_day: bool) -> Result<i64, FilterError> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.timestamp_millis());
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| FilterError::InvalidDate(input.to_string()))?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc().timestamp_millis())
        .ok_or_else(|| FilterError::InvalidDate(input.to_string()))
}
