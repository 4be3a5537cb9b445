//! Derived views over the event log: counts, session statistics, the export
//! document and the dashboard snapshot. Everything here is a pure function of
//! the events handed in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::env::iso_date;
use crate::event::Event;

/// Occurrences per event name.
pub type EventCounts = BTreeMap<String, u64>;

/// Count events by name.
pub fn count_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> EventCounts {
    let mut counts = EventCounts::new();
    for event in events {
        *counts.entry(event.name.clone()).or_insert(0) += 1;
    }
    counts
}

/// The `n` most frequent names, highest count first, ties by name.
pub fn top_events(counts: &EventCounts, n: usize) -> Vec<(&str, u64)> {
    let mut ranked: Vec<(&str, u64)> = counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(n);
    ranked
}

/// Statistics for the recorder's current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub session_id: String,
    /// Milliseconds since the session started, never negative.
    pub duration: i64,
    pub event_count: usize,
    pub start_time: i64,
    pub events: Vec<Event>,
}

impl SessionStats {
    pub fn compute<'a>(
        session_id: &str,
        start_time: i64,
        now: i64,
        log: impl IntoIterator<Item = &'a Event>,
    ) -> Self {
        let events: Vec<Event> = log
            .into_iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        Self {
            session_id: session_id.to_string(),
            duration: (now - start_time).max(0),
            event_count: events.len(),
            start_time,
            events,
        }
    }
}

/// Aggregate section of the export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub event_counts: EventCounts,
    pub session_stats: SessionStats,
}

/// The downloadable analytics export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    /// RFC 3339 export instant.
    pub export_date: String,
    pub session_id: String,
    pub total_events: usize,
    pub events: Vec<Event>,
    pub summary: ExportSummary,
}

impl ExportDocument {
    /// Pretty-printed JSON, two-space indented.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// File name offered for an export taken at `now`.
pub fn export_file_name(now: i64) -> String {
    format!("analytics-export-{}.json", iso_date(now))
}

/// Everything a dashboard renders in one read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    /// Newest first.
    pub events: Vec<Event>,
    pub event_counts: EventCounts,
    pub session_stats: Option<SessionStats>,
    pub is_enabled: bool,
}

impl DashboardSnapshot {
    /// Events whose name contains `fragment`, ignoring case. An empty
    /// fragment keeps everything.
    pub fn filter_by_name(&self, fragment: &str) -> Vec<&Event> {
        let needle = fragment.to_lowercase();
        self.events
            .iter()
            .filter(|e| needle.is_empty() || e.name.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn top_events(&self, n: usize) -> Vec<(&str, u64)> {
        top_events(&self.event_counts, n)
    }
}

/// Human-readable duration: `1h 2m 3s`, `2m 3s` or `3s`.
pub fn format_duration(ms: i64) -> String {
    let seconds = ms.max(0) / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    if hours > 0 {
        format!("{hours}h {}m {}s", minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{minutes}m {}s", seconds % 60)
    } else {
        format!("{seconds}s")
    }
}
