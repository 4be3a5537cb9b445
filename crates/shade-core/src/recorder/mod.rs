//! The analytics recorder: a bounded, consent-gated event log mirrored to a
//! key-value store.
//!
//! Capture is in-memory only; the store is written by [`Recorder::flush`],
//! which the host triggers periodically through [`Recorder::tick`] and once
//! more through [`Recorder::on_terminate`]. No storage failure ever reaches
//! the caller.
//!
//! Every mutating operation takes `&mut self`, so a host that shares one
//! recorder between threads must put it behind a lock. That also serializes
//! consent revocation against flushes, which keeps the purge total.

use std::collections::VecDeque;

use serde_json::json;
use tracing::{debug, warn};

use crate::config::RecorderConfig;
use crate::consent::ConsentGate;
use crate::env::{iso_timestamp, Environment};
use crate::event::{Event, EventData, EventFilter, IdGenerator};
use crate::lifecycle::{LifecycleTasks, VisibilityChange};
use crate::notify::{EventBus, Listener, SubscriptionId};
use crate::report::{
    count_events, export_file_name, DashboardSnapshot, EventCounts, ExportDocument, ExportSummary,
    SessionStats,
};
use crate::storage::KeyValueStore;

/// Well-known event names emitted by the recorder itself and its helpers.
pub mod names {
    pub const DATA_CLEARED: &str = "analytics_data_cleared";
    pub const VISIBILITY_HIDDEN: &str = "page_visibility_hidden";
    pub const VISIBILITY_VISIBLE: &str = "page_visibility_visible";
    pub const PERFORMANCE_METRIC: &str = "performance_metric";
    pub const ERROR_OCCURRED: &str = "error_occurred";
    pub const USER_INTERACTION: &str = "user_interaction";
}

/// Consent-gated event recorder for one session.
pub struct Recorder<S: KeyValueStore, E: Environment> {
    config: RecorderConfig,
    store: S,
    env: E,
    ids: IdGenerator,
    consent: ConsentGate,
    events: VecDeque<Event>,
    session_id: String,
    start_time: i64,
    tasks: LifecycleTasks,
    bus: EventBus,
}

impl<S: KeyValueStore, E: Environment> Recorder<S, E> {
    /// Start a new session: read consent, hydrate the persisted log when
    /// consent is granted, and register the host tasks.
    ///
    /// `seed` feeds the id generator; hosts pass something that differs per
    /// page load.
    pub fn initialize(config: RecorderConfig, store: S, env: E, seed: u64) -> Self {
        let now = env.now_ms();
        let mut ids = IdGenerator::seeded(seed);
        let session_id = ids.session_id(now);
        let consent = ConsentGate::load(config.consent_key.clone(), &store);
        let tasks = LifecycleTasks::register(now, config.flush_interval_ms);

        let mut recorder = Self {
            events: VecDeque::with_capacity(config.max_events.min(1024)),
            config,
            store,
            env,
            ids,
            consent,
            session_id,
            start_time: now,
            tasks,
            bus: EventBus::new(),
        };

        if recorder.consent.is_enabled() {
            recorder.hydrate(now);
        }
        debug!(
            session_id = %recorder.session_id,
            enabled = recorder.consent.is_enabled(),
            loaded = recorder.events.len(),
            "recorder initialized"
        );
        recorder
    }

    fn hydrate(&mut self, now: i64) {
        let raw = match self.store.get(&self.config.events_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "failed to read stored analytics events");
                return;
            }
        };

        let records: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "discarding unreadable analytics events");
                self.events.clear();
                return;
            }
        };

        let total = records.len();
        let stored: Vec<Event> = records
            .into_iter()
            .filter_map(|record| serde_json::from_value(record).ok())
            .collect();
        let skipped = total - stored.len();
        if skipped > 0 {
            warn!(skipped, "dropping unreadable analytics events");
        }

        let cutoff = now - self.config.retention_ms();
        let readable = stored.len();
        self.events = stored.into_iter().filter(|e| e.timestamp > cutoff).collect();
        let expired = readable - self.events.len();
        self.trim();
        debug!(total, expired, kept = self.events.len(), "analytics events hydrated");
    }

    fn trim(&mut self) {
        while self.events.len() > self.config.max_events {
            self.events.pop_front();
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn is_enabled(&self) -> bool {
        self.consent.is_enabled()
    }

    /// Number of events held in memory, regardless of consent.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Observe every captured event, synchronously after it is appended.
    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // ── Capture ──────────────────────────────────────────────────────

    /// Record an event. Returns false, doing nothing, without consent.
    pub fn capture(&mut self, name: &str, data: EventData) -> bool {
        if !self.consent.is_enabled() {
            return false;
        }

        let now = self.env.now_ms();
        let event = Event {
            id: self.ids.event_id(now),
            name: name.to_string(),
            data,
            timestamp: now,
            session_id: self.session_id.clone(),
            context: self.env.page_context(),
        };
        self.events.push_back(event);
        self.trim();

        if let Some(event) = self.events.back() {
            self.bus.emit(event);
        }
        true
    }

    /// Record a named measurement, `unit` defaulting to `ms`.
    pub fn track_performance(&mut self, metric: &str, value: f64, unit: Option<&str>) -> bool {
        let data = self.stamped(json!({
            "metric": metric,
            "value": value,
            "unit": unit.unwrap_or("ms"),
        }));
        self.capture(names::PERFORMANCE_METRIC, data)
    }

    /// Record an application error with optional stack and caller context.
    pub fn track_error(&mut self, message: &str, stack: Option<&str>, context: EventData) -> bool {
        let data = self.stamped(json!({
            "message": message,
            "stack": stack,
            "context": context,
        }));
        self.capture(names::ERROR_OCCURRED, data)
    }

    /// Record a user interaction with a UI element.
    pub fn track_interaction(&mut self, element: &str, action: &str, details: EventData) -> bool {
        let data = self.stamped(json!({
            "element": element,
            "action": action,
            "details": details,
        }));
        self.capture(names::USER_INTERACTION, data)
    }

    /// Object payload with an ISO `timestamp` field appended.
    fn stamped(&self, value: serde_json::Value) -> EventData {
        let mut data = match value {
            serde_json::Value::Object(map) => map,
            _ => EventData::new(),
        };
        data.insert(
            "timestamp".to_string(),
            iso_timestamp(self.env.now_ms()).into(),
        );
        data
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Write the whole log to the store. Returns true if it was written.
    pub fn flush(&mut self) -> bool {
        if !self.consent.is_enabled() || self.events.is_empty() {
            return false;
        }

        let json = match serde_json::to_string(&self.events) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize analytics events");
                return false;
            }
        };

        match self.store.set(&self.config.events_key, &json) {
            Ok(()) => {
                debug!(events = self.events.len(), bytes = json.len(), "analytics events flushed");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to save analytics events");
                false
            }
        }
    }

    fn remove_persisted(&mut self) {
        if let Err(e) = self.store.remove(&self.config.events_key) {
            warn!(error = %e, "failed to remove stored analytics events");
        }
    }

    /// Grant or revoke consent. Revoking purges memory and the store.
    pub fn set_consent(&mut self, enabled: bool) {
        self.consent.set(&mut self.store, enabled);
        if !enabled {
            self.events.clear();
            self.remove_persisted();
        }
    }

    /// Re-read consent from the store. If another writer revoked it, the
    /// in-memory log is dropped as well.
    pub fn refresh_consent(&mut self) -> bool {
        let enabled = self.consent.refresh(&self.store);
        if !enabled {
            self.events.clear();
        }
        enabled
    }

    /// Delete everything, whatever the consent state, then note the deletion
    /// if consent is still granted.
    pub fn clear(&mut self) {
        self.events.clear();
        self.remove_persisted();
        let data = self.stamped(json!({}));
        self.capture(names::DATA_CLEARED, data);
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Matching events, newest first. Empty without consent.
    pub fn query(&self, filter: &EventFilter) -> Vec<Event> {
        if !self.consent.is_enabled() {
            return Vec::new();
        }
        self.events
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Occurrences per name across the whole retained log.
    pub fn aggregate_counts(&self) -> EventCounts {
        if !self.consent.is_enabled() {
            return EventCounts::new();
        }
        count_events(&self.events)
    }

    pub fn session_stats(&self) -> Option<SessionStats> {
        if !self.consent.is_enabled() {
            return None;
        }
        Some(SessionStats::compute(
            &self.session_id,
            self.start_time,
            self.env.now_ms(),
            &self.events,
        ))
    }

    pub fn export_document(&self) -> Option<ExportDocument> {
        let session_stats = self.session_stats()?;
        let events: Vec<Event> = self.events.iter().cloned().collect();
        Some(ExportDocument {
            export_date: iso_timestamp(self.env.now_ms()),
            session_id: self.session_id.clone(),
            total_events: events.len(),
            events,
            summary: ExportSummary {
                event_counts: self.aggregate_counts(),
                session_stats,
            },
        })
    }

    /// The export document as pretty JSON. `None` without consent.
    pub fn export_snapshot(&self) -> Option<String> {
        let document = self.export_document()?;
        match document.to_json() {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize analytics export");
                None
            }
        }
    }

    /// Suggested download name for an export taken now.
    pub fn export_file_name(&self) -> String {
        export_file_name(self.env.now_ms())
    }

    pub fn dashboard(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            events: self.query(&EventFilter::new()),
            event_counts: self.aggregate_counts(),
            session_stats: self.session_stats(),
            is_enabled: self.consent.is_enabled(),
        }
    }

    // ── Host triggers ────────────────────────────────────────────────

    /// Periodic timer callback. Flushes when the interval has elapsed.
    pub fn tick(&mut self) -> bool {
        let now = self.env.now_ms();
        self.tasks.flush_due(now) && self.flush()
    }

    /// Page is about to unload. Flushes once; later calls do nothing.
    pub fn on_terminate(&mut self) -> bool {
        self.tasks.terminate() && self.flush()
    }

    /// Page visibility changed. Records how long the page was visible when it
    /// is hidden, and a marker when it is shown again.
    pub fn on_visibility_change(&mut self, hidden: bool) -> bool {
        let now = self.env.now_ms();
        match self.tasks.visibility_changed(hidden, now) {
            Some(VisibilityChange::Hidden { visible_ms }) => {
                let data = self.stamped(json!({ "visible_duration": visible_ms }));
                self.capture(names::VISIBILITY_HIDDEN, data)
            }
            Some(VisibilityChange::Visible) => {
                let data = self.stamped(json!({}));
                self.capture(names::VISIBILITY_VISIBLE, data)
            }
            None => false,
        }
    }

    pub fn next_flush(&self) -> Option<i64> {
        self.tasks.next_flush()
    }

    /// Release the host tasks and drop every subscription. Safe to call twice.
    pub fn teardown(&mut self) {
        if self.tasks.teardown() {
            self.bus.clear();
            debug!(session_id = %self.session_id, "recorder torn down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ManualClock, ManualEnvironment};
    use crate::storage::MemoryStore;
    use std::sync::{Arc, Mutex};

    const DAY_MS: i64 = 86_400_000;
    const START: i64 = 1_700_000_000_000;

    type TestRecorder = Recorder<MemoryStore, ManualEnvironment>;

    fn consenting_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.set("analytics-consent", "true").unwrap();
        store
    }

    fn recorder_with(store: MemoryStore, config: RecorderConfig) -> (TestRecorder, ManualClock) {
        let clock = ManualClock::new(START);
        let env = ManualEnvironment::new(clock.clone());
        (Recorder::initialize(config, store, env, 42), clock)
    }

    fn enabled() -> (TestRecorder, ManualClock) {
        recorder_with(consenting_store(), RecorderConfig::default())
    }

    fn disabled() -> (TestRecorder, ManualClock) {
        recorder_with(MemoryStore::new(), RecorderConfig::default())
    }

    fn names_of(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.name.as_str()).collect()
    }

    fn stored_events(recorder: &TestRecorder) -> Option<Vec<Event>> {
        recorder
            .store()
            .get("analytics-events")
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    fn stored_event(name: &str, timestamp: i64) -> serde_json::Value {
        json!({
            "id": format!("event_{timestamp}_abcdefghi"),
            "name": name,
            "data": {},
            "timestamp": timestamp,
            "sessionId": "session_old",
            "url": "http://localhost/",
            "userAgent": "UA",
            "viewport": { "width": 1, "height": 1 },
            "screen": { "width": 1, "height": 1 }
        })
    }

    #[test]
    fn test_initialize_session() {
        let (recorder, _) = enabled();
        assert!(recorder.session_id().starts_with(&format!("session_{START}_")));
        assert_eq!(recorder.start_time(), START);
        assert!(recorder.is_enabled());
        assert!(recorder.is_empty());
        assert_eq!(recorder.next_flush(), Some(START + 30_000));
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        let clock = ManualClock::new(START);
        let a = Recorder::initialize(
            RecorderConfig::default(),
            MemoryStore::new(),
            ManualEnvironment::new(clock.clone()),
            1,
        );
        let b = Recorder::initialize(
            RecorderConfig::default(),
            MemoryStore::new(),
            ManualEnvironment::new(clock),
            2,
        );
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn test_capture_builds_event() {
        let (mut recorder, _) = enabled();
        let mut data = EventData::new();
        data.insert("new_theme".to_string(), json!("dark"));

        assert!(recorder.capture("theme_changed", data));

        let events = recorder.query(&EventFilter::new());
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name, "theme_changed");
        assert_eq!(event.timestamp, START);
        assert_eq!(event.session_id, recorder.session_id());
        assert_eq!(event.data["new_theme"], "dark");
        assert_eq!(event.context.user_agent, "shade-test");
        assert!(event.id.starts_with(&format!("event_{START}_")));
    }

    #[test]
    fn test_capture_does_not_write_store() {
        let (mut recorder, _) = enabled();
        recorder.capture("a", EventData::new());
        assert!(stored_events(&recorder).is_none());
    }

    #[test]
    fn test_consent_gating() {
        let (mut recorder, _) = disabled();
        assert!(!recorder.capture("a", EventData::new()));
        assert!(!recorder.track_performance("load", 12.5, None));
        assert!(!recorder.on_visibility_change(true));

        assert!(recorder.is_empty());
        assert!(recorder.query(&EventFilter::new()).is_empty());
        assert!(recorder.aggregate_counts().is_empty());
        assert!(recorder.session_stats().is_none());
        assert!(recorder.export_snapshot().is_none());
        assert!(!recorder.dashboard().is_enabled);
        assert!(!recorder.flush());
    }

    #[test]
    fn test_bounded_history_keeps_most_recent() {
        let config = RecorderConfig {
            max_events: 5,
            ..RecorderConfig::default()
        };
        let (mut recorder, clock) = recorder_with(consenting_store(), config);

        for i in 0..8 {
            let mut data = EventData::new();
            data.insert("i".to_string(), json!(i));
            recorder.capture("tick", data);
            clock.advance(1);
        }

        assert_eq!(recorder.len(), 5);
        let oldest_first: Vec<i64> = recorder
            .query(&EventFilter::new())
            .iter()
            .rev()
            .map(|e| e.data["i"].as_i64().unwrap())
            .collect();
        assert_eq!(oldest_first, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_default_bound_is_one_thousand() {
        let (mut recorder, _) = enabled();
        for _ in 0..1003 {
            recorder.capture("e", EventData::new());
        }
        assert_eq!(recorder.len(), 1000);
    }

    #[test]
    fn test_retention_on_load() {
        let mut store = consenting_store();
        let log = json!([
            stored_event("expired", START - 31 * DAY_MS),
            stored_event("boundary", START - 30 * DAY_MS),
            stored_event("recent", START - DAY_MS),
        ]);
        store.set("analytics-events", &log.to_string()).unwrap();

        let (recorder, clock) = recorder_with(store, RecorderConfig::default());
        assert_eq!(names_of(&recorder.query(&EventFilter::new())), vec!["recent"]);

        // Already-loaded events are not re-filtered as time passes.
        clock.advance(60 * DAY_MS);
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_load_skipped_without_consent() {
        let mut store = MemoryStore::new();
        let log = json!([stored_event("recent", START - DAY_MS)]);
        store.set("analytics-events", &log.to_string()).unwrap();

        let (recorder, _) = recorder_with(store, RecorderConfig::default());
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_corrupt_log_starts_empty() {
        let mut store = consenting_store();
        store.set("analytics-events", "[{ broken").unwrap();

        let (mut recorder, _) = recorder_with(store, RecorderConfig::default());
        assert!(recorder.is_empty());
        assert!(recorder.capture("after", EventData::new()));
        assert!(recorder.flush());
        assert_eq!(stored_events(&recorder).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_records_are_skipped_on_load() {
        let mut store = consenting_store();
        let mut null_data = stored_event("null_data", START - 2 * DAY_MS);
        null_data["data"] = serde_json::Value::Null;
        let mut fractional = stored_event("fractional", START - 2 * DAY_MS);
        fractional["viewport"]["width"] = json!(1280.5);
        let log = json!([
            stored_event("kept", START - DAY_MS),
            { "name": "no_id" },
            fractional,
            "not an event",
            null_data,
        ]);
        store.set("analytics-events", &log.to_string()).unwrap();

        let (recorder, _) = recorder_with(store, RecorderConfig::default());
        assert_eq!(
            names_of(&recorder.query(&EventFilter::new())),
            vec!["null_data", "kept"]
        );
    }

    #[test]
    fn test_unreadable_store_means_disabled() {
        let (mut recorder, _) = recorder_with(MemoryStore::unavailable(), RecorderConfig::default());
        assert!(!recorder.is_enabled());
        assert!(!recorder.capture("a", EventData::new()));
    }

    #[test]
    fn test_flush_writes_full_log() {
        let (mut recorder, _) = enabled();
        assert!(!recorder.flush());

        recorder.capture("a", EventData::new());
        recorder.capture("b", EventData::new());
        assert!(recorder.flush());

        let stored = stored_events(&recorder).unwrap();
        assert_eq!(names_of(&stored), vec!["a", "b"]);
    }

    #[test]
    fn test_flush_failure_is_swallowed() {
        let (mut recorder, _) = enabled();
        recorder.capture("a", EventData::new());

        recorder.store_mut().set_available(false);
        assert!(!recorder.flush());
        assert_eq!(recorder.len(), 1);

        recorder.store_mut().set_available(true);
        assert!(recorder.flush());
    }

    #[test]
    fn test_flush_over_quota_is_swallowed() {
        let mut store = MemoryStore::with_quota(200);
        store.set("analytics-consent", "true").unwrap();
        let (mut recorder, _) = recorder_with(store, RecorderConfig::default());

        for _ in 0..10 {
            recorder.capture("big", EventData::new());
        }
        assert!(!recorder.flush());
        assert!(stored_events(&recorder).is_none());
        assert_eq!(recorder.len(), 10);
    }

    #[test]
    fn test_revocation_purges() {
        let (mut recorder, _) = enabled();
        recorder.capture("a", EventData::new());
        recorder.capture("b", EventData::new());
        recorder.flush();
        assert!(stored_events(&recorder).is_some());

        recorder.set_consent(false);
        assert!(recorder.is_empty());
        assert!(stored_events(&recorder).is_none());
        assert_eq!(
            recorder.store().get("analytics-consent").unwrap().as_deref(),
            Some("false")
        );

        recorder.set_consent(true);
        assert!(recorder.is_empty());
        assert!(recorder.query(&EventFilter::new()).is_empty());
        assert!(recorder.capture("c", EventData::new()));
        assert_eq!(names_of(&recorder.query(&EventFilter::new())), vec!["c"]);
    }

    #[test]
    fn test_enabling_keeps_session_id() {
        let (mut recorder, _) = disabled();
        let session = recorder.session_id().to_string();
        recorder.set_consent(true);
        assert_eq!(recorder.session_id(), session);
        assert!(recorder.capture("a", EventData::new()));
    }

    #[test]
    fn test_refresh_consent_after_external_revocation() {
        let (mut recorder, _) = enabled();
        recorder.capture("a", EventData::new());
        recorder.store_mut().set("analytics-consent", "false").unwrap();

        assert!(!recorder.refresh_consent());
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_query_ordering_newest_first() {
        let (mut recorder, _) = enabled();
        // Same millisecond: insertion order still decides.
        recorder.capture("E1", EventData::new());
        recorder.capture("E2", EventData::new());
        recorder.capture("E3", EventData::new());

        let events = recorder.query(&EventFilter::new());
        assert_eq!(names_of(&events), vec!["E3", "E2", "E1"]);

        let mut oldest_first = events.clone();
        oldest_first.reverse();
        assert_eq!(names_of(&oldest_first), vec!["E1", "E2", "E3"]);
    }

    #[test]
    fn test_query_filters() {
        let (mut recorder, clock) = enabled();
        recorder.capture("theme_changed", EventData::new());
        clock.advance(1000);
        recorder.capture("user_interaction", EventData::new());
        clock.advance(1000);
        recorder.capture("theme_reset_to_system", EventData::new());

        let themed = recorder.query(&EventFilter::new().with_name("theme"));
        assert_eq!(names_of(&themed), vec!["theme_reset_to_system", "theme_changed"]);

        let window = EventFilter::new().with_start(START + 500).with_end(START + 1000);
        assert_eq!(names_of(&recorder.query(&window)), vec!["user_interaction"]);
        assert_eq!(recorder.len(), 3);
    }

    #[test]
    fn test_aggregate_counts_span_sessions() {
        let mut store = consenting_store();
        let log = json!([
            stored_event("theme_changed", START - DAY_MS),
            stored_event("theme_changed", START - DAY_MS + 1),
        ]);
        store.set("analytics-events", &log.to_string()).unwrap();
        let (mut recorder, _) = recorder_with(store, RecorderConfig::default());

        recorder.capture("theme_changed", EventData::new());
        recorder.capture("user_interaction", EventData::new());

        let counts = recorder.aggregate_counts();
        assert_eq!(counts["theme_changed"], 3);
        assert_eq!(counts["user_interaction"], 1);

        let stats = recorder.session_stats().unwrap();
        assert_eq!(stats.event_count, 2);
    }

    #[test]
    fn test_session_stats_duration_monotonic() {
        let (mut recorder, clock) = enabled();
        for _ in 0..4 {
            recorder.capture("e", EventData::new());
        }

        let first = recorder.session_stats().unwrap();
        assert_eq!(first.event_count, 4);
        assert_eq!(first.session_id, recorder.session_id());
        assert!(first.duration >= 0);

        clock.advance(2500);
        let second = recorder.session_stats().unwrap();
        assert_eq!(second.duration, first.duration + 2500);
        assert_eq!(second.event_count, 4);
    }

    #[test]
    fn test_export_idempotent_without_capture() {
        let (mut recorder, clock) = enabled();
        recorder.capture("a", EventData::new());
        recorder.capture("b", EventData::new());

        let first = recorder.export_document().unwrap();
        clock.advance(10);
        let second = recorder.export_document().unwrap();

        assert_eq!(first.total_events, 2);
        assert_eq!(first.total_events, second.total_events);
        assert_eq!(first.events, second.events);
        assert_eq!(first.session_id, recorder.session_id());
        assert_eq!(first.summary.event_counts["a"], 1);
    }

    #[test]
    fn test_export_snapshot_json() {
        let (mut recorder, _) = enabled();
        recorder.capture("a", EventData::new());

        let json: serde_json::Value =
            serde_json::from_str(&recorder.export_snapshot().unwrap()).unwrap();
        assert_eq!(json["totalEvents"], 1);
        assert_eq!(json["exportDate"], "2023-11-14T22:13:20.000Z");
        assert_eq!(json["events"][0]["name"], "a");
        assert_eq!(json["summary"]["sessionStats"]["eventCount"], 1);
        assert_eq!(recorder.export_file_name(), "analytics-export-2023-11-14.json");
    }

    #[test]
    fn test_clear_with_consent() {
        let (mut recorder, _) = enabled();
        recorder.capture("a", EventData::new());
        recorder.capture("b", EventData::new());
        recorder.flush();

        recorder.clear();

        assert!(stored_events(&recorder).is_none());
        let remaining = recorder.query(&EventFilter::new());
        assert_eq!(names_of(&remaining), vec![names::DATA_CLEARED]);
        assert!(remaining[0].data.contains_key("timestamp"));
    }

    #[test]
    fn test_clear_without_consent() {
        let mut store = MemoryStore::new();
        store.set("analytics-events", "[]").unwrap();
        let (mut recorder, _) = recorder_with(store, RecorderConfig::default());

        recorder.clear();
        assert!(recorder.is_empty());
        assert!(stored_events(&recorder).is_none());
    }

    #[test]
    fn test_clear_survives_failing_store() {
        let (mut recorder, _) = enabled();
        recorder.capture("a", EventData::new());
        recorder.store_mut().set_available(false);

        recorder.clear();
        assert_eq!(names_of(&recorder.query(&EventFilter::new())), vec![names::DATA_CLEARED]);
    }

    #[test]
    fn test_subscribers_see_new_events() {
        let (mut recorder, _) = enabled();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sub = recorder.subscribe(Box::new(move |e| {
            seen_clone.lock().unwrap().push(e.name.clone());
        }));

        recorder.capture("a", EventData::new());
        recorder.set_consent(false);
        recorder.capture("ignored", EventData::new());
        recorder.set_consent(true);
        recorder.capture("b", EventData::new());
        assert!(recorder.unsubscribe(sub));
        recorder.capture("c", EventData::new());

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_tick_flushes_on_interval() {
        let (mut recorder, clock) = enabled();
        recorder.capture("a", EventData::new());

        clock.advance(29_999);
        assert!(!recorder.tick());
        assert!(stored_events(&recorder).is_none());

        clock.advance(1);
        assert!(recorder.tick());
        assert_eq!(stored_events(&recorder).unwrap().len(), 1);
    }

    #[test]
    fn test_terminate_flushes_once() {
        let (mut recorder, _) = enabled();
        recorder.capture("a", EventData::new());
        assert!(recorder.on_terminate());
        assert!(!recorder.on_terminate());
        assert_eq!(stored_events(&recorder).unwrap().len(), 1);
    }

    #[test]
    fn test_visibility_events() {
        let (mut recorder, clock) = enabled();
        clock.advance(4000);
        assert!(recorder.on_visibility_change(true));
        clock.advance(1000);
        assert!(recorder.on_visibility_change(false));

        let events = recorder.query(&EventFilter::new());
        assert_eq!(
            names_of(&events),
            vec![names::VISIBILITY_VISIBLE, names::VISIBILITY_HIDDEN]
        );
        assert_eq!(events[1].data["visible_duration"], 4000);
    }

    #[test]
    fn test_visibility_events_respect_bound() {
        let config = RecorderConfig {
            max_events: 2,
            ..RecorderConfig::default()
        };
        let (mut recorder, _) = recorder_with(consenting_store(), config);
        recorder.capture("a", EventData::new());
        recorder.on_visibility_change(true);
        recorder.on_visibility_change(false);
        assert_eq!(recorder.len(), 2);
    }

    #[test]
    fn test_teardown_releases_tasks_once() {
        let (mut recorder, clock) = enabled();
        recorder.subscribe(Box::new(|_| {}));
        recorder.capture("a", EventData::new());

        recorder.teardown();
        recorder.teardown();

        clock.advance(60_000);
        assert!(!recorder.tick());
        assert!(!recorder.on_terminate());
        assert!(!recorder.on_visibility_change(true));
        assert_eq!(recorder.next_flush(), None);
        // Direct calls keep working.
        assert!(recorder.flush());
    }

    #[test]
    fn test_tracking_helpers() {
        let (mut recorder, _) = enabled();
        recorder.track_performance("first_paint", 120.0, None);
        let mut context = EventData::new();
        context.insert("component".to_string(), json!("toggle"));
        recorder.track_error("boom", Some("at toggle"), context);
        recorder.track_interaction("theme-toggle", "click", EventData::new());

        let events = recorder.query(&EventFilter::new());
        assert_eq!(
            names_of(&events),
            vec![
                names::USER_INTERACTION,
                names::ERROR_OCCURRED,
                names::PERFORMANCE_METRIC
            ]
        );
        assert_eq!(events[2].data["unit"], "ms");
        assert_eq!(events[2].data["value"], 120.0);
        assert_eq!(events[1].data["context"]["component"], "toggle");
        assert_eq!(events[0].data["action"], "click");
        assert_eq!(events[0].data["timestamp"], "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn test_dashboard_snapshot() {
        let (mut recorder, _) = enabled();
        recorder.capture("theme_changed", EventData::new());
        recorder.capture("theme_changed", EventData::new());
        recorder.capture("user_interaction", EventData::new());

        let snapshot = recorder.dashboard();
        assert!(snapshot.is_enabled);
        assert_eq!(snapshot.events.len(), 3);
        assert_eq!(snapshot.events[0].name, "user_interaction");
        assert_eq!(snapshot.top_events(1), vec![("theme_changed", 2)]);
        assert_eq!(snapshot.session_stats.unwrap().event_count, 3);
    }
}
