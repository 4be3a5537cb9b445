mod bridge;
mod host;
mod state;

use serde::Deserialize;
use shade_core::config::Config;
use shade_core::event::{into_event_data, EventData, EventFilter};
use shade_core::notify::NEW_EVENT;
use shade_core::recorder::Recorder;
use shade_core::theme::{
    Theme, ThemePreference, THEME_CHANGED, THEME_INITIALIZED, THEME_RESET_TO_SYSTEM,
};

use bridge::{HostEnvironment, HostStore};

const NOT_INITIALIZED: i32 = -4;

// ── Helper: read string from WASM memory ─────────────────────────────

fn read_str(ptr: *const u8, len: u32) -> Option<&'static str> {
    if len == 0 {
        return Some("");
    }
    let bytes = unsafe { std::slice::from_raw_parts(ptr, len as usize) };
    std::str::from_utf8(bytes).ok()
}

/// Empty input means no payload; otherwise it must be JSON.
fn read_data(ptr: *const u8, len: u32) -> Option<EventData> {
    let raw = read_str(ptr, len)?;
    if raw.trim().is_empty() {
        return Some(EventData::new());
    }
    serde_json::from_str(raw).ok().map(into_event_data)
}

fn write_to_buffer(s: &str, out_ptr: *mut u8, max_len: u32) -> u32 {
    let bytes = s.as_bytes();
    let copy_len = bytes.len().min(max_len as usize);
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), out_ptr, copy_len);
    }
    copy_len as u32
}

/// Store a JSON result for `shade_get_result`. Returns its byte length.
fn set_result(rt: &mut state::Runtime, json: String) -> i32 {
    let len = json.len() as i32;
    rt.result_buffer = json;
    len
}

fn to_result<T: serde::Serialize>(rt: &mut state::Runtime, value: &T) -> i32 {
    match serde_json::to_string(value) {
        Ok(json) => set_result(rt, json),
        Err(_) => -1,
    }
}

fn theme_code(theme: Theme) -> i32 {
    match theme {
        Theme::Light => 0,
        Theme::Dark => 1,
    }
}

fn system_theme(is_dark: bool) -> Theme {
    if is_dark {
        Theme::Dark
    } else {
        Theme::Light
    }
}

// ── LIFECYCLE EXPORTS ────────────────────────────────────────────────

/// Initialize the recorder and theme preference from a JSON config.
/// Returns 0 on success, negative on error.
#[unsafe(no_mangle)]
pub extern "C" fn shade_init(config_ptr: *const u8, config_len: u32) -> i32 {
    let config_str = match read_str(config_ptr, config_len) {
        Some(s) => s,
        None => return -1,
    };

    let config = match Config::from_json(config_str) {
        Ok(c) => c,
        Err(_) => return -2,
    };

    if config.validate().is_err() {
        return -3;
    }

    bridge::init_logging();
    // The new recorder loads what the previous page still held in memory.
    state::shutdown();

    let mut recorder = Recorder::initialize(
        config.recorder.clone(),
        HostStore,
        HostEnvironment,
        host::random_seed(),
    );
    recorder.subscribe(Box::new(|event| {
        if let Ok(json) = serde_json::to_string(event) {
            host::emit_event(NEW_EVENT, &json);
        }
    }));

    let theme = ThemePreference::load(
        config.theme.storage_key.clone(),
        &HostStore,
        system_theme(host::prefers_dark()),
    );
    recorder.capture(THEME_INITIALIZED, theme.initialized_data());

    state::init(state::Runtime {
        config,
        recorder,
        theme,
        result_buffer: String::new(),
    });

    host::log(host::LOG_INFO, "shade: runtime initialized");
    0
}

/// Page is unloading. Returns 1 if the log was flushed.
#[unsafe(no_mangle)]
pub extern "C" fn shade_terminate() -> i32 {
    match state::get() {
        Some(rt) => rt.recorder.on_terminate() as i32,
        None => NOT_INITIALIZED,
    }
}

/// Release the periodic flush, termination hook and listeners.
#[unsafe(no_mangle)]
pub extern "C" fn shade_teardown() {
    if let Some(rt) = state::get() {
        rt.recorder.teardown();
    }
}

/// Periodic timer callback. Returns 1 if the log was flushed.
#[unsafe(no_mangle)]
pub extern "C" fn shade_tick() -> i32 {
    match state::get() {
        Some(rt) => rt.recorder.tick() as i32,
        None => NOT_INITIALIZED,
    }
}

/// Visibility listener. Returns 1 if an event was recorded.
#[unsafe(no_mangle)]
pub extern "C" fn shade_visibility(hidden: i32) -> i32 {
    match state::get() {
        Some(rt) => rt.recorder.on_visibility_change(hidden != 0) as i32,
        None => NOT_INITIALIZED,
    }
}

// ── MEMORY MANAGEMENT ────────────────────────────────────────────────

/// Allocate memory in WASM linear memory (for host to write into).
#[unsafe(no_mangle)]
pub extern "C" fn shade_alloc(size: u32) -> *mut u8 {
    match std::alloc::Layout::from_size_align(size.max(1) as usize, 1) {
        Ok(layout) => unsafe { std::alloc::alloc(layout) },
        Err(_) => std::ptr::null_mut(),
    }
}

/// Deallocate memory in WASM linear memory.
#[unsafe(no_mangle)]
pub extern "C" fn shade_dealloc(ptr: *mut u8, size: u32) {
    if ptr.is_null() {
        return;
    }
    if let Ok(layout) = std::alloc::Layout::from_size_align(size.max(1) as usize, 1) {
        unsafe { std::alloc::dealloc(ptr, layout) }
    }
}

/// Copy the last query result into host memory. Returns bytes written.
#[unsafe(no_mangle)]
pub extern "C" fn shade_get_result(out_ptr: *mut u8, max_len: u32) -> u32 {
    match state::get() {
        Some(rt) => write_to_buffer(&rt.result_buffer, out_ptr, max_len),
        None => 0,
    }
}

// ── CAPTURE ──────────────────────────────────────────────────────────

/// Record an event with a JSON payload (empty for none).
/// Returns 1 if recorded, 0 without consent, negative on error.
#[unsafe(no_mangle)]
pub extern "C" fn shade_capture(
    name_ptr: *const u8,
    name_len: u32,
    data_ptr: *const u8,
    data_len: u32,
) -> i32 {
    let Some(name) = read_str(name_ptr, name_len) else {
        return -1;
    };
    let Some(data) = read_data(data_ptr, data_len) else {
        return -2;
    };
    match state::get() {
        Some(rt) => rt.recorder.capture(name, data) as i32,
        None => NOT_INITIALIZED,
    }
}

/// Record a `performance_metric`. An empty unit means milliseconds.
#[unsafe(no_mangle)]
pub extern "C" fn shade_track_performance(
    metric_ptr: *const u8,
    metric_len: u32,
    value: f64,
    unit_ptr: *const u8,
    unit_len: u32,
) -> i32 {
    let (Some(metric), Some(unit)) = (read_str(metric_ptr, metric_len), read_str(unit_ptr, unit_len))
    else {
        return -1;
    };
    let unit = (!unit.is_empty()).then_some(unit);
    match state::get() {
        Some(rt) => rt.recorder.track_performance(metric, value, unit) as i32,
        None => NOT_INITIALIZED,
    }
}

/// Record an `error_occurred`. Empty stack means none; context is JSON.
#[unsafe(no_mangle)]
pub extern "C" fn shade_track_error(
    msg_ptr: *const u8,
    msg_len: u32,
    stack_ptr: *const u8,
    stack_len: u32,
    context_ptr: *const u8,
    context_len: u32,
) -> i32 {
    let (Some(message), Some(stack)) = (read_str(msg_ptr, msg_len), read_str(stack_ptr, stack_len))
    else {
        return -1;
    };
    let Some(context) = read_data(context_ptr, context_len) else {
        return -2;
    };
    let stack = (!stack.is_empty()).then_some(stack);
    match state::get() {
        Some(rt) => rt.recorder.track_error(message, stack, context) as i32,
        None => NOT_INITIALIZED,
    }
}

/// Record a `user_interaction` with JSON details.
#[unsafe(no_mangle)]
pub extern "C" fn shade_track_interaction(
    element_ptr: *const u8,
    element_len: u32,
    action_ptr: *const u8,
    action_len: u32,
    details_ptr: *const u8,
    details_len: u32,
) -> i32 {
    let (Some(element), Some(action)) =
        (read_str(element_ptr, element_len), read_str(action_ptr, action_len))
    else {
        return -1;
    };
    let Some(details) = read_data(details_ptr, details_len) else {
        return -2;
    };
    match state::get() {
        Some(rt) => rt.recorder.track_interaction(element, action, details) as i32,
        None => NOT_INITIALIZED,
    }
}

/// Write the log to storage now. Returns 1 if written.
#[unsafe(no_mangle)]
pub extern "C" fn shade_flush() -> i32 {
    match state::get() {
        Some(rt) => rt.recorder.flush() as i32,
        None => NOT_INITIALIZED,
    }
}

// ── CONSENT ──────────────────────────────────────────────────────────

/// Grant (non-zero) or revoke (zero) consent. Revoking purges all data.
#[unsafe(no_mangle)]
pub extern "C" fn shade_set_consent(enabled: i32) -> i32 {
    match state::get() {
        Some(rt) => {
            rt.recorder.set_consent(enabled != 0);
            0
        }
        None => NOT_INITIALIZED,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn shade_is_enabled() -> i32 {
    match state::get() {
        Some(rt) => rt.recorder.is_enabled() as i32,
        None => NOT_INITIALIZED,
    }
}

/// Re-read consent after another tab changed it.
#[unsafe(no_mangle)]
pub extern "C" fn shade_refresh_consent() -> i32 {
    match state::get() {
        Some(rt) => rt.recorder.refresh_consent() as i32,
        None => NOT_INITIALIZED,
    }
}

/// Delete every stored event, regardless of consent.
#[unsafe(no_mangle)]
pub extern "C" fn shade_clear() -> i32 {
    match state::get() {
        Some(rt) => {
            rt.recorder.clear();
            0
        }
        None => NOT_INITIALIZED,
    }
}

// ── QUERY ────────────────────────────────────────────────────────────
// Query exports leave JSON in the result buffer and return its length.

/// Bound given either as epoch milliseconds or as a date string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Bound {
    Millis(i64),
    Date(String),
}

#[derive(Debug, Default, Deserialize)]
struct QueryRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    start: Option<Bound>,
    #[serde(default)]
    end: Option<Bound>,
}

impl QueryRequest {
    fn into_filter(self) -> Option<EventFilter> {
        let mut filter = EventFilter::new();
        if let Some(name) = self.name {
            filter = filter.with_name(name);
        }
        filter = match self.start {
            Some(Bound::Millis(ms)) => filter.with_start(ms),
            Some(Bound::Date(date)) => filter.with_start_date(&date).ok()?,
            None => filter,
        };
        filter = match self.end {
            Some(Bound::Millis(ms)) => filter.with_end(ms),
            Some(Bound::Date(date)) => filter.with_end_date(&date).ok()?,
            None => filter,
        };
        Some(filter)
    }
}

/// Events matching a JSON filter `{name?, start?, end?}`, newest first.
#[unsafe(no_mangle)]
pub extern "C" fn shade_query(filter_ptr: *const u8, filter_len: u32) -> i32 {
    let Some(raw) = read_str(filter_ptr, filter_len) else {
        return -1;
    };
    let request = if raw.trim().is_empty() {
        QueryRequest::default()
    } else {
        match serde_json::from_str::<QueryRequest>(raw) {
            Ok(r) => r,
            Err(_) => return -2,
        }
    };
    let Some(filter) = request.into_filter() else {
        return -3;
    };
    let Some(rt) = state::get() else {
        return NOT_INITIALIZED;
    };
    let events = rt.recorder.query(&filter);
    to_result(rt, &events)
}

#[unsafe(no_mangle)]
pub extern "C" fn shade_counts() -> i32 {
    let Some(rt) = state::get() else {
        return NOT_INITIALIZED;
    };
    let counts = rt.recorder.aggregate_counts();
    to_result(rt, &counts)
}

/// Current session statistics, `null` without consent.
#[unsafe(no_mangle)]
pub extern "C" fn shade_session_stats() -> i32 {
    let Some(rt) = state::get() else {
        return NOT_INITIALIZED;
    };
    let stats = rt.recorder.session_stats();
    to_result(rt, &stats)
}

/// Pretty export document. Returns 0 with an empty buffer without consent.
#[unsafe(no_mangle)]
pub extern "C" fn shade_export() -> i32 {
    let Some(rt) = state::get() else {
        return NOT_INITIALIZED;
    };
    let json = rt.recorder.export_snapshot().unwrap_or_default();
    set_result(rt, json)
}

/// Suggested file name for a download of `shade_export`.
#[unsafe(no_mangle)]
pub extern "C" fn shade_export_file_name() -> i32 {
    let Some(rt) = state::get() else {
        return NOT_INITIALIZED;
    };
    let name = rt.recorder.export_file_name();
    set_result(rt, name)
}

/// Everything the dashboard renders, plus its configured refresh cadence.
#[unsafe(no_mangle)]
pub extern "C" fn shade_dashboard() -> i32 {
    let Some(rt) = state::get() else {
        return NOT_INITIALIZED;
    };
    let snapshot = rt.recorder.dashboard();
    let top: Vec<_> = snapshot
        .top_events(rt.config.dashboard.top_events)
        .into_iter()
        .map(|(name, count)| serde_json::json!({ "name": name, "count": count }))
        .collect();
    let view = serde_json::json!({
        "snapshot": snapshot,
        "topEvents": top,
        "pollIntervalMs": rt.config.dashboard.poll_interval_ms,
    });
    set_result(rt, view.to_string())
}

// ── THEME ────────────────────────────────────────────────────────────
// Theme exports return 0 for light and 1 for dark.

#[unsafe(no_mangle)]
pub extern "C" fn shade_theme_current() -> i32 {
    match state::get() {
        Some(rt) => theme_code(rt.theme.current()),
        None => NOT_INITIALIZED,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn shade_theme_is_following_system() -> i32 {
    match state::get() {
        Some(rt) => rt.theme.is_following_system() as i32,
        None => NOT_INITIALIZED,
    }
}

/// User pressed the toggle. Returns the new theme.
#[unsafe(no_mangle)]
pub extern "C" fn shade_theme_toggle() -> i32 {
    let Some(rt) = state::get() else {
        return NOT_INITIALIZED;
    };
    let change = rt.theme.toggle(&mut HostStore);
    rt.recorder.capture(THEME_CHANGED, change.to_event_data());
    theme_code(change.new_theme)
}

/// Forget the pinned theme. Returns the system theme now in effect.
#[unsafe(no_mangle)]
pub extern "C" fn shade_theme_reset() -> i32 {
    let Some(rt) = state::get() else {
        return NOT_INITIALIZED;
    };
    let data = rt.theme.reset_to_system_preference(&mut HostStore);
    rt.recorder.capture(THEME_RESET_TO_SYSTEM, data);
    theme_code(rt.theme.current())
}

/// The system color scheme changed. Returns the theme now in effect.
#[unsafe(no_mangle)]
pub extern "C" fn shade_theme_system_changed(is_dark: i32) -> i32 {
    let Some(rt) = state::get() else {
        return NOT_INITIALIZED;
    };
    if let Some(change) = rt.theme.on_system_change(system_theme(is_dark != 0)) {
        rt.recorder.capture(THEME_CHANGED, change.to_event_data());
    }
    theme_code(rt.theme.current())
}

// ── TESTS ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> serde_json::Value {
        let mut buf = vec![0u8; 64 * 1024];
        let n = shade_get_result(buf.as_mut_ptr(), buf.len() as u32);
        buf.truncate(n as usize);
        serde_json::from_slice(&buf).unwrap()
    }

    fn result_text() -> String {
        let mut buf = vec![0u8; 1024];
        let n = shade_get_result(buf.as_mut_ptr(), buf.len() as u32);
        buf.truncate(n as usize);
        String::from_utf8(buf).unwrap()
    }

    fn capture(name: &str, data: &str) -> i32 {
        shade_capture(
            name.as_ptr(),
            name.len() as u32,
            data.as_ptr(),
            data.len() as u32,
        )
    }

    fn query(filter: &str) -> serde_json::Value {
        assert!(shade_query(filter.as_ptr(), filter.len() as u32) > 0);
        result()
    }

    #[test]
    fn test_shade_init_invalid_json() {
        let config = b"not json";
        let result = shade_init(config.as_ptr(), config.len() as u32);
        assert_eq!(result, -2);
    }

    #[test]
    fn test_shade_init_invalid_utf8() {
        let config: &[u8] = &[0xFF, 0xFE];
        let result = shade_init(config.as_ptr(), config.len() as u32);
        assert_eq!(result, -1);
    }

    #[test]
    fn test_shade_init_invalid_config() {
        let config = br#"{"recorder":{"max_events":0}}"#;
        let result = shade_init(config.as_ptr(), config.len() as u32);
        assert_eq!(result, -3);
    }

    #[test]
    fn test_shade_alloc_dealloc() {
        let ptr = shade_alloc(1024);
        assert!(!ptr.is_null());
        unsafe {
            std::ptr::write(ptr, 42u8);
            assert_eq!(std::ptr::read(ptr), 42u8);
        }
        shade_dealloc(ptr, 1024);
    }

    #[test]
    fn test_query_request_bounds() {
        let request: QueryRequest =
            serde_json::from_str(r#"{"name":"theme","start":5,"end":"2023-11-14"}"#).unwrap();
        let filter = request.into_filter().unwrap();
        assert_eq!(filter.name_contains.as_deref(), Some("theme"));
        assert_eq!(filter.start, Some(5));
        assert_eq!(filter.end, Some(1_699_920_000_000 + 86_399_999));

        let bad: QueryRequest = serde_json::from_str(r#"{"start":"soon"}"#).unwrap();
        assert!(bad.into_filter().is_none());
    }

    // The runtime is global, so the whole page flow lives in one test.
    #[test]
    fn test_page_flow() {
        host::set_now(1_700_000_000_000.0);
        let config = b"{}";
        assert_eq!(shade_init(config.as_ptr(), config.len() as u32), 0);

        // Default-deny: theme_initialized was dropped and nothing records.
        assert_eq!(shade_is_enabled(), 0);
        assert_eq!(capture("ignored", ""), 0);
        assert_eq!(shade_theme_current(), 0);

        assert_eq!(shade_set_consent(1), 0);
        assert_eq!(shade_is_enabled(), 1);
        host::take_emitted();

        assert_eq!(capture("custom", r#"{"k":"v"}"#), 1);
        assert_eq!(capture("bad", "{oops"), -2);
        assert_eq!(shade_theme_toggle(), 1);
        assert_eq!(shade_theme_is_following_system(), 0);

        let emitted = host::take_emitted();
        assert_eq!(emitted.len(), 2);
        assert!(emitted.iter().all(|(topic, _)| topic == NEW_EVENT));

        let events = query("");
        assert_eq!(events[0]["name"], THEME_CHANGED);
        assert_eq!(events[0]["data"]["trigger"], "user_toggle");
        assert_eq!(events[1]["data"]["k"], "v");
        assert_eq!(events[1]["userAgent"], "native");

        assert_eq!(query(r#"{"name":"custom"}"#).as_array().unwrap().len(), 1);

        assert!(shade_counts() > 0);
        assert_eq!(result()["custom"], 1);

        host::set_now(1_700_000_030_000.0);
        assert_eq!(shade_tick(), 1);
        let stored = host::storage_get("analytics-events").unwrap().unwrap();
        let stored: Vec<serde_json::Value> = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored.len(), 2);

        assert!(shade_export() > 0);
        let export = result();
        assert_eq!(export["totalEvents"], 2);

        assert!(shade_dashboard() > 0);
        let dashboard = result();
        assert_eq!(dashboard["snapshot"]["isEnabled"], true);
        assert_eq!(dashboard["pollIntervalMs"], 10_000);

        assert_eq!(shade_theme_reset(), 0);
        assert_eq!(shade_theme_is_following_system(), 1);
        assert_eq!(shade_theme_system_changed(1), 1);

        let (metric, unit) = ("first_paint", "");
        assert_eq!(
            shade_track_performance(
                metric.as_ptr(),
                metric.len() as u32,
                182.5,
                unit.as_ptr(),
                unit.len() as u32,
            ),
            1
        );
        let (element, action, details) = ("theme-toggle", "click", r#"{"x":1}"#);
        assert_eq!(
            shade_track_interaction(
                element.as_ptr(),
                element.len() as u32,
                action.as_ptr(),
                action.len() as u32,
                details.as_ptr(),
                details.len() as u32,
            ),
            1
        );
        let events = query("");
        assert_eq!(events[0]["name"], "user_interaction");
        assert_eq!(events[0]["data"]["details"]["x"], 1);
        assert_eq!(events[1]["name"], "performance_metric");
        assert_eq!(events[1]["data"]["unit"], "ms");

        assert!(shade_session_stats() > 0);
        assert_eq!(result()["eventCount"], events.as_array().unwrap().len());

        assert!(shade_export_file_name() > 0);
        assert_eq!(result_text(), "analytics-export-2023-11-14.json");

        assert_eq!(shade_refresh_consent(), 1);

        // Re-initializing keeps events the previous runtime never flushed.
        assert_eq!(capture("before_reload", ""), 1);
        assert_eq!(shade_init(config.as_ptr(), config.len() as u32), 0);
        assert_eq!(shade_is_enabled(), 1);
        let stored = host::storage_get("analytics-events").unwrap().unwrap();
        assert!(stored.contains("before_reload"));
        let reloaded = query(r#"{"name":"before_reload"}"#);
        assert_eq!(reloaded.as_array().unwrap().len(), 1);

        assert_eq!(shade_clear(), 0);
        let events = query("");
        assert_eq!(events.as_array().unwrap().len(), 1);
        assert_eq!(events[0]["name"], "analytics_data_cleared");

        assert_eq!(shade_set_consent(0), 0);
        assert_eq!(query("").as_array().unwrap().len(), 0);
        assert_eq!(shade_export(), 0);

        assert_eq!(shade_terminate(), 0);
        shade_teardown();
        assert_eq!(shade_tick(), 0);
    }
}
