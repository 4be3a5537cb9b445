//! Host environment capability: the clock and the page context captured with
//! every event.
//!
//! Browsers read these from ambient globals; here they are injected so tests
//! can pin time and page dimensions.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Width and height in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Snapshot of where an event was captured.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub viewport: Dimensions,
    #[serde(default)]
    pub screen: Dimensions,
}

/// Clock plus page context, consulted once per capture.
pub trait Environment: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
    fn page_context(&self) -> PageContext;
}

/// A shareable clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self(Arc::new(AtomicI64::new(start_ms)))
    }

    pub fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, ms: i64) {
        self.0.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

/// Deterministic environment driven by a [`ManualClock`].
#[derive(Debug, Clone)]
pub struct ManualEnvironment {
    clock: ManualClock,
    context: PageContext,
}

impl ManualEnvironment {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            context: PageContext {
                url: "http://localhost/".to_string(),
                user_agent: "shade-test".to_string(),
                viewport: Dimensions::new(1280, 720),
                screen: Dimensions::new(1920, 1080),
            },
        }
    }

    pub fn with_context(mut self, context: PageContext) -> Self {
        self.context = context;
        self
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }
}

impl Environment for ManualEnvironment {
    fn now_ms(&self) -> i64 {
        self.clock.now()
    }

    fn page_context(&self) -> PageContext {
        self.context.clone()
    }
}

/// Wall-clock environment for native hosts with a fixed page context.
#[derive(Debug, Clone, Default)]
pub struct SystemEnvironment {
    context: PageContext,
}

impl SystemEnvironment {
    pub fn new(context: PageContext) -> Self {
        Self { context }
    }
}

impl Environment for SystemEnvironment {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }

    fn page_context(&self) -> PageContext {
        self.context.clone()
    }
}

/// Render epoch milliseconds as an RFC 3339 UTC string with millisecond precision.
pub fn iso_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Render epoch milliseconds as a `YYYY-MM-DD` UTC date.
pub fn iso_date(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
