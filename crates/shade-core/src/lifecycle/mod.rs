//! Host-driven triggers registered by the recorder: a periodic flush timer, a
//! once-only termination hook, and a page visibility listener.
//!
//! Nothing here owns a thread or a timer. The host calls in with the current
//! time and the recorder acts on what comes back.

use tracing::debug;

/// Visibility transition worth recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityChange {
    /// Page was hidden after being visible for `visible_ms`.
    Hidden { visible_ms: i64 },
    /// Page became visible again.
    Visible,
}

/// Registration state of the recorder's host tasks.
#[derive(Debug, Clone)]
pub struct LifecycleTasks {
    flush_interval_ms: i64,
    next_flush: Option<i64>,
    terminated: bool,
    hidden: bool,
    visible_since: i64,
    active: bool,
}

impl LifecycleTasks {
    /// Register all tasks, starting the flush cadence at `now`.
    /// Intervals beyond `i64::MAX` are clamped and zero is treated as 1 ms.
    pub fn register(now: i64, flush_interval_ms: u64) -> Self {
        debug!(flush_interval_ms, "lifecycle tasks registered");
        let flush_interval_ms = i64::try_from(flush_interval_ms).unwrap_or(i64::MAX).max(1);
        Self {
            flush_interval_ms,
            next_flush: Some(now.saturating_add(flush_interval_ms)),
            terminated: false,
            hidden: false,
            visible_since: now,
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn next_flush(&self) -> Option<i64> {
        self.next_flush
    }

    /// Whether the periodic flush should run at `now`. Missed intervals are
    /// skipped rather than replayed.
    pub fn flush_due(&mut self, now: i64) -> bool {
        let Some(next) = self.next_flush else {
            return false;
        };
        if !self.active || now < next {
            return false;
        }
        let interval = self.flush_interval_ms;
        let missed = now.saturating_sub(next) / interval;
        let skip = missed.saturating_add(1).saturating_mul(interval);
        self.next_flush = Some(next.saturating_add(skip));
        true
    }

    /// Fire the termination hook. Returns true only the first time.
    pub fn terminate(&mut self) -> bool {
        if !self.active || self.terminated {
            return false;
        }
        self.terminated = true;
        true
    }

    /// Track a visibility change. Repeated reports of the current state and
    /// reports after teardown yield nothing.
    pub fn visibility_changed(&mut self, hidden: bool, now: i64) -> Option<VisibilityChange> {
        if !self.active || hidden == self.hidden {
            return None;
        }
        self.hidden = hidden;
        if hidden {
            Some(VisibilityChange::Hidden {
                visible_ms: (now - self.visible_since).max(0),
            })
        } else {
            self.visible_since = now;
            Some(VisibilityChange::Visible)
        }
    }

    /// Release every task. Returns true only for the call that released them.
    pub fn teardown(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.next_flush = None;
        debug!("lifecycle tasks released");
        true
    }
}
