//! Host imports: functions the page provides to the WASM module.
//!
//! On wasm32 targets these are real extern "C" imports. On native targets
//! they are stubs backed by thread-local state so the exports can be tested.

#[cfg(target_arch = "wasm32")]
mod ffi {
    unsafe extern "C" {
        pub fn host_log(level: i32, msg_ptr: *const u8, msg_len: u32);
        pub fn host_now() -> f64;
        /// Either a uniform value in `[0, 1)` or an integral seed.
        pub fn host_random_seed() -> f64;
        pub fn host_prefers_dark() -> i32;
        pub fn host_page_context(out_ptr: *mut u8, max_len: u32) -> u32;
        pub fn host_events_emit(
            topic_ptr: *const u8,
            topic_len: u32,
            payload_ptr: *const u8,
            payload_len: u32,
        );
        /// Byte length of the stored value, -1 if absent, < -1 on error.
        pub fn host_storage_len(key_ptr: *const u8, key_len: u32) -> i32;
        /// Copy the stored value out. Returns bytes written, < 0 on error.
        pub fn host_storage_get(key_ptr: *const u8, key_len: u32, out_ptr: *mut u8, max_len: u32)
            -> i32;
        /// 0 on success, < 0 on error (quota, disabled storage).
        pub fn host_storage_set(
            key_ptr: *const u8,
            key_len: u32,
            value_ptr: *const u8,
            value_len: u32,
        ) -> i32;
        pub fn host_storage_remove(key_ptr: *const u8, key_len: u32) -> i32;
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    thread_local! {
        pub static NOW: Cell<f64> = const { Cell::new(0.0) };
        pub static STORAGE: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
        pub static EMITTED: RefCell<Vec<(String, String)>> = const { RefCell::new(Vec::new()) };
    }
}

pub const LOG_TRACE: i32 = 0;
pub const LOG_DEBUG: i32 = 1;
pub const LOG_INFO: i32 = 2;
pub const LOG_WARN: i32 = 3;
pub const LOG_ERROR: i32 = 4;

const PAGE_CONTEXT_MAX: usize = 4096;

/// Safe wrapper: log a string at a given level.
pub fn log(level: i32, msg: &str) {
    #[cfg(target_arch = "wasm32")]
    unsafe {
        ffi::host_log(level, msg.as_ptr(), msg.len() as u32);
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = (level, msg);
    }
}

/// Host clock in epoch milliseconds.
pub fn now_ms() -> f64 {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe { ffi::host_now() }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        native::NOW.with(|now| now.get())
    }
}

/// Seed for session and event ids, fresh per page load.
pub fn random_seed() -> u64 {
    #[cfg(target_arch = "wasm32")]
    {
        seed_from_host(unsafe { ffi::host_random_seed() })
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        42
    }
}

/// Map the host's f64 seed to 64 bits without collapsing fractions to zero.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn seed_from_host(raw: f64) -> u64 {
    if raw.is_finite() && raw >= 1.0 && raw.fract() == 0.0 {
        raw as u64
    } else {
        raw.to_bits()
    }
}

/// Whether the system color scheme is currently dark.
pub fn prefers_dark() -> bool {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe { ffi::host_prefers_dark() != 0 }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        false
    }
}

/// Page context as JSON, written by the host.
pub fn page_context_json() -> String {
    #[cfg(target_arch = "wasm32")]
    {
        let mut buf = vec![0u8; PAGE_CONTEXT_MAX];
        let n = unsafe { ffi::host_page_context(buf.as_mut_ptr(), buf.len() as u32) };
        buf.truncate((n as usize).min(PAGE_CONTEXT_MAX));
        String::from_utf8(buf).unwrap_or_default()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = PAGE_CONTEXT_MAX;
        r#"{"url":"http://localhost/","userAgent":"native"}"#.to_string()
    }
}

/// Dispatch a page-level event with a JSON payload.
pub fn emit_event(topic: &str, payload: &str) {
    #[cfg(target_arch = "wasm32")]
    unsafe {
        ffi::host_events_emit(
            topic.as_ptr(),
            topic.len() as u32,
            payload.as_ptr(),
            payload.len() as u32,
        );
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        native::EMITTED.with(|e| e.borrow_mut().push((topic.to_string(), payload.to_string())));
    }
}

/// Read a storage key. `Err` carries the host's error code.
pub fn storage_get(key: &str) -> Result<Option<String>, i32> {
    #[cfg(target_arch = "wasm32")]
    {
        let len = unsafe { ffi::host_storage_len(key.as_ptr(), key.len() as u32) };
        if len == -1 {
            return Ok(None);
        }
        if len < 0 {
            return Err(len);
        }
        let mut buf = vec![0u8; len as usize];
        let n = unsafe {
            ffi::host_storage_get(key.as_ptr(), key.len() as u32, buf.as_mut_ptr(), len as u32)
        };
        if n < 0 {
            return Err(n);
        }
        buf.truncate(n as usize);
        String::from_utf8(buf).map(Some).map_err(|_| -3)
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        Ok(native::STORAGE.with(|s| s.borrow().get(key).cloned()))
    }
}

/// Write a storage key. Returns the host's status code, 0 on success.
pub fn storage_set(key: &str, value: &str) -> i32 {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe {
            ffi::host_storage_set(
                key.as_ptr(),
                key.len() as u32,
                value.as_ptr(),
                value.len() as u32,
            )
        }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        native::STORAGE.with(|s| s.borrow_mut().insert(key.to_string(), value.to_string()));
        0
    }
}

/// Remove a storage key. Returns the host's status code, 0 on success.
pub fn storage_remove(key: &str) -> i32 {
    #[cfg(target_arch = "wasm32")]
    {
        unsafe { ffi::host_storage_remove(key.as_ptr(), key.len() as u32) }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        native::STORAGE.with(|s| s.borrow_mut().remove(key));
        0
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
pub fn set_now(ms: f64) {
    native::NOW.with(|now| now.set(ms));
}

#[cfg(all(test, not(target_arch = "wasm32")))]
pub fn take_emitted() -> Vec<(String, String)> {
    native::EMITTED.with(|e| std::mem::take(&mut *e.borrow_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractional_seeds_stay_distinct() {
        let a = seed_from_host(0.25);
        let b = seed_from_host(0.75);
        assert_ne!(a, 0);
        assert_ne!(b, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_integral_seed_passes_through() {
        assert_eq!(seed_from_host(42.0), 42);
        assert_eq!(seed_from_host(9_007_199_254_740_991.0), 9_007_199_254_740_991);
    }
}
