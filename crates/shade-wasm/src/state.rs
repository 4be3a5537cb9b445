//! Global WASM state: the page's recorder and theme preference.
//!
//! The page drives every export from its single JS thread, so the runtime sits
//! behind a raw pointer rather than a lock.

use shade_core::config::Config;
use shade_core::recorder::Recorder;
use shade_core::theme::ThemePreference;

use crate::bridge::{HostEnvironment, HostStore};

/// Everything one page load owns.
pub struct Runtime {
    pub config: Config,
    pub recorder: Recorder<HostStore, HostEnvironment>,
    pub theme: ThemePreference,
    /// JSON buffer for the last query result.
    pub result_buffer: String,
}

/// Heap-allocated runtime, null until `shade_init`.
static mut RT_PTR: *mut Runtime = std::ptr::null_mut();

/// Flush, tear down and drop the installed runtime, if any.
pub fn shutdown() {
    unsafe {
        if RT_PTR.is_null() {
            return;
        }
        let mut previous = Box::from_raw(RT_PTR);
        RT_PTR = std::ptr::null_mut();
        previous.recorder.on_terminate();
        previous.recorder.teardown();
    }
}

/// Install a runtime, shutting down any previous one first.
pub fn init(runtime: Runtime) {
    shutdown();
    unsafe {
        RT_PTR = Box::into_raw(Box::new(runtime));
    }
}

/// Mutable access to the runtime, `None` before `shade_init`.
pub fn get() -> Option<&'static mut Runtime> {
    unsafe {
        if RT_PTR.is_null() {
            None
        } else {
            Some(&mut *RT_PTR)
        }
    }
}
