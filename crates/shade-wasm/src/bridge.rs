//! Core capabilities backed by host imports: storage, clock and page
//! context, plus a tracing writer that forwards log lines to the host.

use std::io;

use shade_core::env::{Environment, PageContext};
use shade_core::storage::{KeyValueStore, StorageError};
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

use crate::host;

/// The page's local storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostStore;

fn host_error(op: &str, code: i32) -> StorageError {
    StorageError::Unavailable(format!("host {op} failed with code {code}"))
}

impl KeyValueStore for HostStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        host::storage_get(key).map_err(|code| host_error("get", code))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        match host::storage_set(key, value) {
            0 => Ok(()),
            code => Err(host_error("set", code)),
        }
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        match host::storage_remove(key) {
            0 => Ok(()),
            code => Err(host_error("remove", code)),
        }
    }
}

/// Host clock and page context.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostEnvironment;

impl Environment for HostEnvironment {
    fn now_ms(&self) -> i64 {
        host::now_ms() as i64
    }

    fn page_context(&self) -> PageContext {
        serde_json::from_str(&host::page_context_json()).unwrap_or_default()
    }
}

/// Routes formatted tracing output to `host_log`, one call per line.
pub struct HostLogWriter {
    level: i32,
    buf: Vec<u8>,
}

impl io::Write for HostLogWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for HostLogWriter {
    fn drop(&mut self) {
        let line = String::from_utf8_lossy(&self.buf);
        let line = line.trim_end();
        if !line.is_empty() {
            host::log(self.level, line);
        }
    }
}

pub struct HostMakeWriter;

impl<'a> MakeWriter<'a> for HostMakeWriter {
    type Writer = HostLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        HostLogWriter {
            level: host::LOG_INFO,
            buf: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        let level = match *meta.level() {
            Level::TRACE => host::LOG_TRACE,
            Level::DEBUG => host::LOG_DEBUG,
            Level::INFO => host::LOG_INFO,
            Level::WARN => host::LOG_WARN,
            Level::ERROR => host::LOG_ERROR,
        };
        HostLogWriter {
            level,
            buf: Vec::new(),
        }
    }
}

/// Install the host-backed tracing subscriber. Later calls are ignored.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_writer(HostMakeWriter)
        .without_time()
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_store_round_trip() {
        let mut store = HostStore;
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_host_environment_context() {
        host::set_now(1234.9);
        let env = HostEnvironment;
        assert_eq!(env.now_ms(), 1234);
        let ctx = env.page_context();
        assert_eq!(ctx.url, "http://localhost/");
        assert_eq!(ctx.user_agent, "native");
    }
}
