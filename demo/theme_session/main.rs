//! # Scenario 1: Theme Session
//!
//! **Actor**: Visitor exploring the theme toggle demo
//! **Duration**: A few seconds of simulated page time
//!
//! Demonstrates:
//! - Consent-gated capture of theme events
//! - Periodic flush driven by a tokio interval
//! - Visibility changes and the once-only termination flush
//! - Reloading the persisted log into a second session

#[path = "../common.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use shade_core::config::Config;
use shade_core::env::{Dimensions, PageContext, SystemEnvironment};
use shade_core::event::EventFilter;
use shade_core::recorder::Recorder;
use shade_core::report::format_duration;
use shade_core::storage::{is_available, FileStore, KeyValueStore};
use shade_core::theme::{
    Theme, ThemePreference, THEME_CHANGED, THEME_INITIALIZED, THEME_RESET_TO_SYSTEM,
};
use tokio::sync::Mutex;

use common::{init_tracing, load_config, sep};

type SharedRecorder = Arc<Mutex<Recorder<FileStore, SystemEnvironment>>>;

fn page() -> PageContext {
    PageContext {
        url: "http://localhost:3000/".to_string(),
        user_agent: "shade-demo/0.1".to_string(),
        viewport: Dimensions::new(1280, 800),
        screen: Dimensions::new(2560, 1600),
    }
}

fn demo_defaults() -> Config {
    let mut config = Config::default();
    // Flush every half second so the scenario finishes quickly.
    config.recorder.flush_interval_ms = 500;
    config
}

async fn pause(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = load_config(demo_defaults())?;

    println!("==========================================================");
    println!("  SCENARIO 1: Theme Session");
    println!("  Simulating a visitor toggling themes with analytics on");
    println!("==========================================================\n");

    let dir = std::env::temp_dir().join("shade-demo");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join("local-storage.json");
    let mut store = FileStore::new(&path);
    if !is_available(&mut store) {
        anyhow::bail!("storage at {} is not writable", path.display());
    }
    store
        .set(&config.recorder.consent_key, "true")
        .context("failed to grant consent")?;
    println!("[Storage] {}", path.display());

    // ── Session 1: toggle, hide, flush ──────────────────────────
    sep("SESSION 1: Theme changes with periodic flush");

    let recorder = Recorder::initialize(
        config.recorder.clone(),
        store,
        SystemEnvironment::new(page()),
        seed(),
    );
    let recorder: SharedRecorder = Arc::new(Mutex::new(recorder));

    {
        let mut rec = recorder.lock().await;
        rec.subscribe(Box::new(|event| {
            println!("[Event] {} {}", event.name, serde_json::Value::Object(event.data.clone()));
        }));
        println!("[Session] {} (loaded {} events)", rec.session_id(), rec.len());
    }

    let flusher = {
        let recorder = Arc::clone(&recorder);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(100));
            loop {
                ticker.tick().await;
                if recorder.lock().await.tick() {
                    println!("[Flush] periodic flush written");
                }
            }
        })
    };

    let mut theme = {
        let mut rec = recorder.lock().await;
        let theme = ThemePreference::load(
            config.theme.storage_key.clone(),
            rec.store(),
            Theme::Light,
        );
        rec.capture(THEME_INITIALIZED, theme.initialized_data());
        theme
    };
    println!("[Theme] starting with {}", theme.current());

    pause(300).await;
    {
        let mut rec = recorder.lock().await;
        let change = theme.toggle(rec.store_mut());
        rec.capture(THEME_CHANGED, change.to_event_data());
        rec.track_interaction("theme-toggle", "click", Default::default());
    }

    pause(400).await;
    recorder.lock().await.on_visibility_change(true);
    pause(200).await;
    recorder.lock().await.on_visibility_change(false);

    {
        let mut rec = recorder.lock().await;
        if let Some(change) = theme.on_system_change(Theme::Dark) {
            rec.capture(THEME_CHANGED, change.to_event_data());
        } else {
            println!("[Theme] system switched to dark, pinned theme kept");
        }
        let data = theme.reset_to_system_preference(rec.store_mut());
        rec.capture(THEME_RESET_TO_SYSTEM, data);
        println!(
            "[Theme] now {} (following system: {})",
            theme.current(),
            theme.is_following_system()
        );
    }

    pause(600).await;
    flusher.abort();

    {
        let mut rec = recorder.lock().await;
        println!("[Unload] termination flush: {}", rec.on_terminate());
        println!("[Unload] second termination: {}", rec.on_terminate());

        let snapshot = rec.dashboard();
        if let Some(stats) = &snapshot.session_stats {
            println!(
                "[Stats] {} events in {}",
                stats.event_count,
                format_duration(stats.duration)
            );
        }
        for (name, count) in snapshot.top_events(config.dashboard.top_events) {
            println!("  {name:<28} {count}");
        }
        rec.teardown();
    }

    // ── Session 2: reload ───────────────────────────────────────
    sep("SESSION 2: Reload the persisted log");

    let reloaded = Recorder::initialize(
        config.recorder.clone(),
        FileStore::new(&path),
        SystemEnvironment::new(page()),
        seed(),
    );
    println!("[Session] {} (loaded {} events)", reloaded.session_id(), reloaded.len());
    let themed = reloaded.query(&EventFilter::new().with_name("theme"));
    println!("[Query] {} theme events across sessions", themed.len());
    for event in themed.iter().take(5) {
        println!("  {} {}", event.name, event.session_id);
    }

    println!("\n[Done] Theme session scenario complete.");
    Ok(())
}

/// Per-run id seed from the wall clock.
fn seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
