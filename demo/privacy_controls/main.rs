//! # Scenario 2: Privacy Controls
//!
//! **Actor**: Visitor reviewing what the demo site recorded about them
//! **Duration**: One page view
//!
//! Demonstrates:
//! - Default-deny consent and opting in
//! - Filtering, aggregate counts and the export document
//! - Revocation purging memory and storage
//! - Clearing data while consent stays granted

#[path = "../common.rs"]
mod common;

use anyhow::{Context, Result};
use serde_json::json;
use shade_core::config::Config;
use shade_core::env::{PageContext, SystemEnvironment};
use shade_core::event::{into_event_data, EventData, EventFilter};
use shade_core::recorder::Recorder;
use shade_core::storage::{KeyValueStore, MemoryStore};

use common::{init_tracing, load_config, sep};

fn stored_bytes(store: &MemoryStore, key: &str) -> usize {
    store.get(key).ok().flatten().map(|v| v.len()).unwrap_or(0)
}

fn main() -> Result<()> {
    init_tracing();
    let config = load_config(Config::default())?;
    let events_key = config.recorder.events_key.clone();

    println!("==========================================================");
    println!("  SCENARIO 2: Privacy Controls");
    println!("  Opting in, inspecting, exporting and revoking analytics");
    println!("==========================================================\n");

    let mut recorder = Recorder::initialize(
        config.recorder.clone(),
        MemoryStore::new(),
        SystemEnvironment::new(PageContext::default()),
        7,
    );

    // ── Step 1: nothing without consent ─────────────────────────
    sep("STEP 1: Default-deny");

    let recorded = recorder.capture("page_view", EventData::new());
    println!("[Consent] enabled: {}", recorder.is_enabled());
    println!("[Capture] page_view recorded: {recorded}");
    println!("[Dashboard] enabled flag: {}", recorder.dashboard().is_enabled);

    // ── Step 2: opt in and use the site ─────────────────────────
    sep("STEP 2: Opt in");

    recorder.set_consent(true);
    recorder.capture("page_view", into_event_data(json!({ "path": "/" })));
    recorder.track_performance("first_contentful_paint", 182.4, None);
    recorder.track_interaction("theme-toggle", "click", EventData::new());
    recorder.track_interaction("showcase-card", "hover", into_event_data(json!({ "card": 2 })));
    recorder.track_error(
        "contrast check failed",
        None,
        into_event_data(json!({ "component": "AccessibilityTest" })),
    );
    recorder.flush();
    println!(
        "[Storage] {} bytes under '{events_key}'",
        stored_bytes(recorder.store(), &events_key)
    );

    let interactions = recorder.query(&EventFilter::new().with_name("interaction"));
    println!("[Query] {} interaction events (newest first):", interactions.len());
    for event in &interactions {
        println!("  {} {}", event.name, serde_json::Value::Object(event.data.clone()));
    }

    println!("[Counts]");
    for (name, count) in recorder.aggregate_counts() {
        println!("  {name:<24} {count}");
    }

    // ── Step 3: export ──────────────────────────────────────────
    sep("STEP 3: Export");

    let export = recorder
        .export_snapshot()
        .context("export unavailable while consent is granted")?;
    println!("[Export] {} ({} bytes)", recorder.export_file_name(), export.len());
    let preview: String = export.lines().take(6).collect::<Vec<_>>().join("\n");
    println!("{preview}\n  ...");

    // ── Step 4: revoke ──────────────────────────────────────────
    sep("STEP 4: Revoke consent");

    recorder.set_consent(false);
    println!("[Consent] enabled: {}", recorder.is_enabled());
    println!("[Memory] {} events", recorder.len());
    println!(
        "[Storage] {} bytes under '{events_key}'",
        stored_bytes(recorder.store(), &events_key)
    );
    println!("[Export] available: {}", recorder.export_snapshot().is_some());

    // ── Step 5: opt back in, then clear ─────────────────────────
    sep("STEP 5: Clear data");

    recorder.set_consent(true);
    recorder.capture("page_view", into_event_data(json!({ "path": "/settings" })));
    recorder.clear();
    let remaining = recorder.query(&EventFilter::new());
    println!("[Clear] {} events remain:", remaining.len());
    for event in &remaining {
        println!("  {} at {}", event.name, event.timestamp);
    }

    println!("\n[Done] Privacy controls scenario complete.");
    Ok(())
}
