//! Consent-gated, locally stored event analytics.
//!
//! The [`recorder::Recorder`] captures free-form events into a bounded
//! in-memory log, mirrors it to a host key-value store on flush, and answers
//! dashboard and export queries. Nothing here talks to a network.

pub mod config;
pub mod consent;
pub mod env;
pub mod event;
pub mod lifecycle;
pub mod notify;
pub mod recorder;
pub mod report;
pub mod storage;
pub mod theme;
