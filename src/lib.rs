//! Supervision-and-interpretation core for the external `gmaps-scraper`
//! worker: process lifecycle with streaming output capture, a line
//! classifier producing typed status events, tolerant CSV extraction, and a
//! fallback-aware configuration location resolver.

pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod supervisor;
pub mod table;
