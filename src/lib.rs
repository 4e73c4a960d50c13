//! nbresuse - memory usage exporter for notebook servers.
//!
//! This library provides the pieces the `nbresused` daemon wires together:
//! - `collector` - `/proc` sampling, kernel attribution and the per-tick orchestrator
//! - `session` - the notebook server's session registry
//! - `metrics` - gauge sinks backed by a prometheus registry
//! - `export` - the `/metrics` HTTP endpoint
//! - `background` - the fixed-interval tick loop

pub mod background;
pub mod collector;
pub mod export;
pub mod metrics;
pub mod session;
