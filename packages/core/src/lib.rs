// Library root: exposes internal modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod api;
pub mod cache;
pub mod clock;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod producers;
pub mod scheduler;
pub mod services;

// Startup plumbing used by the binary.
pub mod cli;
pub mod config;
pub mod logging;
