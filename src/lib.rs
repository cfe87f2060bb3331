//! Purpose: Library crate behind the `voldriver` Docker volume plugin.
//! Exports: `api` (Volume Manager contract), `adapter`, `dispatch`, `listener`, `discovery`, `core`.
//! Role: Protocol shim between Docker's volume-plugin API and a pluggable Volume Manager.
//! Invariants: Modules take explicit configuration values; there is no process-global state.
pub mod adapter;
pub mod api;
pub mod core;
pub mod discovery;
pub mod dispatch;
pub mod listener;

pub use adapter::{Adapter, AdapterConfig, Identity};
