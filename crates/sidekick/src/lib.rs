//
// lib.rs
//
// Incremental code-intelligence worker for a single TypeScript document.
//
// The host hands the worker a document and a stream of edits; the worker keeps
// a virtual file set in sync through a debounced change buffer, loads
// declaration files as the document needs them, and answers completion,
// diagnostic and hover queries through an analysis engine.
//

pub mod adapters;
pub mod buffer;
pub mod config;
pub mod coords;
pub mod declaration_cache;
pub mod engine;
pub mod env;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod parser_pool;
pub mod patch;
pub mod perf;
pub mod rpc;
pub mod state;
pub mod worker;

pub use rpc::{spawn_worker, WorkerHandle};
pub use worker::{default_services, CodeWorker, InitRequest};
