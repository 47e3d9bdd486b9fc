//! Background sweeper: replays deferred saves of file-backed documents.

mod error;
mod runtime;

pub use error::DaemonError;
pub use runtime::{
    documents_from_config, init_tracing, run, spawn_sweeper, start_blocking, SweepSummary,
    SweeperHandle,
};
