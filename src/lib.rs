pub mod config;
pub mod error;
pub mod evaluator;
pub mod fortran_io;
pub mod fs_ops;
pub mod model_store;
pub mod par_file;
pub mod parameters;
pub mod postprocess;
pub mod preprocess;
pub mod solver;
pub mod sources;
pub mod tool_runner;
pub mod vector;

pub use error::*;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber for a binary. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing(service: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
    tracing::debug!(service, "tracing initialised");
}
