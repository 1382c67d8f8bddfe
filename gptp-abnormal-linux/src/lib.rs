//! Linux side of the abnormal event harness: the gptp2d processes, the poll
//! loop over their output and the operator facing menu.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod mux;
pub mod runner;
pub mod scenario;

#[cfg(test)]
mod testutil;

pub use runner::{run_single_test, RunConfig, RunError, RunOutcome, TestRun};

/// Route `log` records into a `tracing` fmt subscriber writing to stderr
///
/// Stdout stays free for the daemons' output and the run banners.
pub fn setup_logger(
    level: log::LevelFilter,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    use tracing::level_filters::LevelFilter;

    tracing_log::LogTracer::init_with_filter(level)?;

    let max_level = match level {
        log::LevelFilter::Off => LevelFilter::OFF,
        log::LevelFilter::Error => LevelFilter::ERROR,
        log::LevelFilter::Warn => LevelFilter::WARN,
        log::LevelFilter::Info => LevelFilter::INFO,
        log::LevelFilter::Debug => LevelFilter::DEBUG,
        log::LevelFilter::Trace => LevelFilter::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .try_init()
}
