// Motor-imagery decoder core
// Spectral features, ERD/Fisher analysis and evidence-accumulation decisions

// Module declarations
pub mod analysis;
pub mod config;
pub mod error;
pub mod recording;
pub mod signal;
pub mod telemetry;
pub mod testing;

// Re-exports for convenience
pub use analysis::{run_batch, SubjectInput, SubjectPipeline};
pub use config::PipelineConfig;

/// Install the stderr tracing subscriber
///
/// `verbose` lowers the level from INFO to DEBUG. Calling this twice is
/// harmless; the second install is ignored.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
