use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mi_decoder::recording::{load_runs, load_subject, save_run};
use mi_decoder::signal::SpatialFilter;
use mi_decoder::telemetry::Diagnostics;
use mi_decoder::testing::{SessionGenerator, SyntheticConfig};
use mi_decoder::{init_logging, run_batch, PipelineConfig, SubjectInput, SubjectPipeline};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "mi_cli",
    about = "Offline motor-imagery analysis and decoder evaluation"
)]
struct Cli {
    /// Pipeline configuration (JSON); defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Spatial filter matrix (JSON rows); identity over all channels when omitted
    #[arg(long, global = true)]
    spatial_filter: Option<PathBuf>,
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a synthetic subject directory (offline/ and online/ recordings)
    Simulate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 3)]
        offline_runs: usize,
        #[arg(long, default_value_t = 2)]
        online_runs: usize,
        #[arg(long, default_value_t = 5)]
        trials_per_class: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
    /// Train on offline recordings and evaluate on online recordings
    Evaluate {
        #[arg(long, required = true, num_args = 1..)]
        offline: Vec<PathBuf>,
        #[arg(long, required = true, num_args = 1..)]
        online: Vec<PathBuf>,
        #[arg(long, default_value = "subject")]
        id: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Evaluate several subject directories
    Batch {
        #[arg(required = true)]
        subjects: Vec<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration
    DumpConfig,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Simulate {
            out,
            offline_runs,
            online_runs,
            trials_per_class,
            seed,
        } => run_simulate(&config, &out, offline_runs, online_runs, trials_per_class, seed),
        Commands::Evaluate {
            offline,
            online,
            id,
            output,
        } => {
            let filter = load_filter(cli.spatial_filter.as_deref(), &config)?;
            run_evaluate(&config, filter, id, &offline, &online, output)
        }
        Commands::Batch { subjects, output } => {
            let filter = load_filter(cli.spatial_filter.as_deref(), &config)?;
            run_batch_command(&config, filter, &subjects, output)
        }
        Commands::DumpConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
    }
}

fn load_filter(path: Option<&Path>, config: &PipelineConfig) -> Result<SpatialFilter> {
    match path {
        Some(path) => SpatialFilter::from_file(path)
            .with_context(|| format!("loading spatial filter {}", path.display())),
        None => Ok(SpatialFilter::identity(config.acquisition.n_channels)),
    }
}

fn run_simulate(
    config: &PipelineConfig,
    out: &Path,
    offline_runs: usize,
    online_runs: usize,
    trials_per_class: usize,
    seed: u64,
) -> Result<ExitCode> {
    let synthetic = SyntheticConfig {
        sample_rate: config.acquisition.sample_rate,
        ..SyntheticConfig::default()
    };
    let mut generator = SessionGenerator::new(synthetic, &config.protocol, seed);

    for (folder, n_runs) in [("offline", offline_runs), ("online", online_runs)] {
        let dir = out.join(folder);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        for run in generator.session(folder, n_runs, trials_per_class) {
            let path = dir.join(format!("{}.json", run.id));
            save_run(&run, &path)?;
            println!("{}", path.display());
        }
    }
    Ok(ExitCode::from(0))
}

fn run_evaluate(
    config: &PipelineConfig,
    filter: SpatialFilter,
    id: String,
    offline: &[PathBuf],
    online: &[PathBuf],
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let diagnostics = Diagnostics::new();
    let input = SubjectInput {
        id,
        offline: load_runs(offline, &diagnostics),
        online: load_runs(online, &diagnostics),
    };

    let pipeline = SubjectPipeline::new(config, filter);
    let report = pipeline
        .run_subject(&input, &diagnostics)
        .with_context(|| format!("evaluating subject {}", input.id))?;

    emit_json(&report, output)?;
    Ok(ExitCode::from(0))
}

fn run_batch_command(
    config: &PipelineConfig,
    filter: SpatialFilter,
    subjects: &[PathBuf],
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let diagnostics = Diagnostics::new();
    let mut inputs = Vec::with_capacity(subjects.len());
    for dir in subjects {
        match load_subject(dir, &diagnostics) {
            Ok(input) => inputs.push(input),
            Err(err) => eprintln!("Skipping {}: {err:#}", dir.display()),
        }
    }

    let reports = run_batch(config, filter, &inputs, &diagnostics);

    #[derive(Serialize)]
    struct BatchOutput<'a> {
        reports: &'a [mi_decoder::analysis::SubjectReport],
        skips: Vec<mi_decoder::telemetry::SkipEvent>,
    }

    emit_json(
        &BatchOutput {
            reports: &reports,
            skips: diagnostics.snapshot(),
        },
        output,
    )?;

    if reports.len() == subjects.len() {
        Ok(ExitCode::from(0))
    } else {
        Ok(ExitCode::from(2))
    }
}

fn emit_json<T: Serialize>(value: &T, output: Option<PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(path) = output {
        fs::write(&path, &json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{}", json);
    }
    Ok(())
}
