//! Benchmark harness CLI.
#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mrb::coldstart::{AwsCliInvoker, ColdStartConfig, ColdStartOrchestrator};
use mrb::compare::{ingest, write_outputs};
use mrb::load::{LoadGenerator, LoadScenario, samples_path, write_summary};
use mrb_common::config::variants::DEFAULT_VARIANTS_FILE;
use mrb_common::contract::{api_envelope_schema, metrics_snapshot_schema};
use mrb_common::{InvocationCsvWriter, LogConfig, RuntimeId, VariantRegistry, init_logging};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mrb")]
#[command(author, version, about = "Multi-runtime serverless benchmark harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure cold and warm invocation durations of every variant
    MeasureColdStarts {
        /// Invocations per variant [env: MRB_ITERATIONS, default: 10]
        #[arg(long)]
        iterations: Option<u32>,

        /// Idle time before the first invocation of each variant
        /// [env: MRB_IDLE_SECONDS, default: 300]
        #[arg(long)]
        idle_seconds: Option<u64>,

        /// Pause between the remaining invocations
        /// [env: MRB_WARM_INTERVAL_SECONDS, default: 10]
        #[arg(long)]
        warm_interval_seconds: Option<u64>,

        /// Upper bound for a single invocation and for the endpoint lookup
        /// [env: MRB_TIMEOUT_SECONDS, default: 60]
        #[arg(long)]
        timeout_seconds: Option<u64>,

        /// Variants registry (TOML)
        #[arg(long, env = "MRB_VARIANTS_FILE", default_value = DEFAULT_VARIANTS_FILE)]
        variants_file: PathBuf,

        /// Only measure these runtimes (repeatable)
        #[arg(long = "runtime")]
        runtimes: Vec<String>,

        /// CSV dataset to append to
        #[arg(long, default_value = "results/cold-starts.csv")]
        output: PathBuf,

        /// AWS region passed to the CLI
        #[arg(long, env = "AWS_REGION")]
        region: Option<String>,

        /// AWS profile passed to the CLI
        #[arg(long, env = "AWS_PROFILE")]
        profile: Option<String>,
    },

    /// Run a staged load test against one variant
    LoadTest {
        /// Scenario file (TOML or JSON); defaults to the built-in ramp
        #[arg(long)]
        stages_file: Option<PathBuf>,

        /// Runtime id of the target variant
        #[arg(long)]
        runtime: String,

        /// Base URL of the variant; looked up in the registry when omitted
        #[arg(long)]
        base_url: Option<String>,

        /// Variants registry (TOML)
        #[arg(long, env = "MRB_VARIANTS_FILE", default_value = DEFAULT_VARIANTS_FILE)]
        variants_file: PathBuf,

        /// Directory receiving samples and summary
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },

    /// Aggregate datasets into a comparison report
    Compare {
        /// Cold-start CSV dataset
        #[arg(long)]
        invocations: Option<PathBuf>,

        /// Load samples: a JSON Lines file or a directory of them
        #[arg(long)]
        load: Option<PathBuf>,

        /// Output directory for the markdown and JSON reports
        #[arg(long, default_value = "results")]
        out: PathBuf,

        /// Registry whose variants always get a row, data or not
        #[arg(long)]
        variants_file: Option<PathBuf>,
    },

    /// Print the JSON Schema of the metrics snapshot and the CRUD envelope
    ContractSchema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    match cli.command {
        Commands::MeasureColdStarts {
            iterations,
            idle_seconds,
            warm_interval_seconds,
            timeout_seconds,
            variants_file,
            runtimes,
            output,
            region,
            profile,
        } => {
            let mut config = ColdStartConfig::from_env()?;
            if let Some(iterations) = iterations {
                config.iterations = iterations;
            }
            if let Some(secs) = idle_seconds {
                config.idle = Duration::from_secs(secs);
            }
            if let Some(secs) = warm_interval_seconds {
                config.warm_interval = Duration::from_secs(secs);
            }
            if let Some(secs) = timeout_seconds {
                config.timeout = Duration::from_secs(secs);
            }
            if config.iterations == 0 {
                bail!("--iterations must be at least 1");
            }
            if config.timeout.is_zero() {
                bail!("--timeout-seconds must be at least 1");
            }
            measure_cold_starts(config, &variants_file, &runtimes, &output, region, profile)
                .await?;
        }
        Commands::LoadTest {
            stages_file,
            runtime,
            base_url,
            variants_file,
            output_dir,
        } => {
            load_test(
                stages_file.as_deref(),
                RuntimeId::new(runtime),
                base_url,
                &variants_file,
                &output_dir,
            )
            .await?;
        }
        Commands::Compare {
            invocations,
            load,
            out,
            variants_file,
        } => {
            compare(
                invocations.as_deref(),
                load.as_deref(),
                &out,
                variants_file.as_deref(),
            )?;
        }
        Commands::ContractSchema => {
            let schemas = serde_json::json!({
                "metricsSnapshot": metrics_snapshot_schema(),
                "apiEnvelope": api_envelope_schema(),
            });
            println!("{}", serde_json::to_string_pretty(&schemas)?);
        }
    }

    Ok(())
}

async fn measure_cold_starts(
    config: ColdStartConfig,
    variants_file: &Path,
    runtimes: &[String],
    output: &Path,
    region: Option<String>,
    profile: Option<String>,
) -> Result<()> {
    let registry = VariantRegistry::load(variants_file)?;
    let variants = registry.select(runtimes)?;
    if variants.is_empty() {
        bail!("no variants configured in {}", variants_file.display());
    }
    let mut writer = InvocationCsvWriter::open(output)?;

    info!(
        variants = variants.len(),
        iterations = config.iterations,
        idle = %humantime::format_duration(config.idle),
        output = %output.display(),
        "Starting cold-start measurement"
    );

    let invoker = AwsCliInvoker::new().with_region(region).with_profile(profile);
    let orchestrator = ColdStartOrchestrator::new(invoker, config);
    let summaries = orchestrator.run(&variants, &mut writer).await;

    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

async fn load_test(
    stages_file: Option<&Path>,
    runtime_id: RuntimeId,
    base_url: Option<String>,
    variants_file: &Path,
    output_dir: &Path,
) -> Result<()> {
    let scenario = match stages_file {
        Some(path) => LoadScenario::load(path)?,
        None => LoadScenario::default(),
    };

    let base_url = match base_url {
        Some(url) => url,
        None => {
            let registry = VariantRegistry::load(variants_file).with_context(|| {
                format!("--base-url not given and registry {} unavailable", variants_file.display())
            })?;
            let variant = registry
                .get(runtime_id.as_str())
                .with_context(|| format!("runtime '{runtime_id}' not found in registry"))?;
            variant
                .http_base_url()
                .with_context(|| format!("runtime '{runtime_id}' has no http_base_url"))?
                .to_string()
        }
    };

    let samples = samples_path(output_dir, &runtime_id);
    let run = LoadGenerator::new(scenario)
        .run(runtime_id, &base_url, Some(&samples))
        .await?;
    let summary_file = write_summary(output_dir, &run.summary)
        .with_context(|| format!("failed to write summary under {}", output_dir.display()))?;

    if !run.summary.passed {
        warn!(
            runtime_id = %run.summary.runtime_id,
            violations = run.summary.violations.len(),
            "Load test exceeded thresholds"
        );
    }
    info!(
        samples = %samples.display(),
        summary = %summary_file.display(),
        "Load test complete"
    );
    println!("{}", serde_json::to_string_pretty(&run.summary)?);
    Ok(())
}

fn compare(
    invocations: Option<&Path>,
    load: Option<&Path>,
    out: &Path,
    variants_file: Option<&Path>,
) -> Result<()> {
    if invocations.is_none() && load.is_none() {
        bail!("at least one of --invocations or --load is required");
    }
    let known: Vec<RuntimeId> = match variants_file {
        Some(path) => VariantRegistry::load(path)?
            .iter()
            .map(|v| v.runtime_id.clone())
            .collect(),
        None => Vec::new(),
    };

    let inputs = ingest(invocations, load)?;
    let report = inputs.compare(&known);
    let paths = write_outputs(&report, out)
        .with_context(|| format!("failed to write report to {}", out.display()))?;

    println!("{}", paths.markdown.display());
    println!("{}", paths.json.display());
    Ok(())
}
