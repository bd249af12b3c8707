//! semflow CLI: validate, explain, and run YAML pipelines.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use semflow_core::config::{EngineConfig, ImplicitDependencies, PdfProcessing};
use semflow_exec::Engine;
use semflow_io::DataDirectory;
use semflow_planner::{
    choose_plan, parse_yaml_pipeline, plan_candidates, LowerOptions, ParsedPipeline,
    PipelineConfig, Policy,
};
use semflow_solver::{Services, Solver};

#[derive(Parser)]
#[command(name = "semflow")]
#[command(about = "semflow: declarative LLM-powered record pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Overrides shared by `explain` and `run`; they win over env and pipeline values.
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// File or directory to register as the pipeline's source dataset
    #[arg(long)]
    data: Option<PathBuf>,

    /// Plan selection policy: max_quality, min_cost, min_time
    #[arg(long)]
    policy: Option<String>,

    /// Ignore published caches while planning
    #[arg(long)]
    no_cache: bool,

    /// Cache directory (overrides config)
    #[arg(long)]
    cache_dir: Option<String>,

    /// LLM model name (overrides config)
    #[arg(long)]
    model: Option<String>,

    /// Parallelism hint for LLM-bound operators
    #[arg(long)]
    max_workers: Option<usize>,

    /// Unset depends_on means: all_upstream or none
    #[arg(long)]
    implicit_deps: Option<String>,

    /// Emit at most this many source records
    #[arg(long)]
    num_samples: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline and print its records as JSON lines
    Run {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        #[command(flatten)]
        overrides: Overrides,

        /// Keep per-record stats for every operator
        #[arg(long)]
        profile: bool,
    },

    /// Validate a pipeline YAML file (syntax and schema check)
    Validate {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,
    },

    /// Show every legal plan and its estimated cost
    Explain {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            pipeline,
            overrides,
            profile,
        } => {
            if let Err(e) = run_pipeline(&pipeline, &overrides, profile) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { pipeline } => {
            if let Err(e) = validate_pipeline(&pipeline) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Pipeline is valid");
        }
        Commands::Explain {
            pipeline,
            overrides,
        } => {
            if let Err(e) = explain_pipeline(&pipeline, &overrides) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Everything a planned run needs, built once per invocation.
struct Session {
    parsed: ParsedPipeline,
    ctx: DataDirectory,
    solver: Solver,
    opts: LowerOptions,
    policy: Policy,
}

fn open_session(pipeline_path: &Path, overrides: &Overrides, profile: bool) -> CliResult<Session> {
    let yaml_content = fs::read_to_string(pipeline_path)?;
    let parsed = parse_yaml_pipeline(&yaml_content)?;

    let mut config = EngineConfig::from_env();
    apply_pipeline_config(&mut config, &parsed.config);
    apply_overrides(&mut config, overrides)?;
    config.validate()?;

    let policy_name = overrides.policy.as_ref().or(parsed.config.policy.as_ref());
    let policy = match policy_name {
        Some(name) => Policy::parse(name).ok_or_else(|| format!("unknown policy '{name}'"))?,
        None => Policy::default(),
    };
    let opts = LowerOptions {
        num_samples: overrides.num_samples.or(parsed.config.num_samples),
        scan_start_idx: parsed.config.scan_start_idx.unwrap_or(0),
        max_workers: config.max_workers,
        profiling: profile,
    };

    let solver = Solver::new(Services::from_config(&config)?);
    let mut ctx = DataDirectory::with_fs(config);
    let data_path = overrides
        .data
        .clone()
        .or_else(|| parsed.source_path.as_ref().map(PathBuf::from));
    match data_path {
        Some(path) => ctx.register_path(parsed.dataset.dataset_id(), &path)?,
        None => return Err(format!(
            "no data for dataset '{}': pass --data or set `path` on the source step",
            parsed.dataset.dataset_id()
        )
        .into()),
    }

    Ok(Session {
        parsed,
        ctx,
        solver,
        opts,
        policy,
    })
}

fn run_pipeline(pipeline_path: &Path, overrides: &Overrides, profile: bool) -> CliResult<()> {
    let session = open_session(pipeline_path, overrides, profile)?;
    let mut candidates = plan_candidates(
        &session.parsed.dataset,
        &session.ctx,
        &session.solver,
        &session.opts,
    )?;
    let costs: Vec<_> = candidates.iter().map(|c| c.cost.clone()).collect();
    let best = choose_plan(&costs, session.policy)?;
    let chosen = candidates.swap_remove(best);
    info!(
        plan = best,
        candidates = costs.len(),
        policy = ?session.policy,
        "executing plan"
    );

    let engine = Engine::new(session.ctx);
    let output = engine.run(&chosen.physical)?;
    for record in &output.records {
        println!("{}", record.as_text_json());
    }

    eprintln!("✓ Pipeline executed successfully");
    eprintln!("  Records: {}", output.manifest.records_out);
    eprintln!(
        "  Duration: {}ms",
        output.manifest.finished_ms - output.manifest.started_ms
    );
    eprintln!("  Cost: ${:.6}", output.total_cost());
    eprintln!("  Plan hash: {}", output.manifest.plan_hash.to_hex());
    if profile {
        eprintln!("{}", serde_json::to_string_pretty(&output.profiles)?);
    }

    Ok(())
}

fn validate_pipeline(pipeline_path: &Path) -> CliResult<()> {
    let yaml_content = fs::read_to_string(pipeline_path)?;
    let parsed = parse_yaml_pipeline(&yaml_content)?;
    let mut config = EngineConfig::default();
    apply_pipeline_config(&mut config, &parsed.config);
    config.validate()?;
    if let Some(name) = &parsed.config.policy {
        Policy::parse(name).ok_or_else(|| format!("unknown policy '{name}'"))?;
    }
    Ok(())
}

fn explain_pipeline(pipeline_path: &Path, overrides: &Overrides) -> CliResult<()> {
    let session = open_session(pipeline_path, overrides, false)?;
    let candidates = plan_candidates(
        &session.parsed.dataset,
        &session.ctx,
        &session.solver,
        &session.opts,
    )?;
    let costs: Vec<_> = candidates.iter().map(|c| c.cost.clone()).collect();
    let best = choose_plan(&costs, session.policy)?;

    println!("Pipeline Execution Plans");
    println!("========================");
    println!();
    println!("Dataset: {}", session.parsed.dataset.dataset_id());
    println!("Policy: {:?}", session.policy);
    println!("Candidates: {}", candidates.len());
    for (i, c) in candidates.iter().enumerate() {
        println!();
        let marker = if i == best { " (chosen)" } else { "" };
        println!("Plan {}{}:", i, marker);
        println!("  Logical: {}", c.logical);
        print!("{}", c.physical.describe());
        println!(
            "  Estimated: time {:.2}s, cost ${:.6}, quality {:.3}, {:.1} records out",
            c.cost.total_time, c.cost.total_cost, c.cost.quality, c.cost.cardinality
        );
    }

    Ok(())
}

fn apply_pipeline_config(cfg: &mut EngineConfig, doc: &PipelineConfig) {
    if let Some(service) = &doc.llm_service {
        cfg.llm_service = service.clone();
    }
    if let Some(model) = &doc.llm_model {
        cfg.llm_model = model.clone();
    }
    if let Some(endpoint) = &doc.llm_endpoint {
        cfg.llm_endpoint = endpoint.clone();
    }
    if let Some(mode) = doc.pdf_processing.as_deref().and_then(PdfProcessing::parse) {
        cfg.pdf_processing = mode;
    }
    if let Some(endpoint) = &doc.pdf_endpoint {
        cfg.pdf_endpoint = Some(endpoint.clone());
    }
    if let Some(dir) = &doc.cache_dir {
        cfg.cache_dir = dir.clone();
    }
    if let Some(no_cache) = doc.no_cache {
        cfg.no_cache = no_cache;
    }
    if let Some(n) = doc.max_workers {
        cfg.max_workers = n;
    }
    if let Some(deps) = doc
        .implicit_dependencies
        .as_deref()
        .and_then(ImplicitDependencies::parse)
    {
        cfg.implicit_dependencies = deps;
    }
}

fn apply_overrides(cfg: &mut EngineConfig, o: &Overrides) -> CliResult<()> {
    if o.no_cache {
        cfg.no_cache = true;
    }
    if let Some(dir) = &o.cache_dir {
        cfg.cache_dir = dir.clone();
    }
    if let Some(model) = &o.model {
        cfg.llm_model = model.clone();
    }
    if let Some(n) = o.max_workers {
        cfg.max_workers = n;
    }
    if let Some(deps) = &o.implicit_deps {
        cfg.implicit_dependencies = ImplicitDependencies::parse(deps)
            .ok_or_else(|| format!("unknown implicit dependency mode '{deps}'"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{apply_overrides, apply_pipeline_config, EngineConfig, Overrides};
    use semflow_core::config::ImplicitDependencies;
    use semflow_planner::PipelineConfig;

    #[test]
    fn pipeline_config_overrides_env_defaults() {
        let mut config = EngineConfig::default();
        let pipeline = PipelineConfig {
            llm_model: Some("gpt-4o".into()),
            cache_dir: Some("/tmp/pipeline".into()),
            implicit_dependencies: Some("none".into()),
            no_cache: Some(true),
            ..Default::default()
        };
        apply_pipeline_config(&mut config, &pipeline);
        assert_eq!(config.llm_model, "gpt-4o");
        assert_eq!(config.cache_dir, "/tmp/pipeline");
        assert_eq!(config.implicit_dependencies, ImplicitDependencies::None);
        assert!(config.no_cache);
    }

    #[test]
    fn cli_overrides_higher_priority_than_config() {
        let mut config = EngineConfig::default();
        let pipeline = PipelineConfig {
            cache_dir: Some("/tmp/pipeline".into()),
            max_workers: Some(2),
            ..Default::default()
        };
        apply_pipeline_config(&mut config, &pipeline);
        assert_eq!(config.cache_dir, "/tmp/pipeline");

        let cli = Overrides {
            cache_dir: Some("/tmp/cli".into()),
            max_workers: Some(8),
            ..Default::default()
        };
        apply_overrides(&mut config, &cli).unwrap();
        assert_eq!(config.cache_dir, "/tmp/cli");
        assert_eq!(config.max_workers, 8);
    }

    #[test]
    fn unknown_override_values_are_rejected() {
        let mut config = EngineConfig::default();
        let cli = Overrides {
            implicit_deps: Some("sometimes".into()),
            ..Default::default()
        };
        assert!(apply_overrides(&mut config, &cli).is_err());
    }
}
