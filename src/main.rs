use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{Select, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use scrutiny::canned::{CannedAnalysisService, MemoryReportStore, sample_entity};
use scrutiny::config::{EngineConfig, PipelineMode};
use scrutiny::context::{AgentProfile, BusinessEntity};
use scrutiny::driver::PipelineDriver;
use scrutiny::events::{EngineEvent, EventBus, LogStatus};
use scrutiny::registry::StepRegistry;
use scrutiny::service::ReportStore;
use scrutiny::step::{StepStatus, pipeline_template};

#[derive(Parser)]
#[command(name = "scrutiny")]
#[command(version, about = "Automated business analysis orchestrator")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a scrutiny.toml config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis pipeline over an entity
    Run {
        /// JSON file describing the entity; a built-in sample is used when omitted
        #[arg(long)]
        entity: Option<PathBuf>,
        /// Gate every step transition behind an interactive approval prompt
        #[arg(long)]
        manual: bool,
        /// Script the backend to judge the challenge unsuitable (demo of the entry gate)
        #[arg(long)]
        unsuitable: bool,
        /// Milliseconds between scheduler ticks
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Write the final report JSON here
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the pipeline steps
    Steps,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            ref entity,
            manual,
            unsuitable,
            interval_ms,
            ref out,
        } => cmd_run(&cli, entity.as_deref(), manual, unsuitable, interval_ms, out.as_deref()).await,
        Commands::Steps => cmd_steps(),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "scrutiny=debug" } else { "scrutiny=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn cmd_steps() -> Result<()> {
    println!("{}", style("Pipeline steps").bold());
    for (index, step) in pipeline_template().iter().enumerate() {
        println!(
            "  {}. {} - {}",
            index + 1,
            style(&step.title).cyan(),
            step.description
        );
        for sub in &step.sub_steps {
            println!("       - {}", sub.title);
        }
    }
    Ok(())
}

fn load_entity(path: Option<&std::path::Path>) -> Result<BusinessEntity> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read entity file: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse entity JSON: {}", path.display()))
        }
        None => Ok(sample_entity()),
    }
}

fn build_config(cli: &Cli, manual: bool, interval_ms: Option<u64>) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default(&std::env::current_dir()?),
    };
    if manual {
        config.mode = PipelineMode::Manual;
    }
    if let Some(ms) = interval_ms {
        config.tick_interval_ms = ms;
    }
    Ok(config)
}

async fn cmd_run(
    cli: &Cli,
    entity: Option<&std::path::Path>,
    manual: bool,
    unsuitable: bool,
    interval_ms: Option<u64>,
    out: Option<&std::path::Path>,
) -> Result<()> {
    let config = build_config(cli, manual, interval_ms)?;
    let entity = load_entity(entity)?;
    println!(
        "{} {} - {}",
        style("Analyzing").bold().green(),
        style(&entity.name).bold(),
        entity.challenge
    );

    let service = if unsuitable {
        CannedAnalysisService::new().unsuitable()
    } else {
        CannedAnalysisService::new()
    };
    let bus = EventBus::new(config.event_capacity);
    let mut registry = StepRegistry::new(bus.clone()).with_step_timeout(config.step_timeout());
    registry.register_default_processors(Arc::new(service));

    let driver = Arc::new(
        PipelineDriver::new(registry, bus, config)
            .with_subject(entity)
            .with_agent(AgentProfile::new("scrutiny-analyst").with_role("analyst")),
    );

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string"),
    );
    spinner.set_prefix("Step");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let mut rx = driver.subscribe();
    driver.start().await;

    let mut final_report = None;
    loop {
        match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            Ok(Ok(EngineEvent::StepStatusChanged { kind, status, .. })) => {
                spinner.set_message(format!("{} → {}", kind, status));
            }
            Ok(Ok(EngineEvent::Log { entry })) => {
                let line = format!("{}: {}", entry.title, entry.description);
                let styled = match entry.status {
                    LogStatus::Success => style(line).green(),
                    LogStatus::Warning => style(line).yellow(),
                    LogStatus::Error => style(line).red(),
                    LogStatus::Info => style(line).dim(),
                };
                spinner.println(format!("  {}", styled));
            }
            Ok(Ok(EngineEvent::PipelineCompleted { report, logs })) => {
                spinner.finish_and_clear();
                println!(
                    "{} {} log entries recorded",
                    style("Pipeline completed.").bold().green(),
                    logs.len()
                );
                final_report = report;
                break;
            }
            Ok(Err(_)) => break,
            Err(_) => {
                // The bus went quiet; decide whether the driver is waiting on us.
                let snapshot = driver.snapshot().await;
                if let Some(index) = snapshot.awaiting_approval {
                    if !prompt_approval(&driver, index).await? {
                        break;
                    }
                } else if !snapshot.is_running && !snapshot.completed {
                    spinner.finish_and_clear();
                    if let Some(entry) = snapshot.last_log {
                        println!("{} {}", style("Halted:").bold().yellow(), entry.description);
                    } else {
                        println!("{}", style("Pipeline halted.").bold().yellow());
                    }
                    print_step_summary(&driver).await;
                    return Ok(());
                }
            }
        }
    }
    spinner.finish_and_clear();
    print_step_summary(&driver).await;

    if let Some(report) = final_report {
        let store = MemoryReportStore::new();
        let key = store.save_report(&report).await?;
        println!("\n{}", style("Report").bold());
        println!("  {}", report.summary);
        for finding in &report.findings {
            println!("  - {}", finding);
        }
        println!(
            "  Confidence: {:.0} ({})",
            report.confidence_score,
            if report.is_logical { "logical" } else { "needs review" }
        );
        println!("  Stored as {}", style(&key).dim());
        if let Some(path) = out {
            let content = serde_json::to_string_pretty(&report)?;
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write report file: {}", path.display()))?;
            println!("  Written to {}", path.display());
        }
    }
    Ok(())
}

async fn prompt_approval(driver: &Arc<PipelineDriver>, index: usize) -> Result<bool> {
    let snapshot = driver.snapshot().await;
    let title = snapshot
        .steps
        .get(index)
        .map(|s| s.title.clone())
        .unwrap_or_else(|| format!("step {}", index));
    let options = &[
        "Approve and continue",
        "Reject and stop",
        "Abort without deciding",
    ];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("'{}' awaits approval", title))
        .items(options)
        .default(0)
        .interact()?;
    match selection {
        0 => {
            driver.approve(index).await?;
            Ok(true)
        }
        1 => {
            driver.reject(index).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

async fn print_step_summary(driver: &Arc<PipelineDriver>) {
    let snapshot = driver.snapshot().await;
    println!("\n{}", style("Steps").bold());
    for step in &snapshot.steps {
        let marker = match step.status {
            StepStatus::Completed => style("done").green(),
            StepStatus::Error => style("error").red(),
            StepStatus::InProgress => style("running").cyan(),
            StepStatus::Pending => style("pending").dim(),
        };
        println!("  [{}] {}", marker, step.title);
    }
}
