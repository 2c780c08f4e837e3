//! Scribe CLI - batched documentation runs driven by an external agent
//!
//! Usage:
//!   scribe init                         Write .scribe/config.toml
//!   scribe scan                         Show prioritized source files
//!   scribe plan [--force]               Build batches and the task list
//!   scribe next                         Claim the next eligible task
//!   scribe submit <id> --output <path>  Submit produced files for a task
//!   scribe validate <id> --output <p>   Dry-run validation
//!   scribe status                       Show progress
//!   scribe reset <id>                   Return a failed task to pending
//!   scribe skip <id> --reason <text>    Skip a task

mod services;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scribe_core::{ScribeConfig, Task, TaskPayload};
use scribe_tasks::{NextTask, Submission, SubmissionOutcome, TaskPersistence, TaskStore};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use services::Services;

#[derive(Parser)]
#[command(name = "scribe")]
#[command(author, version, about = "Batched, validated documentation runs")]
struct Cli {
    /// Project root (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Scan and rank source files without planning
    Scan,

    /// Build work units and generate the task list
    Plan {
        /// Replace an existing plan and task list
        #[arg(long)]
        force: bool,
    },

    /// Claim the next eligible task
    Next,

    /// Submit produced outputs for an in-progress task
    Submit {
        /// Task ID
        id: String,

        /// Produced file, relative to the project root (repeatable)
        #[arg(short, long = "output", value_name = "PATH")]
        outputs: Vec<String>,

        /// Free-form implementation notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Validate outputs for a task without changing its state
    Validate {
        /// Task ID
        id: String,

        /// File to check, relative to the project root (repeatable)
        #[arg(short, long = "output", value_name = "PATH")]
        outputs: Vec<String>,
    },

    /// Show progress and the task in flight
    Status,

    /// Move a failed task back to pending
    Reset {
        /// Task ID
        id: String,
    },

    /// Mark a pending or failed task as skipped
    Skip {
        /// Task ID
        id: String,

        /// Why the task is skipped
        #[arg(long)]
        reason: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays clean
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let services = Services::new(&cli.root)?;
    let json = cli.json;

    match cli.command {
        Commands::Init { force } => cmd_init(&services, force, json),
        Commands::Scan => cmd_scan(&services, json),
        Commands::Plan { force } => cmd_plan(&services, force, json).await,
        Commands::Next => cmd_next(&services, json).await,
        Commands::Submit { id, outputs, notes } => {
            cmd_submit(&services, id, outputs, notes, json).await
        }
        Commands::Validate { id, outputs } => cmd_validate(&services, id, outputs, json).await,
        Commands::Status => cmd_status(&services, json).await,
        Commands::Reset { id } => cmd_reset(&services, id, json).await,
        Commands::Skip { id, reason } => cmd_skip(&services, id, reason, json).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_task(task: &Task) {
    println!("Task {} [{}]", task.id, task.kind());
    println!("  {}", task.title);
    if !task.description.is_empty() {
        println!("  {}", task.description);
    }
    println!("  Priority: {}  Estimate: {} min  Attempt: {}", task.priority, task.estimated_minutes, task.attempts);
    println!("  Depends on: {}", task.dependency);

    let instructions = &task.instructions;
    if !instructions.target_files.is_empty() {
        println!("\n  Files:");
        for file in &instructions.target_files {
            println!("    - {}", file);
        }
    }
    if !instructions.output_patterns.is_empty() {
        println!("\n  Write:");
        for output in &instructions.output_patterns {
            println!("    - {}", output);
        }
        let expected: Vec<String> = task.expected_outputs.iter().map(|e| e.to_string()).collect();
        println!("    (accepted names: {})", expected.join(", "));
    }
    if !instructions.focus_areas.is_empty() {
        println!("\n  Focus on:");
        for area in &instructions.focus_areas {
            println!("    - {}", area);
        }
    }
    if !instructions.checklist.is_empty() {
        println!("\n  Checklist:");
        for item in &instructions.checklist {
            println!("    [ ] {}", item);
        }
    }
}

fn cmd_init(services: &Services, force: bool, json: bool) -> Result<()> {
    let path = ScribeConfig::config_path(services.root());
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let path = ScribeConfig::write_default(services.root()).context("Failed to write config")?;
    info!("Initialized Scribe in {}", services.root().display());

    if json {
        print_json(&serde_json::json!({ "config": path }))?;
    } else {
        println!("Created {}", path.display());
        println!("\nNext steps:");
        println!("  1. Adjust budgets and exclusions in the config as needed");
        println!("  2. Run 'scribe plan' to build batches and tasks");
        println!("  3. Run 'scribe next' to fetch the first task");
    }
    Ok(())
}

fn cmd_scan(services: &Services, json: bool) -> Result<()> {
    let report = services
        .prioritizer()?
        .scan(services.root())
        .context("Failed to scan project")?;

    if json {
        return print_json(&report);
    }

    println!("Scanned {} file(s)", report.len());
    println!("\nBy category:");
    for (category, files) in &report.by_category {
        println!("  {:<12} {}", category.to_string(), files.len());
    }
    println!("\nBy language:");
    for (language, files) in &report.by_language {
        println!("  {:<12} {}", format!("{:?}", language).to_lowercase(), files.len());
    }
    println!("\nTop files:");
    for file in report.files.iter().take(20) {
        println!("  {:>3}  {:<10} {}", file.importance, file.category.to_string(), file.path);
    }
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
    Ok(())
}

async fn cmd_plan(services: &Services, force: bool, json: bool) -> Result<()> {
    let plans = services.plans()?;
    let storage = services.storage()?;
    if !force && (plans.exists().await || storage.load().await?.is_some()) {
        bail!("A plan already exists (use --force to replace it and reset all tasks)");
    }

    let root = services.root();
    let scan = services
        .prioritizer()?
        .scan(root)
        .context("Failed to scan project")?;
    let plan = services.builder()?.build(root, &scan.files).await;
    plans.save(&plan).await.context("Failed to save batch plan")?;

    let tasks = services.generator()?.generate(&plan);
    let project = root
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "project".to_string());
    let store = TaskStore::create(storage, &project, tasks)
        .await
        .context("Failed to save task list")?;
    let list = store.snapshot().await;

    info!(batches = plan.units.len(), tasks = list.total, "Plan ready");

    if json {
        return print_json(&serde_json::json!({
            "manifest": plan.manifest,
            "tasks": list.total,
        }));
    }

    let manifest = &plan.manifest;
    println!("Planned {} batch(es) from {} file(s)", manifest.total_batches, manifest.files_considered);
    println!("  Included: {}  Deferred: {}", manifest.files_included, manifest.deferred.len());
    println!("  Estimated tokens: {}", manifest.total_tokens);
    for (strategy, count) in &manifest.strategies {
        println!("  {:<9} {}", strategy.to_string(), count);
    }
    for warning in &manifest.warnings {
        println!("  warning: {}", warning);
    }
    println!("\nGenerated {} task(s). Run 'scribe next' to begin.", list.total);
    Ok(())
}

async fn cmd_next(services: &Services, json: bool) -> Result<()> {
    let dispatcher = services.dispatcher().await?;
    let next = dispatcher.get_next_task().await?;

    // File tasks carry their work unit so the agent gets the prepared content
    let unit = match &next {
        NextTask::Assigned(Task {
            payload: TaskPayload::FileProcessing { batch_id, .. },
            ..
        }) => Some(
            services
                .plans()?
                .load_unit(batch_id)
                .await
                .with_context(|| format!("Failed to load work unit {}", batch_id))?,
        ),
        _ => None,
    };

    if json {
        return print_json(&serde_json::json!({ "next": next, "work_unit": unit }));
    }

    match &next {
        NextTask::Assigned(task) => {
            print_task(task);
            if let Some(unit) = unit {
                println!("\n  Work unit {} ({}, ~{} tokens):", unit.id, unit.strategy, unit.estimated_tokens);
                for entry in &unit.entries {
                    println!("\n=== {} ({}, {:?}) ===", entry.path, entry.category, entry.language);
                    println!("{}", entry.processing_hint);
                    println!("{}", entry.content);
                }
            }
            println!("\nWhen done: scribe submit {} --output <path>...", task.id);
        }
        NextTask::Blocked(report) => {
            println!("Blocked: {}", report.diagnostic);
            for waiting in &report.waiting {
                println!("  {} - {}", waiting.id, waiting.unmet);
            }
        }
        NextTask::Complete(summary) => {
            println!(
                "All {} task(s) finished: {} completed, {} skipped",
                summary.total, summary.completed, summary.skipped
            );
        }
    }
    Ok(())
}

async fn cmd_submit(
    services: &Services,
    id: String,
    outputs: Vec<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let dispatcher = services.dispatcher().await?;
    let mut submission = Submission::new(id, outputs);
    if let Some(notes) = notes {
        submission = submission.with_notes(notes);
    }
    let outcome = dispatcher.submit_completion(submission).await?;

    if json {
        return print_json(&outcome);
    }

    let validation = outcome.validation();
    match &outcome {
        SubmissionOutcome::Accepted { task, next, .. } => {
            println!("Accepted {} ({:.1}%)", task.id, validation.percentage);
            println!("{}", next);
        }
        SubmissionOutcome::Rejected {
            task, remediation, ..
        } => {
            println!("Rejected {} ({:.1}%)", task.id, validation.percentage);
            for issue in validation.issues() {
                println!("  - {}", issue);
            }
            println!("\nTo fix:");
            for step in remediation {
                println!("  - {}", step);
            }
        }
    }
    Ok(())
}

async fn cmd_validate(services: &Services, id: String, outputs: Vec<String>, json: bool) -> Result<()> {
    let dispatcher = services.dispatcher().await?;
    let result = dispatcher.validate_outputs(&id, &outputs).await?;

    if json {
        return print_json(&result);
    }

    println!(
        "{} {} ({:.1} / {:.1}, {:.1}%)",
        if result.passed { "PASS" } else { "FAIL" },
        id,
        result.score,
        result.max_score,
        result.percentage
    );
    for check in &result.checks {
        println!(
            "  [{}] {:<18} {:.1}/{:.1}{}",
            if check.passed { "x" } else { " " },
            check.check.name(),
            check.score,
            check.max_score,
            if check.blocking && !check.passed { " (blocking)" } else { "" }
        );
        for issue in &check.issues {
            println!("        - {}", issue);
        }
    }
    for suggestion in &result.suggestions {
        println!("  suggestion: {}", suggestion);
    }
    Ok(())
}

async fn cmd_status(services: &Services, json: bool) -> Result<()> {
    let dispatcher = services.dispatcher().await?;
    let status = dispatcher.status().await.context("Failed to read task status")?;

    if json {
        return print_json(&status);
    }

    let progress = &status.progress;
    println!("Scribe Status: {}", status.project);
    println!("==========");
    println!("Phase: {}", progress.phase);
    println!(
        "Progress: {}/{} ({:.1}%), {} remaining, ~{} min left",
        progress.completed + progress.skipped,
        progress.total,
        progress.percentage,
        progress.remaining,
        progress.estimated_remaining_minutes
    );
    println!(
        "Pending: {}  In progress: {}  Completed: {}  Skipped: {}  Error: {}",
        progress.pending, progress.in_progress, progress.completed, progress.skipped, progress.errored
    );
    if let Some(current) = &status.current {
        println!("\nCurrent: {} - {}", current.id, current.title);
    }
    if !status.errored.is_empty() {
        println!("\nFailed (reset or skip to continue):");
        for id in &status.errored {
            println!("  - {}", id);
        }
    }
    Ok(())
}

async fn cmd_reset(services: &Services, id: String, json: bool) -> Result<()> {
    let task = services.dispatcher().await?.reset_task(&id).await?;
    if json {
        return print_json(&task);
    }
    println!("Reset {} to {}", task.id, task.status);
    Ok(())
}

async fn cmd_skip(services: &Services, id: String, reason: String, json: bool) -> Result<()> {
    let task = services.dispatcher().await?.skip_task(&id, &reason).await?;
    if json {
        return print_json(&task);
    }
    println!("Skipped {}: {}", task.id, reason);
    Ok(())
}
