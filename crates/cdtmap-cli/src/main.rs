use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cdtmap_benchmark::RunnerEvent;
use cdtmap_core::CdtMapConfig;
use cdtmap_services::{
    load_code_catalog, load_test_cases, missing_codes, LoadStatus, OllamaClient, RequestDispatcher,
    ResultStore, Selection, TemplatePrompts, ValidationReport, ValidationService,
};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cdtmap")]
#[command(about = "CDT code mapper - consistency and accuracy harness", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ollama host URL
    #[arg(long, global = true)]
    host: Option<String>,

    /// Model ID
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Results file
    #[arg(long, global = true)]
    results: Option<PathBuf>,

    /// Test case catalog (JSON); built-in set when omitted
    #[arg(long, global = true)]
    test_cases: Option<PathBuf>,

    /// CDT code catalog (JSON); built-in set when omitted
    #[arg(long, global = true)]
    codes: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stored status of every test case
    Status,

    /// Run test cases that do not pass yet
    Run {
        /// Run only these cases, regardless of stored status
        #[arg(short, long = "case")]
        cases: Vec<String>,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Run every test case, ignoring stored status
    RunAll {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Clear all stored results
    Reset,

    /// List cases that pass both checks
    Passed,

    /// List cases that still fail a check
    NeedsWork,

    /// List expected codes missing from the code catalog
    CheckCodes,

    /// List models available on the Ollama host
    Models,
}

#[derive(clap::Args)]
struct BatchArgs {
    /// Repetitions per test case
    #[arg(short, long)]
    runs: Option<u32>,

    /// Maximum concurrent requests
    #[arg(short, long)]
    workers: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match &cli.command {
        Commands::Status => cmd_status(&config),
        Commands::Run { cases, batch } => cmd_run(&cli, config, cases, batch, false).await,
        Commands::RunAll { batch } => cmd_run(&cli, config, &[], batch, true).await,
        Commands::Reset => cmd_reset(&config),
        Commands::Passed => cmd_list(&config, true),
        Commands::NeedsWork => cmd_list(&config, false),
        Commands::CheckCodes => cmd_check_codes(&cli),
        Commands::Models => cmd_models(&config).await,
    }
}

/// Defaults, then the config file, then environment, then flags.
fn resolve_config(cli: &Cli) -> Result<CdtMapConfig> {
    let base = match &cli.config {
        Some(path) => CdtMapConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CdtMapConfig::default(),
    };
    let mut config = base.apply_env();

    if let Some(host) = &cli.host {
        config.ollama.host = host.clone();
    }
    if let Some(model) = &cli.model {
        config.ollama.model = model.clone();
    }
    if let Some(path) = &cli.results {
        config.results.path = path.clone();
    }
    if let Commands::Run { batch, .. } | Commands::RunAll { batch } = &cli.command {
        if let Some(runs) = batch.runs {
            config.harness.runs_per_test = runs;
        }
        if let Some(workers) = batch.workers {
            config.harness.max_workers = workers;
        }
    }

    config.validate()?;
    tracing::debug!(
        host = %config.ollama.host,
        model = %config.ollama.model,
        results = %config.results.path.display(),
        "Resolved configuration"
    );
    Ok(config)
}

fn open_store(config: &CdtMapConfig) -> ResultStore {
    let (store, status) = ResultStore::open(&config.results.path);
    if let LoadStatus::Corrupt(reason) = status {
        println!(
            "Warning: could not read {} ({}); starting from an empty result set",
            config.results.path.display(),
            reason
        );
    }
    store
}

fn cmd_status(config: &CdtMapConfig) -> Result<()> {
    let store = open_store(config);
    let snapshot = store.snapshot();
    let summary = &snapshot.summary;

    println!();
    println!("Test Results Status:");
    println!("{:-<60}", "");
    if let Some(ts) = snapshot.last_updated {
        println!("  Last updated:       {}", ts.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if !snapshot.model.is_empty() {
        println!("  Model:              {}", snapshot.model);
    }
    println!("  Total cases:        {}", summary.total_cases);
    println!(
        "  Accuracy passed:    {} ({:.1}%)",
        summary.accuracy_passed,
        summary.percent(summary.accuracy_passed)
    );
    println!(
        "  Consistency passed: {} ({:.1}%)",
        summary.consistency_passed,
        summary.percent(summary.consistency_passed)
    );
    println!(
        "  Both passed:        {} ({:.1}%)",
        summary.both_passed,
        summary.percent(summary.both_passed)
    );
    println!("  Needs work:         {}", summary.needs_work);

    if snapshot.test_cases.is_empty() {
        println!();
        println!("  No results yet. Use `cdtmap run` to validate the test cases.");
        println!();
        return Ok(());
    }

    println!();
    println!("  {:<45} {:>8} {:>11}  {}", "Test case", "Score", "Consistency", "Issues");
    println!("{:-<90}", "");
    for (name, status) in &snapshot.test_cases {
        let issues = match status.issues() {
            issues if issues.is_empty() => "-".to_string(),
            issues => issues.join(", "),
        };
        println!(
            "  {:<45} {:>8.2} {:>10.0}%  {}",
            name,
            status.accuracy_score,
            status.consistency_rate * 100.0,
            issues
        );
    }
    println!();

    Ok(())
}

async fn cmd_run(
    cli: &Cli,
    config: CdtMapConfig,
    names: &[String],
    batch: &BatchArgs,
    force: bool,
) -> Result<()> {
    let test_cases = load_test_cases(cli.test_cases.as_deref())?;
    let code_catalog = load_code_catalog(cli.codes.as_deref())?;

    let client = Arc::new(OllamaClient::from_config(&config.ollama)?);
    let dispatcher = RequestDispatcher::new(client, &config, &TemplatePrompts, &code_catalog);
    let store = open_store(&config);
    let mut service = ValidationService::new(Arc::new(dispatcher), store, config.harness.clone());

    let selection = match names.is_empty() {
        true => service.select_cases(&test_cases, force),
        false => service.select_named(&test_cases, names),
    };
    for name in &selection.unknown {
        println!("Unknown test case: {}", name);
    }

    if !batch.json {
        print_batch_header(&config, &selection);
    }

    let (tx, rx) = mpsc::channel(100);
    let progress = tokio::spawn(print_progress(rx, batch.json));
    let report = service.validate_streaming(&selection, tx).await;
    let _ = progress.await;
    let report = report?;

    match batch.json {
        true => println!("{}", serde_json::to_string_pretty(&report)?),
        false => print_report(&report),
    }

    Ok(())
}

fn print_batch_header(config: &CdtMapConfig, selection: &Selection) {
    println!();
    println!("Running validation...");
    println!("  Model:        {}", config.ollama.model);
    println!("  Host:         {}", config.ollama.host);
    println!("  Test cases:   {}", selection.cases.len());
    println!("  Skipped:      {} (already passing)", selection.skipped.len());
    println!("  Runs/test:    {}", config.harness.runs_per_test);
    println!("  Workers:      {}", config.harness.max_workers);
    println!();
}

async fn print_progress(mut rx: mpsc::Receiver<RunnerEvent>, quiet: bool) {
    while let Some(event) = rx.recv().await {
        if quiet {
            continue;
        }
        if let RunnerEvent::TaskFinished {
            completed,
            total,
            test_name,
            run_index,
            elapsed_seconds,
            error,
        } = event
        {
            let outcome = match error {
                Some(e) => format!("error: {}", e),
                None => "ok".to_string(),
            };
            println!(
                "  [{:>3}/{}] {} (run {}) {:.2}s {}",
                completed, total, test_name, run_index, elapsed_seconds, outcome
            );
        }
    }
}

fn print_report(report: &ValidationReport) {
    if report.all_passing() {
        println!("All test cases are passing. Use `cdtmap run-all` to re-validate everything.");
        println!();
        return;
    }

    println!();
    println!("Accuracy (run 1):");
    println!("{:-<60}", "");
    for v in &report.accuracy {
        let mark = if v.passed { "PASS" } else { "FAIL" };
        println!("  {} {:<45} score {:.2}", mark, v.test_name, v.score);
        if let Some(error) = &v.error {
            println!("       error: {}", error);
        } else if !v.missing_codes.is_empty() {
            println!(
                "       missing: {}  got: {}",
                v.missing_codes.join(", "),
                v.extracted_codes.join(", ")
            );
        }
    }

    println!();
    println!("Consistency ({} runs):", report.runs_per_test);
    println!("{:-<60}", "");
    for v in &report.consistency {
        let mark = if v.consistent { "PASS" } else { "FAIL" };
        println!(
            "  {} {:<45} {} distinct, {} failed, {:.0}% agree",
            mark,
            v.test_name,
            v.distinct_code_sets,
            v.failed_run_count,
            v.agreement_rate * 100.0
        );
    }

    let acc = &report.accuracy_summary;
    let cons = &report.consistency_summary;
    let store = &report.store_summary;
    println!();
    println!("Summary:");
    println!("{:-<60}", "");
    println!(
        "  Accuracy:     {}/{} passed (mean score {:.2})",
        acc.passed, acc.total, acc.overall_score
    );
    println!(
        "  Consistency:  {}/{} consistent ({:.1}%), {} of {} runs failed",
        cons.consistent,
        cons.total,
        cons.consistency_rate * 100.0,
        cons.failed_runs,
        cons.total_runs
    );
    println!("  Batch time:   {:.2}s", report.elapsed_seconds);
    println!(
        "  Overall:      {}/{} cases passing, {} need work",
        store.both_passed, store.total_cases, store.needs_work
    );
    println!();
}

fn cmd_reset(config: &CdtMapConfig) -> Result<()> {
    let mut store = open_store(config);
    store.reset(&config.ollama.model)?;
    println!("All test results cleared ({}).", config.results.path.display());
    Ok(())
}

fn cmd_list(config: &CdtMapConfig, passed: bool) -> Result<()> {
    let store = open_store(config);
    let (title, names) = match passed {
        true => ("Passing test cases", store.passed_names()),
        false => ("Test cases needing work", store.needs_work_names()),
    };

    println!();
    println!("{} ({}):", title, names.len());
    println!("{:-<60}", "");
    for name in &names {
        match store.status(name) {
            Some(status) if !passed => println!("  {} [{}]", name, status.issues().join(", ")),
            _ => println!("  {}", name),
        }
    }
    println!();
    Ok(())
}

fn cmd_check_codes(cli: &Cli) -> Result<()> {
    let test_cases = load_test_cases(cli.test_cases.as_deref())?;
    let code_catalog = load_code_catalog(cli.codes.as_deref())?;
    let missing = missing_codes(&test_cases, &code_catalog);

    println!();
    println!(
        "Checked {} test cases against {} catalog codes",
        test_cases.len(),
        code_catalog.len()
    );
    match missing.is_empty() {
        true => println!("  All expected codes are in the catalog."),
        false => {
            println!("  Missing from catalog ({}):", missing.len());
            for code in &missing {
                println!("    {}", code);
            }
        }
    }
    println!();
    Ok(())
}

async fn cmd_models(config: &CdtMapConfig) -> Result<()> {
    let client = OllamaClient::from_config(&config.ollama)?;
    let models = client.list_models().await?;

    println!();
    println!("Available Models ({}):", client.host());
    println!("{:-<75}", "");
    println!("  {:<4} {:<40} {:<10} {}", "#", "ID", "Params", "Quantization");
    println!("{:-<75}", "");
    for (i, m) in models.iter().enumerate() {
        let params = m.parameter_size.as_deref().unwrap_or("-");
        let quant = m.quantization.as_deref().unwrap_or("-");
        let marker = if m.name == config.ollama.model { " *" } else { "" };
        println!("  {:<4} {:<40} {:<10} {}{}", i + 1, m.name, params, quant, marker);
    }
    println!();

    Ok(())
}
