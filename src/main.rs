use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arbiter::catalog::{self, JsonCatalog};
use arbiter::cmd::Command;
use arbiter::{Judge, JudgeConfig, SandboxConfig, SandboxOutput, Submission};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::runtime;

#[derive(Debug, Parser)]
#[clap(name = "arbiter", version, about = "Sandboxed code judge")]
struct Opt {
    #[clap(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run one program in the sandbox and print its resource usage
    Sandbox(SandboxConfig),
    /// Judge one source file against a catalog question
    Judge(JudgeArgs),
    /// Judge submissions read as JSON lines from stdin
    Batch(BatchArgs),
}

#[derive(Debug, Args)]
struct JudgeArgs {
    #[clap(flatten)]
    config: JudgeConfig,

    #[clap(long, value_name = "path")]
    catalog: PathBuf,

    #[clap(long, value_name = "id")]
    question: String,

    #[clap(short, long)]
    language: String,

    code: PathBuf,
}

#[derive(Debug, Args)]
struct BatchArgs {
    #[clap(flatten)]
    config: JudgeConfig,

    #[clap(long, value_name = "path")]
    catalog: PathBuf,
}

fn setup_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    tracing_subscriber::fmt()
        .event_format(fmt::format::Format::default().pretty())
        .with_env_filter(EnvFilter::from_default_env())
        .with_timer(fmt::time::ChronoLocal::rfc3339())
        .with_writer(io::stderr)
        .finish()
        .with(ErrorLayer::default())
        .init();
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();
    let out = &mut stdout_lock;
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn sandbox(runtime: &runtime::Runtime, mut config: SandboxConfig) -> Result<()> {
    let name = config.bin.to_string_lossy().into_owned();
    let mut cmd = Command::new(name.as_str());
    config.bin = cmd
        .resolve()
        .map(|p| p.to_path_buf())
        .with_context(|| format!("executable not found: {}", name))?;

    let output: SandboxOutput = {
        let _enter = runtime.enter();
        arbiter::run(&config)?
    };

    print_json(&output)
}

async fn judge_one(args: JudgeArgs) -> Result<()> {
    let catalog = JsonCatalog::load(&args.catalog)?;
    let code = std::fs::read_to_string(&args.code)
        .with_context(|| format!("failed to read code file: {}", args.code.display()))?;

    let judge = Arc::new(Judge::new(args.config).context("failed to create temp root")?);
    let submission = Submission {
        question_id: args.question,
        language: args.language,
        code,
    };

    let report = catalog::submit_code(&judge, &catalog, &submission).await?;
    print_json(&report)
}

#[derive(Serialize)]
struct Rejected {
    error: String,
}

async fn batch(args: BatchArgs) -> Result<()> {
    let catalog = Arc::new(JsonCatalog::load(&args.catalog)?);
    let judge = Arc::new(Judge::new(args.config).context("failed to create temp root")?);

    let mut handles = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let judge = Arc::clone(&judge);
        let catalog = Arc::clone(&catalog);
        handles.push(tokio::spawn(async move {
            let submission: Submission = serde_json::from_str(&line)
                .map_err(|err| format!("invalid submission: {}", err))?;
            catalog::submit_code(&judge, &*catalog, &submission)
                .await
                .map_err(|err| err.to_string())
        }));
    }

    for handle in handles {
        match handle.await? {
            Ok(report) => print_json(&report)?,
            Err(error) => print_json(&Rejected { error })?,
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    setup_tracing();

    let opt = Opt::parse();

    let runtime = runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()?;

    match opt.command {
        Cmd::Sandbox(config) => sandbox(&runtime, config),
        Cmd::Judge(args) => runtime.block_on(judge_one(args)),
        Cmd::Batch(args) => runtime.block_on(batch(args)),
    }
}
