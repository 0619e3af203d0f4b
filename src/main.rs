//! aicommit - CLI entry point.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use dialoguer::Confirm;
use futures::StreamExt;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use aicommit::git::{GitProvider, SystemGit};
use aicommit::{Config, Generation, Pipeline, TextStream};

/// Generate a commit message for the staged changes.
#[derive(Parser, Debug)]
#[command(name = "aicommit")]
#[command(about = "Generate commit messages for staged changes with an LLM")]
#[command(version)]
struct Cli {
    /// Config file (defaults to .aicommit.toml in the current directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the message without committing
    #[arg(long)]
    dry_run: bool,

    /// Debug logging and full error chains
    #[arg(short, long)]
    verbose: bool,

    /// Backend to use (openai, deepseek, local, claude, dummy)
    #[arg(long)]
    provider: Option<String>,

    /// Model name passed to the backend
    #[arg(long)]
    model: Option<String>,

    /// Stream the response as it is generated
    #[arg(long)]
    stream: bool,

    /// Skip the response cache
    #[arg(long)]
    no_cache: bool,

    /// Commit without asking for confirmation
    #[arg(short = 'y', long)]
    yes: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli).await {
        if cli.verbose {
            eprintln!("Error: {:?}", e);
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: &Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("Cannot determine the current directory")?;

    // Step 1: Resolve configuration
    let mut config =
        Config::resolve(cli.config.as_deref(), &cwd).context("Failed to load configuration")?;
    apply_cli_overrides(&mut config, cli);

    // Step 2: Check the repository
    let git = Arc::new(SystemGit::new(cwd.clone()));
    if !git.is_repository() {
        bail!("Not a git repository. Run aicommit from within a git repository.");
    }
    if !git
        .has_staged_changes()
        .context("Failed to inspect staged changes")?
    {
        bail!("No staged changes. Stage files with `git add` first.");
    }

    // Step 3: Collect context and generate
    let stream = config.backend.stream;
    let pipeline = Pipeline::new(config, cwd)
        .context("Failed to set up the pipeline")?
        .with_git(git.clone());

    let context = pipeline
        .collect_context()
        .await
        .context("Failed to collect context")?;

    info!("Generating commit message");
    let message = match pipeline
        .generate_from(&context, stream)
        .await
        .context("Failed to generate commit message")?
    {
        Generation::Complete(message) => message,
        Generation::Stream(chunks) => {
            // stdout only carries the final message
            let raw = echo_stream(chunks, &mut std::io::stderr()).await?;
            pipeline
                .format(&context, &raw)
                .context("Failed to format commit message")?
        }
    };

    // Step 4: Show and commit
    println!("{}", message);

    if cli.dry_run {
        eprintln!("Dry run complete. No commit created.");
        return Ok(());
    }

    if !cli.yes {
        let confirmed = Confirm::new()
            .with_prompt("Commit with this message?")
            .default(true)
            .interact()
            .context("Confirmation prompt failed")?;
        if !confirmed {
            eprintln!("Aborted. No commit created.");
            return Ok(());
        }
    }

    let oid = git.commit(&message).context("Failed to create commit")?;
    eprintln!("Created commit {}", &oid[..oid.len().min(7)]);
    Ok(())
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(provider) = &cli.provider {
        config.backend.name = provider.clone();
    }
    if let Some(model) = &cli.model {
        config.backend.model = model.clone();
    }
    if cli.stream {
        config.backend.stream = true;
    }
    if cli.no_cache {
        config.cache.enabled = false;
    }
}

/// Write each chunk to `progress` as it arrives and return the joined text.
async fn echo_stream<W: Write>(mut chunks: TextStream, progress: &mut W) -> Result<String> {
    let mut raw = String::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.context("Streaming response failed")?;
        write!(progress, "{}", chunk).ok();
        progress.flush().ok();
        raw.push_str(&chunk);
    }
    writeln!(progress).ok();
    Ok(raw)
}
