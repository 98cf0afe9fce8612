use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gitee_pr_review_agent::{
    agents::{ConsoleSink, OrchestratorConfig, ReviewOrchestrator},
    config::Settings,
    forge::GiteeClient,
    llm::{ChatBackend, OpenAiChatClient},
    reports::ReportWriter,
    types::DiffRequest,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gitee-pr-agent")]
#[command(about = "Concurrent multi-reviewer PR review pipeline for Gitee")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Review a pull request and write the Markdown report
    Review {
        /// Repository owner (user or organization)
        #[arg(short, long, env = "GITEE_OWNER")]
        owner: String,

        /// Repository name
        #[arg(short, long, env = "GITEE_REPO")]
        repo: String,

        /// Pull request number
        #[arg(short, long, env = "GITEE_PR_NUMBER")]
        pr_number: u64,

        /// Report output path (defaults to review_results/pr_review_report.md)
        #[arg(short = 'f', long)]
        output_file: Option<PathBuf>,
    },

    /// Probe the chat backend for availability
    HealthCheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let settings = Settings::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Review {
            owner,
            repo,
            pr_number,
            output_file,
        } => review(settings, owner, repo, pr_number, output_file).await,

        Commands::HealthCheck => health_check(settings).await,
    }
}

/// Initialize tracing with the specified log level
fn init_tracing(log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to create env filter")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}

/// Run the full review pipeline and persist the report
async fn review(
    settings: Settings,
    owner: String,
    repo: String,
    pr_number: u64,
    output_file: Option<PathBuf>,
) -> Result<()> {
    let request = DiffRequest {
        owner,
        repo,
        pr_number,
    };
    info!(
        "Reviewing {}/{} pull request #{}",
        request.owner, request.repo, request.pr_number
    );

    let diff_source = Arc::new(GiteeClient::new(&settings.forge)?);
    let backend =
        Arc::new(OpenAiChatClient::new(&settings.model).context("Failed to create chat backend")?);
    let orchestrator = ReviewOrchestrator::new(
        diff_source,
        backend,
        Arc::new(ConsoleSink),
        OrchestratorConfig {
            stage_timeout: settings.stage_timeout(),
        },
    );

    // Ctrl-C aborts every in-flight request.
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, aborting run");
            cancel.cancel();
        }
    });

    let report = match orchestrator.run(&request).await {
        Ok(report) => report,
        Err(err) => {
            error!(stage = err.stage(), "Review pipeline failed: {}", err);
            return Err(err.into());
        }
    };

    println!("\n{}", "=".repeat(50));
    println!("Final code review report");
    println!("{}\n", "=".repeat(50));
    println!("{}", report.markdown);

    let output_path = output_file.unwrap_or_else(|| settings.pipeline.output_path.clone());
    let writer = ReportWriter::new(output_path);
    let path = writer
        .persist(&report)
        .await
        .context("Report could not be saved (full text printed above)")?;
    println!("\nReport saved to: {}", path.display());

    Ok(())
}

/// Probe the chat backend and report its availability
async fn health_check(settings: Settings) -> Result<()> {
    let backend = OpenAiChatClient::new(&settings.model).context("Failed to create chat backend")?;

    match backend.health_check().await {
        Ok(true) => {
            println!("Chat backend: healthy");
            Ok(())
        }
        Ok(false) => {
            println!("Chat backend: unhealthy");
            std::process::exit(1);
        }
        Err(err) => {
            error!("Health check failed: {}", err);
            println!("Chat backend: error - {}", err);
            std::process::exit(1);
        }
    }
}
