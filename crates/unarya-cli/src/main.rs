//! Unarya - code-analysis pipeline CLI
//!
//! ## Commands
//!
//! - `run`: Execute a pipeline in-process against the configured services
//! - `start`: Ask a running `unaryad` to execute a pipeline
//! - `status`: Show the stage progress of a run held by `unaryad`

mod daemon;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use unarya_core::telemetry::init_tracing;
use unarya_core::{OrchestratorConfig, PipelineRequest, PipelineResult, StageStatus};
use unarya_pipeline::api::{RunSnapshot, StartPipelineRequest};
use unarya_pipeline::{stage_clients, Orchestrator};

use crate::daemon::DaemonClient;

#[derive(Parser)]
#[command(name = "unarya")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Unarya code-analysis pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone)]
struct SourceArgs {
    /// Repository, archive or file URL
    url: String,

    /// Branch to collect (git sources)
    #[arg(short, long)]
    branch: Option<String>,

    /// Access token for private sources
    #[arg(long, env = "UNARYA_SOURCE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Source type: git, archive or url
    #[arg(short = 't', long, default_value = "git")]
    source_type: String,
}

impl SourceArgs {
    fn to_request(&self) -> Result<PipelineRequest> {
        PipelineRequest::parse(
            self.url.clone(),
            self.branch.clone(),
            self.token.clone(),
            &self.source_type,
        )
        .context("invalid pipeline request")
    }

    fn to_api(&self) -> StartPipelineRequest {
        StartPipelineRequest {
            repository_url: self.url.clone(),
            branch: self.branch.clone(),
            token: self.token.clone(),
            source_type: self.source_type.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline in this process
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Retries per stage (overrides PIPELINE_MAX_RETRIES)
        #[arg(long)]
        max_retries: Option<u32>,

        /// Per-stage timeout in seconds (overrides PIPELINE_STAGE_TIMEOUT_SECS)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Print the full result as JSON
        #[arg(long)]
        output_json: bool,
    },

    /// Start a pipeline on a running daemon
    Start {
        #[command(flatten)]
        source: SourceArgs,

        /// Daemon base URL
        #[arg(long, env = "UNARYA_DAEMON_URL", default_value = "http://127.0.0.1:50051")]
        daemon: String,

        /// Return the run id immediately instead of waiting
        #[arg(short, long)]
        detach: bool,
    },

    /// Show the progress of a run on a daemon
    Status {
        /// Run ID
        run_id: String,

        /// Daemon base URL
        #[arg(long, env = "UNARYA_DAEMON_URL", default_value = "http://127.0.0.1:50051")]
        daemon: String,

        /// Print the snapshot as JSON
        #[arg(long)]
        output_json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            source,
            max_retries,
            timeout_secs,
            output_json,
        } => cmd_run(&source, max_retries, timeout_secs, output_json).await,
        Commands::Start {
            source,
            daemon,
            detach,
        } => cmd_start(&source, &daemon, detach).await,
        Commands::Status {
            run_id,
            daemon,
            output_json,
        } => cmd_status(&run_id, &daemon, output_json).await,
    }
}

async fn cmd_run(
    source: &SourceArgs,
    max_retries: Option<u32>,
    timeout_secs: Option<u64>,
    output_json: bool,
) -> Result<()> {
    let request = source.to_request()?;

    let mut config = OrchestratorConfig::from_env().context("invalid configuration")?;
    if let Some(retries) = max_retries {
        config.retry.max_retries = retries;
    }
    if let Some(secs) = timeout_secs {
        config = config.with_stage_timeout(Duration::from_secs(secs.max(1)));
    }

    let clients = stage_clients(&config).context("failed to build stage clients")?;
    let orchestrator = Orchestrator::with_config(clients, &config);
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    match orchestrator.run(request, cancel).await {
        Ok(result) => {
            if output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", render_result(&result));
            }
            Ok(())
        }
        Err(error) => {
            if let Some(partial) = error.partial() {
                if output_json {
                    println!("{}", serde_json::to_string_pretty(partial)?);
                } else {
                    print!("{}", render_result(partial));
                }
            }
            Err(error).context("pipeline failed")
        }
    }
}

async fn cmd_start(source: &SourceArgs, daemon: &str, detach: bool) -> Result<()> {
    let client = DaemonClient::new(daemon);
    let request = source.to_api();

    if detach {
        let started = client.start_background(&request).await?;
        println!("{}", started.run_id);
        return Ok(());
    }

    let resp = client.start_pipeline(&request).await?;
    if let Some(run_id) = &resp.run_id {
        println!("Run ID: {run_id}");
    }
    println!("Status: {}", resp.status);
    println!("{}", resp.details);
    if !resp.succeeded() {
        anyhow::bail!("pipeline failed");
    }
    Ok(())
}

async fn cmd_status(run_id: &str, daemon: &str, output_json: bool) -> Result<()> {
    let snapshot = DaemonClient::new(daemon).status(run_id).await?;
    if output_json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", render_snapshot(&snapshot));
    }
    Ok(())
}

fn status_mark(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Success => "✓",
        StageStatus::Failed => "✗",
        StageStatus::Running => "…",
        StageStatus::Pending => "·",
    }
}

fn render_result(result: &PipelineResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Run ID: {}\n", result.run_id));
    out.push_str(&format!(
        "Status: {}\n",
        if result.succeeded() {
            "✓ PASSED"
        } else {
            "✗ FAILED"
        }
    ));
    out.push_str(&format!("Duration: {}ms\n\n", result.duration_ms));

    for stage in &result.stages {
        out.push_str(&format!(
            "  {} {} ({}, attempts: {})\n",
            status_mark(stage.status),
            stage.stage,
            stage.status,
            stage.attempts
        ));
    }
    out.push_str(&format!(
        "\nSummary: {}/{} stages passed\n",
        result.passed_count(),
        result.stages.len()
    ));

    if let Some(error) = &result.error {
        out.push_str(&format!("Error: {error}\n"));
    }
    if let Some(final_result) = &result.final_result {
        out.push_str(&format!(
            "Risk: {} ({:.1})\n{}\n",
            final_result.risk_level, final_result.risk_score, final_result.summary
        ));
    }
    out
}

fn render_snapshot(snapshot: &RunSnapshot) -> String {
    let mut out = format!(
        "Run ID: {}{}\n",
        snapshot.run_id,
        if snapshot.active { " (running)" } else { "" }
    );
    for state in snapshot.stages.values() {
        out.push_str(&format!(
            "  {} {} {} (updated {})\n",
            status_mark(state.status),
            state.stage,
            state.status,
            state.updated_at.to_rfc3339()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use unarya_core::{RunId, StageSummary};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "unarya",
            "run",
            "https://example.com/release.zip",
            "--source-type",
            "archive",
            "--max-retries",
            "0",
            "--output-json",
        ])
        .expect("parse");

        match cli.command {
            Commands::Run {
                source,
                max_retries,
                output_json,
                ..
            } => {
                assert_eq!(source.source_type, "archive");
                assert_eq!(max_retries, Some(0));
                assert!(output_json);
                let request = source.to_request().expect("valid request");
                assert_eq!(request.source_type, unarya_core::SourceType::Archive);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn invalid_source_type_rejected() {
        let source = SourceArgs {
            url: "https://example.com/repo".to_string(),
            branch: None,
            token: None,
            source_type: "svn".to_string(),
        };
        assert!(source.to_request().is_err());
    }

    #[test]
    fn render_partial_result() {
        let result = PipelineResult {
            run_id: RunId::from("run-1"),
            plan_digest: String::new(),
            stages: vec![
                StageSummary {
                    stage: "collector".to_string(),
                    status: StageStatus::Success,
                    attempts: 1,
                },
                StageSummary {
                    stage: "parser".to_string(),
                    status: StageStatus::Failed,
                    attempts: 4,
                },
            ],
            final_result: None,
            duration_ms: 42,
            failed_stage: Some("parser".to_string()),
            error: Some("stage parser failed after 3 retries: call cancelled".to_string()),
        };

        let text = render_result(&result);
        assert!(text.contains("✗ FAILED"));
        assert!(text.contains("✗ parser (failed, attempts: 4)"));
        assert!(text.contains("Summary: 1/2 stages passed"));
        assert!(!text.contains("Risk:"));
    }
}
