//! xAgent CLI - GUI automation and tool approval
//!
//! Usage:
//!   xagent gui <instruction> --screens <dir>   Run the GUI agent on recorded screens
//!   xagent approve <tool> --params <json>      Classify a tool call
//!   xagent config init                         Write default settings
//!   xagent config show                         Print effective settings

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use xagent_approval::{ApprovalEngine, ApprovalResult, Confirmer, ToolCall, ToolGate};
use xagent_core::{AgentStatus, ApprovalMode, Origin, RunUpdate, XAgentConfig};
use xagent_gui::{GuiAgent, ReplayOperator, RunObserver};
use xagent_model::{resolve_api_key, HttpModelCaller};

#[derive(Parser)]
#[command(name = "xagent")]
#[command(author, version, about = "AI automation agent with smart tool approval")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the GUI agent against a directory of recorded screenshots
    Gui {
        /// What the agent should do
        instruction: String,

        /// Directory of PNG screenshots, replayed in file-name order
        #[arg(long, value_name = "DIR")]
        screens: PathBuf,

        /// Override gui.max_loop_count
        #[arg(long)]
        max_loops: Option<usize>,

        /// Write the final run state as JSON
        #[arg(long, value_name = "FILE")]
        transcript: Option<PathBuf>,

        /// Directory holding .xagent/settings.toml
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },

    /// Decide whether a tool call may run
    Approve {
        /// Tool name (e.g. Bash, Write, Read)
        tool: String,

        /// Tool parameters as JSON
        #[arg(long, default_value = "{}")]
        params: String,

        /// Override approval.mode (manual, smart, yolo)
        #[arg(long)]
        mode: Option<ApprovalMode>,

        /// Directory holding .xagent/settings.toml
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },

    /// Settings file management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write .xagent/settings.toml with defaults
    Init {
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective settings
    Show {
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Gui {
            instruction,
            screens,
            max_loops,
            transcript,
            path,
        } => cmd_gui(instruction, screens, max_loops, transcript, path).await,
        Commands::Approve {
            tool,
            params,
            mode,
            path,
        } => cmd_approve(tool, params, mode, path).await,
        Commands::Config { action } => cmd_config(action),
    }
}

/// Prints transcript entries as they arrive
struct ConsoleObserver;

impl RunObserver for ConsoleObserver {
    fn on_data(&self, update: RunUpdate) {
        for entry in &update.transcript {
            match (entry.origin, &entry.screenshot) {
                (Origin::Human, Some(shot)) => {
                    println!("[screen] {}x{} ({}ms)", shot.width, shot.height, entry.timing.duration)
                }
                (Origin::Human, None) => println!("[user] {}", entry.text),
                (Origin::Assistant, _) => println!("[model] {}", entry.text.trim()),
            }
        }
        if update.transcript.is_empty() {
            println!("[status] {}", update.status);
        }
    }

    fn on_error(&self, error: &xagent_core::XAgentError) {
        eprintln!("[error] {}", error);
    }
}

async fn cmd_gui(
    instruction: String,
    screens: PathBuf,
    max_loops: Option<usize>,
    transcript: Option<PathBuf>,
    path: PathBuf,
) -> Result<()> {
    let config = XAgentConfig::load_or_default(&path).context("Failed to load settings")?;
    let mut settings = config.gui.clone();
    if let Some(max) = max_loops {
        settings.max_loop_count = max;
    }

    let model = HttpModelCaller::new(config.model.clone()).context("Failed to create model caller")?;
    let operator = ReplayOperator::new(&screens);

    let abort = CancellationToken::new();
    let ctrl_c = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping run");
            ctrl_c.cancel();
        }
    });

    let agent = GuiAgent::new(Arc::new(operator), Arc::new(model), settings)
        .with_abort_signal(&abort)
        .with_observer(Arc::new(ConsoleObserver));

    info!("Replaying screens from {}", screens.display());
    let state = agent.run(&instruction).await;

    println!();
    println!("Run {}: {}", state.run_id, state.status);
    println!("  loops:   {}", state.loop_count);
    println!("  entries: {}", state.transcript.len());
    if let Some(error) = &state.error {
        println!("  error:   {}", error);
    }

    if let Some(out) = transcript {
        let json = serde_json::to_string_pretty(&state)?;
        tokio::fs::write(&out, json)
            .await
            .with_context(|| format!("Failed to write transcript to {}", out.display()))?;
        println!("Transcript written to {}", out.display());
    }

    if state.status == AgentStatus::Error {
        bail!("GUI run failed");
    }
    Ok(())
}

/// Asks on the terminal
struct StdinConfirmer;

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(
        &self,
        call: &ToolCall,
        assessment: Option<&ApprovalResult>,
    ) -> xagent_core::Result<bool> {
        let mut stdout = tokio::io::stdout();
        let mut prompt = format!("\nTool: {}\nParams: {}\n", call.name, call.params);
        if let Some(result) = assessment {
            prompt.push_str(&format!(
                "Risk: {} ({})\nReason: {}\n",
                result.risk_level, result.detection_method, result.description
            ));
        }
        prompt.push_str("Allow? [y/N] ");
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

async fn cmd_approve(tool: String, params: String, mode: Option<ApprovalMode>, path: PathBuf) -> Result<()> {
    let config = XAgentConfig::load_or_default(&path).context("Failed to load settings")?;
    let params: serde_json::Value =
        serde_json::from_str(&params).context("--params must be a JSON object")?;
    let mode = mode.unwrap_or(config.approval.mode);

    // Without a key the AI tier fails closed; the rule tiers still work
    let api_key = resolve_api_key(&config.model).unwrap_or_else(|e| {
        warn!("{}", e);
        String::new()
    });
    let model = HttpModelCaller::with_api_key(config.model.clone(), api_key)
        .context("Failed to create model caller")?;

    let engine = ApprovalEngine::with_model(Arc::new(model), &config.approval);
    let gate = ToolGate::new(mode, engine, Arc::new(StdinConfirmer));
    let call = ToolCall::new(tool, params);

    info!("Evaluating {} in {} mode", call.name, mode);
    match gate.authorize(&call).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => bail!("{}", e),
    }
}

fn cmd_config(action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Init { path, force } => {
            let settings = XAgentConfig::settings_path(&path);
            if settings.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    settings.display()
                );
            }
            let written = XAgentConfig::write_default(&path)?;
            println!("Created {}", written.display());
            Ok(())
        }
        ConfigCommands::Show { path } => {
            let config = XAgentConfig::load_or_default(&path)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
