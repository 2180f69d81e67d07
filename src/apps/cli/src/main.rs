//! Chatloom CLI
//!
//! Terminal front end for the streaming chat core: creates backend sessions
//! and streams a reply to a single message.

mod logging;
mod output;

use anyhow::{anyhow, bail, Context, Result};
use chatloom_core::{ChatClientConfig, ChatRuntime, TurnOutcome};
use chatloom_core_types::ArtifactTemplateItem;
use clap::{Parser, Subcommand};
use output::StreamPrinter;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chatloom-cli")]
#[command(about = "Stream chat replies from a Chatloom backend", long_about = None)]
#[command(version)]
struct Cli {
    /// Backend base URL (overrides config file and CHATLOOM_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Assistant type sent with each message
    #[arg(long, global = true)]
    assistant_type: Option<String>,

    /// Path to a config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a backend session and print its id
    Session,

    /// Send one message and stream the reply
    Send {
        /// Message text
        #[arg(required = true)]
        text: Vec<String>,

        /// Artifact template entry as STAGE:KEY[:NAME], repeatable
        #[arg(long = "artifact", value_parser = parse_template_item)]
        artifacts: Vec<ArtifactTemplateItem>,

        /// Stage whose artifact is printed after the reply
        #[arg(long)]
        stage: Option<String>,
    },
}

fn parse_template_item(value: &str) -> Result<ArtifactTemplateItem, String> {
    let mut fields = value.splitn(3, ':');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(stage), Some(key), name) if !stage.is_empty() && !key.is_empty() => Ok(
            ArtifactTemplateItem::new(stage, key, name.filter(|n| !n.is_empty()).unwrap_or(key)),
        ),
        _ => Err(format!("expected STAGE:KEY[:NAME], got '{}'", value)),
    }
}

fn load_config(cli: &Cli) -> Result<ChatClientConfig> {
    let mut config =
        ChatClientConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_cli_overrides(&mut config, cli);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn apply_cli_overrides(config: &mut ChatClientConfig, cli: &Cli) {
    if let Some(base_url) = cli.base_url.as_ref() {
        config.base_url = base_url.clone();
    }
    if let Some(assistant_type) = cli.assistant_type.as_ref() {
        config.assistant_type = assistant_type.clone();
    }
}

async fn run_session(config: ChatClientConfig) -> Result<()> {
    let runtime = ChatRuntime::new(config)?;
    let session_id = runtime
        .ensure_session()
        .await
        .context("Failed to create session")?;
    println!("{}", session_id);
    Ok(())
}

async fn run_send(
    config: ChatClientConfig,
    text: String,
    artifacts: Vec<ArtifactTemplateItem>,
    stage: Option<String>,
) -> Result<()> {
    let runtime = ChatRuntime::new(config)?;
    let has_template = !artifacts.is_empty();
    if has_template {
        runtime.set_artifact_template(artifacts).await;
    }
    if stage.is_some() {
        runtime.select_stage(stage).await?;
    }

    let mut updates = runtime.subscribe();
    let mut printer = StreamPrinter::new();
    let sender = runtime.clone();
    let mut turn = tokio::spawn(async move { sender.send_message(text).await });
    let mut stopping = false;

    let outcome = loop {
        tokio::select! {
            result = &mut turn => break result.context("Send task failed")??,
            changed = updates.changed() => {
                if changed.is_ok() {
                    printer.print(&updates.borrow_and_update());
                }
            }
            _ = tokio::signal::ctrl_c(), if !stopping => {
                stopping = true;
                log::info!("Interrupted, stopping stream");
                runtime.stop().await;
            }
        }
    };

    printer.print(&runtime.snapshot());
    printer.finish();
    runtime.flush_sync().await;

    if has_template {
        let rendered = runtime.rendered_artifact().await;
        if !rendered.is_empty() {
            println!("\n{}", rendered);
        }
    }

    match outcome {
        TurnOutcome::Finished => Ok(()),
        TurnOutcome::Cancelled => {
            eprintln!("Stopped.");
            Ok(())
        }
        TurnOutcome::Failed(message) => bail!("Reply failed: {}", message),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = logging::LogConfig::new(cli.debug);
    logging::init_logging(&log_config).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;
    logging::spawn_log_cleanup_task();
    tracing::debug!(
        "Logging initialized: level={}, session_log_dir={:?}",
        logging::level_to_str(log_config.level),
        log_config.session_log_dir
    );

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Session => run_session(config).await,
        Commands::Send {
            text,
            artifacts,
            stage,
        } => run_send(config, text.join(" "), artifacts, stage).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_template_items() {
        let item = parse_template_item("requirements:prd:Product doc").expect("valid");
        assert_eq!(item, ArtifactTemplateItem::new("requirements", "prd", "Product doc"));

        let item = parse_template_item("design:tech_spec").expect("valid");
        assert_eq!(item.name, "tech_spec");

        assert!(parse_template_item("design").is_err());
        assert!(parse_template_item(":key").is_err());
    }

    fn write_config(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "base_url = \"http://file.example.com\"\nassistant_type = \"writer\"\nidle_timeout_secs = 30\n",
        )
        .expect("write config");
        path
    }

    #[test]
    fn cli_flags_override_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(&dir);
        let cli = Cli::parse_from([
            "chatloom-cli",
            "--config",
            path.to_str().expect("utf-8 path"),
            "--base-url",
            "https://chat.example.com",
            "--assistant-type",
            "architect",
            "send",
            "hello",
            "world",
        ]);
        let mut config = ChatClientConfig::from_file(&path).expect("config");
        apply_cli_overrides(&mut config, &cli);

        assert_eq!(config.base_url, "https://chat.example.com");
        assert_eq!(config.assistant_type, "architect");
        assert_eq!(config.idle_timeout_secs, 30);
        assert!(matches!(cli.command, Commands::Send { ref text, .. } if text.len() == 2));
    }

    #[test]
    fn config_file_values_survive_without_flags() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(&dir);
        let cli = Cli::parse_from(["chatloom-cli", "session"]);
        let mut config = ChatClientConfig::from_file(&path).expect("config");
        apply_cli_overrides(&mut config, &cli);

        assert_eq!(config.base_url, "http://file.example.com");
        assert_eq!(config.assistant_type, "writer");
    }
}
