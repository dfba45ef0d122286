//! SMS Forwarder - Command-line interface
//!
//! Manages the persisted forwarding rules and feeds inbound messages to the
//! router, either one at a time or as JSON lines on stdin.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use sms_forwarder::forwarding::FileBlobStore;
use sms_forwarder::{Dispatcher, ForwarderSettings, InboundMessage, MessageRouter, RuleDraft, RuleId, RuleStore};

/// Rule-based SMS forwarding.
#[derive(Parser)]
#[command(name = "sms-forwarder")]
#[command(about = "Match inbound short messages against forwarding rules and fan them out")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (JSON); defaults are used when it does not exist
    #[arg(long, env = "SMS_FORWARDER_CONFIG", default_value = "sms-forwarder.json", global = true)]
    config: PathBuf,

    /// Directory holding the persisted rules, overrides the settings file
    #[arg(long, env = "SMS_FORWARDER_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SMS_FORWARDER_LOG", default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage forwarding rules
    Rules {
        #[command(subcommand)]
        command: RuleCommands,
    },

    /// Route a single inbound message
    Route {
        #[arg(long)]
        sender: String,
        #[arg(long)]
        body: String,
    },

    /// Route inbound messages read as JSON lines from stdin
    Serve,

    /// Show or change the settings file
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print the effective settings
    Show,
    /// Apply a partial JSON document and write the settings file
    Set { json: String },
}

#[derive(Subcommand)]
enum RuleCommands {
    /// List rules in match order
    List,
    /// Append a new rule
    Add(RuleArgs),
    /// Replace the rule with the given id
    Update {
        id: RuleId,
        #[command(flatten)]
        rule: RuleArgs,
    },
    /// Delete the rule with the given id
    Delete { id: RuleId },
    /// Show every rule carrying a (number, word) filter pair
    Find {
        #[arg(long, default_value = "")]
        number: String,
        #[arg(long, default_value = "")]
        word: String,
    },
}

#[derive(Args)]
struct RuleArgs {
    /// Substring of the sender address
    #[arg(long, default_value = "")]
    number: String,
    /// Substring of the message body
    #[arg(long, default_value = "")]
    word: String,
    /// Body rewrite, "before -> after"
    #[arg(long, default_value = "")]
    substitution: String,
    /// Destination number, repeat for fan-out
    #[arg(long = "to", required = true)]
    to: Vec<String>,
}

impl From<RuleArgs> for RuleDraft {
    fn from(args: RuleArgs) -> Self {
        RuleDraft::new(args.number, args.word, args.substitution, args.to)
    }
}

/// Application state for the forwarder
struct AppState {
    store: Arc<RuleStore>,
    router: MessageRouter,
}

impl AppState {
    fn new(settings: &ForwarderSettings) -> Result<Self> {
        let blobs = Arc::new(FileBlobStore::new(settings.data_dir.clone()));
        let store = Arc::new(RuleStore::with_key(blobs, settings.rules_key.clone()));

        let transport = settings.build_transport()?;
        let dispatcher = Dispatcher::new(transport, settings.dispatcher_config());
        let router = MessageRouter::new(store.clone(), dispatcher);

        Ok(Self { store, router })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to encode output")?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level.as_str()))
        .init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = ForwarderSettings::load(&cli.config)?;

    if let Commands::Settings { command } = cli.command {
        return run_settings_command(settings, &cli.config, cli.data_dir, command);
    }
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }

    info!("Using rule store at {}", settings.data_dir.display());
    let state = AppState::new(&settings)?;

    match cli.command {
        Commands::Rules { command } => run_rule_command(&state, command).await,
        Commands::Route { sender, body } => {
            let outcome = state.router.route(InboundMessage::new(sender, body)).await;
            print_json(&outcome)
        }
        Commands::Serve => serve(&state).await,
        Commands::Settings { .. } => Ok(()),
    }
}

fn run_settings_command(
    mut settings: ForwarderSettings,
    path: &Path,
    data_dir: Option<PathBuf>,
    command: SettingsCommands,
) -> Result<()> {
    match command {
        SettingsCommands::Show => {
            if let Some(data_dir) = data_dir {
                settings.data_dir = data_dir;
            }
            print_json(&settings.to_json())
        }
        SettingsCommands::Set { json } => {
            let update = serde_json::from_str(&json).context("Settings update is not valid JSON")?;
            settings.update_from_json(update)?;
            settings.save(path)?;
            print_json(&settings.to_json())
        }
    }
}

async fn run_rule_command(state: &AppState, command: RuleCommands) -> Result<()> {
    match command {
        RuleCommands::List => print_json(&state.store.list_rules().await),
        RuleCommands::Add(rule) => {
            let rule = state.store.add_rule(rule.into()).await?;
            print_json(&rule)
        }
        RuleCommands::Update { id, rule } => {
            let rule = state.store.update_rule(id, rule.into()).await?;
            print_json(&rule)
        }
        RuleCommands::Delete { id } => {
            let rule = state.store.delete_rule(id).await?;
            print_json(&rule)
        }
        RuleCommands::Find { number, word } => {
            print_json(&state.store.find_by_filters(&number, &word).await)
        }
    }
}

async fn serve(state: &AppState) -> Result<()> {
    info!("Reading inbound messages from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message: InboundMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping malformed inbound message: {}", e);
                println!("{}", serde_json::json!({ "error": e.to_string() }));
                continue;
            }
        };

        let outcome = state.router.route(message).await;
        println!("{}", serde_json::to_string(&outcome).context("Failed to encode outcome")?);
    }

    info!("Input closed, statistics: {}", state.router.get_statistics().await);
    Ok(())
}
