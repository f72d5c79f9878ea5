use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use coding_agent::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use coding_agent::config::AgentConfig;
use coding_agent::providers::provider_for_id;
use coding_agent::runtime::AgentRuntime;
use coding_agent::tools::ShellTool;
use session_store::{audit_session, SessionLogger};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "coding_agent",
    version,
    about = "Headless coding agent with glass-box session logging"
)]
struct Cli {
    /// Base directory for session logs (overrides CODING_AGENT_LOG_DIR)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Model name (overrides CODING_AGENT_MODEL)
    #[arg(long)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read prompts from stdin, one per line, and log every turn (default)
    Run,
    /// Log recorded message histories, one JSON file per turn, into a new session
    Replay {
        /// History files in turn order; each holds the full history through that turn
        #[arg(required = true)]
        histories: Vec<PathBuf>,
    },
    /// Compare a session directory with its validation record
    Audit {
        /// Path to a `session_NNN` directory
        session_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = AgentConfig::from_env();
    if let Some(log_dir) = cli.log_dir {
        config.log_dir = log_dir;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_interactive(&config),
        Command::Replay { histories } => replay(&config, &histories),
        Command::Audit { session_dir } => audit(&session_dir),
    }
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn run_interactive(config: &AgentConfig) -> anyhow::Result<()> {
    let provider = provider_for_id(&config.provider_id, &config.model)
        .map_err(anyhow::Error::msg)
        .context("selecting model provider")?;
    let logger = SessionLogger::create(&config.log_dir).context("creating session")?;
    info!(dir = %logger.session().dir().display(), "session logging enabled");

    let mut runtime = AgentRuntime::new(
        provider,
        ShellTool::new(config.shell_timeout),
        logger,
        config.system_instructions.clone(),
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("reading prompt from stdin")?;
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }

        match parse_slash_command(prompt) {
            Some(SlashCommand::Quit) => break,
            Some(SlashCommand::Help) => writeln!(stdout, "{HELP_TEXT}")?,
            Some(SlashCommand::New) => {
                runtime.new_conversation();
                writeln!(stdout, "Started a new conversation.")?;
            }
            Some(SlashCommand::Unknown(command)) => {
                writeln!(stdout, "Unknown command {command}. {HELP_TEXT}")?;
            }
            None => match runtime.run_turn(prompt) {
                Ok(outcome) => {
                    for text in outcome.texts {
                        writeln!(stdout, "{text}")?;
                    }
                }
                Err(error) => warn!(%error, "turn failed"),
            },
        }
        stdout.flush()?;
    }

    Ok(())
}

fn replay(config: &AgentConfig, histories: &[PathBuf]) -> anyhow::Result<()> {
    let mut logger = SessionLogger::create(&config.log_dir).context("creating session")?;

    for path in histories {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading history {}", path.display()))?;
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing history {}", path.display()))?;
        let history = agent_provider::decode_history(value);

        let report = logger
            .log_turn(&history, &config.model, &config.system_instructions)
            .with_context(|| format!("logging history {}", path.display()))?;
        info!(
            history = %path.display(),
            records = history.len(),
            interactions = report.slots.len(),
            "history replayed"
        );
    }

    println!("{}", logger.session().dir().display());
    Ok(())
}

fn audit(session_dir: &Path) -> anyhow::Result<()> {
    let report = audit_session(session_dir)
        .with_context(|| format!("auditing {}", session_dir.display()))?;

    for divergence in &report.divergences {
        println!("{divergence}");
    }
    if !report.is_clean() {
        bail!(
            "{} divergence(s) across {} expected interactions",
            report.divergences.len(),
            report.expected
        );
    }

    println!("{} interactions match the validation record", report.expected);
    Ok(())
}
