use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use whisker::chat::{ChatClient, ConversationLog, Role};
use whisker::db::{self, HistoryRepo, PrefsRepo};
use whisker::Config;

/// Whisker - streaming chat client with voice session plumbing
#[derive(Parser)]
#[command(name = "whisker", version, about)]
struct Cli {
    /// Path to a config file (defaults to the platform config dir)
    #[arg(short, long, env = "WHISKER_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config)
    #[arg(long, env = "WHISKER_BACKEND_URL")]
    backend: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Reset the backend conversation and clear local history
    Reset,
    /// Show persisted conversation history
    History {
        /// Number of most recent turns to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Get or set a stored preference
    Pref {
        /// Preference key (e.g. "theme", "voice_output")
        key: String,
        /// Value to store; omit to read
        value: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,whisker=info",
        1 => "info,whisker=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.backend_url = backend;
    }

    let pool = db::init(config.data_dir.join("whisker.db"))?;
    let history = HistoryRepo::new(pool.clone());
    let client = ChatClient::new(&config.backend_url)?;

    match cli.command {
        Some(Command::Reset) => {
            client.reset().await?;
            history.clear()?;
            println!("Conversation reset");
            Ok(())
        }
        Some(Command::History { limit }) => {
            let turns = history.list()?;
            let start = turns.len().saturating_sub(limit);
            for turn in &turns[start..] {
                println!(
                    "[{}] {}: {}",
                    turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    turn.role.as_str(),
                    turn.text
                );
            }
            Ok(())
        }
        Some(Command::Pref { key, value }) => {
            let prefs_repo = PrefsRepo::new(pool);
            if let Some(value) = value {
                prefs_repo.set(&key, &value)?;
                println!("{key} = {value}");
            } else {
                match prefs_repo.get(&key)? {
                    Some(value) => println!("{key} = {value}"),
                    None => println!("{key} is not set"),
                }
            }
            Ok(())
        }
        None => repl(&client, history).await,
    }
}

/// Line-oriented streaming chat loop.
async fn repl(client: &ChatClient, history: HistoryRepo) -> anyhow::Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let mut log = ConversationLog::with_repo(history);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Connected. Type a message (Ctrl-D to quit).");
    print_prompt()?;
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            print_prompt()?;
            continue;
        }

        log.append(Role::User, message);
        let mut stream = client.stream_message(message).await?;
        while let Some(delta) = stream.next_delta().await? {
            if let Some(content) = delta.content {
                print!("{content}");
                std::io::stdout().flush()?;
            }
            if let Some(error) = delta.error {
                tracing::warn!(error = %error, "backend reported an error");
            }
        }
        println!();
        log.append(Role::Assistant, stream.full_text());
        print_prompt()?;
    }
    Ok(())
}

fn print_prompt() -> std::io::Result<()> {
    print!("> ");
    std::io::stdout().flush()
}
