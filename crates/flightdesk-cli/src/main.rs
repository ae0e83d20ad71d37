use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use flightdesk_bus::{EventBus, Topic};
use flightdesk_core::{
    load_config, BotSettings, FlightBot, FlightdeskConfig, InMemoryTicketLedger,
    KeywordRecognizer,
};
use flightdesk_gateway::{BusTransport, Gateway, RateLimitConfig, RateLimiter};
use flightdesk_memory::{InMemoryStateStore, SqliteStateStore, StateStore};
use flightdesk_schema::{BusMessage, InboundMessage};
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const CHANNEL: &str = "repl";
const USER: &str = "user:local";

#[derive(Parser)]
#[command(name = "flightdesk", version, about = "flightdesk ticket-purchase bot")]
struct Cli {
    #[arg(
        long,
        default_value = ".",
        help = "Config root directory (contains config/, data/ and logs/)"
    )]
    config_root: PathBuf,

    #[arg(long, global = true, help = "Keep conversation state in memory instead of SQLite")]
    in_memory: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Talk to the bot from the terminal")]
    Repl {
        #[arg(long, default_value = "repl:0", help = "Conversation scope to use")]
        conversation: String,
    },
    #[command(about = "Play a transcript file, one user message per line")]
    Replay {
        #[arg(help = "Transcript path")]
        file: PathBuf,
        #[arg(long, default_value = "replay:0", help = "Conversation scope to use")]
        conversation: String,
    },
    #[command(about = "Validate config files")]
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.config_root.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "flightdesk.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Validate => {
            let config = load_config(&cli.config_root.join("config"))?;
            println!(
                "Config valid. {} intents, {} suggested queries, rate limit {}/min.",
                config.recognizer.intents.len(),
                config.main.dialog.suggested_queries.len(),
                config.main.rate_limit.requests_per_minute
            );
        }
        Commands::Repl { conversation } => {
            let mut session = Session::bootstrap(&cli.config_root, cli.in_memory, &conversation).await?;
            run_repl(&mut session).await?;
        }
        Commands::Replay { file, conversation } => {
            let mut session = Session::bootstrap(&cli.config_root, cli.in_memory, &conversation).await?;
            run_replay(&mut session, &file).await?;
        }
    }

    Ok(())
}

/// One terminal conversation wired through the gateway.
struct Session {
    gateway: Gateway,
    replies: mpsc::Receiver<BusMessage>,
    conversation: String,
    _bus: Arc<EventBus>,
}

impl Session {
    async fn bootstrap(root: &Path, in_memory: bool, conversation: &str) -> Result<Self> {
        let config = load_config(&root.join("config"))?;
        let store = open_state_store(root, in_memory)?;
        Self::from_config(config, store, conversation).await
    }

    async fn from_config(
        config: FlightdeskConfig,
        store: Arc<dyn StateStore>,
        conversation: &str,
    ) -> Result<Self> {
        let bus = Arc::new(EventBus::new(256));
        let replies = bus.subscribe(Topic::ReplyReady).await;
        let publisher = bus.publisher();

        let bot = FlightBot::builder()
            .recognizer(Arc::new(KeywordRecognizer::new(config.recognizer.clone())))
            .state_store(store)
            .transport(Arc::new(BusTransport::new(publisher.clone())))
            .record_sink(Arc::new(InMemoryTicketLedger::new()))
            .settings(BotSettings::from_config(&config))
            .max_concurrent(config.main.runtime.max_concurrent)
            .build()?;

        let rate_limiter = RateLimiter::new(RateLimitConfig::from(&config.main.rate_limit));
        tracing::info!(app = %config.main.app.name, env = %config.main.app.env, "flightdesk ready");

        Ok(Self {
            gateway: Gateway::new(Arc::new(bot), publisher, rate_limiter),
            replies,
            conversation: conversation.to_string(),
            _bus: bus,
        })
    }

    /// Sends one line and returns the rendered replies.
    async fn say(&mut self, line: &str) -> Result<Vec<String>> {
        let inbound = parse_line(&self.conversation, line)?;
        self.gateway.handle_inbound(inbound).await?;

        let mut rendered = Vec::new();
        while let Ok(msg) = self.replies.try_recv() {
            if let BusMessage::ReplyReady { outbound } = msg {
                rendered.push(outbound.activity.render());
            }
        }
        Ok(rendered)
    }
}

fn open_state_store(root: &Path, in_memory: bool) -> Result<Arc<dyn StateStore>> {
    if in_memory {
        return Ok(Arc::new(InMemoryStateStore::new()));
    }

    let db_path = root.join("data/flightdesk.db");
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteStateStore::open(db_path.to_str().unwrap_or("data/flightdesk.db"))
        .with_context(|| format!("opening state store {}", db_path.display()))?;
    Ok(Arc::new(store))
}

/// Lines starting with `{` are card submissions; anything else is typed text.
fn parse_line(conversation: &str, line: &str) -> Result<InboundMessage> {
    let line = line.trim();
    if line.starts_with('{') {
        let value: serde_json::Value =
            serde_json::from_str(line).context("card input is not valid JSON")?;
        return Ok(InboundMessage::text(CHANNEL, conversation, USER, "").with_value(value));
    }
    Ok(InboundMessage::text(CHANNEL, conversation, USER, line))
}

async fn run_repl(session: &mut Session) -> Result<()> {
    println!("flightdesk REPL. Type 'quit' to exit.");
    println!("---");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input == "quit" || input == "exit" {
            break;
        }
        if input.is_empty() {
            continue;
        }

        match session.say(input).await {
            Ok(replies) => print_replies(&replies),
            Err(err) => eprintln!("Error: {err}"),
        }
    }

    Ok(())
}

async fn run_replay(session: &mut Session, file: &Path) -> Result<()> {
    let reader = std::io::BufReader::new(
        std::fs::File::open(file).with_context(|| format!("opening {}", file.display()))?,
    );
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        println!("> {line}");
        let replies = session
            .say(line)
            .await
            .with_context(|| format!("replaying {line:?}"))?;
        print_replies(&replies);
    }
    Ok(())
}

fn print_replies(replies: &[String]) {
    for reply in replies {
        println!("{reply}");
    }
}
