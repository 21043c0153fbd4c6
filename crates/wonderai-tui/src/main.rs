use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use std::io::Write;
use tracing_subscriber::EnvFilter;
use wonderai_core::api::{ImageRequest, LocationQuery};
use wonderai_core::{CancellationToken, ChatClient, Config, StreamEvent, UserIdentity};

mod app;
mod handler;
mod markdown;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

const LOG_FILE: &str = "wonderai.log";
const DEFAULT_LOG_FILTER: &str = "warn,wonderai=info,wonderai_core=info";

#[derive(Parser)]
#[command(name = "wonderai", version)]
#[command(about = "Terminal client for the WonderAI chat backend")]
struct Cli {
    /// Backend base URL (overrides config and WONDERAI_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Conversation to join (overrides config and WONDERAI_CONVERSATION)
    #[arg(long, global = true)]
    conversation: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and stream the reply to stdout
    Ask {
        /// Message text
        #[arg(required = true)]
        prompt: Vec<String>,
    },
    /// Check that the backend is reachable
    Health,
    /// List your conversations
    Conversations {
        /// Maximum number of conversations
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Generate an image from a prompt
    Image {
        /// Image description
        #[arg(required = true)]
        prompt: Vec<String>,
        /// One of 256x256, 512x512, 1024x1024, 1792x1024, 1024x1792
        #[arg(short, long, default_value = "1024x1024")]
        size: String,
    },
    /// Search for places
    Places {
        /// What to look for
        #[arg(required = true)]
        query: Vec<String>,
        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.command.is_none())?;

    let mut config = Config::load().context("failed to load config")?;
    config.apply_overrides(cli.api_url, cli.conversation);
    config.validate()?;

    let identity = UserIdentity::load_or_create(&UserIdentity::default_path()?)?;

    match cli.command {
        None => run_tui(config, identity).await,
        Some(command) => {
            let client = ChatClient::from_config(&config)?;
            match command {
                Commands::Ask { prompt } => {
                    ask(&client, config.conversation_id(), identity.id(), &prompt.join(" ")).await
                }
                Commands::Health => health(&client).await,
                Commands::Conversations { limit } => {
                    list_conversations(&client, identity.id(), limit).await
                }
                Commands::Image { prompt, size } => {
                    generate_image(&client, identity.id(), prompt.join(" "), size).await
                }
                Commands::Places { query, limit } => {
                    search_places(&client, identity.id(), query.join(" "), limit).await
                }
            }
        }
    }
}

/// The TUI owns the terminal, so interactive runs log to a file.
fn init_logging(interactive: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if interactive {
        let dir = Config::config_dir()?;
        std::fs::create_dir_all(&dir)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE))
            .with_context(|| format!("failed to open log file in {}", dir.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

async fn run_tui(config: Config, identity: UserIdentity) -> Result<()> {
    let mut events = EventHandler::new();
    let mut app = App::new(config, identity, events.sender())?;
    app.load_history();

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event),
                None => break,
            }
        }
        anyhow::Ok(())
    }
    .await;

    tui::restore()?;
    result
}

async fn ask(client: &ChatClient, conversation: &str, user_id: &str, prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        anyhow::bail!("message is empty");
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut stream = client
        .stream_message(conversation, prompt.trim(), user_id, cancel)
        .await?;
    let mut stdout = std::io::stdout();
    while let Some(item) = stream.next().await {
        match item? {
            StreamEvent::Update { content, .. } => {
                write!(stdout, "{content}")?;
                stdout.flush()?;
            }
            StreamEvent::Complete { .. } => {
                writeln!(stdout)?;
            }
        }
    }
    Ok(())
}

async fn health(client: &ChatClient) -> Result<()> {
    let status = client.health().await?;
    println!("{} at {}", status.status, client.base_url());
    if let Some(version) = &status.version {
        println!("version: {version}");
    }
    if let Some(services) = &status.services {
        println!("{}", serde_json::to_string_pretty(services)?);
    }
    if !status.is_healthy() {
        anyhow::bail!("backend reports status '{}'", status.status);
    }
    Ok(())
}

async fn list_conversations(client: &ChatClient, user_id: &str, limit: u32) -> Result<()> {
    let conversations = client.list_conversations(user_id, limit, 0).await?;
    if conversations.is_empty() {
        println!("No conversations yet");
        return Ok(());
    }
    for conv in conversations {
        println!(
            "{}  {}  ({} messages)",
            conv.id, conv.title, conv.message_count
        );
    }
    Ok(())
}

async fn generate_image(client: &ChatClient, user_id: &str, prompt: String, size: String) -> Result<()> {
    let mut request = ImageRequest::new(prompt);
    request.size = size;
    request.user_id = Some(user_id.to_string());

    let image = client.generate_image(&request).await?;
    println!("{}", image.image_url);
    if let Some(revised) = &image.revised_prompt {
        println!("revised prompt: {revised}");
    }
    Ok(())
}

async fn search_places(client: &ChatClient, user_id: &str, query: String, limit: u32) -> Result<()> {
    let mut request = LocationQuery::new(query);
    request.limit = limit;
    request.user_id = Some(user_id.to_string());

    let results = client.search_locations(&request).await?;
    if results.locations.is_empty() {
        println!("No places found for '{}'", results.query);
        return Ok(());
    }
    for (i, loc) in results.locations.iter().enumerate() {
        println!(
            "{}. {} ({:.5}, {:.5})",
            i + 1,
            loc.name,
            loc.coordinates.latitude,
            loc.coordinates.longitude
        );
        if !loc.address.is_empty() {
            println!("   {}", loc.address);
        }
    }
    Ok(())
}
