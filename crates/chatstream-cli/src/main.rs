mod config;

use chatstream_agent::{Agent, OllamaAgent, ScriptedAgent};
use chatstream_client::{ChatSession, TurnResult};
use chatstream_core::Event;
use chatstream_gateway::{AuthConfig, GatewayConfig, GatewayServer};
use chatstream_session::{FileMessageStore, MessageStore};
use clap::{Parser, Subcommand};
use config::ChatStreamConfig;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatstream", about = "Streaming chat gateway and terminal client")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "chatstream.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the streaming gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Answer every request by streaming this text instead of calling the model
        #[arg(long)]
        scripted: Option<String>,
    },
    /// Chat with a running gateway from the terminal
    Chat {
        /// Gateway base URL
        #[arg(long, default_value = "http://localhost:3000")]
        url: String,
        /// Conversation to resume (a new one is started when omitted)
        #[arg(long)]
        chat_id: Option<String>,
        /// API key presented as a bearer token
        #[arg(long)]
        api_key: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Serve { .. }));

    let config = ChatStreamConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            scripted,
        } => serve(config, host, port, scripted).await,
        Commands::Chat {
            url,
            chat_id,
            api_key,
        } => chat(config, url, chat_id, api_key).await,
    }
}

async fn serve(
    config: ChatStreamConfig,
    host: Option<String>,
    port: Option<u16>,
    scripted: Option<String>,
) -> anyhow::Result<()> {
    let host = host.unwrap_or(config.server.host);
    let port = port.unwrap_or(config.server.port);

    let agent: Arc<dyn Agent> = match scripted {
        Some(text) => {
            info!("Serving scripted answers");
            let words: Vec<String> = text
                .split_inclusive(' ')
                .map(str::to_string)
                .collect();
            Arc::new(
                words
                    .into_iter()
                    .fold(ScriptedAgent::new(), ScriptedAgent::token),
            )
        }
        None => {
            info!(
                base_url = %config.model.base_url,
                model = %config.model.model_id,
                "Using Ollama model backend"
            );
            Arc::new(OllamaAgent::new(config.model))
        }
    };

    let auth = AuthConfig {
        api_keys: config.security.api_keys.clone(),
        allow_anonymous: config.security.allow_anonymous,
    };
    if auth.rejects_everyone() {
        anyhow::bail!(
            "No API keys configured: set [security] api_keys, or allow_anonymous = true to serve without keys"
        );
    }
    if auth.is_enabled() {
        info!(keys = auth.api_keys.len(), "API key auth enabled");
    }
    if auth.allow_anonymous {
        warn!("Anonymous callers are admitted");
    }

    let app = GatewayServer::build_with_config(
        agent,
        GatewayConfig {
            auth,
            stream_buffer: config.server.stream_buffer,
        },
    );

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("chatstream gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("chatstream gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

async fn chat(
    config: ChatStreamConfig,
    url: String,
    chat_id: Option<String>,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let store: Arc<dyn MessageStore> =
        Arc::new(FileMessageStore::new(config.data_dir.join("messages")).await?);
    let chat_id = chat_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut session = ChatSession::resume(&url, chat_id, store).await?;
    if let Some(key) = api_key {
        session = session.with_api_key(key);
    }

    println!("chat {} ({} earlier messages)", session.chat_id(), session.history().len());
    for msg in session.history() {
        println!("{}: {}", msg.role.as_str(), msg.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let result = session
            .send_with(&line, |event| {
                if let Event::Token { text } = event {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
                if let Event::ToolStart { tool, .. } = event {
                    println!("\n[{tool} ...]");
                }
            })
            .await?;

        match result {
            TurnResult::Skipped => continue,
            TurnResult::Answered(_) => println!(),
            TurnResult::Empty { rendering } => println!("\n{rendering}"),
            TurnResult::Failed { rendering, .. } => eprintln!("\n{rendering}"),
        }
    }

    Ok(())
}
