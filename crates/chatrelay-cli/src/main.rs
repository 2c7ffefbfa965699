use std::path::PathBuf;

use anyhow::Context;
use chatrelay_agents::{MemoriesProvider, RunwareProvider, ToolProvider, classify};
use chatrelay_common::{MediaRef, MediaState};
use chatrelay_config::{AppConfig, ConfigLoader};
use chatrelay_gateway::GatewayServer;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatrelay", version, about = "Chat dispatch and streaming relay service")]
struct Cli {
    /// Path to the YAML config file (default: ~/.chatrelay/config.yml)
    #[arg(short, long, global = true, env = "CHATRELAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway
    Serve,
    /// Show which tool a message would be routed to
    Classify {
        message: String,
        /// Treat these video IDs as ready uploads in the conversation
        #[arg(long = "ready-video", value_name = "ID")]
        ready_videos: Vec<String>,
    },
    /// Print the tool catalogue of both backends
    Tools,
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::new(cli.config)
        .load()
        .context("failed to load configuration")?;

    match cli.command {
        Command::Serve => {
            init_tracing(&config);
            tracing::info!("starting chatrelay {}", env!("CARGO_PKG_VERSION"));
            GatewayServer::new(config)
                .run()
                .await
                .context("gateway stopped with an error")?;
        }
        Command::Classify {
            message,
            ready_videos,
        } => {
            let media: Vec<MediaRef> = ready_videos
                .into_iter()
                .map(|id| MediaRef {
                    name: id.clone(),
                    id,
                    state: MediaState::Ready,
                })
                .collect();
            let selection = classify(&message, &media);
            println!("{}", serde_json::to_string_pretty(&selection.to_json())?);
        }
        Command::Tools => {
            let runware = RunwareProvider::from_config(&config.tools.runware);
            let memories = MemoriesProvider::from_config(&config.tools.memories);
            let providers: [&dyn ToolProvider; 2] = [&runware, &memories];
            let tools: Vec<_> = providers
                .iter()
                .flat_map(|provider| {
                    let backend = provider.backend();
                    provider.list_tools().into_iter().map(move |tool| {
                        json!({
                            "backend": backend,
                            "name": tool.name,
                            "description": tool.description,
                        })
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
    }

    Ok(())
}
