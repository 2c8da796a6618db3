//! backstop - LLM provider failover gateway
//!
//! A local gateway that keeps text generation available by routing each
//! request through a prioritized provider list with bounded retries.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backstop::config::{Config, KeySource};

#[derive(Parser)]
#[command(name = "backstop")]
#[command(about = "LLM provider failover gateway")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },

    /// Show configured providers in priority order
    Providers {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

/// Initialize tracing. `RUST_LOG` wins when set; otherwise the given level
/// applies to the backstop target.
fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "backstop={},tower_http=info",
                    level
                ))
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let (mut cfg, key_sources) = Config::from_file_with_env(&config)?;
            init_tracing(&cfg.logging.level);
            tracing::info!(config = %config, "Configuration loaded");

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Overriding listen address");
                cfg.server.listen = addr;
            }

            backstop::gateway::run_server(cfg, key_sources).await
        }

        Commands::Check { config } => {
            init_tracing("info");
            let (cfg, key_sources) = Config::from_file_with_env(&config)?;
            println!("Configuration OK: {} provider(s)", cfg.providers.len());
            print_providers(&cfg, &key_sources);
            Ok(())
        }

        Commands::Providers { config } => {
            init_tracing("info");
            let (cfg, key_sources) = Config::from_file_with_env(&config)?;
            print_providers(&cfg, &key_sources);
            Ok(())
        }
    }
}

fn print_providers(config: &Config, key_sources: &[(String, KeySource)]) {
    for (priority, p) in config.providers.iter().enumerate() {
        let role = if priority == 0 { "primary" } else { "fallback" };
        let key_source = key_sources
            .iter()
            .find(|(name, _)| name == &p.name)
            .map(|(_, source)| source.to_string())
            .unwrap_or_else(|| "none".to_string());
        println!(
            "  {}. {} [{}] kind={} model={} url={} key={}",
            priority + 1,
            p.name,
            role,
            p.kind,
            p.model.as_deref().unwrap_or("(default)"),
            p.url.as_deref().unwrap_or("(default)"),
            key_source,
        );
    }
    if !config.failover.enabled {
        println!("  note: failover disabled; only the primary will be attempted");
    }
}
