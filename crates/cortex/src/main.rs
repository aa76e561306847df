// SPDX-FileCopyrightText: 2026 Cortex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cortex - context and orchestration engine for multi-agent chat.
//!
//! This is the binary entry point.

mod commands;
mod runtime;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cortex_agent::{ResponseStyle, Strategy};
use cortex_core::types::{AgentRole, ProviderKind};

/// Cortex - context and orchestration engine for multi-agent chat.
#[derive(Parser, Debug)]
#[command(name = "cortex", version, about, long_about = None)]
struct Cli {
    /// Configuration file to load instead of the default search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scheduler (batch extraction, memory expiry) until stopped.
    Serve,
    /// Send one chat message and print the reply.
    Chat {
        #[arg(long, default_value = "default")]
        tenant: String,
        /// Continue an existing session.
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        strategy: Option<Strategy>,
        /// Route to one agent by id (forces the single strategy).
        #[arg(long)]
        agent: Option<String>,
        /// Agent ids for `parallel` and `chain`, comma-separated, in chain order.
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,
        #[arg(long)]
        style: Option<ResponseStyle>,
        /// Print the reply as it is generated.
        #[arg(long)]
        stream: bool,
        message: String,
    },
    /// Process queued conversation turns now.
    Extract {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show engine health.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Manage agents.
    #[command(subcommand)]
    Agents(AgentCommands),
    /// Inspect and edit long-term memory.
    #[command(subcommand)]
    Memory(MemoryCommands),
}

#[derive(Subcommand, Debug)]
enum AgentCommands {
    List {
        tenant: String,
        /// Include disabled agents.
        #[arg(long)]
        all: bool,
    },
    Add {
        tenant: String,
        name: String,
        role: AgentRole,
        provider: ProviderKind,
        model: String,
        #[arg(long)]
        system_prompt: Option<String>,
        /// Environment variable holding the agent's API key.
        #[arg(long, value_name = "VAR")]
        api_key_env: Option<String>,
    },
    Remove {
        tenant: String,
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum MemoryCommands {
    Search {
        tenant: String,
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    Store {
        tenant: String,
        content: String,
        #[arg(long)]
        importance: Option<f32>,
    },
    Clear {
        tenant: String,
        /// Only memories extracted from this session.
        #[arg(long)]
        session: Option<String>,
    },
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cortex={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => cortex_config::load_and_validate_path(path),
        None => cortex_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            cortex_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.engine.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Chat {
            tenant,
            session,
            strategy,
            agent,
            agents,
            style,
            stream,
            message,
        }) => {
            let args = commands::ChatArgs {
                tenant,
                session,
                strategy,
                agent,
                agents,
                style,
                stream,
                message,
            };
            commands::run_chat(config, args).await
        }
        Some(Commands::Extract { limit }) => commands::run_extract(config, limit).await,
        Some(Commands::Status { json }) => commands::run_status(config, json).await,
        Some(Commands::Agents(cmd)) => match cmd {
            AgentCommands::List { tenant, all } => commands::list_agents(config, &tenant, all).await,
            AgentCommands::Add {
                tenant,
                name,
                role,
                provider,
                model,
                system_prompt,
                api_key_env,
            } => {
                let args = commands::AddAgentArgs {
                    tenant,
                    name,
                    role,
                    provider,
                    model,
                    system_prompt,
                    api_key_env,
                };
                commands::add_agent(config, args).await
            }
            AgentCommands::Remove { tenant, id } => commands::remove_agent(config, &tenant, &id).await,
        },
        Some(Commands::Memory(cmd)) => match cmd {
            MemoryCommands::Search { tenant, query, limit } => {
                commands::search_memory(config, &tenant, &query, limit).await
            }
            MemoryCommands::Store {
                tenant,
                content,
                importance,
            } => commands::store_memory(config, &tenant, content, importance).await,
            MemoryCommands::Clear { tenant, session } => {
                commands::clear_memory(config, &tenant, session.as_deref()).await
            }
        },
        None => {
            println!("cortex: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("cortex: {e}");
        std::process::exit(1);
    }
}
