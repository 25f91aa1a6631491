//! Castway CLI - Headless stream playlist and playback tool
//!
//! Features:
//! - JSON / extended M3U playlist loading and search
//! - Protocol classification and playback planning
//! - CORS proxy settings and URL rewriting
//! - Custom playlist library
//! - Orchestrator dry runs with scripted engine events

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod dry_run;
mod output;

use castway_core::{ChannelEntryPatch, JsonFileStore, Settings};
use commands::StreamArgs;
use dry_run::ScriptedEvent;
use output::OutputFormat;

/// Castway CLI - Stream playlist toolkit
#[derive(Parser)]
#[command(name = "castway")]
#[command(version)]
#[command(about = "Playlist parsing, proxy fallback and playback planning for web streams", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Settings file
    #[arg(long, env = "CASTWAY_SETTINGS", default_value = "castway-settings.json")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a playlist (URL or file) and list its channels
    Load {
        /// Playlist URL or path
        source: String,

        /// Filter by name or group
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum number of channels to show
        #[arg(short = 'n', long, default_value = "150")]
        limit: usize,
    },

    /// Show which protocol and engine a URL gets
    Classify {
        /// Stream URL
        url: String,
    },

    /// Rewrite a URL through the proxy template
    Rewrite {
        /// Stream URL
        url: String,
    },

    /// Show the request an engine would issue for a stream
    Plan {
        #[command(flatten)]
        stream: StreamArgs,

        /// Plan the proxied path even when the proxy is disabled
        #[arg(long)]
        proxied: bool,
    },

    /// Drive the orchestrator with scripted engine events
    Simulate {
        #[command(flatten)]
        stream: StreamArgs,

        /// Comma-separated events: ready, network, media, other
        #[arg(short, long, value_delimiter = ',')]
        events: Vec<ScriptedEvent>,

        /// Pretend no HLS engine is available
        #[arg(long)]
        no_hls: bool,
    },

    /// Manage CORS proxy settings
    Proxy {
        #[command(subcommand)]
        action: ProxyAction,
    },

    /// Manage the custom playlist
    List {
        #[command(subcommand)]
        action: ListAction,
    },

    /// List built-in sample streams
    Samples,
}

#[derive(Subcommand)]
enum ProxyAction {
    /// Show current settings
    Show,
    /// Route all requests through the proxy
    Enable,
    /// Request streams directly
    Disable,
    /// Set the template (must contain {url}); omit to restore the default
    Template { template: Option<String> },
}

#[derive(Subcommand)]
enum ListAction {
    /// Show custom entries
    Show {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Add an entry
    Add {
        name: String,
        url: String,
        #[arg(long)]
        user_agent: Option<String>,
        #[arg(long)]
        cookie: Option<String>,
        #[arg(long)]
        referer: Option<String>,
    },
    /// Update fields of an entry
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
        #[arg(long)]
        cookie: Option<String>,
        #[arg(long)]
        referer: Option<String>,
    },
    /// Remove an entry
    Remove { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    castway_core::init();

    let mut settings = Settings::load(JsonFileStore::open(&cli.settings)?)?;
    let format = cli.format;

    match cli.command {
        Commands::Load { source, search, limit } => {
            commands::load(&settings, &source, search.as_deref(), limit, format).await?;
        }
        Commands::Classify { url } => {
            commands::classify(&url, format)?;
        }
        Commands::Rewrite { url } => {
            commands::rewrite(&settings, &url, format)?;
        }
        Commands::Plan { stream, proxied } => {
            commands::plan(&settings, &stream, proxied, format)?;
        }
        Commands::Simulate { stream, events, no_hls } => {
            commands::simulate(&settings, &stream, &events, no_hls, format)?;
        }
        Commands::Proxy { action } => match action {
            ProxyAction::Show => commands::proxy_show(&settings, format)?,
            ProxyAction::Enable => commands::proxy_enable(&mut settings, true)?,
            ProxyAction::Disable => commands::proxy_enable(&mut settings, false)?,
            ProxyAction::Template { template } => commands::proxy_template(&mut settings, template.as_deref())?,
        },
        Commands::List { action } => match action {
            ListAction::Show { search } => commands::list_show(&settings, search.as_deref(), format)?,
            ListAction::Add {
                name,
                url,
                user_agent,
                cookie,
                referer,
            } => commands::list_add(&mut settings, &name, &url, user_agent, cookie, referer)?,
            ListAction::Update {
                id,
                name,
                url,
                user_agent,
                cookie,
                referer,
            } => {
                let patch = ChannelEntryPatch {
                    name,
                    url,
                    user_agent,
                    cookie,
                    referer,
                };
                commands::list_update(&mut settings, &id, &patch)?;
            }
            ListAction::Remove { id } => commands::list_remove(&mut settings, &id)?,
        },
        Commands::Samples => {
            commands::show_samples(format)?;
        }
    }

    Ok(())
}
