use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linear_tools::auth::callback;
use linear_tools::{tools, Config, Dispatcher, SessionState};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    env!("LINEAR_TOOLS_VERSION_SUFFIX")
);

#[derive(Parser)]
#[command(name = "linear-tools")]
#[command(author, version = VERSION, about = "Linear issue tracker operations as callable tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available tools as JSON
    Tools,

    /// Call one tool and print its JSON result
    Call {
        /// Tool name (e.g., linear_create_issue)
        tool: String,

        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,
    },

    /// Print the OAuth authorization URL for the configured client
    AuthUrl,

    /// Run the OAuth flow in the browser and store the tokens
    Login {
        /// Seconds to wait for the browser redirect
        #[arg(long, default_value = "120")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON results
    let filter = if cli.verbose {
        "linear_tools=debug"
    } else {
        "linear_tools=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Tools => {
            println!("{}", serde_json::to_string_pretty(tools::catalogue())?);
        }
        Commands::Call { tool, args } => {
            let args: serde_json::Value =
                serde_json::from_str(&args).context("Tool arguments must be valid JSON")?;
            let config = Config::load()?;
            let mut dispatcher = Dispatcher::from_config(&config)?;
            let result = dispatcher.call(&tool, args).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::AuthUrl => {
            let config = Config::load()?;
            let dispatcher = Dispatcher::from_config(&config)?;
            println!("{}", dispatcher.session().authorization_url()?);
        }
        Commands::Login { timeout } => {
            run_login(Duration::from_secs(timeout)).await?;
        }
    }

    Ok(())
}

async fn run_login(timeout: Duration) -> Result<()> {
    let config = Config::load()?;
    let redirect_uri = config
        .oauth
        .redirect_uri
        .clone()
        .context("No OAuth redirect_uri configured (set LINEAR_REDIRECT_URI)")?;
    let mut dispatcher = Dispatcher::from_config(&config)?;

    if let SessionState::Authenticated(mode) = dispatcher.session().state() {
        println!("Already authenticated with {}.", mode);
        return Ok(());
    }

    let url = dispatcher.session().authorization_url()?;
    println!("Opening browser for authentication...");
    println!();
    println!("If the browser doesn't open automatically, visit:");
    println!("{}", url);
    println!();

    if let Err(e) = open::that(&url) {
        tracing::warn!("Failed to open browser: {}", e);
    }

    let code = callback::wait_for_code(&redirect_uri, timeout).await?;
    println!("Exchanging authorization code for tokens...");
    dispatcher.session_mut().handle_callback(&code).await?;
    println!("Authenticated.");
    Ok(())
}
