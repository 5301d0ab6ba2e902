//! tradedesk live market-data host - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tradedesk_llm::Provider;

/// tradedesk live market-data host
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "TRADEDESK_CONFIG", default_value = "config/default.toml")]
    config: String,

    /// Ask the assistant one question and exit instead of streaming
    #[arg(long)]
    ask: Option<String>,

    /// Assistant provider for --ask (openai or anthropic)
    #[arg(long, default_value = "openai")]
    provider: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    tradedesk_ws::init_crypto();

    let args = Args::parse();

    tradedesk_telemetry::init_logging()?;

    info!("Starting tradedesk v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %args.config, "Loading configuration");

    let config = tradedesk_app::AppConfig::from_file(&args.config)?;
    info!(
        binance_ws_url = %config.binance_ws_url,
        symbols = config.symbols.len(),
        "Configuration loaded"
    );

    let app = tradedesk_app::Application::new(config)?;

    if let Some(question) = args.ask {
        let provider: Provider = args.provider.parse()?;
        let reply = app.ask(provider, &question).await?;
        println!("{reply}");
        return Ok(());
    }

    app.run().await?;

    Ok(())
}
