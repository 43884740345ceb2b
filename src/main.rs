use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use dendrite::{
    GatewayService, HttpHandler, RequestForwarder, UpstreamClientAdapter, build_router,
    config::models::GatewayConfig,
    metrics,
    ports::http_client::HttpClient,
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    // Determine the command to run
    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config), // Default to serve with config from args
    };

    match command {
        "validate" => {
            return validate_config_command(&config_path).await;
        }
        "init" => {
            return init_config_command(&config_path).await;
        }
        "serve" => {
            // Continue with normal server startup
        }
        _ => unreachable!(),
    }

    // Configure tracing_subscriber for JSON output
    tracing_setup::init_tracing().map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    // Register metric descriptions
    metrics::init_metrics().map_err(|e| eyre!("Failed to initialize metrics: {}", e))?;

    tracing::info!("Loading configuration from {config_path}");

    let config: GatewayConfig = dendrite::config::loader::load_config(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    dendrite::config::GatewayConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration: {e}"))?;

    let config = Arc::new(config);

    let http_client: Arc<dyn HttpClient> =
        Arc::new(UpstreamClientAdapter::new().context("Failed to create HTTP client adapter")?);

    let gateway_service = Arc::new(GatewayService::new(config.clone()));
    let forwarder = RequestForwarder::new(http_client, &config);
    let http_handler = Arc::new(HttpHandler::new(gateway_service, forwarder));

    // Create graceful shutdown manager
    let graceful_shutdown = Arc::new(GracefulShutdown::new());

    // Start signal handler for graceful shutdown
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;

    tracing::info!(
        "Starting Dendrite API gateway on {} (upstream: {})",
        config.listen_addr,
        config.upstream.base_url
    );

    println!(
        "Dendrite API gateway listening on {} (upstream: {})",
        config.listen_addr, config.upstream.base_url
    );
    println!(
        "Health check endpoint: http://{}/health",
        config.listen_addr
    );

    let app = build_router(http_handler);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run the server until a shutdown signal arrives
    let shutdown = graceful_shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown.wait_for_shutdown_signal().await;
            tracing::info!("Shutdown signal received: {:?}", reason);
        })
        .await
        .context("Server error")?;

    // Shutdown tracing on exit
    tracing_setup::shutdown_tracing();

    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    use dendrite::config::{GatewayConfigValidator, loader::load_config};

    println!("🔍 Validating configuration file: {config_path}");

    // First check if file exists and is readable
    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    // Try to parse the configuration
    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    // Validate the configuration
    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Upstream: {}", config.upstream.base_url);
            println!("   • Public Base URL: {}", config.public_base_url);
            println!(
                "   • Default Limits: {}/minute, {}/day",
                config.default_limits.per_minute, config.default_limits.per_day
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all URLs start with http:// or https://");
            println!("   • Verify listen address format (e.g., '127.0.0.1:7000')");
            println!("   • Set a non-empty admin_key and upstream.api_key");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Dendrite API Gateway Configuration

# The address to listen on
listen_addr = "127.0.0.1:7000"

# Shared secret for /admin endpoints
admin_key = "change-me"

# Externally visible base URL of this gateway; rewritten resource URLs in
# proxied responses point here
public_base_url = "http://127.0.0.1:7000"

# The single upstream API fronted by this gateway
[upstream]
base_url = "https://api.example.com/v1"
api_key = "sk-upstream-key"

# Limits applied to clients registered without explicit limits
[default_limits]
perMinute = 10
perDay = 1000
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'dendrite serve --config {config_path}' to start the gateway");
    Ok(())
}
