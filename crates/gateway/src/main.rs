mod api;
mod bootstrap;
mod cli;
mod state;

use clap::Parser;
use cw_domain::config::ConfigSeverity;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            run_server(cli::load_config()).await
        }
        Some(Command::Doctor) => {
            let config = cli::load_config();
            let passed = cli::doctor::run(&config).await;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = cli::load_config();
            if !cli::config::validate(&config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            cli::config::show(&cli::load_config());
            Ok(())
        }
        Some(Command::Version) => {
            println!("casewire {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cw_gateway=debug")))
        .json()
        .init();
}

async fn run_server(config: cw_domain::config::Config) -> anyhow::Result<()> {
    tracing::info!(role = ?config.server.role, "casewire starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if config.has_fatal_errors() {
        anyhow::bail!("config validation failed with {} error(s)", issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count());
    }

    let bind_addr = config.server.bind_addr.clone();
    let rate_limit = config.server.rate_limit;
    let state = bootstrap::build_app_state(config).await?;
    bootstrap::spawn_background_tasks(state.clone());

    let cors = CorsLayer::permissive();
    let router = api::router(state.clone()).with_state(state).layer(cors);

    let governor_layer = rate_limit.map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(requests_per_second = rl.requests_per_second, burst_size = rl.burst_size, "per-IP rate limiting enabled");
        GovernorLayer { config: std::sync::Arc::new(gov_config) }
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (set RATE_LIMIT_RPS and RATE_LIMIT_BURST to enable)");
    }
    let app = match governor_layer {
        Some(gov) => router.layer(gov),
        None => router,
    };

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "casewire listening");
    axum::serve(listener, app).await?;
    Ok(())
}
