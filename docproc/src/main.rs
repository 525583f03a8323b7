use clap::Parser;
use docproc::config::Mode;
use docproc::{Application, Config, secrets, telemetry};

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before anything else that might build a TLS client
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Parse CLI args
    let args = docproc::config::Args::parse();

    // Load configuration
    let mut config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    let mode = args.mode();

    // CloudWatch does not render ANSI colours
    telemetry::init_telemetry(config.enable_otel_export, mode == Mode::Serve)?;

    tracing::debug!("{:?}", args);

    secrets::resolve_api_keys(&mut config).await;

    let app = Application::new(config)?;
    let result = match mode {
        Mode::Serve => app.serve(shutdown_signal()).await,
        Mode::Lambda => app.run_lambda(shutdown_signal()).await,
    };

    telemetry::shutdown_telemetry();
    result
}
