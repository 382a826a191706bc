// TABULAR SERVE - Prediction server
// HTTP server for a pre-trained tabular model

mod align;
mod config;
mod error;
mod http;
mod ml;
mod response;
mod samples;
mod service;
mod types;

use std::sync::Arc;

use log::{error, info};
use tokio::sync::oneshot;

use crate::config::ServerConfig;
use crate::http::ApiState;
use crate::service::PredictionService;

// ============================================================================
// RUNTIME
// ============================================================================

fn main() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    if let Err(error) = run_console() {
        error!("[SERVER] {}", error);
        std::process::exit(1);
    }
}

fn run_console() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!("[SERVER] Failed to listen for shutdown: {}", error);
            }
            let _ = shutdown_tx.send(());
        });

        run_until_shutdown(ServerConfig::from_env(), shutdown_rx).await
    })
}

pub async fn run_until_shutdown(
    config: ServerConfig,
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("==========================================");
    println!("=   TABULAR SERVE - STARTING             =");
    println!("==========================================\n");

    let service = PredictionService::load(&config.model_dir, &config.model_files);
    if service.is_loaded() {
        println!("[OK] Model: LOADED");
    } else {
        println!("[!!] Model: ABSENT - predictions will not work");
        println!(
            "[!!] Place a model artifact ({}) in {}",
            config.model_files.join(", "),
            config.model_dir.display()
        );
    }
    println!("[OK] API: http://{}", config.api_addr);
    println!("[OK] CORS origins: {}", config.cors_origins);
    println!("===========================================\n");

    let state = ApiState {
        service: Arc::new(service),
    };

    crate::http::serve(config, state, async move {
        let _ = shutdown_rx.await;
    })
    .await?;

    info!("[SERVER] Shut down gracefully");
    Ok(())
}
