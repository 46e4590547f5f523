mod classifier;
mod console;
mod mirror;
mod notifier;
mod pipeline;
mod presenter;
mod transport;

use classifier::HttpClassifier;
use hand_relay_common::channel::FrameChannel;
use hand_relay_common::config::Config;
use hand_relay_common::shutdown::Shutdown;
use hand_relay_producer::{run_producer, ProducerExit, StreamSource};
use notifier::StateNotifier;
use pipeline::ConsumerLoop;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{error, info, warn};
use transport::HttpTransport;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        stream = config.stream.url,
        mode = config.stream.mode,
        classifier = config.classifier.url,
        actuator = config.actuator.url,
        actuator_timeout_ms = config.actuator.timeout_ms,
        mirror = config.classifier.mirror,
        "starting hand-relay"
    );

    let classifier = match HttpClassifier::new(&config.classifier) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to create classifier client");
            std::process::exit(1);
        }
    };
    let transport = match HttpTransport::new(&config.actuator.url, config.actuator.timeout()) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "failed to create actuator client");
            std::process::exit(1);
        }
    };
    info!(url = transport.url(), "actuator client ready");

    let shutdown = Shutdown::new();
    console::spawn_shutdown_listeners(&shutdown);

    // Capture task
    let channel = Arc::new(FrameChannel::new());
    let producer = {
        let channel = Arc::clone(&channel);
        let listener = shutdown.subscribe();
        let stream = config.stream.clone();
        tokio::spawn(async move {
            match StreamSource::open(&stream).await {
                Ok(source) => run_producer(source, channel, listener).await,
                Err(e) => {
                    error!(error = %e, "failed to open video source, capture stopped");
                    ProducerExit::SourceFailed(e)
                }
            }
        })
    };

    // Preview server
    let (publisher, preview_server) = if config.preview.enabled {
        let (publisher, feed) = hand_relay_preview::channel();
        let bind = config.preview.bind.clone();
        let server_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = hand_relay_preview::serve(&bind, feed, server_shutdown).await {
                error!(error = %e, "preview unavailable");
            }
        });
        (Some(publisher), Some(handle))
    } else {
        (None, None)
    };

    info!("entering processing loop");
    let consumer = ConsumerLoop::new(
        channel,
        classifier,
        StateNotifier::new(transport, config.actuator.timeout()),
        publisher,
        config.classifier.mirror,
        config.consumer.idle_wait(),
    );
    let last_confirmed = consumer.run(shutdown.subscribe()).await;

    // The loop only returns on shutdown; make sure capture sees it too.
    shutdown.trigger();
    let mut exit_code = capture_exit_code(producer.await);
    if let Some(handle) = preview_server {
        if let Err(e) = handle.await {
            error!(error = %e, "preview task panicked");
            exit_code = 1;
        }
    }

    info!(
        last_confirmed = last_confirmed.map(|s| s.label()),
        exit_code,
        "hand-relay stopped"
    );

    // The stdin reader sits in a blocking read that the runtime cannot
    // cancel; exit explicitly now that capture has released its source.
    std::process::exit(exit_code);
}

/// Log how capture ended and pick the exit code; only a panic is non-zero.
fn capture_exit_code(joined: Result<ProducerExit, JoinError>) -> i32 {
    match joined {
        Ok(ProducerExit::Shutdown) => {
            info!("capture stopped");
            0
        }
        Ok(ProducerExit::SourceFailed(e)) => {
            warn!(error = %e, "capture had already failed");
            0
        }
        Err(e) => {
            error!(error = %e, "capture task panicked");
            1
        }
    }
}
