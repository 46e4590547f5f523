use hand_relay_common::shutdown::Shutdown;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

const QUIT_KEY: &str = "q";

/// Raise shutdown on Ctrl-C or when `q` is entered on stdin.
pub fn spawn_shutdown_listeners(shutdown: &Shutdown) {
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                if on_signal.trigger() {
                    info!("interrupt received, shutting down");
                }
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    let on_key = shutdown.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if is_quit(&line) => {
                    if on_key.trigger() {
                        info!("quit key pressed, shutting down");
                    }
                    return;
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!("stdin closed, quit key disabled");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read stdin, quit key disabled");
                    return;
                }
            }
        }
    });
}

fn is_quit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(QUIT_KEY)
}
