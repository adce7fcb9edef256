mod comm;
mod console;
mod eval;
mod executor;
mod history;
mod inspect;
mod output;
mod settings;

use comm::{Comm, CommConfig};
use console::{Console, DaemonConfig};
use tokio::signal;
use tracing::{Level, error, info};
use tracing_subscriber::fmt;

/// Single-threaded runtime: snippet values are not `Send`, so requests are
/// served on the main task while the transport runs alongside it
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_max_level(Level::DEBUG)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting opconsole daemon...");

    let daemon_config = DaemonConfig::from_env();
    let comm_config = CommConfig {
        listen_addr: daemon_config.listen_addr.clone(),
        listen_port: daemon_config.listen_port,
        ..CommConfig::default()
    };

    info!(
        home = %daemon_config.home.display(),
        port = comm_config.listen_port,
        "Configuration loaded"
    );

    let (comm, mut user_rx) = Comm::new(comm_config).await?;
    info!(addr = %comm.local_addr()?, "Comm initialized");

    let console = Console::new(&daemon_config);

    let comm_handle = tokio::spawn(async move {
        if let Err(e) = comm.run().await {
            error!(error = %e, "Comm server error");
        }
    });

    info!("Entering main loop...");

    loop {
        tokio::select! {
            Some(req) = user_rx.recv() => {
                console.handle_user_request(req).await;
            }
            _ = async {
                signal::ctrl_c().await.ok();
            } => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!("Shutting down...");
    comm_handle.abort();

    info!("Goodbye!");
    Ok(())
}
