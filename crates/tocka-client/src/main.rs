//! # tocka
//!
//! Terminal chat client. Select a recipient with `@user` or `#group`, then
//! type to send. Commands start with `!`: `addGroup`, `addUser`,
//! `removeUser`, `upload`, `listUsers`, `listGroups`. `/quit` or end of
//! input exits.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use tocka_broker::{AmqpBroker, Broker, ControlPlane, ManagementClient};
use tocka_client::{init_tracing, ClientConfig, ConsoleView, Session};
use tocka_shared::constants::APP_NAME;

const INPUT_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let mut config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let mut lines = spawn_stdin_reader();

    if config.username.is_empty() {
        let mut out = tokio::io::stdout();
        out.write_all(b"User: ").await?;
        out.flush().await?;
        config.username = lines
            .recv()
            .await
            .map(|line| line.trim().to_string())
            .context("no username given")?;
    }

    let amqp = AmqpBroker::connect(&config.broker)
        .await
        .context("failed to connect to the broker")?;
    let broker: Arc<dyn Broker> = Arc::new(amqp);

    let control_plane: Option<Arc<dyn ControlPlane>> = match ManagementClient::from_config(&config.broker) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!(error = %e, "Management API unavailable, membership listing disabled");
            None
        }
    };

    let mut session = Session::start(broker.clone(), control_plane, &config, ConsoleView)
        .await
        .context("failed to start session")?;
    session.run(lines).await;

    if let Err(e) = broker.close().await {
        warn!(error = %e, "Closing broker connection");
    }
    info!("Bye");
    Ok(())
}

/// Forward stdin lines to the coordinator. The channel closes at end of
/// input.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(INPUT_BUFFER);
    tokio::spawn(async move {
        let mut reader = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match reader.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Reading stdin");
                    break;
                }
            }
        }
    });
    rx
}
