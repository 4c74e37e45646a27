use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, sync::watch};
use tracing::{error, info, warn};

use crate::connection::handle_conn;
use crate::state::SharedState;

/// Stop signal shared by the accept loop, the connection tasks, the
/// console and the Ctrl-C handler.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Shutdown { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolves once shutdown has been triggered (or the signal is gone).
pub async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Failing to bind is the one fatal startup error.
pub async fn bind(addr: &str) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))?;
    info!("bound to {}", listener.local_addr()?);
    Ok(listener)
}

/// Accepts connections until shutdown, then writes a final snapshot.
pub async fn run(listener: TcpListener, state: SharedState, shutdown: Shutdown) -> anyhow::Result<()> {
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, addr)) => {
                    let st = state.clone();
                    let sd = shutdown.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) = handle_conn(socket, st, sd).await {
                            warn!("connection {addr} ended with error: {e:?}");
                        }
                    });
                }
                Err(e) => {
                    error!("accept failed: {e}");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            _ = stopped(&mut stop) => break,
        }
    }

    info!("stopping server");
    let mut st = state.write().await;
    st.sessions.disconnect_all();
    st.persist().await;
    info!("server stopped");
    Ok(())
}
