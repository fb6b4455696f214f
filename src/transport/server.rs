//! TCP broker server
//!
//! Responsibilities:
//! - Recover the topic store from the durable log before accepting anything
//! - Accept TCP connections and run one `Session` task per connection
//! - Enforce the connection limit
//! - Stop in stages: stop accepting, close idle sessions, give sessions
//!   awaiting an ack a grace period, then cancel what is left

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::broker::{RecoveryReport, TopicStore, TopicTable, recover};
use crate::config::Settings;
use crate::persistence::DurableLog;
use crate::transport::message::ServerFrame;
use crate::transport::session::{Session, SessionContext};
use crate::utils::error::{BrokerError, Result};

pub struct BrokerServer {
    local_addr: SocketAddr,
    store: TopicStore,
    log: DurableLog,
    recovery: RecoveryReport,
    shutdown: CancellationToken,
    accept_task: JoinHandle<Result<()>>,
}

impl BrokerServer {
    /// Recover persisted messages, bind the listener and start accepting connections.
    pub async fn start(settings: &Settings) -> Result<Self> {
        let log = DurableLog::open(&settings.broker.data_dir)?;
        let mut table = TopicTable::new();
        let recovery = recover(&log, &mut table)?;
        let store = TopicStore::spawn(table);

        let addr = format!("{}:{}", settings.server.host, settings.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(BrokerError::Fatal)?;
        let local_addr = listener.local_addr().map_err(BrokerError::Fatal)?;
        info!(data_dir = %settings.broker.data_dir, "Broker listening on {local_addr}");

        let shutdown = CancellationToken::new();
        let ctx = SessionContext {
            store: store.clone(),
            log: log.clone(),
            ack_timeout: settings.broker.ack_timeout(),
            max_frame_bytes: settings.broker.max_frame_bytes,
            shutdown: shutdown.clone(),
            abort: CancellationToken::new(),
        };
        let accept_task = tokio::spawn(accept_loop(
            listener,
            ctx,
            settings.broker.max_connections,
            settings.broker.shutdown_grace(),
        ));

        Ok(Self {
            local_addr,
            store,
            log,
            recovery,
            shutdown,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> &TopicStore {
        &self.store
    }

    pub fn log(&self) -> &DurableLog {
        &self.log
    }

    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Resolves once shutdown has begun, either through `stop` or a fatal listener error.
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await
    }

    /// Stop accepting, drain sessions and return the listener's fatal error, if any.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        match self.accept_task.await {
            Ok(result) => {
                info!("Broker stopped");
                result
            }
            Err(e) => {
                error!(error = %e, "accept loop did not finish cleanly");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for BrokerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerServer")
            .field("local_addr", &self.local_addr)
            .field("log", &self.log)
            .field("recovery", &self.recovery)
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    ctx: SessionContext,
    max_connections: usize,
    grace: Duration,
) -> Result<()> {
    let limit = Arc::new(Semaphore::new(max_connections));
    let mut sessions: JoinSet<Result<()>> = JoinSet::new();

    let result = loop {
        let accepted = tokio::select! {
            _ = ctx.shutdown.cancelled() => break Ok(()),
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                report_session(joined);
                continue;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let Ok(permit) = limit.clone().try_acquire_owned() else {
                    warn!(%peer, max_connections, "connection limit reached; refusing");
                    sessions.spawn(refuse(stream, max_connections));
                    continue;
                };
                let id = format!("session-{}", Uuid::new_v4());
                let span = info_span!("session", id = %id, %peer);
                let session = Session::new(stream, ctx.clone());
                sessions.spawn(
                    async move {
                        debug!("connected");
                        let result = session.run().await;
                        drop(permit);
                        debug!("disconnected");
                        result
                    }
                    .instrument(span),
                );
            }
            Err(e) if is_transient(&e) => {
                warn!(error = %e, "failed to accept connection");
            }
            Err(e) => {
                error!(error = %e, "listener failed; shutting down");
                ctx.shutdown.cancel();
                break Err(BrokerError::Fatal(e));
            }
        }
    };

    drop(listener);
    drain(&mut sessions, &ctx.abort, grace).await;
    result
}

/// Wait for sessions in three steps: graceful, ack waits cancelled, tasks aborted.
/// Aborted sessions still requeue through their in-flight guards.
async fn drain(sessions: &mut JoinSet<Result<()>>, abort: &CancellationToken, grace: Duration) {
    if sessions.is_empty() {
        return;
    }
    info!(sessions = sessions.len(), "waiting for sessions to finish");
    if join_all(sessions, grace).await {
        return;
    }

    warn!(remaining = sessions.len(), "grace period elapsed; cancelling ack waits");
    abort.cancel();
    if join_all(sessions, grace).await {
        return;
    }

    warn!(remaining = sessions.len(), "aborting unresponsive sessions");
    sessions.shutdown().await;
}

async fn join_all(sessions: &mut JoinSet<Result<()>>, within: Duration) -> bool {
    let joined = tokio::time::timeout(within, async {
        while let Some(joined) = sessions.join_next().await {
            report_session(joined);
        }
    })
    .await;
    joined.is_ok()
}

fn report_session(joined: std::result::Result<Result<()>, JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(BrokerError::Connection(e))) => debug!(error = %e, "session ended with a connection error"),
        Ok(Err(e)) => warn!(error = %e, "session ended with an error"),
        Err(e) if e.is_panic() => error!(error = %e, "session panicked"),
        Err(_) => {}
    }
}

async fn refuse(stream: TcpStream, max_connections: usize) -> Result<()> {
    let mut frames = Framed::new(stream, LinesCodec::new());
    let frame = ServerFrame::error(format!("connection limit of {max_connections} reached"));
    let _ = frames.send(frame.encode()).await;
    Ok(())
}

/// Errors that concern one connection rather than the listener.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
