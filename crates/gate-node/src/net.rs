//! TCP transport for the auth listener and the relay connector.
//!
//! Each connection gets a reader loop and a writer task joined by an
//! unbounded channel. The reader awaits `on_read` before reading again, so a
//! session never sees new bytes while a store call is outstanding.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use novus_gate_core::auth::{AuthConnection, AuthTable};
use novus_gate_core::relay::{messages, RelayConnection, RelaySettings, RelayTable};
use novus_gate_core::store::{AccountStore, CharacterStore};
use novus_gate_core::{Liveness, Outbound};

const READ_CHUNK: usize = 4096;

/// Shared state handed to every accepted auth connection.
#[derive(Clone)]
pub struct AuthService {
    pub table: Arc<AuthTable>,
    pub store: Arc<dyn AccountStore>,
    pub handshake_timeout: Option<Duration>,
}

pub async fn serve_auth(listener: TcpListener, service: AuthService) -> anyhow::Result<()> {
    info!(listen = %listener.local_addr()?, "auth.listening");
    loop {
        let (stream, peer) = listener.accept().await.context("accept auth client")?;
        debug!(%peer, "auth.accepted");

        let service = service.clone();
        tokio::spawn(async move {
            match run_auth_connection(stream, peer, service).await {
                Ok(()) => debug!(%peer, "auth.closed"),
                Err(err) => {
                    let error = format!("{err:#}");
                    warn!(%peer, %error, "auth.closed_with_error");
                }
            }
        });
    }
}

async fn run_auth_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: AuthService,
) -> anyhow::Result<()> {
    let (mut reader, writer) = stream.into_split();
    let (outbound, rx) = Outbound::channel();
    let writer_task = tokio::spawn(write_outbound(writer, rx, outbound.liveness().clone()));

    let mut conn = AuthConnection::new(service.table, service.store, outbound.clone());
    let deadline = service.handshake_timeout.map(|limit| Instant::now() + limit);

    let result = pump_auth(&mut reader, &mut conn, deadline).await;
    if conn.is_authed() {
        info!(%peer, username = conn.username(), "auth.session.ended");
    }

    outbound.close();
    drop(conn);
    drop(outbound);
    writer_task.await.context("auth writer task")?;
    result
}

async fn pump_auth(
    reader: &mut OwnedReadHalf,
    conn: &mut AuthConnection,
    deadline: Option<Instant>,
) -> anyhow::Result<()> {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let read = match deadline.filter(|_| !conn.is_authed()) {
            Some(deadline) => time::timeout_at(deadline, reader.read(&mut buf))
                .await
                .map_err(|_| anyhow::anyhow!("handshake timed out"))?,
            None => reader.read(&mut buf).await,
        };
        let n = read.context("read auth socket")?;
        if n == 0 {
            return Ok(());
        }
        conn.on_read(&buf[..n]).await?;
    }
}

/// Connects to the simulation node and serves the relay link until it closes.
pub async fn run_relay(
    addr: &str,
    table: Arc<RelayTable>,
    store: Arc<dyn CharacterStore>,
    settings: RelaySettings,
    version: u16,
    build: u16,
) -> anyhow::Result<()> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connect relay {addr}"))?;
    info!(%addr, version, build, "relay.connected");

    let (mut reader, writer) = stream.into_split();
    let (outbound, rx) = Outbound::channel();
    let writer_task = tokio::spawn(write_outbound(writer, rx, outbound.liveness().clone()));

    outbound.send(messages::greeting(version, build));
    let mut conn = RelayConnection::new(table, store, outbound.clone(), settings);

    let result = pump_relay(&mut reader, &mut conn).await;
    info!(%addr, state = ?conn.state(), "relay.closed");

    outbound.close();
    drop(conn);
    drop(outbound);
    writer_task.await.context("relay writer task")?;
    result
}

async fn pump_relay(reader: &mut OwnedReadHalf, conn: &mut RelayConnection) -> anyhow::Result<()> {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await.context("read relay socket")?;
        if n == 0 {
            return Ok(());
        }
        conn.on_read(&buf[..n]).await?;
    }
}

async fn write_outbound(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    liveness: Liveness,
) {
    while let Some(bytes) = rx.recv().await {
        if let Err(err) = writer.write_all(&bytes).await {
            debug!(error = %err, "net.write.failed");
            liveness.close();
            return;
        }
    }
    let _ = writer.shutdown().await;
}
