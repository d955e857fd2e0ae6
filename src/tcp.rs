//! TCP front-end: accepts NFS client connections, pumps bytes between
//! the socket and the RPC engine, and owns the phased shutdown.
//!
//! Shutdown proceeds in order: stop accepting new connections, signal
//! cancellation to every connection and in-flight handler, wait up to
//! `shutdown_timeout` for connections to drain, then abort whatever
//! remains.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::cache::BlockService;
use crate::config::CoreConfig;
use crate::meta::{AuthContext, MetadataRepository};
use crate::protocol::rpc;
use crate::shutdown::ShutdownController;
use crate::xdr::nfs3;

/// Serving interface of the gateway's TCP listener.
#[async_trait]
pub trait GatewayTcp: Send + Sync {
    /// Actual bound port (useful after binding port 0).
    fn get_listen_port(&self) -> u16;

    /// Actual bound address.
    fn get_listen_ip(&self) -> IpAddr;

    /// Registers a channel receiving `true` on MNT and `false` on
    /// UMNT/UMNTALL.
    fn set_mount_listener(&mut self, signal: mpsc::Sender<bool>);

    /// Accepts and serves connections until shutdown is triggered, then
    /// drains them within the configured timeout.
    async fn serve(&self) -> io::Result<()>;
}

/// TCP listener wired to a metadata repository and a block service.
pub struct GatewayListener {
    listener: TcpListener,
    port: u16,
    repo: Arc<dyn MetadataRepository>,
    blocks: Arc<BlockService>,
    write_verifier: nfs3::writeverf3,
    mount_signal: Option<mpsc::Sender<bool>>,
    export_name: Arc<String>,
    transaction_tracker: Arc<rpc::TransactionTracker>,
    config: Arc<CoreConfig>,
    shutdown: ShutdownController,
    handler_permits: Arc<Semaphore>,
}

impl GatewayListener {
    /// Binds to `ip:port` and prepares the serving state.
    pub async fn bind(
        ipstr: &str,
        repo: Arc<dyn MetadataRepository>,
        blocks: Arc<BlockService>,
        write_verifier: nfs3::writeverf3,
        config: Arc<CoreConfig>,
        shutdown: ShutdownController,
    ) -> io::Result<GatewayListener> {
        let listener = TcpListener::bind(ipstr).await?;
        info!("listening on {ipstr}");
        let port = match listener.local_addr()? {
            SocketAddr::V4(s) => s.port(),
            SocketAddr::V6(s) => s.port(),
        };
        Ok(GatewayListener {
            listener,
            port,
            repo,
            blocks,
            write_verifier,
            mount_signal: None,
            export_name: Arc::new("/".to_string()),
            transaction_tracker: Arc::new(rpc::TransactionTracker::new(
                std::time::Duration::from_secs(60),
            )),
            config,
            shutdown,
            handler_permits: Arc::new(Semaphore::new(rpc::DEFAULT_HANDLER_CONCURRENCY)),
        })
    }

    /// Begins the phased shutdown: [`serve`](GatewayTcp::serve) stops
    /// accepting, cancels outstanding work and drains connections.
    pub fn trigger_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token observing this gateway's shutdown signal; background
    /// collaborators (uploaders, auxiliary listeners) share it.
    pub fn cancel_token(&self) -> crate::shutdown::CancelToken {
        self.shutdown.token()
    }

    /// Sets the export path clients mount; normalized to one leading
    /// slash and no trailing slash.
    pub fn with_export_name<S: AsRef<str>>(&mut self, export_name: S) {
        self.export_name = Arc::new(format!(
            "/{}",
            export_name.as_ref().trim_end_matches('/').trim_start_matches('/')
        ));
    }

    fn connection_context(&self, client_addr: String, cancel: crate::shutdown::CancelToken) -> rpc::Context {
        rpc::Context {
            local_port: self.port,
            client_addr,
            auth: AuthContext::anonymous(),
            repo: self.repo.clone(),
            blocks: self.blocks.clone(),
            write_verifier: self.write_verifier,
            export_name: self.export_name.clone(),
            mount_signal: self.mount_signal.clone(),
            transaction_tracker: self.transaction_tracker.clone(),
            cancel,
            config: self.config.clone(),
        }
    }
}

/// Pumps one established connection: socket bytes into the record
/// reassembler, finished responses back out as contiguous fragments.
async fn process_socket(
    mut socket: tokio::net::TcpStream,
    context: rpc::Context,
    permits: Arc<Semaphore>,
) -> Result<(), anyhow::Error> {
    let (mut message_handler, mut socksend, mut msgrecvchan) =
        rpc::SocketMessageHandler::new(&context, permits);
    let _ = socket.set_nodelay(true);
    let cancel = context.cancel.clone();

    tokio::spawn(async move {
        loop {
            if let Err(e) = message_handler.read().await {
                debug!("record reassembly stopped: {e:?}");
                break;
            }
        }
    });
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("connection cancelled by shutdown");
                return Ok(());
            }
            _ = socket.readable() => {
                let mut buf = [0; 128_000];

                match socket.try_read(&mut buf) {
                    Ok(0) => {
                        return Ok(());
                    }
                    Ok(n) => {
                        let _ = socksend.write_all(&buf[..n]).await;
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        // spurious readiness
                    }
                    Err(e) => {
                        debug!("connection closed: {e:?}");
                        return Err(e.into());
                    }
                }
            },
            reply = msgrecvchan.recv() => {
                match reply {
                    Some(Err(e)) => {
                        debug!("handler failure tears down connection: {e:?}");
                        return Err(e);
                    }
                    Some(Ok(msg)) => {
                        if let Err(e) = rpc::write_fragment(&mut socket, &msg).await {
                            error!("write error: {e:?}");
                        }
                    }
                    None => {
                        return Err(anyhow::anyhow!("unexpected response channel termination"));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl GatewayTcp for GatewayListener {
    fn get_listen_port(&self) -> u16 {
        self.listener.local_addr().map(|a| a.port()).unwrap_or(self.port)
    }

    fn get_listen_ip(&self) -> IpAddr {
        self.listener
            .local_addr()
            .map(|a| a.ip())
            .unwrap_or_else(|_| IpAddr::from([0, 0, 0, 0]))
    }

    fn set_mount_listener(&mut self, signal: mpsc::Sender<bool>) {
        self.mount_signal = Some(signal);
    }

    async fn serve(&self) -> io::Result<()> {
        let server_token = self.shutdown.token();
        let mut connections: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = server_token.cancelled() => {
                    info!("shutdown signalled, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (socket, _) = accepted?;
                    let client_addr = match socket.peer_addr() {
                        Ok(addr) => addr.to_string(),
                        Err(e) => {
                            debug!("peer address unavailable: {e}");
                            continue;
                        }
                    };

                    // Each connection gets its own cancellation scope: it
                    // fires when the client disconnects or when the server
                    // shuts down, aborting in-flight handlers either way.
                    let conn_shutdown = Arc::new(ShutdownController::new());
                    let conn_token = conn_shutdown.token();
                    let context = self.connection_context(client_addr, conn_token.clone());
                    let permits = self.handler_permits.clone();
                    info!("accepting connection from {}", context.client_addr);

                    let link_server = server_token.clone();
                    let link_ctrl = conn_shutdown.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = link_server.cancelled() => link_ctrl.cancel(),
                            _ = conn_token.cancelled() => {}
                        }
                    });
                    connections.spawn(async move {
                        let _ = process_socket(socket, context, permits).await;
                        conn_shutdown.cancel();
                    });
                }
            }
        }

        // Cancellation has been signalled; give connections the grace
        // period, then abort stragglers.
        let deadline = tokio::time::sleep(self.config.shutdown_timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                joined = connections.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
                _ = &mut deadline => {
                    info!("shutdown timeout reached, aborting {} connections", connections.len());
                    connections.abort_all();
                    while connections.join_next().await.is_some() {}
                    break;
                }
            }
        }
        Ok(())
    }
}
