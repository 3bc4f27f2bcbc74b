//! TCP transport for the socket RPC
//!
//! ```text
//!            ┌──────────────┐  lines   ┌───────────────┐
//! client ───►│ connection N │ ───────► │ RpcDispatcher │
//!        ◄───│  writer task │ ◄─────┐  └───────────────┘
//!            └──────────────┘       │
//!                                   │ resource.change
//!                            ┌──────┴──────┐
//!                            │   poller    │ every 200 ms
//!                            └─────────────┘
//! ```
//!
//! Each connection gets a welcome line, then one response line per request.
//! Connections and the poller are torn down together by
//! [`RunningServer::stop`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};

use fieldnode_core::constants::SUBSCRIPTION_POLL_MS;
use fieldnode_core::TimeSource;

use crate::error::LinkError;
use crate::rpc::dispatcher::RpcDispatcher;
use crate::rpc::protocol::welcome;
use crate::rpc::subscriptions::ClientId;

type ClientMap = Arc<Mutex<HashMap<ClientId, UnboundedSender<String>>>>;

/// Socket RPC server configuration
pub struct RpcServer {
    dispatcher: Arc<RpcDispatcher>,
    clock: Arc<dyn TimeSource>,
    poll_interval: Duration,
}

impl RpcServer {
    pub fn new(dispatcher: Arc<RpcDispatcher>, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            dispatcher,
            clock,
            poll_interval: Duration::from_millis(SUBSCRIPTION_POLL_MS),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn dispatcher(&self) -> &Arc<RpcDispatcher> {
        &self.dispatcher
    }

    /// Bind `address` and start accepting connections
    pub async fn start(&self, address: &str) -> Result<RunningServer, LinkError> {
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        info!("rpc server listening on {}", local_addr);

        let clients: ClientMap = Arc::new(Mutex::new(HashMap::new()));

        let accept = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.dispatcher),
            Arc::clone(&clients),
        ));
        let poller = tokio::spawn(poll_loop(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.clock),
            Arc::clone(&clients),
            self.poll_interval,
        ));

        Ok(RunningServer {
            local_addr,
            accept,
            poller,
            clients,
        })
    }
}

/// Handle to a listening server
pub struct RunningServer {
    local_addr: SocketAddr,
    accept: JoinHandle<()>,
    poller: JoinHandle<()>,
    clients: ClientMap,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Stop listening and drop every connection
    pub async fn stop(self) {
        self.accept.abort();
        self.poller.abort();
        self.clients.lock().await.clear();
        info!("rpc server on {} stopped", self.local_addr);
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.accept.abort();
        self.poller.abort();
    }
}

async fn accept_loop(listener: TcpListener, dispatcher: Arc<RpcDispatcher>, clients: ClientMap) {
    let next_id = AtomicU32::new(1);
    // Dropped with this task on stop, which aborts every connection
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let client = ClientId(next_id.fetch_add(1, Ordering::Relaxed));
                    info!("rpc client {} connected from {}", client.0, peer);
                    connections.spawn(serve_connection(
                        stream,
                        client,
                        Arc::clone(&dispatcher),
                        Arc::clone(&clients),
                    ));
                }
                Err(e) => warn!("rpc accept failed: {}", e),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    client: ClientId,
    dispatcher: Arc<RpcDispatcher>,
    clients: ClientMap,
) {
    let (reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        while let Some(mut line) = rx.recv().await {
            line.push('\n');
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    clients.lock().await.insert(client, tx.clone());
    let _ = tx.send(welcome(&dispatcher.context().device_name));

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response = dispatcher.handle_line(client, &line).await;
                if tx.send(response).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("rpc client {} read failed: {}", client.0, e);
                break;
            }
        }
    }

    clients.lock().await.remove(&client);
    dispatcher.subscriptions().remove_client(client).await;
    drop(tx);
    let _ = writer_task.await;
    info!("rpc client {} disconnected", client.0);
}

async fn poll_loop(
    dispatcher: Arc<RpcDispatcher>,
    clock: Arc<dyn TimeSource>,
    clients: ClientMap,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let events = dispatcher
            .subscriptions()
            .poll(dispatcher.context(), dispatcher.registry(), clock.as_ref())
            .await;
        if events.is_empty() {
            continue;
        }

        let clients = clients.lock().await;
        for event in events {
            match clients.get(&event.client) {
                Some(tx) => {
                    debug!("notify client {}: {}", event.client.0, event.line);
                    let _ = tx.send(event.line);
                }
                None => debug!("client {} gone, change dropped", event.client.0),
            }
        }
    }
}
