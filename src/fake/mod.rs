//! In-process fake store for tests.
//!
//! A small RESP server on `127.0.0.1:0` with enough of a real store's
//! behaviour to exercise the gateway end to end: several logical databases,
//! optional password, the `replication` and `keyspace` report sections, and
//! the five key types.
//!
//! ```ignore
//! let server = FakeServer::start().await;
//! let router = ConnectionRouter::new(server.addr(), None);
//! ```
//!
//! The server counts accepted connections, so tests can check how many
//! connections the gateway actually opened. `disconnect_all` drops every open
//! session, the way a store restart would.

mod store;

pub use store::{FakeStore, Value};

use crate::protocol::{RespParser, RespValue};
use bytes::BytesMut;
use commands::FakeSession;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::trace;

/// What the fake reports in its `replication` section.
#[derive(Debug, Clone)]
pub enum FakeRole {
    /// `replicas` holds raw `slave<N>` descriptors.
    Master { replicas: Vec<String> },
    Slave { master_host: String, master_port: u16 },
}

impl Default for FakeRole {
    fn default() -> Self {
        FakeRole::Master {
            replicas: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeOptions {
    pub password: Option<String>,
    pub role: FakeRole,
    pub databases: u16,
}

impl Default for FakeOptions {
    fn default() -> Self {
        Self {
            password: None,
            role: FakeRole::default(),
            databases: 16,
        }
    }
}

/// A running fake store. Stops when dropped.
pub struct FakeServer {
    addr: SocketAddr,
    store: Arc<FakeStore>,
    accepted: Arc<AtomicUsize>,
    sessions: Arc<Mutex<Vec<AbortHandle>>>,
    task: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start() -> Self {
        Self::start_with(FakeOptions::default()).await
    }

    pub async fn start_with(options: FakeOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(FakeStore::new(options.databases));
        let accepted = Arc::new(AtomicUsize::new(0));
        let sessions = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&store),
            Arc::new(options),
            Arc::clone(&accepted),
            Arc::clone(&sessions),
        ));

        Self {
            addr,
            store,
            accepted,
            sessions,
            task,
        }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// A `slave<N>` descriptor pointing at this server.
    pub fn replica_descriptor(&self) -> String {
        format!(
            "ip={},port={},state=online,offset=0,lag=0",
            self.addr.ip(),
            self.addr.port()
        )
    }

    /// Number of connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &FakeStore {
        &self.store
    }

    /// Closes every open session. New connections are still accepted.
    pub fn disconnect_all(&self) {
        for session in self.sessions.lock().unwrap().drain(..) {
            session.abort();
        }
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    store: Arc<FakeStore>,
    options: Arc<FakeOptions>,
    accepted: Arc<AtomicUsize>,
    sessions: Arc<Mutex<Vec<AbortHandle>>>,
) {
    let port = listener.local_addr().map(|a| a.port()).unwrap_or(0);
    while let Ok((stream, _)) = listener.accept().await {
        accepted.fetch_add(1, Ordering::SeqCst);
        let session = FakeSession::new(Arc::clone(&store), Arc::clone(&options), port);
        let task = tokio::spawn(serve(stream, session));
        sessions.lock().unwrap().push(task.abort_handle());
    }
}

/// Read, parse, execute, reply, until the client goes away.
async fn serve(stream: TcpStream, mut session: FakeSession) {
    let mut stream = BufWriter::new(stream);
    let mut buffer = BytesMut::with_capacity(4096);
    let mut parser = RespParser::new();

    loop {
        loop {
            match parser.parse(&buffer) {
                Ok(Some((command, consumed))) => {
                    let _ = buffer.split_to(consumed);
                    let reply = session.execute(command);
                    if stream.write_all(&reply.serialize()).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let reply = RespValue::error(format!("ERR Protocol error: {}", e));
                    let _ = stream.write_all(&reply.serialize()).await;
                    let _ = stream.flush().await;
                    return;
                }
            }
        }
        if stream.flush().await.is_err() {
            return;
        }

        match stream.get_mut().read_buf(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(n) => trace!(bytes = n, "fake store read"),
        }
    }
}
