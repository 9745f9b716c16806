//! Replication Topology Discovery
//!
//! Works out where a store host sits in its replication setup by reading the
//! `replication` section of its status report:
//!
//! - a **master** lists `connected_slaves` and one `slave<N>` descriptor per
//!   replica; each replica is probed by its own task and registered under
//!   the master's [`Host`]
//! - a **slave** names its master through `master_host`/`master_port`; that
//!   host is probed and recorded as the master
//!
//! ## Replica Registration
//!
//! ```text
//!  discover(master)
//!       │ spawn one probe per slave<N>
//!       ├──────────────┬──────────────┐
//!       ▼              ▼              ▼
//!   probe slave0   probe slave1   probe slave2
//!       │              │              ✗ (connect failed, logged)
//!       └──── mpsc ────┘
//!              ▼
//!        registrar task ──> master.replicas
//! ```
//!
//! The registrar is the only writer of a host's replica list. Probes never
//! retry, carry no credentials, and cannot be cancelled once spawned.

use crate::store::{Connection, StoreError};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Errors that end a discovery run.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Replication report is missing field {0}")]
    MissingField(String),

    #[error("Could not parse connected_slaves {value:?}: {source}")]
    InvalidSlaveCount {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("Replica registrar stopped unexpectedly: {0}")]
    Registrar(#[from] tokio::task::JoinError),
}

/// The replication role a host reports for itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
    Other(String),
}

impl Role {
    pub fn parse(s: &str) -> Self {
        match s {
            "master" => Role::Master,
            "slave" | "replica" => Role::Slave,
            other => Role::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => f.write_str("master"),
            Role::Slave => f.write_str("slave"),
            Role::Other(s) => f.write_str(s),
        }
    }
}

/// One store server and what discovery has learned about it.
#[derive(Debug)]
pub struct Host {
    addr: String,
    password: Option<String>,
    role: RwLock<Option<Role>>,
    replicas: RwLock<Vec<Arc<Host>>>,
    master: RwLock<Option<Arc<Host>>>,
}

/// Serializable snapshot of a host for the informational endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostSummary {
    pub address: String,
    pub role: Option<String>,
    pub replicas: Vec<String>,
    pub master: Option<String>,
}

impl Host {
    pub fn new(addr: impl Into<String>, password: Option<String>) -> Self {
        Self {
            addr: addr.into(),
            password: password.filter(|p| !p.is_empty()),
            role: RwLock::new(None),
            replicas: RwLock::new(Vec::new()),
            master: RwLock::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn role(&self) -> Option<Role> {
        self.role.read().await.clone()
    }

    /// Addresses of registered replicas, in registration order.
    pub async fn replica_addrs(&self) -> Vec<String> {
        self.replicas
            .read()
            .await
            .iter()
            .map(|r| r.addr.clone())
            .collect()
    }

    pub async fn master(&self) -> Option<Arc<Host>> {
        self.master.read().await.clone()
    }

    pub async fn summary(&self) -> HostSummary {
        HostSummary {
            address: self.addr.clone(),
            role: self.role().await.map(|r| r.to_string()),
            replicas: self.replica_addrs().await,
            master: self.master().await.map(|m| m.addr.clone()),
        }
    }

    /// Appends `replica` unless a replica with the same address is already
    /// registered. Only the registrar task calls this.
    async fn add_replica(&self, replica: Arc<Host>) -> bool {
        let mut replicas = self.replicas.write().await;
        if replicas.iter().any(|r| r.addr == replica.addr) {
            return false;
        }
        replicas.push(replica);
        true
    }
}

/// Extracts `host:port` from a `slave<N>` descriptor.
///
/// Both the legacy positional form (`10.0.0.2,6380,online`) and the
/// key/value form (`ip=10.0.0.2,port=6380,state=online,...`) are accepted.
pub fn parse_replica_descriptor(descriptor: &str) -> Option<String> {
    let (ip, port) = if descriptor.contains('=') {
        let mut ip = None;
        let mut port = None;
        for part in descriptor.split(',') {
            match part.split_once('=') {
                Some(("ip", v)) => ip = Some(v),
                Some(("port", v)) => port = Some(v),
                _ => {}
            }
        }
        (ip?, port?)
    } else {
        let mut parts = descriptor.split(',');
        (parts.next()?, parts.next()?)
    };

    if ip.is_empty() || port.is_empty() {
        return None;
    }
    Some(format!("{}:{}", ip, port))
}

/// Runs discovery for `host`. Meant to be spawned as a background task.
///
/// Returns once every replica probe has finished and been registered.
pub async fn discover(host: Arc<Host>) -> Result<(), TopologyError> {
    let report = {
        let mut conn = Connection::open(&host.addr, host.password.as_deref(), 0).await?;
        conn.info("replication").await?
    };

    let role = report
        .get("role")
        .map(|r| Role::parse(r))
        .ok_or_else(|| TopologyError::MissingField("role".to_string()))?;
    info!(addr = %host.addr, %role, "Discovered replication role");
    *host.role.write().await = Some(role.clone());

    match role {
        Role::Master => discover_replicas(&host, &report).await,
        Role::Slave => discover_master(&host, &report).await,
        Role::Other(_) => Ok(()),
    }
}

async fn discover_replicas(
    host: &Arc<Host>,
    report: &crate::store::InfoReport,
) -> Result<(), TopologyError> {
    let raw = report
        .get("connected_slaves")
        .ok_or_else(|| TopologyError::MissingField("connected_slaves".to_string()))?;
    let count: usize = raw
        .parse()
        .map_err(|source| TopologyError::InvalidSlaveCount {
            value: raw.clone(),
            source,
        })?;

    let (tx, rx) = mpsc::channel(count.max(1));
    let registrar = tokio::spawn(register_replicas(Arc::clone(host), rx));

    for i in 0..count {
        let field = format!("slave{}", i);
        let Some(addr) = report.get(&field).and_then(|d| parse_replica_descriptor(d)) else {
            warn!(master = %host.addr, %field, "Missing or unreadable replica descriptor");
            continue;
        };

        let tx = tx.clone();
        tokio::spawn(async move {
            info!(%addr, "Connecting to replica");
            match Connection::connect(&addr).await {
                Ok(_) => {
                    forward_replica(&tx, Host::new(addr, None)).await;
                }
                Err(e) => warn!(%addr, error = %e, "Replica probe failed"),
            }
        });
    }
    drop(tx);

    let registered = registrar.await?;
    debug!(master = %host.addr, registered, expected = count, "Replica discovery finished");
    Ok(())
}

/// Hands a reachable replica to the registrar. Returns false, and logs, if
/// the registrar has already stopped.
async fn forward_replica(tx: &mpsc::Sender<Arc<Host>>, replica: Host) -> bool {
    match tx.send(Arc::new(replica)).await {
        Ok(()) => true,
        Err(e) => {
            warn!(addr = %e.0.addr(), "Replica registrar is gone, registration lost");
            false
        }
    }
}

/// Single consumer of replica registrations for `host`.
async fn register_replicas(host: Arc<Host>, mut rx: mpsc::Receiver<Arc<Host>>) -> usize {
    let mut registered = 0;
    while let Some(replica) = rx.recv().await {
        let addr = replica.addr.clone();
        if host.add_replica(replica).await {
            info!(master = %host.addr, replica = %addr, "Registered replica");
            registered += 1;
        } else {
            debug!(master = %host.addr, replica = %addr, "Replica already registered");
        }
    }
    registered
}

async fn discover_master(
    host: &Arc<Host>,
    report: &crate::store::InfoReport,
) -> Result<(), TopologyError> {
    let master_host = report
        .get("master_host")
        .ok_or_else(|| TopologyError::MissingField("master_host".to_string()))?;
    let master_port = report
        .get("master_port")
        .ok_or_else(|| TopologyError::MissingField("master_port".to_string()))?;
    let addr = format!("{}:{}", master_host, master_port);

    match Connection::connect(&addr).await {
        Ok(_) => {
            info!(replica = %host.addr, master = %addr, "Connected to master");
            *host.master.write().await = Some(Arc::new(Host::new(addr, None)));
        }
        Err(e) => warn!(replica = %host.addr, master = %addr, error = %e, "Master probe failed"),
    }
    Ok(())
}
