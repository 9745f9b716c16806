//! Connection Router
//!
//! Maps logical database indexes to live connections on one store.
//!
//! ## Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  ConnectionRouter                    │
//! │                                                      │
//! │   Mutex<HashMap<DbIndex, Arc<OnceCell<DbHandle>>>>   │
//! │        │            │            │                   │
//! │      db 0         db 3         db 7                  │
//! │   OnceCell     OnceCell     OnceCell                 │
//! │   (open)       (opening)    (empty)                  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The map lock is held only long enough to find or insert the cell for an
//! index. The cell then serializes initialization: concurrent `get` calls for
//! the same index all wait on the first caller's connect, and only one
//! connection is ever opened. Calls for different indexes connect in parallel.
//! A failed connect leaves the cell empty, so the next request tries again.
//!
//! A cached connection that has gone broken (see [`Connection::is_broken`])
//! is swapped for a fresh cell on the next `get`, so one transport failure
//! only costs the request that hit it. The failed request itself is not
//! retried. Healthy entries are never evicted.

use crate::store::connection::{Connection, StoreError};
use crate::store::{info, DbIndex};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Shared handle to a database connection. Holding the lock gives exclusive
/// use of the connection for a sequence of commands.
pub type DbHandle = Arc<Mutex<Connection>>;

/// Lazily opens and caches one connection per database index.
#[derive(Debug)]
pub struct ConnectionRouter {
    addr: String,
    password: Option<String>,
    databases: Mutex<HashMap<DbIndex, Arc<OnceCell<DbHandle>>>>,
}

impl ConnectionRouter {
    pub fn new(addr: impl Into<String>, password: Option<String>) -> Self {
        Self {
            addr: addr.into(),
            password: password.filter(|p| !p.is_empty()),
            databases: Mutex::new(HashMap::new()),
        }
    }

    /// The store address every connection is opened against.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Returns the connection for `db`, opening it on first use.
    ///
    /// Repeated calls return handles to the same connection until it breaks.
    pub async fn get(&self, db: DbIndex) -> Result<DbHandle, StoreError> {
        let handle = self.cached_or_open(db).await?;

        // A connection busy with another request is not inspected; if it
        // breaks there, the next caller replaces it.
        let broken = handle.try_lock().is_ok_and(|conn| conn.is_broken());
        if !broken {
            return Ok(handle);
        }

        warn!(addr = %self.addr, db, "Replacing broken connection");
        self.invalidate(db, &handle).await;
        self.cached_or_open(db).await
    }

    /// Forgets the cached connection for `db` if it is still `handle`.
    ///
    /// Returns whether anything was removed. A handle that has already been
    /// replaced leaves the newer connection alone.
    pub async fn invalidate(&self, db: DbIndex, handle: &DbHandle) -> bool {
        let mut databases = self.databases.lock().await;
        let current = databases
            .get(&db)
            .and_then(|cell| cell.get())
            .is_some_and(|cached| Arc::ptr_eq(cached, handle));
        if current {
            databases.insert(db, Arc::new(OnceCell::new()));
        }
        current
    }

    /// Opens a connection for every database the keyspace report names.
    ///
    /// Reads the keyspace section over database 0, then replaces whatever is
    /// cached for each named index with a freshly opened connection. Returns
    /// the number of databases found.
    pub async fn populate(&self) -> Result<usize, StoreError> {
        let primary = self.get(0).await?;
        let report = primary.lock().await.info("keyspace").await?;
        let found = info::keyspace_databases(&report);

        for &db in &found {
            info!(db, "Found database in keyspace report");
            let handle = self.open(db).await?;
            let mut databases = self.databases.lock().await;
            databases.insert(db, Arc::new(OnceCell::new_with(Some(handle))));
        }

        Ok(found.len())
    }

    /// Number of databases with an established connection.
    pub async fn connection_count(&self) -> usize {
        let databases = self.databases.lock().await;
        databases.values().filter(|cell| cell.initialized()).count()
    }

    /// Indexes with an established connection, in ascending order.
    pub async fn connected_databases(&self) -> Vec<DbIndex> {
        let databases = self.databases.lock().await;
        let mut dbs: Vec<DbIndex> = databases
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(&db, _)| db)
            .collect();
        dbs.sort_unstable();
        dbs
    }

    async fn cached_or_open(&self, db: DbIndex) -> Result<DbHandle, StoreError> {
        let cell = {
            let mut databases = self.databases.lock().await;
            Arc::clone(databases.entry(db).or_default())
        };

        let handle = cell
            .get_or_try_init(|| async {
                debug!(addr = %self.addr, db, "Opening connection on first use");
                self.open(db).await
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    async fn open(&self, db: DbIndex) -> Result<DbHandle, StoreError> {
        let conn = Connection::open(&self.addr, self.password(), db).await?;
        Ok(Arc::new(Mutex::new(conn)))
    }
}
