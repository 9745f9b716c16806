//! Status Report Parsing
//!
//! The store's `INFO` reply is a free-text report grouped into sections:
//!
//! ```text
//! # Replication
//! role:master
//! connected_slaves:1
//! slave0:ip=10.0.0.2,port=6379,state=online,offset=1523,lag=0
//!
//! # Keyspace
//! db0:keys=12,expires=0,avg_ttl=0
//! db3:keys=1,expires=1,avg_ttl=9000
//! ```
//!
//! Comment lines (`#`) and blank lines are skipped; every other line is a
//! `field:value` pair split on the first colon.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::DbIndex;

/// Parsed `field -> value` pairs from a status report.
pub type InfoReport = HashMap<String, String>;

/// Errors produced while validating a section name or parsing a report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InfoError {
    #[error("Invalid INFO section: {0}")]
    InvalidSection(String),

    #[error("Malformed INFO line: {0:?}")]
    MalformedLine(String),
}

/// The report sections a store recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoSection {
    Server,
    Clients,
    Memory,
    Persistence,
    Stats,
    Replication,
    Cpu,
    CommandStats,
    Cluster,
    Keyspace,
    All,
    Default,
}

impl InfoSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoSection::Server => "server",
            InfoSection::Clients => "clients",
            InfoSection::Memory => "memory",
            InfoSection::Persistence => "persistence",
            InfoSection::Stats => "stats",
            InfoSection::Replication => "replication",
            InfoSection::Cpu => "cpu",
            InfoSection::CommandStats => "commandstats",
            InfoSection::Cluster => "cluster",
            InfoSection::Keyspace => "keyspace",
            InfoSection::All => "all",
            InfoSection::Default => "default",
        }
    }
}

impl FromStr for InfoSection {
    type Err = InfoError;

    /// An empty name selects [`InfoSection::Default`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let section = match s {
            "" | "default" => InfoSection::Default,
            "server" => InfoSection::Server,
            "clients" => InfoSection::Clients,
            "memory" => InfoSection::Memory,
            "persistence" => InfoSection::Persistence,
            "stats" => InfoSection::Stats,
            "replication" => InfoSection::Replication,
            "cpu" => InfoSection::Cpu,
            "commandstats" => InfoSection::CommandStats,
            "cluster" => InfoSection::Cluster,
            "keyspace" => InfoSection::Keyspace,
            "all" => InfoSection::All,
            other => return Err(InfoError::InvalidSection(other.to_string())),
        };
        Ok(section)
    }
}

impl fmt::Display for InfoSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates `section`, then parses `raw` into a field map.
///
/// The section name is checked before the text is looked at, so an unknown
/// section fails the same way whatever the report contains.
///
/// ```
/// use flashgate::store::info::parse_info;
///
/// let report = parse_info("# Replication\r\nrole:master\r\nconnected_slaves:0\r\n", "replication").unwrap();
/// assert_eq!(report["role"], "master");
/// assert!(parse_info("role:master", "bogus").is_err());
/// ```
pub fn parse_info(raw: &str, section: &str) -> Result<InfoReport, InfoError> {
    section.parse::<InfoSection>()?;
    parse_report(raw)
}

/// Splits a report into fields. Fails on the first line that has no colon.
pub fn parse_report(raw: &str) -> Result<InfoReport, InfoError> {
    let mut report = InfoReport::new();
    for line in raw.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (field, value) = line
            .split_once(':')
            .ok_or_else(|| InfoError::MalformedLine(line.to_string()))?;
        report.insert(field.to_string(), value.to_string());
    }
    Ok(report)
}

/// Database indexes named by the keyspace fields of a report (`db0`, `db12`, ...).
///
/// Only field names of exactly `db` followed by one to three digits count.
/// The result is sorted and free of duplicates.
pub fn keyspace_databases(report: &InfoReport) -> Vec<DbIndex> {
    let mut dbs: Vec<DbIndex> = report.keys().filter_map(|k| keyspace_index(k)).collect();
    dbs.sort_unstable();
    dbs.dedup();
    dbs
}

fn keyspace_index(field: &str) -> Option<DbIndex> {
    let digits = field.strip_prefix("db")?;
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
