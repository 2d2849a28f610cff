//! Parsers for `zpool`/`zfs` listings and kstat files.
//!
//! All parsers take the full text and return typed records. Listings are
//! expected in scripted mode (`-Hp`): tab-separated, exact byte values,
//! no header.

use std::collections::HashMap;

use crate::model::{DatasetInfo, DatasetKind, PoolInfo, PoolIoCounters};

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parses a size column. `-` (property not available) reads as 0.
fn parse_size(field: &str, what: &str) -> Result<u64, ParseError> {
    let field = field.trim();
    if field == "-" {
        return Ok(0);
    }
    field
        .parse()
        .map_err(|_| ParseError::new(format!("invalid {} value '{}'", what, field)))
}

// ============ zpool list ============

/// Parses `zpool list -Hp -o name,size,allocated,free,health`.
pub fn parse_zpool_list(content: &str) -> Result<Vec<PoolInfo>, ParseError> {
    let mut pools = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() != 5 {
            return Err(ParseError::new(format!(
                "zpool list: expected 5 columns, got {} in '{}'",
                parts.len(),
                line
            )));
        }

        pools.push(PoolInfo {
            name: parts[0].to_string(),
            size: parse_size(parts[1], "size")?,
            allocated: parse_size(parts[2], "allocated")?,
            free: parse_size(parts[3], "free")?,
            health: parts[4].trim().to_string(),
        });
    }

    Ok(pools)
}

// ============ zfs list ============

/// Parses `zfs list -Hp -r -t filesystem,volume -o name,type,used,available,volsize`.
///
/// Types other than filesystem/volume are skipped.
pub fn parse_zfs_list(content: &str) -> Result<Vec<DatasetInfo>, ParseError> {
    let mut datasets = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() != 5 {
            return Err(ParseError::new(format!(
                "zfs list: expected 5 columns, got {} in '{}'",
                parts.len(),
                line
            )));
        }

        let kind = match parts[1].trim() {
            "filesystem" => DatasetKind::Filesystem,
            "volume" => DatasetKind::Volume,
            _ => continue,
        };

        let volsize = match parts[4].trim() {
            "-" => None,
            v => Some(parse_size(v, "volsize")?),
        };

        datasets.push(DatasetInfo {
            name: parts[0].to_string(),
            kind,
            used: parse_size(parts[2], "used")?,
            available: parse_size(parts[3], "available")?,
            volsize,
        });
    }

    Ok(datasets)
}

// ============ kstat ============

/// Parses a pool's `io` kstat (KSTAT_TYPE_IO).
///
/// Format: a kstat header line, a line of column names, a line of values.
/// Only `nread`, `nwritten`, `reads` and `writes` are kept.
pub fn parse_kstat_io(content: &str) -> Result<PoolIoCounters, ParseError> {
    let mut lines = content.lines();
    let header = lines
        .by_ref()
        .find(|l| l.split_whitespace().next() == Some("nread"))
        .ok_or_else(|| ParseError::new("io kstat: missing column header"))?;
    let values = lines
        .next()
        .ok_or_else(|| ParseError::new("io kstat: missing value row"))?;

    let row: HashMap<&str, &str> = header
        .split_whitespace()
        .zip(values.split_whitespace())
        .collect();

    let get = |name: &str| -> Result<u64, ParseError> {
        row.get(name)
            .ok_or_else(|| ParseError::new(format!("io kstat: missing column {}", name)))?
            .parse()
            .map_err(|_| ParseError::new(format!("io kstat: invalid {}", name)))
    };

    Ok(PoolIoCounters {
        read_ops: get("reads")?,
        write_ops: get("writes")?,
        read_bytes: get("nread")?,
        write_bytes: get("nwritten")?,
    })
}

/// Parses a named kstat (KSTAT_TYPE_NAMED) such as `arcstats`.
///
/// Format: a kstat header line, `name type data`, then one
/// `<name> <type> <value>` line per statistic. Negative values clamp to 0;
/// non-numeric values are skipped.
pub fn parse_kstat_named(content: &str) -> Result<HashMap<String, u64>, ParseError> {
    let mut lines = content.lines();
    lines
        .by_ref()
        .find(|l| {
            let mut cols = l.split_whitespace();
            cols.next() == Some("name") && cols.next() == Some("type")
        })
        .ok_or_else(|| ParseError::new("named kstat: missing 'name type data' header"))?;

    let mut stats = HashMap::new();
    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }

        let value = match parts[2].parse::<u64>() {
            Ok(v) => v,
            Err(_) => match parts[2].parse::<i64>() {
                Ok(v) => v.max(0) as u64,
                Err(_) => continue,
            },
        };
        stats.insert(parts[0].to_string(), value);
    }

    Ok(stats)
}
