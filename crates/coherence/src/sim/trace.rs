//! Processor access traces.
//!
//! One access per line: `<core> <R|W> <address>`. The address is hex with a
//! `0x` prefix or decimal. Blank lines and `#` comments are skipped.
//!
//! ```text
//! # core op addr
//! 0 R 0x1000
//! 1 W 4096
//! ```

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::common::ConfigError;
use crate::message::ProcessorRequest;

/// Kind of processor access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Access {
    /// Load.
    Read,
    /// Store.
    Write,
}

/// One trace line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    /// Issuing core.
    pub core: usize,
    /// Load or store.
    pub access: Access,
    /// Byte address.
    pub addr: u64,
}

/// A parsed trace, in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    /// Builds a trace from already parsed entries.
    pub const fn from_entries(entries: Vec<TraceEntry>) -> Self {
        Self { entries }
    }

    /// Parses trace text.
    ///
    /// # Returns
    ///
    /// The trace, or `ConfigError::Trace` naming the first bad line.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let bad = |reason: String| ConfigError::Trace { line: i + 1, reason };
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [core, op, addr] = fields.as_slice() else {
                return Err(bad(format!("expected `<core> <R|W> <addr>`, got `{line}`")));
            };
            let core = core
                .parse::<usize>()
                .map_err(|e| bad(format!("bad core `{core}`: {e}")))?;
            let access = match *op {
                "R" | "r" => Access::Read,
                "W" | "w" => Access::Write,
                other => return Err(bad(format!("bad access `{other}`, expected R or W"))),
            };
            let addr = parse_addr(addr).map_err(|e| bad(format!("bad address `{addr}`: {e}")))?;
            entries.push(TraceEntry { core, access, addr });
        }
        Ok(Self { entries })
    }

    /// Reads and parses a trace file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Entries in file order.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the trace has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest core index referenced, if any.
    pub fn max_core(&self) -> Option<usize> {
        self.entries.iter().map(|e| e.core).max()
    }
}

fn parse_addr(text: &str) -> Result<u64, std::num::ParseIntError> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    }
}

/// A trace access in flight through an L1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoreRequest {
    /// Issuing core.
    pub core: usize,
    /// Load or store.
    pub access: Access,
    /// Byte address.
    pub addr: u64,
    /// Cycle the request entered the L1.
    pub issued_at: u64,
}

impl ProcessorRequest for CoreRequest {
    fn address(&self) -> u64 {
        self.addr
    }

    fn is_read(&self) -> bool {
        self.access == Access::Read
    }
}
