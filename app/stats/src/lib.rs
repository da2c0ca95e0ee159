use std::collections::HashMap;
use std::hash::Hash;

use anyhow::Result;
use parser::{DropLineParser, ParsedDropEvent, RawLogLine};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const TOP_SUBNETS: usize = 5;
pub const TOP_PORTS: usize = 10;

/// Insertion-ordered counter. `most_common` ranks by count descending;
/// equal counts keep first-seen order (stable sort over insertion
/// order), so identical input always yields identical ranking.
#[derive(Debug, Clone)]
pub struct Tally<K: Eq + Hash + Clone> {
    counts: HashMap<K, u64>,
    order: Vec<K>,
}

impl<K: Eq + Hash + Clone> Tally<K> {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn add(&mut self, key: K) {
        let entry = self.counts.entry(key.clone()).or_insert(0);
        if *entry == 0 {
            self.order.push(key);
        }
        *entry += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn most_common(&self, n: usize) -> Vec<(K, u64)> {
        let mut ranked: Vec<(K, u64)> = self
            .order
            .iter()
            .map(|key| (key.clone(), self.counts[key]))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(n);
        ranked
    }
}

impl<K: Eq + Hash + Clone> Default for Tally<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary statistics over one parsed batch. Rankings are ordered most
/// frequent first; ties keep first-seen order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropStats {
    pub total_blocks: u64,
    pub top_src_subnets: Vec<(String, u64)>,
    pub top_dst_ports: Vec<(u16, u64)>,
}

impl DropStats {
    /// The "no data extracted" result, distinct in meaning (but not in
    /// shape) from a batch where zero drops genuinely occurred.
    pub fn zeroed() -> Self {
        Self {
            total_blocks: 0,
            top_src_subnets: Vec::new(),
            top_dst_ports: Vec::new(),
        }
    }
}

/// Pure reduction over a parsed batch: record count, top 5 source `/24`
/// subnets, top 10 destination ports. Records without a destination
/// port count toward `total_blocks` but not toward the port ranking.
pub fn aggregate(parsed: &[ParsedDropEvent]) -> DropStats {
    let mut subnets = Tally::new();
    let mut ports = Tally::new();
    for event in parsed {
        if let Some(subnet) = event.src_subnet() {
            subnets.add(subnet);
        }
        if let Some(port) = event.dst_port {
            ports.add(port);
        }
    }
    debug!(
        total = parsed.len(),
        subnets = subnets.len(),
        ports = ports.len(),
        "aggregated drop stats"
    );
    DropStats {
        total_blocks: parsed.len() as u64,
        top_src_subnets: subnets.most_common(TOP_SUBNETS),
        top_dst_ports: ports.most_common(TOP_PORTS),
    }
}

/// Parses a raw batch and aggregates in one step. A batch where nothing
/// matched yields an empty record list and zeroed stats, never an
/// error.
pub fn parse_and_aggregate(raw: &[RawLogLine]) -> Result<(Vec<ParsedDropEvent>, DropStats)> {
    let parser = DropLineParser::new()?;
    let parsed = parser.parse_batch(raw);
    if parsed.is_empty() {
        return Ok((parsed, DropStats::zeroed()));
    }
    let stats = aggregate(&parsed);
    Ok((parsed, stats))
}
