use std::collections::HashMap;

use parser::ParsedDropEvent;
use policy::ThreatPolicy;
use stats::Tally;
use tracing::debug;

const EMPTY_DIGEST: &str = "\nTotal normalized events: 0 (from 0 raw)\nThreat score total: 0";

/// How many contributing subnets to render under each group line.
const SUBNETS_PER_GROUP: usize = 3;

/// Condenses a parsed batch into the multi-line digest handed to the
/// model summarizer.
///
/// Events without a destination port, or whose port is excluded by the
/// policy, contribute to no group and no score. Surviving events are
/// grouped by `(dst_port, proto)`, ranked by count (ties keep discovery
/// order), and truncated to `policy.max_groups`. Each retained group
/// renders one line plus up to three contributing `/24` subnets.
/// Deterministic: the same input and policy always yield the same
/// digest.
pub fn condense(parsed: &[ParsedDropEvent], policy: &ThreatPolicy) -> String {
    if parsed.is_empty() {
        return EMPTY_DIGEST.to_string();
    }

    let mut groups: Tally<(u16, String)> = Tally::new();
    let mut contributors: HashMap<(u16, String), Tally<String>> = HashMap::new();
    let mut threat_score_total: u64 = 0;

    for event in parsed {
        let Some(dst_port) = event.dst_port else {
            continue;
        };
        if policy.exclude_ports.contains(&dst_port) {
            continue;
        }
        let key = (dst_port, event.proto.clone());
        groups.add(key.clone());
        contributors
            .entry(key)
            .or_default()
            .add(event.src_subnet().unwrap_or_else(|| "unknown".to_string()));
        threat_score_total += u64::from(policy.threat_score(dst_port));
    }

    let retained = groups.most_common(policy.max_groups);
    let mut lines = Vec::new();
    let mut normalized_total: u64 = 0;
    for ((dst_port, proto), count) in &retained {
        normalized_total += count;
        let level = policy.threat_level(*dst_port);
        lines.push(format!("{count} {proto} probes on DPT={dst_port} ({level})"));
        if let Some(subnets) = contributors.get(&(*dst_port, proto.clone())) {
            for (subnet, sub_count) in subnets.most_common(SUBNETS_PER_GROUP) {
                lines.push(format!("  └─ {sub_count} from {subnet}"));
            }
        }
    }

    debug!(
        raw = parsed.len(),
        lines = lines.len(),
        threat_score_total,
        "condensed drop batch"
    );

    let mut digest = lines.join("\n");
    digest.push_str(&format!(
        "\nTotal normalized events: {normalized_total} (from {} raw)",
        parsed.len()
    ));
    if threat_score_total > 0 {
        digest.push_str(&format!("\nThreat score total: {threat_score_total}"));
    }
    digest
}

/// Rough chars/4 token estimate, for reporting how far a digest sits
/// under the summarizer's context budget.
pub fn approx_tokens(text: &str) -> usize {
    text.chars().count() / 4
}
