use std::collections::{HashMap, HashSet};
use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Port 51413 is a high-volume torrent probe target; excluded by
/// default to keep the digest signal-heavy.
fn default_exclude_ports() -> HashSet<u16> {
    HashSet::from([51413])
}

/// SSH, Telnet, RDP, SMB, MSSQL, MySQL.
fn default_threat_ports() -> HashMap<u16, u32> {
    HashMap::from([(22, 5), (23, 5), (3389, 10), (445, 8), (1433, 8), (3306, 6)])
}

fn default_max_groups() -> usize {
    30
}

/// Configuration for the normalization pass: which destination ports to
/// drop as noise, how dangerous the rest are, and how many groups the
/// digest may carry. Ports absent from `threat_ports` score 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatPolicy {
    #[serde(default = "default_exclude_ports")]
    pub exclude_ports: HashSet<u16>,
    #[serde(default = "default_threat_ports")]
    pub threat_ports: HashMap<u16, u32>,
    #[serde(default = "default_max_groups")]
    pub max_groups: usize,
}

impl Default for ThreatPolicy {
    fn default() -> Self {
        Self {
            exclude_ports: default_exclude_ports(),
            threat_ports: default_threat_ports(),
            max_groups: default_max_groups(),
        }
    }
}

impl ThreatPolicy {
    pub fn threat_score(&self, port: u16) -> u32 {
        self.threat_ports.get(&port).copied().unwrap_or(1)
    }

    pub fn threat_level(&self, port: u16) -> ThreatLevel {
        match self.threat_ports.get(&port) {
            Some(score) if *score >= 8 => ThreatLevel::High,
            Some(_) => ThreatLevel::Medium,
            None => ThreatLevel::Low,
        }
    }
}

/// Per-port classification rendered into the digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
        };
        f.write_str(label)
    }
}

/// Overall risk band for the dashboard/voice consumers, classified from
/// the parsed-record count (not raw line count).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskLevel {
    LowActivity,
    ModerateThreats,
    HighThreatLevel,
}

impl RiskLevel {
    pub fn classify(total_blocks: u64) -> Self {
        if total_blocks < 50 {
            RiskLevel::LowActivity
        } else if total_blocks <= 300 {
            RiskLevel::ModerateThreats
        } else {
            RiskLevel::HighThreatLevel
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::LowActivity => "Low Activity",
            RiskLevel::ModerateThreats => "Moderate Threats",
            RiskLevel::HighThreatLevel => "High Threat Level",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            RiskLevel::LowActivity => "#00FF00",
            RiskLevel::ModerateThreats => "#FFFF00",
            RiskLevel::HighThreatLevel => "#FF0000",
        }
    }
}

/// Loads a YAML policy. Omitted fields fall back to the documented
/// defaults, so an operator file can override a single field.
pub fn load_policy_from_str(data: &str) -> Result<ThreatPolicy> {
    let policy: ThreatPolicy = serde_yaml::from_str(data)?;
    debug!(
        excluded = policy.exclude_ports.len(),
        scored = policy.threat_ports.len(),
        max_groups = policy.max_groups,
        "loaded threat policy"
    );
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let policy = ThreatPolicy::default();
        assert!(policy.exclude_ports.contains(&51413));
        assert_eq!(policy.max_groups, 30);
        assert_eq!(policy.threat_score(3389), 10);
        assert_eq!(policy.threat_score(8443), 1);
    }

    #[test]
    fn threat_levels_from_default_scores() {
        let policy = ThreatPolicy::default();
        assert_eq!(policy.threat_level(3389), ThreatLevel::High);
        assert_eq!(policy.threat_level(445), ThreatLevel::High);
        assert_eq!(policy.threat_level(22), ThreatLevel::Medium);
        assert_eq!(policy.threat_level(3306), ThreatLevel::Medium);
        assert_eq!(policy.threat_level(80), ThreatLevel::Low);
    }

    #[test]
    fn raising_score_past_eight_flips_label() {
        let mut policy = ThreatPolicy::default();
        policy.threat_ports.insert(8080, 3);
        assert_eq!(policy.threat_level(8080), ThreatLevel::Medium);

        policy.threat_ports.insert(8080, 8);
        assert_eq!(policy.threat_level(8080), ThreatLevel::High);
        // Other ports unaffected.
        assert_eq!(policy.threat_level(22), ThreatLevel::Medium);
        assert_eq!(policy.threat_level(80), ThreatLevel::Low);
    }

    #[test]
    fn risk_band_boundaries() {
        assert_eq!(RiskLevel::classify(0), RiskLevel::LowActivity);
        assert_eq!(RiskLevel::classify(49), RiskLevel::LowActivity);
        assert_eq!(RiskLevel::classify(50), RiskLevel::ModerateThreats);
        assert_eq!(RiskLevel::classify(300), RiskLevel::ModerateThreats);
        assert_eq!(RiskLevel::classify(301), RiskLevel::HighThreatLevel);
        assert_eq!(RiskLevel::classify(301).label(), "High Threat Level");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let policy = load_policy_from_str("max_groups: 5\n").unwrap();
        assert_eq!(policy.max_groups, 5);
        assert!(policy.exclude_ports.contains(&51413));
        assert_eq!(policy.threat_score(23), 5);
    }

    #[test]
    fn full_yaml_overrides() {
        let policy = load_policy_from_str(
            "exclude_ports: []\nthreat_ports:\n  8443: 10\nmax_groups: 2\n",
        )
        .unwrap();
        assert!(policy.exclude_ports.is_empty());
        assert_eq!(policy.threat_level(8443), ThreatLevel::High);
        assert_eq!(policy.threat_level(3389), ThreatLevel::Low);
    }
}
