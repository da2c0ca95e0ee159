use std::fs;
use std::io::{self, Read};

use anyhow::Result;
use clap::{Parser, Subcommand};
use parser::RawLogLine;
use policy::{load_policy_from_str, RiskLevel, ThreatPolicy};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Firewall drop digest CLI")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse exported log lines and print the structured drop events
    Parse {
        /// Log export file, or `-` for stdin
        #[arg(long)]
        input: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Aggregate drop statistics and the overall risk level
    Stats {
        #[arg(long)]
        input: String,
    },
    /// Render the condensed digest for model summarization
    Digest {
        #[arg(long)]
        input: String,
        /// YAML threat policy; defaults apply when omitted
        #[arg(long)]
        policy_file: Option<String>,
        #[arg(long)]
        max_groups: Option<usize>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();
    match args.command {
        Command::Parse { input, limit } => run_parse(&input, limit),
        Command::Stats { input } => run_stats(&input),
        Command::Digest {
            input,
            policy_file,
            max_groups,
        } => run_digest(&input, policy_file.as_deref(), max_groups),
    }
}

/// Reads one record per line: either a JSON export entry (nested or
/// flat) or a bare firewall message.
fn read_raw_lines(input: &str) -> Result<Vec<RawLogLine>> {
    let data = if input == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(input)?
    };

    let lines = data
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match serde_json::from_str(line) {
            Ok(value) => RawLogLine::from_value(&value),
            Err(_) => RawLogLine {
                timestamp: String::new(),
                source: String::new(),
                message: line.to_string(),
            },
        })
        .collect();
    Ok(lines)
}

fn run_parse(input: &str, limit: usize) -> Result<()> {
    let raw = read_raw_lines(input)?;
    let (parsed, stats) = stats::parse_and_aggregate(&raw)?;
    info!(raw = raw.len(), parsed = parsed.len(), "parsed export");
    for event in parsed.iter().take(limit) {
        println!("{}", serde_json::to_string(event)?);
    }
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}

fn run_stats(input: &str) -> Result<()> {
    let raw = read_raw_lines(input)?;
    let (_, stats) = stats::parse_and_aggregate(&raw)?;
    let risk = RiskLevel::classify(stats.total_blocks);
    let report = serde_json::json!({
        "status": { "level": risk.label(), "color": risk.color() },
        "total_blocks": stats.total_blocks,
        "top_src_subnets": stats.top_src_subnets,
        "top_dst_ports": stats.top_dst_ports,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_digest(input: &str, policy_file: Option<&str>, max_groups: Option<usize>) -> Result<()> {
    let raw = read_raw_lines(input)?;
    let (parsed, _) = stats::parse_and_aggregate(&raw)?;

    let mut policy = match policy_file {
        Some(path) => load_policy_from_str(&fs::read_to_string(path)?)?,
        None => ThreatPolicy::default(),
    };
    if let Some(max_groups) = max_groups {
        policy.max_groups = max_groups;
    }

    let digest = normalizer::condense(&parsed, &policy);

    let raw_chars: usize = parsed.iter().map(|p| p.raw_message.chars().count()).sum();
    info!(
        tokens_before = raw_chars / 4,
        tokens_after = normalizer::approx_tokens(&digest),
        "digest token estimate"
    );

    println!("{digest}");
    Ok(())
}
