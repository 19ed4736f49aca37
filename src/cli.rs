use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use crate::config::AgentConfig;
use crate::domain::{FinalDecision, Recommendation};
use crate::error::Result;
use crate::pattern::{PatternInsights, Precedent};

#[derive(Parser)]
#[command(name = "conclave")]
#[command(author = "Conclave Team")]
#[command(version = "0.1.0")]
#[command(about = "Multi-agent debate engine for trade candidates", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus the CONCLAVE_ENV overlay)
    #[arg(short, long, default_value = "config", env = "CONCLAVE_CONFIG_DIR")]
    pub config: PathBuf,

    /// Print results as JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Debate one candidate and print the decision
    Debate {
        /// Candidate identifier (ticker)
        id: String,
        /// JSON array of candidate snapshots
        #[arg(short, long, default_value = "data/snapshots.json")]
        snapshots: PathBuf,
    },
    /// Show historical precedents for a candidate without debating
    Patterns {
        id: String,
        #[arg(short, long, default_value = "data/snapshots.json")]
        snapshots: PathBuf,
    },
    /// Load and validate configuration, then list the voices
    CheckConfig,
}

#[derive(Debug, Serialize, Tabled)]
pub struct RecommendationRow {
    pub agent: String,
    pub action: String,
    pub confidence: String,
    pub target: String,
    pub stop: String,
    pub note: String,
}

impl From<&Recommendation> for RecommendationRow {
    fn from(rec: &Recommendation) -> Self {
        Self {
            agent: rec.agent.clone(),
            action: rec.action.to_string(),
            confidence: format!("{:.0}%", rec.confidence * 100.0),
            target: rec.target_price.map(|p| p.to_string()).unwrap_or_default(),
            stop: rec.stop_loss.map(|p| p.to_string()).unwrap_or_default(),
            note: if rec.parse_failed {
                "unparsed".to_string()
            } else {
                String::new()
            },
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct PrecedentRow {
    pub side: &'static str,
    pub case: String,
    pub sector: String,
    pub size: String,
    pub similarity: String,
    pub outcome: String,
}

impl PrecedentRow {
    fn new(side: &'static str, p: &Precedent) -> Self {
        Self {
            side,
            case: p.label.clone(),
            sector: p.sector.clone(),
            size: p.size_bucket.to_string(),
            similarity: format!("{:.2}", p.similarity),
            outcome: format!("{:+.1}%", p.outcome_pct),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct FieldRow {
    pub field: &'static str,
    pub value: String,
}

#[derive(Debug, Serialize, Tabled)]
pub struct AgentRow {
    pub name: String,
    pub kind: &'static str,
    pub persona: String,
    pub model: String,
}

impl From<&AgentConfig> for AgentRow {
    fn from(agent: &AgentConfig) -> Self {
        Self {
            name: agent.name.clone(),
            kind: agent.kind.as_str(),
            persona: agent.persona.clone().unwrap_or_default(),
            model: agent.model.clone().unwrap_or_default(),
        }
    }
}

pub fn precedent_rows(insights: &PatternInsights) -> Vec<PrecedentRow> {
    insights
        .positive
        .iter()
        .map(|p| PrecedentRow::new("winner", p))
        .chain(insights.negative.iter().map(|p| PrecedentRow::new("loser", p)))
        .collect()
}

pub fn decision_rows(decision: &FinalDecision) -> Vec<FieldRow> {
    let price = |p: Option<rust_decimal::Decimal>| p.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
    vec![
        FieldRow { field: "session", value: decision.session_id.to_string() },
        FieldRow { field: "candidate", value: decision.candidate_id.clone() },
        FieldRow { field: "action", value: decision.action.to_string() },
        FieldRow { field: "confidence", value: format!("{:.0}%", decision.confidence * 100.0) },
        FieldRow { field: "status", value: decision.consensus_status.to_string() },
        FieldRow { field: "terminal", value: decision.terminal_state.to_string() },
        FieldRow { field: "rounds", value: decision.round_count.to_string() },
        FieldRow {
            field: "score",
            value: decision
                .final_score
                .map(|s| format!("{:.3}", s))
                .unwrap_or_else(|| "-".to_string()),
        },
        FieldRow { field: "target", value: price(decision.target_price) },
        FieldRow { field: "stop", value: price(decision.stop_loss) },
        FieldRow {
            field: "success probability",
            value: format!("{:.0}%", decision.success_probability * 100.0),
        },
    ]
}

pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("(no results)");
    } else {
        println!("{}", Table::new(rows));
    }
}

pub fn print_decision(decision: &FinalDecision, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(decision)?);
        return Ok(());
    }

    print_table(&decision_rows(decision));
    println!();
    println!("{}", decision.rationale);
    println!();
    let rows: Vec<RecommendationRow> = decision.contributions.iter().map(Into::into).collect();
    print_table(&rows);
    Ok(())
}

pub fn print_insights(candidate_id: &str, insights: &PatternInsights, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(insights)?);
        return Ok(());
    }

    println!(
        "{}: success {:.0}%, risk {}, library {} cases",
        candidate_id,
        insights.success_probability * 100.0,
        insights.risk,
        insights.library_size
    );
    if let Some(bucket) = insights.winners_bucket {
        println!("Winners cluster in {} caps", bucket);
    }
    println!("{}", insights.historical_comparison());
    print_table(&precedent_rows(insights));
    Ok(())
}

pub fn print_agents(agents: &[AgentConfig]) {
    let rows: Vec<AgentRow> = agents.iter().map(Into::into).collect();
    print_table(&rows);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentKind;
    use crate::domain::{Action, SizeBucket};
    use crate::pattern::RiskBucket;
    use clap::CommandFactory;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_debate_command() {
        let cli = Cli::try_parse_from(["conclave", "debate", "AAPL", "--snapshots", "snap.json"])
            .unwrap();
        match cli.command {
            Commands::Debate { id, snapshots } => {
                assert_eq!(id, "AAPL");
                assert_eq!(snapshots, PathBuf::from("snap.json"));
            }
            _ => panic!("expected debate"),
        }
        assert_eq!(cli.config, PathBuf::from("config"));
    }

    #[test]
    fn test_recommendation_row() {
        let rec = Recommendation::new("value", Action::Buy, 0.72, "cheap").with_target(dec!(120));
        let row = RecommendationRow::from(&rec);
        assert_eq!(row.confidence, "72%");
        assert_eq!(row.target, "120");
        assert!(row.stop.is_empty());
        assert!(row.note.is_empty());

        let failed = RecommendationRow::from(&Recommendation::parse_failed("llm", "garbage"));
        assert_eq!(failed.note, "unparsed");
    }

    #[test]
    fn test_precedent_rows_list_winners_first() {
        let precedent = |id: &str, outcome: f64| Precedent {
            case_id: id.to_string(),
            label: id.to_string(),
            sector: "Technology".to_string(),
            size_bucket: SizeBucket::Large,
            similarity: 0.8,
            outcome_pct: outcome,
            factors: vec![],
        };
        let insights = PatternInsights {
            positive: vec![precedent("WIN", 42.0)],
            negative: vec![precedent("LOSS", -30.0)],
            success_probability: 0.5,
            risk: RiskBucket::Moderate,
            winners_bucket: Some(SizeBucket::Large),
            library_size: 2,
        };

        let rows = precedent_rows(&insights);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].side, "winner");
        assert_eq!(rows[0].outcome, "+42.0%");
        assert_eq!(rows[1].side, "loser");
    }

    #[test]
    fn test_agent_row() {
        let row = AgentRow::from(&AgentConfig::heuristic("momentum", AgentKind::HeuristicMomentum));
        assert_eq!(row.name, "momentum");
        assert_eq!(row.kind, "heuristic_momentum");
    }
}
