//! PostgreSQL storage for decisions and historical precedents.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use super::PersistenceSink;
use crate::domain::FinalDecision;
use crate::error::{ConclaveError, Result};
use crate::pattern::{PatternCase, PatternLibraryLoader};

/// Connect a pool the way every store in this crate expects
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}

/// Create the decision and pattern tables if missing
pub async fn ensure_tables(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS debate_decisions (
            session_id UUID PRIMARY KEY,
            candidate_id TEXT NOT NULL,
            action TEXT NOT NULL,
            confidence DOUBLE PRECISION NOT NULL,
            consensus_status TEXT NOT NULL,
            terminal_state TEXT NOT NULL,
            round_count INTEGER NOT NULL,
            final_score DOUBLE PRECISION,
            payload JSONB NOT NULL,
            decided_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_debate_decisions_candidate_time ON debate_decisions(candidate_id, decided_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pattern_cases (
            id TEXT PRIMARY KEY,
            label TEXT,
            market_cap DOUBLE PRECISION,
            pe_ratio DOUBLE PRECISION,
            sector TEXT NOT NULL,
            price_to_book DOUBLE PRECISION,
            outcome_pct DOUBLE PRECISION NOT NULL,
            factors JSONB NOT NULL DEFAULT '[]'::jsonb
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Writes one row per session into `debate_decisions`
pub struct PostgresDecisionSink {
    pool: PgPool,
}

impl PostgresDecisionSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = connect(url, max_connections).await?;
        ensure_tables(&pool).await?;
        info!("decision store ready");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl PersistenceSink for PostgresDecisionSink {
    async fn save(&self, decision: &FinalDecision) -> Result<()> {
        let payload = serde_json::to_value(decision)?;

        sqlx::query(
            r#"
            INSERT INTO debate_decisions (
                session_id, candidate_id, action, confidence, consensus_status,
                terminal_state, round_count, final_score, payload, decided_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (session_id) DO NOTHING
            "#,
        )
        .bind(decision.session_id)
        .bind(&decision.candidate_id)
        .bind(decision.action.as_str())
        .bind(decision.confidence)
        .bind(decision.consensus_status.as_str())
        .bind(decision.terminal_state.as_str())
        .bind(decision.round_count as i32)
        .bind(decision.final_score)
        .bind(&payload)
        .bind(decision.decided_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ConclaveError::Persistence(format!("insert decision: {}", e)))?;

        debug!(
            "Saved decision {} for {} ({})",
            decision.session_id, decision.candidate_id, decision.consensus_status
        );
        Ok(())
    }
}

/// Loads the precedent library from `pattern_cases`
pub struct PostgresPatternLoader {
    pool: PgPool,
}

impl PostgresPatternLoader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PatternLibraryLoader for PostgresPatternLoader {
    async fn load(&self) -> Result<Vec<PatternCase>> {
        let rows = sqlx::query(
            r#"
            SELECT id, label, market_cap, pe_ratio, sector, price_to_book, outcome_pct, factors
            FROM pattern_cases
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ConclaveError::PatternLibrary(format!("query pattern_cases: {}", e)))?;

        let cases: Vec<PatternCase> = rows
            .iter()
            .map(|row| {
                let factors: serde_json::Value = row.get("factors");
                PatternCase {
                    id: row.get("id"),
                    label: row.get("label"),
                    market_cap: row.get("market_cap"),
                    pe_ratio: row.get("pe_ratio"),
                    sector: row.get("sector"),
                    price_to_book: row.get("price_to_book"),
                    outcome_pct: row.get("outcome_pct"),
                    factors: factors_from_json(&factors),
                }
            })
            .collect();

        debug!("Loaded {} pattern cases from postgres", cases.len());
        Ok(cases)
    }
}

fn factors_from_json(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
