//! SQLite-based persistent storage for trade journal entries
//!
//! Owns the shared connection handle. All writes are serialized behind one
//! `tokio::sync::Mutex`; the insert-or-merge logic in the repositories is a
//! read-then-write sequence with no atomic upsert, so a single writer is a
//! correctness requirement, not an optimization.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::schema;
use super::{BuyScenario, ClosedTrade, CompressionTier, JournalEntry, Lesson, Retrospective};

/// Parse a stored RFC 3339 timestamp, falling back to now on corrupt data
pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// One bounded same-instrument read result for context assembly
#[derive(Debug, Clone)]
pub struct TradeOutcome {
    pub trade_date: DateTime<Utc>,
    pub profit_rate: f64,
    pub holding_days: i64,
    pub one_line_summary: String,
    pub lessons: Vec<Lesson>,
}

/// Memory database statistics
#[derive(Debug, Clone)]
pub struct JournalStats {
    pub total_entries: usize,
    pub entries_by_tier: [usize; 3],
    pub active_principles: usize,
    pub active_intuitions: usize,
    pub closed_trades: usize,
}

/// SQLite-backed journal entry store
pub struct JournalStore {
    conn: Arc<Mutex<Connection>>,
    market: String,
}

impl JournalStore {
    /// Open (or create) the store at the given path for one market
    pub async fn open<P: AsRef<Path>>(path: P, market: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path)?;

        // WAL mode for better concurrent-reader behavior
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            market: market.to_string(),
        })
    }

    /// Shared connection handle for the sibling repositories
    pub fn handle(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    /// Record a newly opened position (written at buy time by the pipeline)
    pub async fn record_open_position(
        &self,
        ticker: &str,
        company_name: &str,
        buy_price: f64,
        buy_date: &str,
        scenario_json: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let scenario = BuyScenario::from_json(scenario_json);

        conn.execute(
            r#"INSERT OR REPLACE INTO stock_holdings
               (ticker, company_name, buy_price, buy_date, scenario, target_price, stop_loss, last_updated)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                ticker,
                company_name,
                buy_price,
                buy_date,
                scenario_json,
                scenario.target_price,
                scenario.stop_loss,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Insert the full tier-1 journal entry for a closed trade, returning
    /// the generated entry id
    pub async fn insert_entry(&self, trade: &ClosedTrade, retro: &Retrospective) -> Result<i64> {
        let conn = self.conn.lock().await;

        let now = Utc::now().to_rfc3339();
        let scenario = BuyScenario::from_json(&trade.scenario_json);
        let market_context = scenario.market_condition.clone().unwrap_or_default();

        conn.execute(
            r#"INSERT INTO trading_journal
               (market, ticker, company_name, trade_date, trade_type,
                buy_price, buy_date, buy_scenario, buy_market_context,
                sell_price, sell_reason, profit_rate, holding_days,
                situation_analysis, judgment_evaluation, lessons, pattern_tags,
                one_line_summary, confidence_score, compression_layer, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                       ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)"#,
            params![
                self.market,
                trade.ticker,
                trade.company_name,
                now,
                "sell",
                trade.buy_price,
                trade.buy_date,
                trade.scenario_json,
                market_context,
                trade.sell_price,
                trade.sell_reason,
                trade.profit_rate,
                trade.holding_days,
                serde_json::to_string(&retro.situation_analysis)?,
                serde_json::to_string(&retro.judgment_evaluation)?,
                serde_json::to_string(&retro.lessons)?,
                serde_json::to_string(&retro.pattern_tags)?,
                retro.one_line_summary,
                retro.confidence_score,
                CompressionTier::Detailed.as_i64(),
                now,
            ],
        )?;

        let id = conn.last_insert_rowid();
        info!(
            "Journal entry {} created for {} ({:+.1}%)",
            id, trade.ticker, trade.profit_rate
        );
        Ok(id)
    }

    /// Append the closed-trade summary row and release the holding slot
    pub async fn record_trade_summary(&self, trade: &ClosedTrade) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            r#"INSERT INTO trading_history
               (ticker, company_name, buy_price, buy_date, sell_price, sell_date,
                profit_rate, holding_days, scenario)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                trade.ticker,
                trade.company_name,
                trade.buy_price,
                trade.buy_date,
                trade.sell_price,
                Utc::now().to_rfc3339(),
                trade.profit_rate,
                trade.holding_days,
                trade.scenario_json,
            ],
        )?;

        conn.execute(
            "DELETE FROM stock_holdings WHERE ticker = ?1",
            params![trade.ticker],
        )?;

        Ok(())
    }

    /// Latest closed-trade outcomes for one instrument, newest first
    pub async fn recent_outcomes(&self, ticker: &str, limit: usize) -> Result<Vec<TradeOutcome>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            r#"SELECT trade_date, profit_rate, holding_days, one_line_summary, lessons
               FROM trading_journal
               WHERE market = ?1 AND ticker = ?2
               ORDER BY trade_date DESC
               LIMIT ?3"#,
        )?;

        let outcomes = stmt
            .query_map(params![self.market, ticker, limit], |row| {
                let trade_date: String = row.get(0)?;
                let lessons_json: Option<String> = row.get(4)?;
                Ok(TradeOutcome {
                    trade_date: parse_ts(&trade_date),
                    profit_rate: row.get(1)?,
                    holding_days: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    one_line_summary: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    lessons: lessons_json
                        .and_then(|j| serde_json::from_str(&j).ok())
                        .unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(outcomes)
    }

    /// Load one full journal entry by id
    pub async fn entry(&self, id: i64) -> Result<Option<JournalEntry>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            r#"SELECT id, market, ticker, company_name, trade_date, trade_type,
                      buy_price, buy_date, buy_scenario, buy_market_context,
                      sell_price, sell_reason, profit_rate, holding_days,
                      situation_analysis, judgment_evaluation, lessons, pattern_tags,
                      one_line_summary, confidence_score, compression_layer,
                      compressed_summary, created_at, last_compressed_at
               FROM trading_journal WHERE id = ?1"#,
        )?;

        let entry = stmt
            .query_row(params![id], |row| {
                let trade_date: String = row.get(4)?;
                let situation: Option<String> = row.get(14)?;
                let judgment: Option<String> = row.get(15)?;
                let lessons: Option<String> = row.get(16)?;
                let tags: Option<String> = row.get(17)?;
                let created_at: String = row.get(22)?;
                let last_compressed: Option<String> = row.get(23)?;

                Ok(JournalEntry {
                    id: row.get(0)?,
                    market: row.get(1)?,
                    ticker: row.get(2)?,
                    company_name: row.get(3)?,
                    trade_date: parse_ts(&trade_date),
                    trade_type: row.get(5)?,
                    buy_price: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                    buy_date: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    buy_scenario: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                    buy_market_context: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                    sell_price: row.get::<_, Option<f64>>(10)?.unwrap_or(0.0),
                    sell_reason: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                    profit_rate: row.get::<_, Option<f64>>(12)?.unwrap_or(0.0),
                    holding_days: row.get::<_, Option<i64>>(13)?.unwrap_or(0),
                    situation_analysis: situation
                        .and_then(|j| serde_json::from_str(&j).ok())
                        .unwrap_or_else(|| serde_json::json!({})),
                    judgment_evaluation: judgment
                        .and_then(|j| serde_json::from_str(&j).ok())
                        .unwrap_or_else(|| serde_json::json!({})),
                    lessons: lessons
                        .and_then(|j| serde_json::from_str(&j).ok())
                        .unwrap_or_default(),
                    pattern_tags: tags
                        .and_then(|j| serde_json::from_str(&j).ok())
                        .unwrap_or_default(),
                    one_line_summary: row.get::<_, Option<String>>(18)?.unwrap_or_default(),
                    confidence_score: row.get::<_, Option<f64>>(19)?.unwrap_or(0.5),
                    compression_layer: CompressionTier::from_i64(
                        row.get::<_, Option<i64>>(20)?.unwrap_or(1),
                    ),
                    compressed_summary: row.get(21)?,
                    created_at: parse_ts(&created_at),
                    last_compressed_at: last_compressed.map(|s| parse_ts(&s)),
                })
            })
            .optional()?;

        Ok(entry)
    }

    /// Advance an entry to a higher compression tier, attaching the
    /// compressed summary. The tier only ever increases; a lower-or-equal
    /// target is a no-op returning false.
    pub async fn compress_entry(
        &self,
        id: i64,
        tier: CompressionTier,
        summary: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;

        let updated = conn.execute(
            r#"UPDATE trading_journal
               SET compression_layer = ?1,
                   compressed_summary = COALESCE(?2, compressed_summary),
                   last_compressed_at = ?3
               WHERE id = ?4 AND compression_layer < ?1"#,
            params![tier.as_i64(), summary, Utc::now().to_rfc3339(), id],
        )?;

        Ok(updated > 0)
    }

    /// Row counts across the memory tables
    pub async fn stats(&self) -> Result<JournalStats> {
        let conn = self.conn.lock().await;

        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, params![self.market], |row| row.get(0))?;
            Ok(n as usize)
        };

        let mut entries_by_tier = [0usize; 3];
        {
            let mut stmt = conn.prepare_cached(
                "SELECT compression_layer, COUNT(*) FROM trading_journal
                 WHERE market = ?1 GROUP BY compression_layer",
            )?;
            let rows = stmt.query_map(params![self.market], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (tier, n) = row?;
                if (1..=3).contains(&tier) {
                    entries_by_tier[(tier - 1) as usize] = n as usize;
                }
            }
        }

        let closed_trades: i64 =
            conn.query_row("SELECT COUNT(*) FROM trading_history", [], |row| row.get(0))?;

        Ok(JournalStats {
            total_entries: count("SELECT COUNT(*) FROM trading_journal WHERE market = ?1")?,
            entries_by_tier,
            active_principles: count(
                "SELECT COUNT(*) FROM trading_principles WHERE market = ?1 AND is_active = 1",
            )?,
            active_intuitions: count(
                "SELECT COUNT(*) FROM trading_intuitions WHERE market = ?1 AND is_active = 1",
            )?,
            closed_trades: closed_trades as usize,
        })
    }
}
