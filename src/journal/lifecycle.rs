//! Lifecycle manager
//!
//! Scheduled maintenance over the memory tables: deactivate rules whose
//! confidence fell below the floor, cap the active-rule population, and
//! permanently delete journal entries that finished the compression
//! lifecycle long ago. A dry run computes the same report from read
//! queries only and performs no commit.

use anyhow::Result;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::CompressionTier;

/// Thresholds for one maintenance pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceOptions {
    /// Active principles/intuitions below this confidence are deactivated
    pub min_confidence: f64,
    /// Maximum active principles kept; lowest-confidence excess is
    /// deactivated
    pub max_principles: usize,
    /// Tier-3 journal entries older than this many days are deleted
    pub archive_tier3_days: i64,
    /// Report what would happen without mutating anything
    pub dry_run: bool,
}

impl Default for MaintenanceOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            max_principles: 50,
            archive_tier3_days: 365,
            dry_run: false,
        }
    }
}

/// Counts of actions taken (or, under dry run, that would be taken)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub low_confidence_principles: usize,
    pub capped_principles: usize,
    pub low_confidence_intuitions: usize,
    pub archived_entries: usize,
    pub dry_run: bool,
}

pub struct LifecycleManager {
    conn: Arc<Mutex<Connection>>,
    market: String,
}

impl LifecycleManager {
    pub fn new(conn: Arc<Mutex<Connection>>, market: &str) -> Self {
        Self {
            conn,
            market: market.to_string(),
        }
    }

    /// Run one maintenance pass. Mutations, if any, commit as a single
    /// transaction; the dry-run branch never issues a mutating statement.
    pub async fn run(&self, opts: &MaintenanceOptions) -> Result<MaintenanceReport> {
        if opts.dry_run {
            self.preview(opts).await
        } else {
            self.execute(opts).await
        }
    }

    async fn preview(&self, opts: &MaintenanceOptions) -> Result<MaintenanceReport> {
        let conn = self.conn.lock().await;
        let cutoff = archive_cutoff(opts.archive_tier3_days);

        let low_confidence_principles: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM trading_principles
               WHERE market = ?1 AND is_active = 1 AND confidence < ?2"#,
            params![self.market, opts.min_confidence],
            |row| row.get(0),
        )?;

        // Capping applies to the rules that would survive pruning
        let surviving: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM trading_principles
               WHERE market = ?1 AND is_active = 1 AND confidence >= ?2"#,
            params![self.market, opts.min_confidence],
            |row| row.get(0),
        )?;
        let capped_principles = (surviving as usize).saturating_sub(opts.max_principles);

        let low_confidence_intuitions: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM trading_intuitions
               WHERE market = ?1 AND is_active = 1 AND confidence < ?2"#,
            params![self.market, opts.min_confidence],
            |row| row.get(0),
        )?;

        let archived_entries: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM trading_journal
               WHERE market = ?1 AND compression_layer = ?2 AND created_at < ?3"#,
            params![self.market, CompressionTier::Archived.as_i64(), cutoff],
            |row| row.get(0),
        )?;

        Ok(MaintenanceReport {
            low_confidence_principles: low_confidence_principles as usize,
            capped_principles,
            low_confidence_intuitions: low_confidence_intuitions as usize,
            archived_entries: archived_entries as usize,
            dry_run: true,
        })
    }

    async fn execute(&self, opts: &MaintenanceOptions) -> Result<MaintenanceReport> {
        let mut conn = self.conn.lock().await;
        let cutoff = archive_cutoff(opts.archive_tier3_days);
        let tx = conn.transaction()?;

        // Confidence pruning (soft delete, rows retained for audit)
        let low_confidence_principles = tx.execute(
            r#"UPDATE trading_principles SET is_active = 0
               WHERE market = ?1 AND is_active = 1 AND confidence < ?2"#,
            params![self.market, opts.min_confidence],
        )?;

        // Population capping: keep exactly the top-N by confidence
        let capped_principles = tx.execute(
            r#"UPDATE trading_principles SET is_active = 0
               WHERE market = ?1 AND is_active = 1
                 AND id NOT IN (
                     SELECT id FROM trading_principles
                     WHERE market = ?1 AND is_active = 1
                     ORDER BY confidence DESC
                     LIMIT ?2
                 )"#,
            params![self.market, opts.max_principles],
        )?;

        let low_confidence_intuitions = tx.execute(
            r#"UPDATE trading_intuitions SET is_active = 0
               WHERE market = ?1 AND is_active = 1 AND confidence < ?2"#,
            params![self.market, opts.min_confidence],
        )?;

        // Tiered archival: hard delete, tier 3 only, past the age threshold
        let archived_entries = tx.execute(
            r#"DELETE FROM trading_journal
               WHERE market = ?1 AND compression_layer = ?2 AND created_at < ?3"#,
            params![self.market, CompressionTier::Archived.as_i64(), cutoff],
        )?;

        tx.commit()?;

        let report = MaintenanceReport {
            low_confidence_principles,
            capped_principles,
            low_confidence_intuitions,
            archived_entries,
            dry_run: false,
        };
        info!(
            "Maintenance pass: {} low-confidence principles, {} over capacity, \
             {} low-confidence intuitions, {} entries archived",
            report.low_confidence_principles,
            report.capped_principles,
            report.low_confidence_intuitions,
            report.archived_entries
        );
        Ok(report)
    }
}

fn archive_cutoff(days: i64) -> String {
    (Utc::now() - Duration::days(days)).to_rfc3339()
}
