//! Intuition repository
//!
//! Pattern-level insights produced by the batch compression step, parallel
//! to principles but keyed by (category, condition). Same merge-on-duplicate
//! and soft-delete policy.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::store::parse_ts;
use super::{Intuition, Scope};

const INITIAL_CONFIDENCE: f64 = 0.5;
const MERGE_CONFIDENCE_STEP: f64 = 0.1;

pub struct IntuitionRepository {
    conn: Arc<Mutex<Connection>>,
    market: String,
}

impl IntuitionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>, market: &str) -> Self {
        Self {
            conn,
            market: market.to_string(),
        }
    }

    /// Insert a new insight or merge into the active row with the same
    /// (category, condition) key. Confidence and supporting-trade count
    /// both increase monotonically on merge; success rate and insight text
    /// are refreshed from the latest distillation.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        &self,
        category: &str,
        subcategory: Option<&str>,
        condition: &str,
        insight: &str,
        scope: Scope,
        success_rate: Option<f64>,
        source_journal_id: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let now = Utc::now().to_rfc3339();

        let existing: Option<(i64, Option<String>)> = conn
            .query_row(
                r#"SELECT id, source_journal_ids FROM trading_intuitions
                   WHERE market = ?1 AND category = ?2 AND condition = ?3 AND is_active = 1"#,
                params![self.market, category, condition],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((id, existing_ids)) => {
                let existing_ids = existing_ids.unwrap_or_default();
                let new_ids = if existing_ids.is_empty() {
                    source_journal_id.to_string()
                } else {
                    format!("{},{}", existing_ids, source_journal_id)
                };

                conn.execute(
                    r#"UPDATE trading_intuitions
                       SET supporting_trades = supporting_trades + 1,
                           confidence = MIN(1.0, confidence + ?1),
                           insight = ?2,
                           success_rate = COALESCE(?3, success_rate),
                           source_journal_ids = ?4,
                           last_validated_at = ?5
                       WHERE id = ?6"#,
                    params![MERGE_CONFIDENCE_STEP, insight, success_rate, new_ids, now, id],
                )?;
                debug!("Merged intuition {} ({})", id, condition);
            }
            None => {
                conn.execute(
                    r#"INSERT INTO trading_intuitions
                       (market, category, subcategory, condition, insight, confidence,
                        supporting_trades, success_rate, source_journal_ids,
                        created_at, is_active, scope)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8, ?9, 1, ?10)"#,
                    params![
                        self.market,
                        category,
                        subcategory,
                        condition,
                        insight,
                        INITIAL_CONFIDENCE,
                        success_rate,
                        source_journal_id.to_string(),
                        now,
                        scope.to_string(),
                    ],
                )?;
                debug!("New intuition recorded ({})", condition);
            }
        }

        Ok(())
    }

    /// Highest-confidence active insights, for context assembly
    pub async fn list_top(&self, limit: usize) -> Result<Vec<Intuition>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            r#"SELECT id, market, category, subcategory, condition, insight, confidence,
                      supporting_trades, success_rate, source_journal_ids,
                      created_at, last_validated_at, is_active, scope
               FROM trading_intuitions
               WHERE market = ?1 AND is_active = 1
               ORDER BY confidence DESC
               LIMIT ?2"#,
        )?;

        let intuitions = stmt
            .query_map(params![self.market, limit], map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(intuitions)
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Intuition> {
    let created_at: String = row.get(10)?;
    let last_validated: Option<String> = row.get(11)?;
    let scope: Option<String> = row.get(13)?;

    Ok(Intuition {
        id: row.get(0)?,
        market: row.get(1)?,
        category: row.get(2)?,
        subcategory: row.get(3)?,
        condition: row.get(4)?,
        insight: row.get(5)?,
        confidence: row.get::<_, Option<f64>>(6)?.unwrap_or(0.5),
        supporting_trades: row.get::<_, Option<i64>>(7)?.unwrap_or(1),
        success_rate: row.get(8)?,
        source_journal_ids: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        created_at: parse_ts(&created_at),
        last_validated_at: last_validated.map(|s| parse_ts(&s)),
        is_active: row.get::<_, i64>(12)? != 0,
        scope: Scope::from_label(scope.as_deref().unwrap_or("universal")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::schema;

    fn repo() -> IntuitionRepository {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        IntuitionRepository::new(Arc::new(Mutex::new(conn)), "KR")
    }

    #[tokio::test]
    async fn test_merge_on_duplicate_key() {
        let repo = repo();

        repo.upsert(
            "momentum",
            None,
            "gap up at open",
            "fade the gap",
            Scope::Universal,
            Some(0.6),
            1,
        )
        .await
        .unwrap();
        repo.upsert(
            "momentum",
            Some("open"),
            "gap up at open",
            "fade the gap within 30m",
            Scope::Universal,
            Some(0.7),
            2,
        )
        .await
        .unwrap();

        let all = repo.list_top(10).await.unwrap();
        assert_eq!(all.len(), 1);
        let i = &all[0];
        assert_eq!(i.supporting_trades, 2);
        assert!((i.confidence - 0.6).abs() < 1e-9);
        assert_eq!(i.insight, "fade the gap within 30m");
        assert_eq!(i.success_rate, Some(0.7));
        assert!(i.source_journal_ids.contains('1') && i.source_journal_ids.contains('2'));
    }

    #[tokio::test]
    async fn test_distinct_categories_do_not_merge() {
        let repo = repo();
        repo.upsert("momentum", None, "c", "i1", Scope::Universal, None, 1)
            .await
            .unwrap();
        repo.upsert("timing", None, "c", "i2", Scope::Universal, None, 1)
            .await
            .unwrap();

        assert_eq!(repo.list_top(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_top_listing_ordered_by_confidence() {
        let repo = repo();
        repo.upsert("a", None, "c1", "i", Scope::Universal, None, 1)
            .await
            .unwrap();
        repo.upsert("b", None, "c2", "i", Scope::Universal, None, 1)
            .await
            .unwrap();
        // Merge the second twice so its confidence leads
        repo.upsert("b", None, "c2", "i", Scope::Universal, None, 2)
            .await
            .unwrap();
        repo.upsert("b", None, "c2", "i", Scope::Universal, None, 3)
            .await
            .unwrap();

        let top = repo.list_top(1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].category, "b");
        assert!((top[0].confidence - 0.7).abs() < 1e-9);
    }
}
