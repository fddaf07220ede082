//! Principle repository
//!
//! Stores deduplicated, scope-tagged decision rules distilled from trade
//! lessons. One active rule per (condition, action) pair within a scope:
//! a corroborating lesson merges into the existing row instead of creating
//! a duplicate, nudging confidence up by a fixed step.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::store::parse_ts;
use super::{Lesson, Principle, Priority, Scope};

/// Confidence assigned to a freshly distilled rule
const INITIAL_CONFIDENCE: f64 = 0.5;

/// Fixed reinforcement step applied per corroborating trade
const MERGE_CONFIDENCE_STEP: f64 = 0.1;

/// SQL expression ranking priority high > medium > low
pub(crate) const PRIORITY_RANK: &str =
    "CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END";

pub struct PrincipleRepository {
    conn: Arc<Mutex<Connection>>,
    market: String,
}

impl PrincipleRepository {
    pub fn new(conn: Arc<Mutex<Connection>>, market: &str) -> Self {
        Self {
            conn,
            market: market.to_string(),
        }
    }

    /// Insert a new rule or merge into the active row with the same
    /// (condition, action) key in this scope.
    ///
    /// Merging appends the source journal id, increments the supporting
    /// trade count, and raises confidence by the fixed step capped at 1.0.
    pub async fn upsert(
        &self,
        scope: Scope,
        scope_context: Option<&str>,
        condition: &str,
        action: &str,
        reason: Option<&str>,
        priority: Priority,
        source_journal_id: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let now = Utc::now().to_rfc3339();

        let existing: Option<(i64, Option<String>)> = conn
            .query_row(
                r#"SELECT id, source_journal_ids FROM trading_principles
                   WHERE market = ?1 AND scope = ?2 AND condition = ?3 AND action = ?4
                     AND is_active = 1"#,
                params![self.market, scope.to_string(), condition, action],
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
                    r#"UPDATE trading_principles
                       SET supporting_trades = supporting_trades + 1,
                           confidence = MIN(1.0, confidence + ?1),
                           source_journal_ids = ?2,
                           last_validated_at = ?3
                       WHERE id = ?4"#,
                    params![MERGE_CONFIDENCE_STEP, new_ids, now, id],
                )?;
                debug!("Merged lesson into principle {} ({})", id, condition);
            }
            None => {
                conn.execute(
                    r#"INSERT INTO trading_principles
                       (market, scope, scope_context, condition, action, reason, priority,
                        confidence, supporting_trades, source_journal_ids, created_at, is_active)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10, 1)"#,
                    params![
                        self.market,
                        scope.to_string(),
                        scope_context,
                        condition,
                        action,
                        reason,
                        priority.to_string(),
                        INITIAL_CONFIDENCE,
                        source_journal_id.to_string(),
                        now,
                    ],
                )?;
                debug!("New principle recorded ({})", condition);
            }
        }

        Ok(())
    }

    /// Distill principles from a journal entry's lessons.
    ///
    /// Lessons missing a condition or an action are skipped silently; a
    /// storage failure on one lesson is logged and does not stop the rest.
    /// Returns the number of lessons applied (inserted or merged).
    pub async fn extract_from_lessons(&self, lessons: &[Lesson], source_journal_id: i64) -> usize {
        let mut applied = 0;

        for lesson in lessons {
            if lesson.condition.trim().is_empty() || lesson.action.trim().is_empty() {
                continue;
            }

            let scope = Scope::for_priority(lesson.priority);
            match self
                .upsert(
                    scope,
                    None,
                    &lesson.condition,
                    &lesson.action,
                    lesson.reason.as_deref(),
                    lesson.priority,
                    source_journal_id,
                )
                .await
            {
                Ok(()) => applied += 1,
                Err(e) => warn!("Failed to save principle from lesson: {}", e),
            }
        }

        applied
    }

    /// Ranked active rules for one scope: priority first (high before
    /// medium before low), confidence as tie-break
    pub async fn list_active(&self, scope: Scope, limit: usize) -> Result<Vec<Principle>> {
        let conn = self.conn.lock().await;

        let sql = format!(
            r#"SELECT id, market, scope, scope_context, condition, action, reason, priority,
                      confidence, supporting_trades, source_journal_ids,
                      created_at, last_validated_at, is_active
               FROM trading_principles
               WHERE market = ?1 AND scope = ?2 AND is_active = 1
               ORDER BY {}, confidence DESC
               LIMIT ?3"#,
            PRIORITY_RANK
        );
        let mut stmt = conn.prepare_cached(&sql)?;

        let principles = stmt
            .query_map(params![self.market, scope.to_string(), limit], map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(principles)
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Principle> {
    let scope: String = row.get(2)?;
    let priority: Option<String> = row.get(7)?;
    let created_at: String = row.get(11)?;
    let last_validated: Option<String> = row.get(12)?;

    Ok(Principle {
        id: row.get(0)?,
        market: row.get(1)?,
        scope: Scope::from_label(&scope),
        scope_context: row.get(3)?,
        condition: row.get(4)?,
        action: row.get(5)?,
        reason: row.get(6)?,
        priority: Priority::from_label(priority.as_deref().unwrap_or("medium")),
        confidence: row.get::<_, Option<f64>>(8)?.unwrap_or(0.5),
        supporting_trades: row.get::<_, Option<i64>>(9)?.unwrap_or(1),
        source_journal_ids: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
        created_at: parse_ts(&created_at),
        last_validated_at: last_validated.map(|s| parse_ts(&s)),
        is_active: row.get::<_, i64>(13)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::schema;

    fn repo() -> PrincipleRepository {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        PrincipleRepository::new(Arc::new(Mutex::new(conn)), "KR")
    }

    fn lesson(condition: &str, action: &str, priority: Priority) -> Lesson {
        Lesson {
            condition: condition.to_string(),
            action: action.to_string(),
            reason: Some("because".to_string()),
            priority,
        }
    }

    #[tokio::test]
    async fn test_duplicate_lesson_merges_into_one_row() {
        let repo = repo();
        let l = lesson("X", "Y", Priority::High);

        assert_eq!(repo.extract_from_lessons(&[l.clone()], 1).await, 1);
        assert_eq!(repo.extract_from_lessons(&[l], 2).await, 1);

        let rules = repo.list_active(Scope::Universal, 10).await.unwrap();
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.supporting_trades, 2);
        assert!((rule.confidence - 0.6).abs() < 1e-9);
        assert!(rule.source_journal_ids.contains('1'));
        assert!(rule.source_journal_ids.contains('2'));
        assert!(rule.last_validated_at.is_some());
    }

    #[tokio::test]
    async fn test_high_priority_is_universal_others_sector() {
        let repo = repo();
        repo.extract_from_lessons(
            &[
                lesson("on spike", "take profit", Priority::High),
                lesson("on dip", "hold", Priority::Medium),
                lesson("on drift", "review", Priority::Low),
            ],
            7,
        )
        .await;

        assert_eq!(repo.list_active(Scope::Universal, 10).await.unwrap().len(), 1);
        assert_eq!(repo.list_active(Scope::Sector, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_confidence_caps_at_one() {
        let repo = repo();
        let l = lesson("cap", "check", Priority::High);

        // 0.5 start + 9 merges of 0.1 would overshoot without the cap
        for id in 0..10 {
            repo.extract_from_lessons(&[l.clone()], id).await;
        }

        let rules = repo.list_active(Scope::Universal, 10).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert!((rules[0].confidence - 1.0).abs() < 1e-9);
        assert_eq!(rules[0].supporting_trades, 10);
    }

    #[tokio::test]
    async fn test_incomplete_lessons_skipped() {
        let repo = repo();
        let applied = repo
            .extract_from_lessons(
                &[
                    lesson("", "act", Priority::High),
                    lesson("cond", "   ", Priority::High),
                    lesson("cond", "act", Priority::High),
                ],
                1,
            )
            .await;
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn test_listing_ranks_priority_then_confidence() {
        let repo = repo();
        // Three distinct universal rules; merge one of them to raise its
        // confidence above its peers
        repo.upsert(Scope::Universal, None, "a", "1", None, Priority::Medium, 1)
            .await
            .unwrap();
        repo.upsert(Scope::Universal, None, "b", "2", None, Priority::High, 1)
            .await
            .unwrap();
        repo.upsert(Scope::Universal, None, "c", "3", None, Priority::Medium, 1)
            .await
            .unwrap();
        repo.upsert(Scope::Universal, None, "c", "3", None, Priority::Medium, 2)
            .await
            .unwrap();

        let rules = repo.list_active(Scope::Universal, 10).await.unwrap();
        assert_eq!(rules.len(), 3);
        // High priority first regardless of confidence
        assert_eq!(rules[0].condition, "b");
        // Then medium, higher confidence first
        assert_eq!(rules[1].condition, "c");
        assert_eq!(rules[2].condition, "a");
    }
}
