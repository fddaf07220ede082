//! Score adjustment calculator
//!
//! Derives a small integer nudge to a buy/sell score from historical
//! profit distributions: the same instrument's last few outcomes and the
//! sector-wide aggregate. Always lands in [-2, 2].

use anyhow::Result;
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Trades considered for the same-instrument term
const SAME_STOCK_WINDOW: usize = 3;

/// Same-instrument average profit thresholds (%)
const SAME_STOCK_LOSS_THRESHOLD: f64 = -5.0;
const SAME_STOCK_GAIN_THRESHOLD: f64 = 10.0;

/// Minimum sector sample size before the sector term applies
const SECTOR_MIN_TRADES: i64 = 3;

/// Sector average profit thresholds (%)
const SECTOR_LOSS_THRESHOLD: f64 = -3.0;
const SECTOR_GAIN_THRESHOLD: f64 = 5.0;

const MAX_ADJUSTMENT: i32 = 2;

pub struct ScoreCalculator {
    conn: Arc<Mutex<Connection>>,
    market: String,
}

impl ScoreCalculator {
    pub fn new(conn: Arc<Mutex<Connection>>, market: &str) -> Self {
        Self {
            conn,
            market: market.to_string(),
        }
    }

    /// Compute the adjustment for one instrument plus the justification
    /// strings. No history yields (0, []).
    pub async fn adjustment(
        &self,
        ticker: &str,
        sector: Option<&str>,
    ) -> Result<(i32, Vec<String>)> {
        let conn = self.conn.lock().await;

        let mut adjustment = 0i32;
        let mut reasons = Vec::new();

        // Same-instrument term: average of the latest outcomes
        let mut stmt = conn.prepare_cached(
            r#"SELECT profit_rate FROM trading_journal
               WHERE market = ?1 AND ticker = ?2
               ORDER BY trade_date DESC LIMIT ?3"#,
        )?;
        let rates: Vec<f64> = stmt
            .query_map(params![self.market, ticker, SAME_STOCK_WINDOW], |row| {
                row.get::<_, Option<f64>>(0).map(|r| r.unwrap_or(0.0))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if !rates.is_empty() {
            let avg = rates.iter().sum::<f64>() / rates.len() as f64;
            if avg < SAME_STOCK_LOSS_THRESHOLD {
                adjustment -= 1;
                reasons.push(format!(
                    "Past trades in this instrument averaged a {:.1}% loss",
                    avg
                ));
            } else if avg > SAME_STOCK_GAIN_THRESHOLD {
                adjustment += 1;
                reasons.push(format!(
                    "Past trades in this instrument averaged a {:.1}% gain",
                    avg
                ));
            }
        }

        // Sector term: only with a real label and a minimum sample.
        // Matches the stored scenario blob by substring; the sector name
        // is not a dedicated column.
        if let Some(sector) = sector.filter(|s| !is_placeholder(s)) {
            let pattern = format!("%\"{}\"%", sector);
            let (avg, count): (Option<f64>, i64) = conn.query_row(
                r#"SELECT AVG(profit_rate), COUNT(*) FROM trading_journal
                   WHERE market = ?1 AND buy_scenario LIKE ?2"#,
                params![self.market, pattern],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            if count >= SECTOR_MIN_TRADES {
                let avg = avg.unwrap_or(0.0);
                if avg < SECTOR_LOSS_THRESHOLD {
                    adjustment -= 1;
                    reasons.push(format!("{} sector averaged a {:.1}% loss", sector, avg));
                } else if avg > SECTOR_GAIN_THRESHOLD {
                    adjustment += 1;
                    reasons.push(format!("{} sector averaged a {:.1}% gain", sector, avg));
                }
            }
        }

        Ok((adjustment.clamp(-MAX_ADJUSTMENT, MAX_ADJUSTMENT), reasons))
    }
}

/// Labels that mean "sector unknown" upstream and must not feed the
/// sector aggregate
fn is_placeholder(sector: &str) -> bool {
    let s = sector.trim();
    s.is_empty() || s.eq_ignore_ascii_case("unknown") || s.eq_ignore_ascii_case("n/a")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::store::JournalStore;
    use crate::journal::{ClosedTrade, Retrospective};
    use tempfile::tempdir;

    fn trade(ticker: &str, profit_rate: f64, sector: &str) -> ClosedTrade {
        ClosedTrade {
            ticker: ticker.to_string(),
            company_name: ticker.to_string(),
            buy_price: 100.0,
            buy_date: "2026-01-01".to_string(),
            scenario_json: format!(r#"{{"sector": "{}"}}"#, sector),
            sell_price: 100.0 + profit_rate,
            sell_reason: "test".to_string(),
            profit_rate,
            holding_days: 5,
        }
    }

    async fn fixtures() -> (tempfile::TempDir, JournalStore, ScoreCalculator) {
        let dir = tempdir().unwrap();
        let store = JournalStore::open(dir.path().join("journal.db"), "KR")
            .await
            .unwrap();
        let calc = ScoreCalculator::new(store.handle(), "KR");
        (dir, store, calc)
    }

    #[tokio::test]
    async fn test_no_history_is_neutral() {
        let (_dir, _store, calc) = fixtures().await;
        let (delta, reasons) = calc.adjustment("005930", Some("semiconductor")).await.unwrap();
        assert_eq!(delta, 0);
        assert!(reasons.is_empty());
    }

    #[tokio::test]
    async fn test_losing_instrument_history_penalized() {
        let (_dir, store, calc) = fixtures().await;
        for rate in [-8.0, -9.0, -10.0] {
            store
                .insert_entry(&trade("T1", rate, "bio"), &Retrospective::default())
                .await
                .unwrap();
        }

        let (delta, reasons) = calc.adjustment("T1", None).await.unwrap();
        assert!(delta < 0);
        assert!(!reasons.is_empty());
    }

    #[tokio::test]
    async fn test_winning_instrument_history_rewarded() {
        let (_dir, store, calc) = fixtures().await;
        for rate in [12.0, 13.0, 14.0] {
            store
                .insert_entry(&trade("T1", rate, "bio"), &Retrospective::default())
                .await
                .unwrap();
        }

        let (delta, reasons) = calc.adjustment("T1", None).await.unwrap();
        assert!(delta > 0);
        assert!(!reasons.is_empty());
    }

    #[tokio::test]
    async fn test_sector_term_needs_minimum_sample() {
        let (_dir, store, calc) = fixtures().await;
        // Two sector trades: under the minimum, no sector term
        for rate in [-10.0, -12.0] {
            store
                .insert_entry(&trade("A", rate, "shipbuilding"), &Retrospective::default())
                .await
                .unwrap();
        }
        let (delta, _) = calc.adjustment("B", Some("shipbuilding")).await.unwrap();
        assert_eq!(delta, 0);

        // Third trade crosses the gate
        store
            .insert_entry(&trade("C", -11.0, "shipbuilding"), &Retrospective::default())
            .await
            .unwrap();
        let (delta, reasons) = calc.adjustment("B", Some("shipbuilding")).await.unwrap();
        assert_eq!(delta, -1);
        assert!(reasons[0].contains("shipbuilding"));
    }

    #[tokio::test]
    async fn test_placeholder_sector_excluded() {
        let (_dir, store, calc) = fixtures().await;
        for rate in [-10.0, -12.0, -14.0] {
            store
                .insert_entry(&trade("A", rate, "unknown"), &Retrospective::default())
                .await
                .unwrap();
        }

        for label in ["unknown", "N/A", "  ", ""] {
            let (delta, reasons) = calc.adjustment("B", Some(label)).await.unwrap();
            assert_eq!(delta, 0, "label {:?} should be excluded", label);
            assert!(reasons.is_empty());
        }
    }

    #[tokio::test]
    async fn test_combined_terms_stay_in_range() {
        let (_dir, store, calc) = fixtures().await;
        for rate in [-20.0, -21.0, -22.0] {
            store
                .insert_entry(&trade("T1", rate, "bio"), &Retrospective::default())
                .await
                .unwrap();
        }

        // Both terms fire negative: instrument avg and sector avg
        let (delta, reasons) = calc.adjustment("T1", Some("bio")).await.unwrap();
        assert_eq!(delta, -2);
        assert_eq!(reasons.len(), 2);
        assert!((-2..=2).contains(&delta));
    }
}
