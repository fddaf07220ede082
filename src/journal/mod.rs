//! Trading Memory Module
//!
//! Provides:
//! - SQLite-based persistence for trade retrospectives ("journal entries")
//! - Principle distillation: deduplicated (condition -> action) rules
//! - Intuition accumulation: pattern-level insights from batch compression
//! - Retrieval context assembly for the next buy decision
//! - Historical-performance score adjustment
//! - Tiered compression/archival lifecycle with dry-run maintenance

pub mod schema;
pub mod parser;
pub mod store;
pub mod principles;
pub mod intuitions;
pub mod context;
pub mod scoring;
pub mod lifecycle;
pub mod engine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use engine::JournalEngine;
pub use lifecycle::{LifecycleManager, MaintenanceOptions, MaintenanceReport};
pub use parser::parse_retrospective;
pub use store::{JournalStats, JournalStore, TradeOutcome};

/// Priority assigned to a lesson or principle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Parse a free-form label, defaulting to Medium on anything unknown
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }

    /// Sort rank for SQL ordering: high before medium before low
    pub fn rank(self) -> i64 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Applicability breadth of a principle or intuition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Universal,
    Market,
    Sector,
}

impl Scope {
    /// Scope for a freshly distilled lesson: high priority generalizes to
    /// every trade, anything lower stays sector-local
    pub fn for_priority(priority: Priority) -> Self {
        match priority {
            Priority::High => Scope::Universal,
            _ => Scope::Sector,
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "market" => Scope::Market,
            "sector" => Scope::Sector,
            _ => Scope::Universal,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Universal => write!(f, "universal"),
            Scope::Market => write!(f, "market"),
            Scope::Sector => write!(f, "sector"),
        }
    }
}

/// Compression tier of a journal entry (monotonically increasing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CompressionTier {
    /// Full retrospective detail
    Detailed,
    /// Condensed summary, detail fields still present
    Summary,
    /// Archived; eligible for deletion after the age threshold
    Archived,
}

impl CompressionTier {
    pub fn as_i64(self) -> i64 {
        match self {
            CompressionTier::Detailed => 1,
            CompressionTier::Summary => 2,
            CompressionTier::Archived => 3,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            3 => CompressionTier::Archived,
            2 => CompressionTier::Summary,
            _ => CompressionTier::Detailed,
        }
    }
}

/// A single distilled lesson from a trade retrospective
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub condition: String,
    pub action: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "default_lesson_priority")]
    pub priority: Priority,
}

fn default_lesson_priority() -> Priority {
    Priority::Medium
}

/// Structured result of parsing a retrospective analysis response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retrospective {
    pub situation_analysis: serde_json::Value,
    pub judgment_evaluation: serde_json::Value,
    pub lessons: Vec<Lesson>,
    pub pattern_tags: Vec<String>,
    pub one_line_summary: String,
    pub confidence_score: f64,
}

impl Default for Retrospective {
    fn default() -> Self {
        Self {
            situation_analysis: serde_json::json!({}),
            judgment_evaluation: serde_json::json!({}),
            lessons: Vec::new(),
            pattern_tags: Vec::new(),
            one_line_summary: String::new(),
            confidence_score: 0.5,
        }
    }
}

/// Buy scenario decoded once at the storage boundary.
///
/// The raw JSON text is persisted verbatim alongside this; all fields are
/// optional because the scenario blob is produced by an upstream agent with
/// no schema guarantee.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuyScenario {
    #[serde(default)]
    pub buy_score: Option<f64>,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub target_price: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub investment_period: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub market_condition: Option<String>,
}

impl BuyScenario {
    /// Decode a scenario blob, tolerating malformed or absent JSON
    pub fn from_json(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }
}

/// Input context for one closed position, supplied by the trading pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub ticker: String,
    pub company_name: String,
    pub buy_price: f64,
    pub buy_date: String,
    /// Serialized buy scenario, persisted verbatim
    pub scenario_json: String,
    pub sell_price: f64,
    pub sell_reason: String,
    /// Realized profit/loss percentage (signed)
    pub profit_rate: f64,
    pub holding_days: i64,
}

/// One stored trade retrospective (full row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub market: String,
    pub ticker: String,
    pub company_name: String,
    pub trade_date: DateTime<Utc>,
    pub trade_type: String,
    pub buy_price: f64,
    pub buy_date: String,
    pub buy_scenario: String,
    pub buy_market_context: String,
    pub sell_price: f64,
    pub sell_reason: String,
    pub profit_rate: f64,
    pub holding_days: i64,
    pub situation_analysis: serde_json::Value,
    pub judgment_evaluation: serde_json::Value,
    pub lessons: Vec<Lesson>,
    pub pattern_tags: Vec<String>,
    pub one_line_summary: String,
    pub confidence_score: f64,
    pub compression_layer: CompressionTier,
    pub compressed_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_compressed_at: Option<DateTime<Utc>>,
}

/// A durable, deduplicated decision rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principle {
    pub id: i64,
    pub market: String,
    pub scope: Scope,
    pub scope_context: Option<String>,
    pub condition: String,
    pub action: String,
    pub reason: Option<String>,
    pub priority: Priority,
    pub confidence: f64,
    pub supporting_trades: i64,
    /// Comma-joined journal entry IDs (provenance only, not a foreign key)
    pub source_journal_ids: String,
    pub created_at: DateTime<Utc>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// A pattern-level insight accumulated by batch compression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intuition {
    pub id: i64,
    pub market: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub condition: String,
    pub insight: String,
    pub confidence: f64,
    pub supporting_trades: i64,
    pub success_rate: Option<f64>,
    pub source_journal_ids: String,
    pub created_at: DateTime<Utc>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub scope: Scope,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_labels_round_trip() {
        assert_eq!(Priority::from_label("high"), Priority::High);
        assert_eq!(Priority::from_label("HIGH "), Priority::High);
        assert_eq!(Priority::from_label("low"), Priority::Low);
        assert_eq!(Priority::from_label("whatever"), Priority::Medium);
        assert_eq!(Priority::High.to_string(), "high");
    }

    #[test]
    fn test_priority_rank_ordering() {
        assert!(Priority::High.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::Low.rank());
    }

    #[test]
    fn test_scope_for_priority() {
        assert_eq!(Scope::for_priority(Priority::High), Scope::Universal);
        assert_eq!(Scope::for_priority(Priority::Medium), Scope::Sector);
        assert_eq!(Scope::for_priority(Priority::Low), Scope::Sector);
    }

    #[test]
    fn test_compression_tier_round_trip() {
        for tier in [
            CompressionTier::Detailed,
            CompressionTier::Summary,
            CompressionTier::Archived,
        ] {
            assert_eq!(CompressionTier::from_i64(tier.as_i64()), tier);
        }
        // Out-of-range values collapse to the base tier
        assert_eq!(CompressionTier::from_i64(0), CompressionTier::Detailed);
        assert_eq!(CompressionTier::from_i64(99), CompressionTier::Detailed);
    }

    #[test]
    fn test_buy_scenario_tolerates_garbage() {
        let s = BuyScenario::from_json("not json at all");
        assert!(s.sector.is_none());

        let s = BuyScenario::from_json(r#"{"sector": "semiconductor", "target_price": 95000}"#);
        assert_eq!(s.sector.as_deref(), Some("semiconductor"));
        assert_eq!(s.target_price, Some(95000.0));
    }
}
