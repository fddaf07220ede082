//! Context assembler
//!
//! Renders the memory the next buy decision should see: ranked universal
//! principles, the latest same-instrument outcomes, and the strongest
//! accumulated intuitions, as one human-readable block. No data means an
//! empty string, indistinguishable from the feature being disabled.

use anyhow::Result;

use super::intuitions::IntuitionRepository;
use super::principles::PrincipleRepository;
use super::store::JournalStore;
use super::{Priority, Scope};
use crate::config::ContextConfig;

pub struct ContextAssembler<'a> {
    store: &'a JournalStore,
    principles: &'a PrincipleRepository,
    intuitions: &'a IntuitionRepository,
    limits: ContextConfig,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(
        store: &'a JournalStore,
        principles: &'a PrincipleRepository,
        intuitions: &'a IntuitionRepository,
        limits: ContextConfig,
    ) -> Self {
        Self {
            store,
            principles,
            intuitions,
            limits,
        }
    }

    /// Assemble the memory block for one instrument. Returns an empty
    /// string when none of the sections produce content.
    pub async fn assemble(&self, ticker: &str, _sector: Option<&str>) -> Result<String> {
        let mut parts: Vec<String> = Vec::new();

        // Ranked universal principles first
        let principles = self
            .principles
            .list_active(Scope::Universal, self.limits.max_principles)
            .await?;
        if !principles.is_empty() {
            parts.push("#### 🎯 Core trading principles (every trade)".to_string());
            for p in &principles {
                let marker = priority_marker(p.priority);
                let mut line = format!("- {} **{}** → {}", marker, p.condition, p.action);
                if let Some(reason) = &p.reason {
                    line.push_str(&format!(" (reason: {})", truncate(reason, 50)));
                }
                line.push_str(&format!(
                    " [confidence: {}, trades: {}]",
                    confidence_bar(p.confidence),
                    p.supporting_trades
                ));
                parts.push(line);
            }
            parts.push(String::new());
        }

        // Same-instrument history
        let outcomes = self
            .store
            .recent_outcomes(ticker, self.limits.max_recent_trades)
            .await?;
        if !outcomes.is_empty() {
            parts.push("#### Past trades for this instrument".to_string());
            for outcome in &outcomes {
                let tag = if outcome.profit_rate > 0.0 { "✅" } else { "❌" };
                let mut line = format!(
                    "- [{}] {} {:+.1}% (held {}d) - {}",
                    outcome.trade_date.format("%Y-%m-%d"),
                    tag,
                    outcome.profit_rate,
                    outcome.holding_days,
                    outcome.one_line_summary
                );
                let actions: Vec<&str> = outcome
                    .lessons
                    .iter()
                    .take(self.limits.max_lesson_actions)
                    .map(|l| l.action.as_str())
                    .filter(|a| !a.is_empty())
                    .collect();
                if !actions.is_empty() {
                    line.push_str(&format!(" / lessons: {}", actions.join(", ")));
                }
                parts.push(line);
            }
            parts.push(String::new());
        }

        // Accumulated intuitions
        let intuitions = self.intuitions.list_top(self.limits.max_intuitions).await?;
        if !intuitions.is_empty() {
            parts.push("#### Accumulated trading intuitions".to_string());
            for i in &intuitions {
                parts.push(format!(
                    "- [{}] {} → {} (confidence: {})",
                    i.category,
                    i.condition,
                    i.insight,
                    confidence_bar(i.confidence)
                ));
            }
            parts.push(String::new());
        }

        if parts.is_empty() {
            return Ok(String::new());
        }

        Ok(format!(
            "### 📚 Past trading experience\n\n{}",
            parts.join("\n")
        ))
    }
}

fn priority_marker(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "🔴",
        Priority::Medium => "🟡",
        Priority::Low => "⚪",
    }
}

/// Fixed-width 5-segment confidence bar, rounded
fn confidence_bar(confidence: f64) -> String {
    let filled = (confidence.clamp(0.0, 1.0) * 5.0).round() as usize;
    format!("{}{}", "●".repeat(filled), "○".repeat(5 - filled))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
