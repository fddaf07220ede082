//! Journal engine facade
//!
//! The caller-facing surface of the trading memory. Everything on the
//! trading decision path absorbs its own failures: a journal write or
//! principle extraction that fails must never abort the pipeline that
//! invoked it, so those methods log and return neutral values. Only the
//! maintenance entry point, which runs as a standalone scheduled job,
//! returns a rich result.

use anyhow::Result;
use tracing::{debug, error, info, warn};

use super::context::ContextAssembler;
use super::intuitions::IntuitionRepository;
use super::lifecycle::{LifecycleManager, MaintenanceOptions, MaintenanceReport};
use super::parser::parse_retrospective;
use super::principles::PrincipleRepository;
use super::scoring::ScoreCalculator;
use super::store::{JournalStats, JournalStore};
use super::{ClosedTrade, Lesson};
use crate::config::EngineConfig;

pub struct JournalEngine {
    config: EngineConfig,
    store: JournalStore,
    principles: PrincipleRepository,
    intuitions: IntuitionRepository,
    scoring: ScoreCalculator,
    lifecycle: LifecycleManager,
}

impl JournalEngine {
    /// Open the engine over the configured database
    pub async fn open(config: EngineConfig) -> Result<Self> {
        let store = JournalStore::open(&config.database_path, &config.market).await?;
        let handle = store.handle();

        Ok(Self {
            principles: PrincipleRepository::new(handle.clone(), &config.market),
            intuitions: IntuitionRepository::new(handle.clone(), &config.market),
            scoring: ScoreCalculator::new(handle.clone(), &config.market),
            lifecycle: LifecycleManager::new(handle, &config.market),
            store,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &JournalStore {
        &self.store
    }

    pub fn principles(&self) -> &PrincipleRepository {
        &self.principles
    }

    /// Write path for the batch compression step
    pub fn intuitions(&self) -> &IntuitionRepository {
        &self.intuitions
    }

    /// Record one closed trade: parse the retrospective analysis text,
    /// persist the journal entry and trade summary, and distill principles
    /// from the lessons. Returns the entry id, or None when the feature is
    /// disabled or the write failed (failure is logged, never propagated).
    pub async fn record_closed_trade(
        &self,
        trade: &ClosedTrade,
        analysis_text: &str,
    ) -> Option<i64> {
        if !self.config.enabled {
            debug!("Trading memory is disabled; skipping journal entry");
            return None;
        }

        let retro = parse_retrospective(analysis_text);

        let entry_id = match self.store.insert_entry(trade, &retro).await {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to create journal entry for {}: {}", trade.ticker, e);
                return None;
            }
        };

        if let Err(e) = self.store.record_trade_summary(trade).await {
            warn!("Failed to record trade summary for {}: {}", trade.ticker, e);
        }

        if !retro.lessons.is_empty() {
            let extracted = self.extract_principles(&retro.lessons, entry_id).await;
            info!(
                "Extracted {} principles from journal entry {}",
                extracted, entry_id
            );
        }

        Some(entry_id)
    }

    /// Distill principles from lessons. Returns the number applied
    /// (inserted or merged); incomplete lessons and per-row failures are
    /// skipped, not surfaced.
    pub async fn extract_principles(&self, lessons: &[Lesson], source_entry_id: i64) -> usize {
        if !self.config.enabled {
            return 0;
        }
        self.principles
            .extract_from_lessons(lessons, source_entry_id)
            .await
    }

    /// Rendered memory block for the next decision on this instrument.
    /// Empty string means "no memory available" — indistinguishable from
    /// the feature being disabled, and never an error.
    pub async fn context_for(&self, ticker: &str, sector: Option<&str>) -> String {
        if !self.config.enabled {
            return String::new();
        }

        let assembler = ContextAssembler::new(
            &self.store,
            &self.principles,
            &self.intuitions,
            self.config.context.clone(),
        );
        match assembler.assemble(ticker, sector).await {
            Ok(context) => context,
            Err(e) => {
                warn!("Failed to assemble journal context for {}: {}", ticker, e);
                String::new()
            }
        }
    }

    /// Historical-performance score nudge in [-2, 2] plus justifications.
    /// Absence of history (or any failure) yields (0, []).
    pub async fn score_adjustment(&self, ticker: &str, sector: Option<&str>) -> (i32, Vec<String>) {
        if !self.config.enabled {
            return (0, Vec::new());
        }

        match self.scoring.adjustment(ticker, sector).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Failed to calculate score adjustment for {}: {}", ticker, e);
                (0, Vec::new())
            }
        }
    }

    /// Run one maintenance pass (standalone scheduled job)
    pub async fn run_maintenance(&self, opts: &MaintenanceOptions) -> Result<MaintenanceReport> {
        self.lifecycle.run(opts).await
    }

    pub async fn stats(&self) -> Result<JournalStats> {
        self.store.stats().await
    }
}
