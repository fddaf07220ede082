//! Trading Memory - journal, principle distillation, and scoring memory
//! for an automated trading pipeline.
//!
//! Every closed trade is recorded with its LLM retrospective, lessons are
//! distilled into deduplicated principles with evidence-weighted confidence,
//! and the accumulated memory feeds back into the next decision as a rendered
//! context block and a bounded score adjustment.

pub mod cli;
pub mod config;
pub mod journal;

pub use config::EngineConfig;
pub use journal::{
    ClosedTrade, JournalEngine, JournalStats, Lesson, MaintenanceOptions, MaintenanceReport,
    Retrospective,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "trading-memory";
