//! Database schema for the trading memory store
//!
//! Five logical tables: current holdings, closed-trade summaries, journal
//! entries (full retrospectives), principles, and intuitions, plus the
//! secondary indexes that keep the bounded "latest N" / "top N" queries
//! cheap.

use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;

/// Create all tables and indexes (idempotent)
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Current open positions
        CREATE TABLE IF NOT EXISTS stock_holdings (
            ticker TEXT PRIMARY KEY,
            company_name TEXT NOT NULL,
            buy_price REAL NOT NULL,
            buy_date TEXT NOT NULL,
            current_price REAL,
            last_updated TEXT,
            scenario TEXT,
            target_price REAL,
            stop_loss REAL
        );

        -- Closed positions, summary only
        CREATE TABLE IF NOT EXISTS trading_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticker TEXT NOT NULL,
            company_name TEXT NOT NULL,
            buy_price REAL NOT NULL,
            buy_date TEXT NOT NULL,
            sell_price REAL NOT NULL,
            sell_date TEXT NOT NULL,
            profit_rate REAL NOT NULL,
            holding_days INTEGER NOT NULL,
            scenario TEXT
        );

        -- One row per closed trade retrospective (Layer 1 memory)
        CREATE TABLE IF NOT EXISTS trading_journal (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            market TEXT NOT NULL DEFAULT 'KR',

            -- Trade basic info
            ticker TEXT NOT NULL,
            company_name TEXT NOT NULL,
            trade_date TEXT NOT NULL,
            trade_type TEXT NOT NULL,

            -- Buy context (for sell retrospective)
            buy_price REAL,
            buy_date TEXT,
            buy_scenario TEXT,
            buy_market_context TEXT,

            -- Sell context
            sell_price REAL,
            sell_reason TEXT,
            profit_rate REAL,
            holding_days INTEGER,

            -- Retrospective results
            situation_analysis TEXT,
            judgment_evaluation TEXT,
            lessons TEXT,
            pattern_tags TEXT,
            one_line_summary TEXT,
            confidence_score REAL,

            -- Compression management
            compression_layer INTEGER DEFAULT 1,
            compressed_summary TEXT,

            -- Metadata
            created_at TEXT NOT NULL,
            last_compressed_at TEXT
        );

        -- Deduplicated decision rules distilled from lessons
        CREATE TABLE IF NOT EXISTS trading_principles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            market TEXT NOT NULL DEFAULT 'KR',

            -- Scope classification
            scope TEXT NOT NULL DEFAULT 'universal',
            scope_context TEXT,

            -- Rule content
            condition TEXT NOT NULL,
            action TEXT NOT NULL,
            reason TEXT,
            priority TEXT DEFAULT 'medium',

            -- Evidence
            confidence REAL DEFAULT 0.5,
            supporting_trades INTEGER DEFAULT 1,
            source_journal_ids TEXT,

            -- Metadata
            created_at TEXT NOT NULL,
            last_validated_at TEXT,
            is_active INTEGER DEFAULT 1
        );

        -- Pattern-level insights from batch compression
        CREATE TABLE IF NOT EXISTS trading_intuitions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            market TEXT NOT NULL DEFAULT 'KR',

            -- Classification
            category TEXT NOT NULL,
            subcategory TEXT,

            -- Insight content
            condition TEXT NOT NULL,
            insight TEXT NOT NULL,
            confidence REAL,

            -- Evidence
            supporting_trades INTEGER,
            success_rate REAL,
            source_journal_ids TEXT,

            -- Metadata
            created_at TEXT NOT NULL,
            last_validated_at TEXT,
            is_active INTEGER DEFAULT 1,
            scope TEXT DEFAULT 'universal'
        );

        -- Indexes for the bounded read paths
        CREATE INDEX IF NOT EXISTS idx_journal_ticker ON trading_journal(market, ticker);
        CREATE INDEX IF NOT EXISTS idx_journal_pattern ON trading_journal(pattern_tags);
        CREATE INDEX IF NOT EXISTS idx_journal_date ON trading_journal(trade_date DESC);
        CREATE INDEX IF NOT EXISTS idx_intuitions_category ON trading_intuitions(category);
        CREATE INDEX IF NOT EXISTS idx_intuitions_scope ON trading_intuitions(scope);
        CREATE INDEX IF NOT EXISTS idx_principles_scope ON trading_principles(market, scope);
        CREATE INDEX IF NOT EXISTS idx_principles_priority ON trading_principles(priority);
        "#,
    )?;

    apply_migrations(conn)?;
    debug!("Trading memory schema initialized");
    Ok(())
}

/// Additive column migrations for databases created by older schema versions.
/// Each ALTER fails harmlessly when the column already exists.
fn apply_migrations(conn: &Connection) -> Result<()> {
    let migrations = [
        "ALTER TABLE trading_intuitions ADD COLUMN scope TEXT DEFAULT 'universal'",
        "ALTER TABLE trading_journal ADD COLUMN market TEXT NOT NULL DEFAULT 'KR'",
        "ALTER TABLE trading_principles ADD COLUMN market TEXT NOT NULL DEFAULT 'KR'",
        "ALTER TABLE trading_intuitions ADD COLUMN market TEXT NOT NULL DEFAULT 'KR'",
    ];

    for sql in migrations {
        if let Err(e) = conn.execute(sql, []) {
            debug!("Migration skipped ({})", e);
        }
    }

    Ok(())
}
