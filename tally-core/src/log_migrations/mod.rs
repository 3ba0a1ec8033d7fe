//! Log database migrations - embedded SQL files
//!
//! The logs database (logs.duckdb) is separate from the ledger database
//! and has its own migration chain, applied by the LoggingService.

/// All log migrations, embedded at compile time.
/// Format: (filename, sql_content)
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_logs_schema.sql", include_str!("001_logs_schema.sql")),
];
