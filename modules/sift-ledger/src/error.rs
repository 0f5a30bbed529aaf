/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt ledger row for {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Ledger lock poisoned")]
    Poisoned,
}
