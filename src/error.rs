//! Error types for LifeCompass.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),

    #[error("I18n error: {0}")]
    I18n(#[from] I18nError),

    #[error("Wizard error: {0}")]
    Wizard(#[from] WizardError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised while completing onboarding.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("No domain selected")]
    MissingDomain,

    #[error("No goal selected")]
    MissingGoal,

    #[error("Onboarding completion already in progress")]
    AlreadyInProgress,

    #[error("Unknown country code: {0}")]
    UnknownCountry(String),

    #[error("Collection {key} is corrupt: {reason}")]
    CorruptCollection { key: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Language error: {0}")]
    Language(#[from] I18nError),
}

/// Translation lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum I18nError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Translation resource for {language} is invalid: {reason}")]
    InvalidResource { language: String, reason: String },

    #[error("Failed to persist language: {0}")]
    Persist(#[from] DatabaseError),
}

/// Terminal wizard errors.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("Input closed before onboarding finished")]
    Aborted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
