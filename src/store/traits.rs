//! `Database` trait: async key-value interface for onboarding persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;

/// Backend-agnostic per-user settings store.
///
/// Values are JSON documents addressed by `(user_id, key)`.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Read a value. `None` when the key was never written.
    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Insert or replace a value.
    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    /// Remove a value. Returns whether a row was deleted.
    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError>;

    /// Raw stored text for a key, exactly as written.
    async fn get_setting_raw(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<String>, DatabaseError>;
}
