//! OnboardingManager: coordinates language/country choices, the final
//! completion step, and the flags the rest of the app reads afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::error::{DatabaseError, OnboardingError};
use crate::i18n::I18n;
use crate::store::Database;

use super::catalog::Catalog;
use super::model::{DomainSelection, GoalTemplate, storage_keys};
use super::service::{CreationReport, OnboardingService};

/// What the user picked on the domain and goal screens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingSelection {
    #[serde(default)]
    pub domain: Option<DomainSelection>,
    #[serde(default)]
    pub goal: Option<GoalTemplate>,
}

impl OnboardingSelection {
    /// Both the domain and the goal, or the first one that is missing.
    pub fn require(&self) -> Result<(&DomainSelection, &GoalTemplate), OnboardingError> {
        let domain = self.domain.as_ref().ok_or(OnboardingError::MissingDomain)?;
        let goal = self.goal.as_ref().ok_or(OnboardingError::MissingGoal)?;
        Ok((domain, goal))
    }
}

/// Onboarding status as seen by the surrounding app.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingStatus {
    pub onboarding_completed: bool,
    pub language: String,
    pub rtl: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<String>,
}

/// Clears the in-flight flag however completion exits.
struct CompletionGuard<'a>(&'a AtomicBool);

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives the onboarding flow for one user.
pub struct OnboardingManager {
    db: Arc<dyn Database>,
    user_id: String,
    service: OnboardingService,
    i18n: RwLock<I18n>,
    completing: AtomicBool,
}

impl OnboardingManager {
    pub fn new(db: Arc<dyn Database>, user_id: impl Into<String>, i18n: I18n) -> Self {
        let user_id = user_id.into();
        Self {
            service: OnboardingService::new(Arc::clone(&db), user_id.clone()),
            db,
            user_id,
            i18n: RwLock::new(i18n),
            completing: AtomicBool::new(false),
        }
    }

    /// Build a manager whose language is restored from storage.
    pub async fn load(
        db: Arc<dyn Database>,
        user_id: impl Into<String>,
        default_language: &str,
    ) -> Self {
        let user_id = user_id.into();
        let i18n = I18n::load(Arc::clone(&db), user_id.clone(), default_language).await;
        Self::new(db, user_id, i18n)
    }

    pub fn service(&self) -> &OnboardingService {
        &self.service
    }

    pub async fn i18n(&self) -> RwLockReadGuard<'_, I18n> {
        self.i18n.read().await
    }

    pub async fn select_language(&self, code: &str) -> Result<(), OnboardingError> {
        self.i18n.write().await.set_language(code).await?;
        Ok(())
    }

    /// Persist the country, normalized to the catalog's code.
    pub async fn select_country(&self, code: &str) -> Result<(), OnboardingError> {
        let country = Catalog::builtin()
            .country(code)
            .ok_or_else(|| OnboardingError::UnknownCountry(code.to_string()))?;
        self.set(storage_keys::USER_COUNTRY, serde_json::json!(country.code))
            .await?;
        tracing::debug!(country = %country.code, "Country selected");
        Ok(())
    }

    /// Final step: validate the selection, create the goal hierarchy and
    /// record that onboarding is done.
    ///
    /// Fails with `AlreadyInProgress` while another completion is running.
    /// Validation errors are raised before anything is written.
    pub async fn complete_onboarding(
        &self,
        selection: &OnboardingSelection,
    ) -> Result<CreationReport, OnboardingError> {
        let _guard = self.begin_completion()?;

        let (domain, goal) = selection.require()?;

        let report = self.service.create_onboarding_data(domain, goal).await?;
        if !report.verified {
            tracing::warn!(goal_id = %report.goal_id, "Onboarding data did not fully verify");
        }

        let flags = [
            (storage_keys::SELECTED_DOMAIN, to_json(domain)?),
            (storage_keys::SELECTED_GOAL, to_json(goal)?),
            (
                storage_keys::THEME_COLOR,
                serde_json::Value::String(domain.color.clone()),
            ),
            (storage_keys::DIRECT_FROM_ONBOARDING, serde_json::Value::Bool(true)),
        ];
        try_join_all(
            flags
                .iter()
                .map(|(key, value)| self.db.set_setting(&self.user_id, key, value)),
        )
        .await?;
        self.set(storage_keys::ONBOARDING_COMPLETED, serde_json::Value::Bool(true))
            .await?;

        tracing::info!(
            goal_id = %report.goal_id,
            domain = %domain.name,
            goal = %goal.name,
            "Onboarding completed"
        );
        Ok(report)
    }

    pub async fn status(&self) -> Result<OnboardingStatus, OnboardingError> {
        let (completed, country, theme_color) = tokio::try_join!(
            self.db
                .get_setting(&self.user_id, storage_keys::ONBOARDING_COMPLETED),
            self.db.get_setting(&self.user_id, storage_keys::USER_COUNTRY),
            self.db.get_setting(&self.user_id, storage_keys::THEME_COLOR),
        )?;

        let i18n = self.i18n.read().await;
        Ok(OnboardingStatus {
            onboarding_completed: completed.and_then(|v| v.as_bool()).unwrap_or(false),
            language: i18n.language().to_string(),
            rtl: i18n.is_rtl(),
            country: country.and_then(|v| v.as_str().map(String::from)),
            theme_color: theme_color.and_then(|v| v.as_str().map(String::from)),
        })
    }

    fn begin_completion(&self) -> Result<CompletionGuard<'_>, OnboardingError> {
        self.completing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| OnboardingError::AlreadyInProgress)?;
        Ok(CompletionGuard(&self.completing))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), OnboardingError> {
        self.db.set_setting(&self.user_id, key, &value).await?;
        Ok(())
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, OnboardingError> {
    serde_json::to_value(value).map_err(|e| DatabaseError::Serialization(e.to_string()).into())
}
