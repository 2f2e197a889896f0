//! Translation lookup with per-user language persistence.
//!
//! Strings live in compiled-in JSON resources, one per language, grouped by
//! namespace. Lookup falls back from the requested namespace to `common` and
//! then to the key itself.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::error::I18nError;
use crate::onboarding::model::storage_keys;
use crate::store::Database;

/// Namespace used when a key is missing from the requested one.
pub const COMMON_NAMESPACE: &str = "common";

/// Languages laid out right-to-left.
const RTL_LANGUAGES: &[&str] = &["ar", "he", "fa", "ur"];

const RESOURCES: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en.json")),
    ("es", include_str!("../locales/es.json")),
];

type Namespaces = HashMap<String, HashMap<String, String>>;

/// All shipped translation tables, keyed by language code.
#[derive(Debug, Default)]
pub struct Translations {
    by_language: HashMap<String, Namespaces>,
}

impl Translations {
    /// The compiled-in tables. A resource that fails to parse is skipped.
    pub fn builtin() -> &'static Translations {
        static TRANSLATIONS: OnceLock<Translations> = OnceLock::new();
        TRANSLATIONS.get_or_init(|| {
            let mut translations = Translations::default();
            for (language, json) in RESOURCES {
                if let Err(e) = translations.add(language, json) {
                    tracing::error!(error = %e, "Skipping translation resource");
                }
            }
            translations
        })
    }

    fn add(&mut self, language: &str, json: &str) -> Result<(), I18nError> {
        let namespaces: Namespaces =
            serde_json::from_str(json).map_err(|e| I18nError::InvalidResource {
                language: language.to_string(),
                reason: e.to_string(),
            })?;
        self.by_language.insert(language.to_string(), namespaces);
        Ok(())
    }

    pub fn supports(&self, language: &str) -> bool {
        self.by_language.contains_key(language)
    }

    /// Supported language codes, sorted.
    pub fn languages(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.by_language.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    fn lookup(&self, language: &str, namespace: &str, key: &str) -> Option<&str> {
        let namespaces = self.by_language.get(language)?;
        namespaces
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .or_else(|| namespaces.get(COMMON_NAMESPACE).and_then(|ns| ns.get(key)))
            .map(String::as_str)
    }
}

/// Replace every `{{name}}` with its value. No escaping, no nesting.
pub fn interpolate(template: &str, params: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in params {
        out = out.replace(&format!("{{{{{name}}}}}"), value);
    }
    out
}

/// Current language plus lookup, bound to one user's stored preference.
pub struct I18n {
    db: Arc<dyn Database>,
    user_id: String,
    language: String,
    translations: &'static Translations,
}

impl I18n {
    /// Restore the user's saved language, or use `default_language`.
    ///
    /// A storage failure or an unsupported saved code is logged and falls back
    /// to the default.
    pub async fn load(
        db: Arc<dyn Database>,
        user_id: impl Into<String>,
        default_language: &str,
    ) -> Self {
        let user_id = user_id.into();
        let translations = Translations::builtin();

        let fallback = if translations.supports(default_language) {
            default_language.to_string()
        } else {
            warn!(default_language, "Default language not shipped, using en");
            "en".to_string()
        };

        let language = match db.get_setting(&user_id, storage_keys::USER_LANGUAGE).await {
            Ok(Some(serde_json::Value::String(saved))) if translations.supports(&saved) => saved,
            Ok(Some(other)) => {
                warn!(saved = %other, "Ignoring unsupported saved language");
                fallback
            }
            Ok(None) => fallback,
            Err(e) => {
                warn!(error = %e, "Failed to read saved language");
                fallback
            }
        };

        debug!(user_id = %user_id, language = %language, "I18n loaded");
        Self {
            db,
            user_id,
            language,
            translations,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_rtl(&self) -> bool {
        RTL_LANGUAGES.contains(&self.language.as_str())
    }

    pub fn translations(&self) -> &'static Translations {
        self.translations
    }

    /// Switch language and persist the choice.
    pub async fn set_language(&mut self, code: &str) -> Result<(), I18nError> {
        if !self.translations.supports(code) {
            return Err(I18nError::UnsupportedLanguage(code.to_string()));
        }
        self.db
            .set_setting(
                &self.user_id,
                storage_keys::USER_LANGUAGE,
                &serde_json::Value::String(code.to_string()),
            )
            .await?;
        self.language = code.to_string();
        debug!(language = code, rtl = self.is_rtl(), "Language changed");
        Ok(())
    }

    /// Translate `key` from `namespace`, substituting `{{param}}` placeholders.
    pub fn t(&self, key: &str, namespace: &str, params: &[(&str, &str)]) -> String {
        match self.translations.lookup(&self.language, namespace, key) {
            Some(template) => interpolate(template, params),
            None => key.to_string(),
        }
    }

    pub fn t_common(&self, key: &str) -> String {
        self.t(key, COMMON_NAMESPACE, &[])
    }
}
