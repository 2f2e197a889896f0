//! LifeCompass: first-run onboarding that turns a chosen life domain and
//! goal into stored goals, projects and tasks.

pub mod config;
pub mod error;
pub mod i18n;
pub mod onboarding;
pub mod store;
pub mod wizard;
