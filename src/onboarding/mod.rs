//! Onboarding: the language → country → domain → goal flow and the goal,
//! project and task records it leaves behind.
//!
//! `OnboardingService` owns the four stored collections (goals, projects,
//! tasks, project→goal link map) and their consistency. `OnboardingManager`
//! sits on top of it and records the choices and flags the rest of the app
//! reads once onboarding is done.

pub mod catalog;
pub mod manager;
pub mod model;
pub mod routes;
pub mod service;

pub use catalog::Catalog;
pub use manager::{OnboardingManager, OnboardingSelection, OnboardingStatus};
pub use model::{
    DomainSelection, Goal, GoalBreakdown, GoalTemplate, LinkMap, Project, ProjectTemplate, Task,
    TaskTemplate,
};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use service::{CreationReport, OnboardingService, VerificationReport};
