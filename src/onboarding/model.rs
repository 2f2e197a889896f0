//! Goal, project and task records plus the templates they are built from.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Life domain chosen on the wheel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DomainSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub icon: String,
    pub color: String,
}

impl DomainSelection {
    /// Value stored in the `domain` field of created records.
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskTemplate>,
}

/// Goal template with its nested project and task templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GoalTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub projects: Vec<ProjectTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub domain_name: String,
    #[serde(default)]
    pub use_metrics_for_progress: bool,
    /// Fields owned by other parts of the app.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Active,
    Paused,
    Completed,
    /// Any status set elsewhere in the app, kept verbatim.
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    /// Owning goal. Missing only in documents written by older builds.
    #[serde(default)]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub goal_title: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub domain_name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub order: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Project {
    pub fn belongs_to(&self, goal_id: &str) -> bool {
        self.goal_id.as_deref() == Some(goal_id)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Secondary `project id → goal id` index kept beside the projects collection.
pub type LinkMap = BTreeMap<String, String>;

/// A goal together with its projects (in `order`) and each project's tasks.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoalBreakdown {
    pub goal: Goal,
    pub projects: Vec<ProjectBreakdown>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBreakdown {
    pub project: Project,
    pub tasks: Vec<Task>,
}

/// Generate `<prefix>_<unix millis>_<9 lowercase alphanumerics>`.
pub fn generate_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{prefix}_{}_{suffix}", Utc::now().timestamp_millis())
}

/// Storage keys read and written by the onboarding flow.
pub mod storage_keys {
    pub const GOALS: &str = "goals";
    pub const PROJECTS: &str = "projects";
    pub const TASKS: &str = "tasks";
    pub const PROJECT_GOAL_LINK_MAP: &str = "projectGoalLinkMap";

    pub const ONBOARDING_COMPLETED: &str = "onboardingCompleted";
    pub const THEME_COLOR: &str = "themeColor";
    pub const SELECTED_DOMAIN: &str = "selectedDomain";
    pub const SELECTED_GOAL: &str = "selectedGoal";
    pub const DIRECT_FROM_ONBOARDING: &str = "directFromOnboarding";
    pub const USER_LANGUAGE: &str = "userLanguage";
    pub const USER_COUNTRY: &str = "userCountry";
}
