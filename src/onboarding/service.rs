//! OnboardingService: materializes the chosen goal into the four local
//! collections and keeps them referentially consistent.
//!
//! The store has no transactions. Creation reads all four collections,
//! appends the new records, writes the four keys concurrently and then runs a
//! verification pass that repairs what it safely can. A process killed between
//! the writes leaves the collections inconsistent until the next verification.
//!
//! Other parts of the app own fields and statuses this module never looks at,
//! so the write paths handle stored records as raw JSON objects and touch only
//! the fields they need. Typed records are used on the read side.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{DatabaseError, OnboardingError};
use crate::store::Database;

use super::model::{
    DomainSelection, Goal, GoalBreakdown, GoalTemplate, LinkMap, Project, ProjectBreakdown,
    ProjectStatus, Task, TaskStatus, generate_id, storage_keys,
};

/// Outcome of a successful `create_onboarding_data` call.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreationReport {
    pub goal_id: String,
    pub project_ids: Vec<String>,
    pub task_ids: Vec<String>,
    /// Minimal-success result of the verification pass.
    pub verified: bool,
}

/// What `verify_created_data` found, after any repair it applied.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub goal_exists: bool,
    pub expected_projects: usize,
    pub linked_projects: usize,
    pub linked_tasks: usize,
    pub link_map_consistent: bool,
    pub repaired_projects: usize,
    pub repaired_links: usize,
}

impl VerificationReport {
    /// Goal present, and at least one project and one task hang off it.
    ///
    /// Does not require every project or task to be linked.
    pub fn is_minimal_success(&self) -> bool {
        self.goal_exists && self.linked_projects > 0 && self.linked_tasks > 0
    }
}

/// Records produced from one domain + goal template, before persistence.
#[derive(Debug, Clone)]
pub struct NewRecords {
    pub goal: Goal,
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
}

impl NewRecords {
    /// Build a goal, its projects and their tasks with fresh ids.
    ///
    /// Every project gets `goal_id` here; nothing downstream assigns it.
    pub fn build(domain: &DomainSelection, template: &GoalTemplate) -> Self {
        let now = Utc::now();
        let goal = Goal {
            id: generate_id("goal"),
            title: template.name.clone(),
            description: template.explanation.clone().unwrap_or_default(),
            icon: domain.icon.clone(),
            color: domain.color.clone(),
            progress: 0.0,
            created_at: now,
            updated_at: now,
            completed: false,
            domain: domain.key().to_string(),
            domain_name: domain.name.clone(),
            use_metrics_for_progress: false,
            extra: Map::new(),
        };

        let mut projects = Vec::with_capacity(template.projects.len());
        let mut tasks = Vec::new();

        for (order, project_template) in template.projects.iter().enumerate() {
            let project_id = generate_id("project");

            for task_template in &project_template.tasks {
                tasks.push(Task {
                    id: generate_id("task"),
                    project_id: project_id.clone(),
                    name: task_template.name.clone(),
                    title: task_template.name.clone(),
                    description: task_template.description.clone().unwrap_or_default(),
                    completed: task_template.completed,
                    status: if task_template.completed {
                        TaskStatus::Completed
                    } else {
                        TaskStatus::Pending
                    },
                    created_at: now,
                    updated_at: now,
                    extra: Map::new(),
                });
            }

            projects.push(Project {
                id: project_id,
                goal_id: Some(goal.id.clone()),
                goal_title: goal.title.clone(),
                title: project_template.name.clone(),
                description: project_template.description.clone().unwrap_or_default(),
                progress: 0.0,
                status: ProjectStatus::Active,
                completed: false,
                created_at: now,
                updated_at: now,
                domain: goal.domain.clone(),
                domain_name: goal.domain_name.clone(),
                color: domain.color.clone(),
                icon: domain.icon.clone(),
                order: order as u32,
                extra: Map::new(),
            });
        }

        Self {
            goal,
            projects,
            tasks,
        }
    }
}

/// Stored collections as raw JSON, so fields owned elsewhere survive a rewrite.
#[derive(Debug, Default)]
struct Collections {
    goals: Vec<Value>,
    projects: Vec<Value>,
    tasks: Vec<Value>,
    link_map: Map<String, Value>,
}

fn str_field<'v>(record: &'v Value, name: &str) -> Option<&'v str> {
    record.get(name).and_then(Value::as_str)
}

fn project_belongs_to(project: &Value, goal_id: &str) -> bool {
    str_field(project, "goalId") == Some(goal_id)
}

/// An object with no `goalId`, or an explicit `null` one.
fn lacks_goal_id(project: &Value) -> bool {
    project.is_object() && project.get("goalId").is_none_or(Value::is_null)
}

fn links_to(link_map: &Map<String, Value>, project_id: &str, goal_id: &str) -> bool {
    link_map.get(project_id).and_then(Value::as_str) == Some(goal_id)
}

/// Creates, verifies and deletes onboarding data for one user.
pub struct OnboardingService {
    db: Arc<dyn Database>,
    user_id: String,
}

impl OnboardingService {
    pub fn new(db: Arc<dyn Database>, user_id: impl Into<String>) -> Self {
        Self {
            db,
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Materialize one goal with its projects and tasks, merging into
    /// whatever the store already holds.
    ///
    /// Existing records are written back unchanged. A collection that cannot
    /// be decoded aborts before any write. Writes that landed before a failure
    /// are not rolled back.
    pub async fn create_onboarding_data(
        &self,
        domain: &DomainSelection,
        template: &GoalTemplate,
    ) -> Result<CreationReport, OnboardingError> {
        let NewRecords {
            goal,
            projects,
            tasks,
        } = NewRecords::build(domain, template);

        info!(
            goal_id = %goal.id,
            domain = %domain.name,
            projects = projects.len(),
            tasks = tasks.len(),
            "Creating onboarding data"
        );

        let goal_id = goal.id.clone();
        let project_ids: Vec<String> = projects.iter().map(|p| p.id.clone()).collect();
        let task_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();

        let mut collections = self.load().await?;
        debug!(
            goals = collections.goals.len(),
            projects = collections.projects.len(),
            tasks = collections.tasks.len(),
            links = collections.link_map.len(),
            "Loaded existing collections"
        );

        collections.goals.push(to_json(storage_keys::GOALS, &goal)?);
        for project in &projects {
            collections
                .link_map
                .insert(project.id.clone(), Value::String(goal_id.clone()));
            collections
                .projects
                .push(to_json(storage_keys::PROJECTS, project)?);
        }
        for task in &tasks {
            collections.tasks.push(to_json(storage_keys::TASKS, task)?);
        }

        self.store_all(&collections).await?;

        let verified = match self.verify_created_data(&goal_id, &project_ids).await {
            Ok(report) => report.is_minimal_success(),
            Err(e) => {
                warn!(goal_id = %goal_id, error = %e, "Verification pass failed");
                false
            }
        };

        info!(goal_id = %goal_id, verified, "Onboarding data created");

        Ok(CreationReport {
            goal_id,
            project_ids,
            task_ids,
            verified,
        })
    }

    /// Re-read the store and check that a freshly created batch is linked up.
    ///
    /// Projects with no `goalId` are attached to `goal_id` when their number
    /// matches the deficit exactly. Missing link-map entries for projects that
    /// already point at `goal_id` are restored.
    pub async fn verify_created_data(
        &self,
        goal_id: &str,
        project_ids: &[String],
    ) -> Result<VerificationReport, OnboardingError> {
        let mut collections = self.load().await?;

        let goal = collections
            .goals
            .iter()
            .find(|g| str_field(g, "id") == Some(goal_id));
        let goal_exists = goal.is_some();
        let goal_title = goal
            .and_then(|g| str_field(g, "title"))
            .unwrap_or_default()
            .to_string();
        if !goal_exists {
            warn!(goal_id, "Created goal missing from store");
        }

        let expected_projects = project_ids.len();
        let mut linked_projects = collections
            .projects
            .iter()
            .filter(|p| project_belongs_to(p, goal_id))
            .count();

        let mut repaired_projects = 0;
        let mut repaired_links = 0;

        if linked_projects < expected_projects {
            let deficit = expected_projects - linked_projects;
            let orphans: Vec<usize> = collections
                .projects
                .iter()
                .enumerate()
                .filter(|(_, p)| lacks_goal_id(p))
                .map(|(i, _)| i)
                .collect();

            if !orphans.is_empty() && orphans.len() == deficit {
                warn!(goal_id, deficit, "Attaching projects without a goal id");
                let now = serde_json::json!(Utc::now());
                for i in orphans {
                    let Some(project) = collections.projects[i].as_object_mut() else {
                        continue;
                    };
                    project.insert("goalId".into(), Value::String(goal_id.to_string()));
                    let titled = project
                        .get("goalTitle")
                        .and_then(Value::as_str)
                        .is_some_and(|t| !t.is_empty());
                    if !titled {
                        project.insert("goalTitle".into(), Value::String(goal_title.clone()));
                    }
                    project.insert("updatedAt".into(), now.clone());
                    if let Some(id) = project.get("id").and_then(Value::as_str) {
                        collections
                            .link_map
                            .insert(id.to_string(), Value::String(goal_id.to_string()));
                    }
                }
                repaired_projects = deficit;
                linked_projects += deficit;
            } else {
                warn!(
                    goal_id,
                    expected = expected_projects,
                    linked = linked_projects,
                    orphans = orphans.len(),
                    "Project count mismatch, not repairable"
                );
            }
        }

        for project in collections
            .projects
            .iter()
            .filter(|p| project_belongs_to(p, goal_id))
        {
            let Some(id) = str_field(project, "id") else {
                continue;
            };
            if !links_to(&collections.link_map, id, goal_id) {
                collections
                    .link_map
                    .insert(id.to_string(), Value::String(goal_id.to_string()));
                repaired_links += 1;
            }
        }
        if repaired_links > 0 {
            warn!(goal_id, repaired_links, "Restored link map entries");
        }

        if repaired_projects > 0 || repaired_links > 0 {
            self.store(&[
                (
                    storage_keys::PROJECTS,
                    Value::Array(collections.projects.clone()),
                ),
                (
                    storage_keys::PROJECT_GOAL_LINK_MAP,
                    Value::Object(collections.link_map.clone()),
                ),
            ])
            .await?;
        }

        let wanted: HashSet<&str> = project_ids.iter().map(String::as_str).collect();
        let linked_tasks = collections
            .tasks
            .iter()
            .filter(|t| str_field(t, "projectId").is_some_and(|id| wanted.contains(id)))
            .count();
        if linked_tasks == 0 {
            warn!(goal_id, "No tasks linked to the created projects");
        }

        let link_map_consistent = project_ids
            .iter()
            .all(|id| links_to(&collections.link_map, id, goal_id));
        if !link_map_consistent {
            warn!(goal_id, "Link map disagrees with created projects");
        }

        let report = VerificationReport {
            goal_exists,
            expected_projects,
            linked_projects,
            linked_tasks,
            link_map_consistent,
            repaired_projects,
            repaired_links,
        };
        debug!(?report, "Verification finished");
        Ok(report)
    }

    /// Remove a goal, every project attached to it by field or by link map,
    /// their tasks, and their link-map entries.
    ///
    /// Returns `false` without writing anything if the goal does not exist.
    pub async fn delete_goal_completely(&self, goal_id: &str) -> Result<bool, OnboardingError> {
        let mut collections = self.load().await?;

        if !collections
            .goals
            .iter()
            .any(|g| str_field(g, "id") == Some(goal_id))
        {
            info!(goal_id, "Goal not found, nothing deleted");
            return Ok(false);
        }

        let doomed: HashSet<String> = collections
            .projects
            .iter()
            .filter(|p| project_belongs_to(p, goal_id))
            .filter_map(|p| str_field(p, "id").map(String::from))
            .chain(
                collections
                    .link_map
                    .iter()
                    .filter(|(_, g)| g.as_str() == Some(goal_id))
                    .map(|(p, _)| p.clone()),
            )
            .collect();

        let tasks_before = collections.tasks.len();
        collections
            .goals
            .retain(|g| str_field(g, "id") != Some(goal_id));
        collections
            .projects
            .retain(|p| !str_field(p, "id").is_some_and(|id| doomed.contains(id)));
        collections
            .tasks
            .retain(|t| !str_field(t, "projectId").is_some_and(|id| doomed.contains(id)));
        collections.link_map.retain(|p, _| !doomed.contains(p));

        self.store_all(&collections).await?;

        info!(
            goal_id,
            projects = doomed.len(),
            tasks = tasks_before - collections.tasks.len(),
            "Goal deleted"
        );
        Ok(true)
    }

    pub async fn goals(&self) -> Result<Vec<Goal>, OnboardingError> {
        self.read_collection(storage_keys::GOALS).await
    }

    pub async fn projects(&self) -> Result<Vec<Project>, OnboardingError> {
        self.read_collection(storage_keys::PROJECTS).await
    }

    pub async fn tasks(&self) -> Result<Vec<Task>, OnboardingError> {
        self.read_collection(storage_keys::TASKS).await
    }

    pub async fn link_map(&self) -> Result<LinkMap, OnboardingError> {
        self.read_collection(storage_keys::PROJECT_GOAL_LINK_MAP)
            .await
    }

    /// A goal with its projects (sorted by `order`) and their tasks.
    pub async fn goal_breakdown(
        &self,
        goal_id: &str,
    ) -> Result<Option<GoalBreakdown>, OnboardingError> {
        let (goals, projects, tasks) =
            tokio::try_join!(self.goals(), self.projects(), self.tasks())?;

        let Some(goal) = goals.into_iter().find(|g| g.id == goal_id) else {
            return Ok(None);
        };

        let mut projects: Vec<Project> = projects
            .into_iter()
            .filter(|p| p.belongs_to(goal_id))
            .collect();
        projects.sort_by_key(|p| p.order);

        let projects = projects
            .into_iter()
            .map(|project| {
                let tasks = tasks
                    .iter()
                    .filter(|t| t.project_id == project.id)
                    .cloned()
                    .collect();
                ProjectBreakdown { project, tasks }
            })
            .collect();

        Ok(Some(GoalBreakdown { goal, projects }))
    }

    async fn load(&self) -> Result<Collections, OnboardingError> {
        let (goals, projects, tasks, link_map) = tokio::try_join!(
            self.read_collection::<Vec<Value>>(storage_keys::GOALS),
            self.read_collection::<Vec<Value>>(storage_keys::PROJECTS),
            self.read_collection::<Vec<Value>>(storage_keys::TASKS),
            self.read_collection::<Map<String, Value>>(storage_keys::PROJECT_GOAL_LINK_MAP),
        )?;
        Ok(Collections {
            goals,
            projects,
            tasks,
            link_map,
        })
    }

    /// Absent keys and JSON `null` read as the empty collection. Anything
    /// else that does not decode is `CorruptCollection`.
    async fn read_collection<T>(&self, key: &str) -> Result<T, OnboardingError>
    where
        T: DeserializeOwned + Default,
    {
        let Some(raw) = self.db.get_setting_raw(&self.user_id, key).await? else {
            return Ok(T::default());
        };
        let corrupt = |e: serde_json::Error| OnboardingError::CorruptCollection {
            key: key.to_string(),
            reason: e.to_string(),
        };
        match serde_json::from_str::<Value>(&raw).map_err(corrupt)? {
            Value::Null => Ok(T::default()),
            value => serde_json::from_value(value).map_err(corrupt),
        }
    }

    async fn store_all(&self, collections: &Collections) -> Result<(), OnboardingError> {
        self.store(&[
            (storage_keys::GOALS, Value::Array(collections.goals.clone())),
            (
                storage_keys::PROJECTS,
                Value::Array(collections.projects.clone()),
            ),
            (storage_keys::TASKS, Value::Array(collections.tasks.clone())),
            (
                storage_keys::PROJECT_GOAL_LINK_MAP,
                Value::Object(collections.link_map.clone()),
            ),
        ])
        .await
    }

    /// Issue all writes at once and wait for every one of them.
    async fn store(&self, entries: &[(&str, Value)]) -> Result<(), OnboardingError> {
        try_join_all(
            entries
                .iter()
                .map(|(key, value)| self.db.set_setting(&self.user_id, key, value)),
        )
        .await?;
        Ok(())
    }
}

fn to_json<T: Serialize>(key: &str, value: &T) -> Result<Value, OnboardingError> {
    serde_json::to_value(value)
        .map_err(|e| DatabaseError::Serialization(format!("{key}: {e}")).into())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::onboarding::model::{ProjectTemplate, TaskTemplate};
    use crate::store::LibSqlBackend;

    const USER: &str = "test-user";

    async fn test_db() -> Arc<LibSqlBackend> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    async fn test_service() -> (OnboardingService, Arc<LibSqlBackend>) {
        let db = test_db().await;
        (OnboardingService::new(db.clone(), USER), db)
    }

    fn health_domain() -> DomainSelection {
        DomainSelection {
            id: None,
            name: "Health & Wellness".into(),
            icon: "fitness".into(),
            color: "#ef4444".into(),
        }
    }

    fn fitness_goal() -> GoalTemplate {
        GoalTemplate {
            name: "Build Fitness Routine".into(),
            explanation: None,
            projects: vec![ProjectTemplate {
                name: "Sustainable Fitness Program".into(),
                description: None,
                tasks: vec![TaskTemplate {
                    name: "Assess current fitness level...".into(),
                    description: None,
                    completed: false,
                }],
            }],
        }
    }

    fn reading_goal() -> GoalTemplate {
        GoalTemplate {
            name: "Read 12 Books This Year".into(),
            explanation: Some("One book a month".into()),
            projects: vec![
                ProjectTemplate {
                    name: "Reading Habit".into(),
                    description: Some("Daily reading slot".into()),
                    tasks: vec![
                        TaskTemplate {
                            name: "Pick first book".into(),
                            description: None,
                            completed: true,
                        },
                        TaskTemplate {
                            name: "Block 20 minutes each evening".into(),
                            description: None,
                            completed: false,
                        },
                    ],
                },
                ProjectTemplate {
                    name: "Book Notes".into(),
                    description: None,
                    tasks: vec![TaskTemplate {
                        name: "Set up a notes template".into(),
                        description: None,
                        completed: false,
                    }],
                },
            ],
        }
    }

    #[tokio::test]
    async fn example_fitness_run() {
        let (service, _db) = test_service().await;

        let report = service
            .create_onboarding_data(&health_domain(), &fitness_goal())
            .await
            .unwrap();
        assert!(report.verified);

        let goals = service.goals().await.unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].title, "Build Fitness Routine");
        assert_eq!(goals[0].id, report.goal_id);
        assert_eq!(goals[0].domain_name, "Health & Wellness");
        assert_eq!(goals[0].color, "#ef4444");

        let projects = service.projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].title, "Sustainable Fitness Program");
        assert_eq!(projects[0].goal_id.as_deref(), Some(report.goal_id.as_str()));

        let tasks = service.tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].project_id, projects[0].id);
        assert_eq!(tasks[0].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn second_run_merges_instead_of_replacing() {
        let (service, _db) = test_service().await;

        let first = service
            .create_onboarding_data(&health_domain(), &fitness_goal())
            .await
            .unwrap();
        let second = service
            .create_onboarding_data(&health_domain(), &reading_goal())
            .await
            .unwrap();
        assert_ne!(first.goal_id, second.goal_id);

        let goals = service.goals().await.unwrap();
        assert_eq!(goals.len(), 2);

        let project_ids: HashSet<String> =
            service.projects().await.unwrap().into_iter().map(|p| p.id).collect();
        let expected: HashSet<String> = first
            .project_ids
            .iter()
            .chain(&second.project_ids)
            .cloned()
            .collect();
        assert_eq!(project_ids, expected);

        let task_ids: HashSet<String> =
            service.tasks().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(task_ids.len(), first.task_ids.len() + second.task_ids.len());
        assert!(first.task_ids.iter().all(|id| task_ids.contains(id)));
        assert!(second.task_ids.iter().all(|id| task_ids.contains(id)));
    }

    #[tokio::test]
    async fn created_projects_and_tasks_are_linked() {
        let (service, _db) = test_service().await;
        let report = service
            .create_onboarding_data(&health_domain(), &reading_goal())
            .await
            .unwrap();

        let link_map = service.link_map().await.unwrap();
        let projects = service.projects().await.unwrap();
        assert_eq!(projects.len(), 2);
        for project in &projects {
            assert_eq!(project.goal_id.as_deref(), Some(report.goal_id.as_str()));
            assert_eq!(link_map.get(&project.id), Some(&report.goal_id));
        }

        let created: HashSet<&str> = report.project_ids.iter().map(String::as_str).collect();
        let tasks = service.tasks().await.unwrap();
        assert_eq!(tasks.len(), 3);
        for task in &tasks {
            assert!(created.contains(task.project_id.as_str()));
        }

        let orders: Vec<u32> = projects.iter().map(|p| p.order).collect();
        assert_eq!(orders, vec![0, 1]);
        let done = tasks.iter().find(|t| t.name == "Pick first book").unwrap();
        assert!(done.completed);
        assert_eq!(done.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn goal_without_projects_creates_only_goal() {
        let (service, _db) = test_service().await;
        let template = GoalTemplate {
            name: "Find a mentor".into(),
            ..Default::default()
        };
        let report = service
            .create_onboarding_data(&health_domain(), &template)
            .await
            .unwrap();

        assert!(report.project_ids.is_empty());
        assert!(!report.verified);
        assert_eq!(service.goals().await.unwrap().len(), 1);
        assert!(service.projects().await.unwrap().is_empty());
        assert!(service.link_map().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_goal_and_everything_under_it() {
        let (service, _db) = test_service().await;
        let keep = service
            .create_onboarding_data(&health_domain(), &fitness_goal())
            .await
            .unwrap();
        let gone = service
            .create_onboarding_data(&health_domain(), &reading_goal())
            .await
            .unwrap();

        assert!(service.delete_goal_completely(&gone.goal_id).await.unwrap());

        let goals = service.goals().await.unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].id, keep.goal_id);

        let projects = service.projects().await.unwrap();
        assert!(projects.iter().all(|p| !p.belongs_to(&gone.goal_id)));
        assert!(projects.iter().all(|p| !gone.project_ids.contains(&p.id)));
        assert_eq!(projects.len(), keep.project_ids.len());

        let tasks = service.tasks().await.unwrap();
        assert!(tasks.iter().all(|t| !gone.project_ids.contains(&t.project_id)));
        assert_eq!(tasks.len(), keep.task_ids.len());

        let link_map = service.link_map().await.unwrap();
        assert!(link_map.values().all(|g| *g != gone.goal_id));
        assert!(gone.project_ids.iter().all(|id| !link_map.contains_key(id)));
    }

    #[tokio::test]
    async fn delete_follows_link_map_when_field_disagrees() {
        let (service, db) = test_service().await;
        let report = service
            .create_onboarding_data(&health_domain(), &fitness_goal())
            .await
            .unwrap();

        // Strip goalId from the project; only the link map still ties it to the goal.
        let mut projects = service.projects().await.unwrap();
        projects[0].goal_id = None;
        db.set_setting(USER, storage_keys::PROJECTS, &serde_json::to_value(&projects).unwrap())
            .await
            .unwrap();

        assert!(service.delete_goal_completely(&report.goal_id).await.unwrap());
        assert!(service.projects().await.unwrap().is_empty());
        assert!(service.tasks().await.unwrap().is_empty());
        assert!(service.link_map().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_goal_leaves_store_untouched() {
        let (service, db) = test_service().await;
        service
            .create_onboarding_data(&health_domain(), &reading_goal())
            .await
            .unwrap();

        let keys = [
            storage_keys::GOALS,
            storage_keys::PROJECTS,
            storage_keys::TASKS,
            storage_keys::PROJECT_GOAL_LINK_MAP,
        ];
        let mut before = Vec::new();
        for key in keys {
            before.push(db.get_setting_raw(USER, key).await.unwrap());
        }

        assert!(!service.delete_goal_completely("nonexistent").await.unwrap());

        for (key, raw) in keys.iter().zip(before) {
            assert_eq!(db.get_setting_raw(USER, key).await.unwrap(), raw, "{key} changed");
        }
    }

    #[tokio::test]
    async fn delete_on_empty_store_writes_nothing() {
        let (service, db) = test_service().await;
        assert!(!service.delete_goal_completely("goal_x").await.unwrap());
        assert!(db.get_setting_raw(USER, storage_keys::GOALS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn verification_attaches_project_missing_goal_id() {
        let (service, db) = test_service().await;
        let report = service
            .create_onboarding_data(&health_domain(), &fitness_goal())
            .await
            .unwrap();
        let project_id = report.project_ids[0].clone();

        // Simulate a project written without its goalId and no link map entry.
        let mut projects = service.projects().await.unwrap();
        projects[0].goal_id = None;
        projects[0].goal_title.clear();
        db.set_setting(USER, storage_keys::PROJECTS, &serde_json::to_value(&projects).unwrap())
            .await
            .unwrap();
        db.set_setting(USER, storage_keys::PROJECT_GOAL_LINK_MAP, &serde_json::json!({}))
            .await
            .unwrap();

        let verification = service
            .verify_created_data(&report.goal_id, &report.project_ids)
            .await
            .unwrap();
        assert_eq!(verification.repaired_projects, 1);
        assert_eq!(verification.linked_projects, 1);
        assert!(verification.link_map_consistent);
        assert!(verification.is_minimal_success());

        let projects = service.projects().await.unwrap();
        assert_eq!(projects[0].goal_id.as_deref(), Some(report.goal_id.as_str()));
        assert_eq!(projects[0].goal_title, "Build Fitness Routine");
        let link_map = service.link_map().await.unwrap();
        assert_eq!(link_map.get(&project_id), Some(&report.goal_id));
    }

    #[tokio::test]
    async fn verification_skips_repair_when_orphans_do_not_match_deficit() {
        let (service, db) = test_service().await;
        let report = service
            .create_onboarding_data(&health_domain(), &reading_goal())
            .await
            .unwrap();

        // Both created projects lose their goalId, plus an unrelated orphan appears.
        let mut projects = service.projects().await.unwrap();
        for p in &mut projects {
            p.goal_id = None;
        }
        let mut stray = projects[0].clone();
        stray.id = "project_stray".into();
        projects.push(stray);
        db.set_setting(USER, storage_keys::PROJECTS, &serde_json::to_value(&projects).unwrap())
            .await
            .unwrap();

        let verification = service
            .verify_created_data(&report.goal_id, &report.project_ids)
            .await
            .unwrap();
        assert_eq!(verification.repaired_projects, 0);
        assert_eq!(verification.linked_projects, 0);
        assert!(!verification.is_minimal_success());
        assert!(service.projects().await.unwrap().iter().all(|p| p.goal_id.is_none()));
    }

    #[tokio::test]
    async fn verification_restores_missing_link_map_entries() {
        let (service, db) = test_service().await;
        let report = service
            .create_onboarding_data(&health_domain(), &reading_goal())
            .await
            .unwrap();
        db.delete_setting(USER, storage_keys::PROJECT_GOAL_LINK_MAP)
            .await
            .unwrap();

        let verification = service
            .verify_created_data(&report.goal_id, &report.project_ids)
            .await
            .unwrap();
        assert_eq!(verification.repaired_links, 2);
        assert!(verification.link_map_consistent);
        assert_eq!(service.link_map().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn verification_reports_missing_goal() {
        let (service, _db) = test_service().await;
        let verification = service
            .verify_created_data("goal_missing", &["project_missing".to_string()])
            .await
            .unwrap();
        assert!(!verification.goal_exists);
        assert!(!verification.is_minimal_success());
    }

    #[tokio::test]
    async fn corrupt_collection_is_reported() {
        let (service, db) = test_service().await;
        db.set_setting(USER, storage_keys::GOALS, &serde_json::json!("not a list"))
            .await
            .unwrap();

        let err = service
            .create_onboarding_data(&health_domain(), &fitness_goal())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OnboardingError::CorruptCollection { ref key, .. } if key == "goals"
        ));
    }

    #[tokio::test]
    async fn undecodable_collection_blocks_creation_and_is_kept() {
        let (service, db) = test_service().await;
        let torn = r#"[{"id":"goal_old","title":"Old""#;
        db.set_setting_raw(USER, storage_keys::GOALS, torn)
            .await
            .unwrap();

        let err = service
            .create_onboarding_data(&health_domain(), &fitness_goal())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OnboardingError::CorruptCollection { ref key, .. } if key == "goals"
        ));

        assert_eq!(
            db.get_setting_raw(USER, storage_keys::GOALS).await.unwrap().as_deref(),
            Some(torn)
        );
        for key in [
            storage_keys::PROJECTS,
            storage_keys::TASKS,
            storage_keys::PROJECT_GOAL_LINK_MAP,
        ] {
            assert!(db.get_setting_raw(USER, key).await.unwrap().is_none(), "{key} written");
        }
    }

    #[tokio::test]
    async fn records_owned_elsewhere_survive_create_and_delete() {
        let (service, db) = test_service().await;
        let goal = serde_json::json!({
            "id": "goal_app",
            "title": "Learn Spanish",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
            "targetDate": "2025-06-01"
        });
        // No description, a status this module does not know.
        let project = serde_json::json!({
            "id": "project_app",
            "goalId": "goal_app",
            "title": "Lessons",
            "status": "in-progress",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        });
        let task = serde_json::json!({
            "id": "task_app",
            "projectId": "project_app",
            "name": "Book a tutor",
            "dueDate": "2025-03-01",
            "priority": "high"
        });
        db.set_setting(USER, storage_keys::GOALS, &serde_json::json!([goal]))
            .await
            .unwrap();
        db.set_setting(USER, storage_keys::PROJECTS, &serde_json::json!([project]))
            .await
            .unwrap();
        db.set_setting(USER, storage_keys::TASKS, &serde_json::json!([task]))
            .await
            .unwrap();
        db.set_setting(
            USER,
            storage_keys::PROJECT_GOAL_LINK_MAP,
            &serde_json::json!({"project_app": "goal_app"}),
        )
        .await
        .unwrap();

        let report = service
            .create_onboarding_data(&health_domain(), &fitness_goal())
            .await
            .unwrap();
        assert!(report.verified);

        let stored = |key: &'static str| {
            let db = Arc::clone(&db);
            async move { db.get_setting(USER, key).await.unwrap().unwrap() }
        };
        let goals = stored(storage_keys::GOALS).await;
        assert_eq!(goals.as_array().unwrap().len(), 2);
        assert_eq!(goals[0], goal);
        assert_eq!(stored(storage_keys::PROJECTS).await[0], project);
        assert_eq!(stored(storage_keys::TASKS).await[0], task);

        // Typed reads keep the extra fields and the foreign status.
        let projects = service.projects().await.unwrap();
        assert_eq!(projects[0].status, ProjectStatus::Other("in-progress".into()));
        let tasks = service.tasks().await.unwrap();
        assert_eq!(tasks[0].extra["priority"], "high");

        assert!(service.delete_goal_completely(&report.goal_id).await.unwrap());
        assert_eq!(stored(storage_keys::GOALS).await, serde_json::json!([goal]));
        assert_eq!(stored(storage_keys::PROJECTS).await, serde_json::json!([project]));
        assert_eq!(stored(storage_keys::TASKS).await, serde_json::json!([task]));
        assert_eq!(
            stored(storage_keys::PROJECT_GOAL_LINK_MAP).await,
            serde_json::json!({"project_app": "goal_app"})
        );
    }

    #[tokio::test]
    async fn second_run_keeps_fields_added_after_the_first() {
        let (service, db) = test_service().await;
        let first = service
            .create_onboarding_data(&health_domain(), &fitness_goal())
            .await
            .unwrap();

        // The app later annotates the first task.
        let mut tasks = db.get_setting(USER, storage_keys::TASKS).await.unwrap().unwrap();
        tasks[0]["dueDate"] = serde_json::json!("2025-03-01");
        tasks[0]["status"] = serde_json::json!("blocked");
        db.set_setting(USER, storage_keys::TASKS, &tasks).await.unwrap();

        service
            .create_onboarding_data(&health_domain(), &reading_goal())
            .await
            .unwrap();

        let after = db.get_setting(USER, storage_keys::TASKS).await.unwrap().unwrap();
        let annotated = after
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["id"] == first.task_ids[0].as_str())
            .unwrap();
        assert_eq!(*annotated, tasks[0]);
    }

    #[tokio::test]
    async fn null_collection_reads_as_empty() {
        let (service, db) = test_service().await;
        db.set_setting(USER, storage_keys::TASKS, &serde_json::Value::Null)
            .await
            .unwrap();
        assert!(service.tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn breakdown_orders_projects_and_groups_tasks() {
        let (service, _db) = test_service().await;
        let report = service
            .create_onboarding_data(&health_domain(), &reading_goal())
            .await
            .unwrap();

        let breakdown = service.goal_breakdown(&report.goal_id).await.unwrap().unwrap();
        assert_eq!(breakdown.goal.title, "Read 12 Books This Year");
        assert_eq!(breakdown.goal.description, "One book a month");
        let titles: Vec<&str> = breakdown
            .projects
            .iter()
            .map(|p| p.project.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Reading Habit", "Book Notes"]);
        assert_eq!(breakdown.projects[0].tasks.len(), 2);
        assert_eq!(breakdown.projects[1].tasks.len(), 1);

        assert!(service.goal_breakdown("goal_missing").await.unwrap().is_none());
    }

    /// Store that rejects writes to one key.
    struct FailingWrites {
        inner: LibSqlBackend,
        fail_key: &'static str,
    }

    #[async_trait]
    impl Database for FailingWrites {
        async fn run_migrations(&self) -> Result<(), DatabaseError> {
            self.inner.run_migrations().await
        }

        async fn get_setting(
            &self,
            user_id: &str,
            key: &str,
        ) -> Result<Option<serde_json::Value>, DatabaseError> {
            self.inner.get_setting(user_id, key).await
        }

        async fn set_setting(
            &self,
            user_id: &str,
            key: &str,
            value: &serde_json::Value,
        ) -> Result<(), DatabaseError> {
            if key == self.fail_key {
                return Err(DatabaseError::Query(format!("disk full writing {key}")));
            }
            self.inner.set_setting(user_id, key, value).await
        }

        async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError> {
            self.inner.delete_setting(user_id, key).await
        }

        async fn get_setting_raw(
            &self,
            user_id: &str,
            key: &str,
        ) -> Result<Option<String>, DatabaseError> {
            self.inner.get_setting_raw(user_id, key).await
        }
    }

    #[tokio::test]
    async fn write_failure_is_returned_as_error() {
        let db = Arc::new(FailingWrites {
            inner: LibSqlBackend::new_memory().await.unwrap(),
            fail_key: storage_keys::TASKS,
        });
        let service = OnboardingService::new(db.clone(), USER);

        let err = service
            .create_onboarding_data(&health_domain(), &fitness_goal())
            .await
            .unwrap_err();
        assert!(matches!(err, OnboardingError::Storage(DatabaseError::Query(_))));
        assert!(
            db.get_setting(USER, storage_keys::TASKS)
                .await
                .unwrap()
                .is_none()
        );
    }
}
