//! Terminal onboarding: the welcome → language → country → domain → goal →
//! breakdown → completion screens as sequential prompts.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::error::WizardError;
use crate::onboarding::catalog::{Catalog, Domain};
use crate::onboarding::model::GoalTemplate;
use crate::onboarding::{CreationReport, OnboardingManager, OnboardingSelection};

const NS: &str = "onboarding";

/// Runs the onboarding prompts against a manager.
pub struct Wizard<'a> {
    manager: &'a OnboardingManager,
    catalog: &'a Catalog,
}

impl<'a> Wizard<'a> {
    pub fn new(manager: &'a OnboardingManager) -> Self {
        Self {
            manager,
            catalog: Catalog::builtin(),
        }
    }

    /// Walk every step, reading answers from `input` and writing prompts to `out`.
    pub async fn run<R, W>(&self, input: R, out: &mut W) -> Result<CreationReport, WizardError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();

        let app_name = self.text("appName", "common", &[]).await;
        let title = self
            .text("welcomeTitle", NS, &[("appName", app_name.as_str())])
            .await;
        let subtitle = self.text("welcomeSubtitle", NS, &[]).await;
        writeln!(out, "{title}")?;
        writeln!(out, "{subtitle}\n")?;

        let languages: Vec<String> = self
            .catalog
            .languages
            .iter()
            .map(|l| l.native_name.clone())
            .collect();
        let choice = self
            .choose(&mut lines, out, "chooseLanguage", &[], &languages)
            .await?;
        self.manager
            .select_language(&self.catalog.languages[choice].code)
            .await?;

        let countries: Vec<String> = self
            .catalog
            .countries
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let choice = self
            .choose(&mut lines, out, "chooseCountry", &[], &countries)
            .await?;
        self.manager
            .select_country(&self.catalog.countries[choice].code)
            .await?;

        let (domain, goal) = loop {
            let (domain, goal) = self.pick_goal(&mut lines, out).await?;
            self.preview(out, goal).await?;
            if self.confirm(&mut lines, out).await? {
                break (domain, goal);
            }
            let restart = self.text("restart", NS, &[]).await;
            writeln!(out, "{restart}\n")?;
        };

        let creating = self.text("creating", NS, &[]).await;
        writeln!(out, "{creating}")?;
        let selection = OnboardingSelection {
            domain: Some(domain.selection()),
            goal: Some(goal.clone()),
        };
        let report = self.manager.complete_onboarding(&selection).await?;

        let breakdown = self
            .manager
            .service()
            .goal_breakdown(&report.goal_id)
            .await?;
        let (projects, tasks) = match breakdown {
            Some(breakdown) => (
                breakdown.projects.len(),
                breakdown.projects.iter().map(|p| p.tasks.len()).sum(),
            ),
            None => (0, 0),
        };
        let (projects, tasks) = (projects.to_string(), tasks.to_string());

        let complete_title = self.text("completeTitle", NS, &[]).await;
        let summary = self
            .text(
                "completeSummary",
                NS,
                &[
                    ("projects", projects.as_str()),
                    ("tasks", tasks.as_str()),
                    ("goal", goal.name.as_str()),
                ],
            )
            .await;
        writeln!(out, "\n{complete_title}")?;
        writeln!(out, "{summary}")?;
        out.flush()?;

        Ok(report)
    }

    async fn pick_goal<R, W>(
        &self,
        lines: &mut Lines<R>,
        out: &mut W,
    ) -> Result<(&'a Domain, &'a GoalTemplate), WizardError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let catalog: &'a Catalog = self.catalog;
        let names: Vec<String> = catalog.domains.iter().map(|d| d.name.clone()).collect();
        let choice = self.choose(lines, out, "chooseDomain", &[], &names).await?;
        let domain = &catalog.domains[choice];

        let goals: Vec<String> = domain.goals.iter().map(|g| g.name.clone()).collect();
        let params = [("domain", domain.name.as_str())];
        let choice = self.choose(lines, out, "chooseGoal", &params, &goals).await?;
        Ok((domain, &domain.goals[choice]))
    }

    async fn preview<W: Write>(&self, out: &mut W, goal: &GoalTemplate) -> Result<(), WizardError> {
        let title = self
            .text("breakdownTitle", NS, &[("goal", goal.name.as_str())])
            .await;
        writeln!(out, "\n{title}")?;
        for (i, project) in goal.projects.iter().enumerate() {
            let index = (i + 1).to_string();
            let line = self
                .text(
                    "projectLine",
                    NS,
                    &[("index", index.as_str()), ("project", project.name.as_str())],
                )
                .await;
            writeln!(out, "{line}")?;
            for task in &project.tasks {
                let line = self
                    .text("taskLine", NS, &[("task", task.name.as_str())])
                    .await;
                writeln!(out, "{line}")?;
            }
        }
        Ok(())
    }

    async fn confirm<R, W>(&self, lines: &mut Lines<R>, out: &mut W) -> Result<bool, WizardError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let yes = self.text("yes", "common", &[]).await;
        let no = self.text("no", "common", &[]).await;
        let prompt = self
            .text("confirmBreakdown", NS, &[("yes", yes.as_str()), ("no", no.as_str())])
            .await;
        write!(out, "{prompt} ")?;
        out.flush()?;

        let answer = read_line(lines).await?.to_lowercase();
        Ok(answer == yes || (!answer.is_empty() && yes.starts_with(&answer)))
    }

    /// Print a numbered menu and return the zero-based index chosen.
    async fn choose<R, W>(
        &self,
        lines: &mut Lines<R>,
        out: &mut W,
        prompt_key: &str,
        params: &[(&str, &str)],
        options: &[String],
    ) -> Result<usize, WizardError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let prompt = self.text(prompt_key, NS, params).await;
        loop {
            writeln!(out, "{prompt}")?;
            for (i, option) in options.iter().enumerate() {
                writeln!(out, "  {}. {}", i + 1, option)?;
            }
            write!(out, "> ")?;
            out.flush()?;

            match read_line(lines).await?.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
                _ => {
                    let max = options.len().to_string();
                    let hint = self
                        .text("invalidChoice", "common", &[("max", max.as_str())])
                        .await;
                    writeln!(out, "{hint}")?;
                }
            }
        }
    }

    async fn text(&self, key: &str, namespace: &str, params: &[(&str, &str)]) -> String {
        self.manager.i18n().await.t(key, namespace, params)
    }
}

async fn read_line<R>(lines: &mut Lines<R>) -> Result<String, WizardError>
where
    R: AsyncBufRead + Unpin,
{
    match lines.next_line().await? {
        Some(line) => Ok(line.trim().to_string()),
        None => Err(WizardError::Aborted),
    }
}
