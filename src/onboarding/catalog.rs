//! Built-in catalog of languages, countries, life domains and goal templates.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::model::{DomainSelection, GoalTemplate};

const CATALOG_JSON: &str = include_str!("../../data/catalog.json");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Language {
    pub code: String,
    pub name: String,
    pub native_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    pub code: String,
    pub name: String,
}

/// One slice of the domain wheel and the goals offered under it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    #[serde(default)]
    pub goals: Vec<GoalTemplate>,
}

impl Domain {
    pub fn selection(&self) -> DomainSelection {
        DomainSelection {
            id: Some(self.id.clone()),
            name: self.name.clone(),
            icon: self.icon.clone(),
            color: self.color.clone(),
        }
    }

    pub fn goal(&self, name: &str) -> Option<&GoalTemplate> {
        self.goals.iter().find(|g| g.name == name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub languages: Vec<Language>,
    pub countries: Vec<Country>,
    pub domains: Vec<Domain>,
}

impl Catalog {
    /// The catalog compiled into the binary, parsed on first use.
    pub fn builtin() -> &'static Catalog {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(|| {
            serde_json::from_str(CATALOG_JSON).unwrap_or_else(|e| {
                tracing::error!(error = %e, "Built-in catalog is invalid");
                Catalog::default()
            })
        })
    }

    pub fn domain(&self, id: &str) -> Option<&Domain> {
        self.domains.iter().find(|d| d.id == id)
    }

    pub fn goal(&self, domain_id: &str, goal_name: &str) -> Option<&GoalTemplate> {
        self.domain(domain_id)?.goal(goal_name)
    }

    /// Case-insensitive lookup by ISO code.
    pub fn country(&self, code: &str) -> Option<&Country> {
        self.countries
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
    }

    pub fn language(&self, code: &str) -> Option<&Language> {
        self.languages.iter().find(|l| l.code == code)
    }
}
