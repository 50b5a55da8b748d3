//! Export, import, and backup documents.
//!
//! Both export flavors are single JSON documents: a flattened one-project
//! export and a `version 1.0` backup envelope holding every project. Import
//! accepts a previously exported document and rebuilds a project, defaulting
//! any missing field to an empty collection / `None`; a malformed document
//! is an error and leaves the existing project list untouched.

use anyhow::{Context as _, Result};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::model::*;

pub const BACKUP_VERSION: &str = "1.0";

/// Flattened single-project export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectExport {
    pub project_name: String,
    pub created_at: String,
    pub updated_at: String,
    pub current_week: u8,
    pub observations: Vec<Observation>,
    pub patterns: Vec<Pattern>,
    pub categories: Vec<String>,
    pub ai_patterns: Vec<Pattern>,
    pub analysis_complete: bool,
    pub ideas: Vec<Idea>,
    pub selected_idea_id: Option<i64>,
    pub validation_data: BTreeMap<i64, IdeaValidation>,
    pub mvp_plan: Option<MvpPlan>,
    pub export_date: String,
}

impl Default for ProjectExport {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
            current_week: 1,
            observations: Vec::new(),
            patterns: Vec::new(),
            categories: Vec::new(),
            ai_patterns: Vec::new(),
            analysis_complete: false,
            ideas: Vec::new(),
            selected_idea_id: None,
            validation_data: BTreeMap::new(),
            mvp_plan: None,
            export_date: String::new(),
        }
    }
}

impl From<&Project> for ProjectExport {
    fn from(p: &Project) -> Self {
        Self {
            project_name: p.name.clone(),
            created_at: p.created_at.clone(),
            updated_at: Utc::now().to_rfc3339(),
            current_week: p.current_week,
            observations: p.data.observations.clone(),
            patterns: p.data.patterns.clone(),
            categories: p.data.categories.clone(),
            ai_patterns: p.data.ai_patterns.clone(),
            analysis_complete: p.data.analysis_complete,
            ideas: p.data.ideas.clone(),
            selected_idea_id: p.data.selected_idea_id,
            validation_data: p.data.validation_data.clone(),
            mvp_plan: p.data.mvp_plan.clone(),
            export_date: Utc::now().to_rfc3339(),
        }
    }
}

impl ProjectExport {
    /// Rebuild a project from this document. The project gets a fresh id and
    /// `updated_at`; `created_at` is kept when the document carries one.
    pub fn into_project(self) -> Project {
        let now = Utc::now().to_rfc3339();
        let created_at = if self.created_at.is_empty() {
            now.clone()
        } else {
            self.created_at
        };
        let categories = if self.categories.is_empty() {
            DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
        } else {
            self.categories
        };
        let name = if self.project_name.trim().is_empty() {
            "Imported project".to_string()
        } else {
            self.project_name
        };
        Project {
            id: now_millis().to_string(),
            name,
            created_at,
            updated_at: now,
            current_week: self.current_week.clamp(1, STAGE_COUNT),
            data: ProjectData {
                observations: self.observations,
                patterns: self.patterns,
                categories,
                ai_patterns: self.ai_patterns,
                analysis_complete: self.analysis_complete,
                ideas: self.ideas,
                selected_idea_id: self.selected_idea_id,
                validation_data: self.validation_data,
                mvp_plan: self.mvp_plan,
            },
        }
    }
}

/// Serialize one project as a pretty-printed export document.
pub fn export_project(project: &Project) -> Result<String> {
    Ok(serde_json::to_string_pretty(&ProjectExport::from(project))?)
}

/// Parse an export document into a new project.
pub fn import_project(json: &str) -> Result<Project> {
    let doc: ProjectExport =
        serde_json::from_str(json).context("not a valid project export document")?;
    Ok(doc.into_project())
}

/// Full-backup envelope: every project in one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub version: String,
    pub backup_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub projects: Vec<Project>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_date: Option<String>,
}

impl Backup {
    pub fn new(projects: Vec<Project>, user_name: Option<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            version: BACKUP_VERSION.to_string(),
            backup_date: now.clone(),
            user_name,
            projects,
            export_date: Some(now),
        }
    }
}

pub fn export_backup(projects: Vec<Project>, user_name: Option<String>) -> Result<String> {
    Ok(serde_json::to_string_pretty(&Backup::new(projects, user_name))?)
}

pub fn import_backup(json: &str) -> Result<Backup> {
    serde_json::from_str(json).context("not a valid backup document")
}

/// `<name-with-dashes>-<YYYY-MM-DD>.json`
pub fn export_filename(project_name: &str) -> String {
    let dashed: String = project_name.split_whitespace().collect::<Vec<_>>().join("-");
    format!("{dashed}-{}.json", Local::now().date_naive())
}

/// `idealog-backup-<YYYY-MM-DD>.json`
pub fn backup_filename() -> String {
    format!("idealog-backup-{}.json", Local::now().date_naive())
}
