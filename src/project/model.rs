//! Project data model types.
//!
//! A [`Project`] is the unit of persistence for both store flavors. Field
//! names serialize as camelCase so documents round-trip with exports written
//! by earlier versions of the tool.

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Categories every fresh project starts with. At least one category must
/// exist at all times — see [`super::edit::EditError::LastCategory`].
pub const DEFAULT_CATEGORIES: [&str; 3] = ["Work", "Personal Time", "Spending"];

/// Number of journey stages (tabs) a project moves through.
pub const STAGE_COUNT: u8 = 5;

/// Epoch milliseconds — the id scheme shared by projects and their items.
/// Monotonic within the process so two ids minted in the same millisecond
/// still come out distinct.
pub fn now_millis() -> i64 {
    use std::sync::atomic::{AtomicI64, Ordering};
    static LAST: AtomicI64 = AtomicI64::new(0);
    let now = Utc::now().timestamp_millis();
    loop {
        let last = LAST.load(Ordering::Relaxed);
        let candidate = if now > last { now } else { last + 1 };
        if LAST
            .compare_exchange(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            return candidate;
        }
    }
}

/// Today's date as `YYYY-MM-DD` in the user's local timezone.
pub fn today() -> String {
    Local::now().date_naive().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Creation timestamp in milliseconds, as a string. Unique within a store.
    pub id: String,
    pub name: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the last persisted mutation.
    pub updated_at: String,
    /// Active stage tab, 1–5.
    pub current_week: u8,
    pub data: ProjectData,
}

impl Project {
    /// Fresh skeleton with the default category set.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: now_millis().to_string(),
            name: name.into(),
            created_at: now.clone(),
            updated_at: now,
            current_week: 1,
            data: ProjectData::default(),
        }
    }

    /// Deep copy with a new id and fresh timestamps; the name gets a
    /// `" (copy)"` suffix so the duplicate is distinguishable in lists.
    pub fn duplicate(&self) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: now_millis().to_string(),
            name: format!("{} (copy)", self.name),
            created_at: now.clone(),
            updated_at: now,
            current_week: self.current_week,
            data: self.data.clone(),
        }
    }

    /// Refresh `updated_at`. Called on every persisted mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().to_rfc3339();
    }

    /// Progress toward the current stage's target, `(current, target)`.
    ///
    /// Targets: 10 observations, 3 patterns, 5 interviews for the selected
    /// idea, 1 MVP plan. Stage 5 has no fixed target and reports `(1, 1)`.
    pub fn stage_progress(&self) -> (usize, usize) {
        let d = &self.data;
        match self.current_week {
            1 => (d.observations.len(), 10),
            2 => (d.patterns.len(), 3),
            3 => {
                let interviews = d
                    .selected_idea_id
                    .and_then(|id| d.validation_data.get(&id))
                    .map(|v| v.interviews.len())
                    .unwrap_or(0);
                (interviews, 5)
            }
            4 => (usize::from(d.mvp_plan.is_some()), 1),
            _ => (1, 1),
        }
    }
}

/// The nested document every store persists verbatim. Each field carries a
/// serde default so documents written before a field existed still parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectData {
    pub observations: Vec<Observation>,
    pub patterns: Vec<Pattern>,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    /// Last AI analysis result, kept apart from the editable `patterns` list.
    pub ai_patterns: Vec<Pattern>,
    pub analysis_complete: bool,
    pub ideas: Vec<Idea>,
    pub selected_idea_id: Option<i64>,
    /// Idea id → validation record. Keys serialize as JSON object strings.
    pub validation_data: BTreeMap<i64, IdeaValidation>,
    pub mvp_plan: Option<MvpPlan>,
}

fn default_categories() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

impl Default for ProjectData {
    fn default() -> Self {
        Self {
            observations: Vec::new(),
            patterns: Vec::new(),
            categories: default_categories(),
            ai_patterns: Vec::new(),
            analysis_complete: false,
            ideas: Vec::new(),
            selected_idea_id: None,
            validation_data: BTreeMap::new(),
            mvp_plan: None,
        }
    }
}

impl ProjectData {
    /// Observations filtered to one category, or all of them for `None`.
    pub fn observations_in(&self, category: Option<&str>) -> Vec<&Observation> {
        self.observations
            .iter()
            .filter(|o| category.is_none_or(|c| o.category == c))
            .collect()
    }
}

/// A single logged pain point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: i64,
    pub text: String,
    pub category: String,
    /// `YYYY-MM-DD` local date of the entry.
    pub date: String,
    /// Stage tab that was active when the entry was logged.
    pub week: u8,
}

/// A cluster of related pain points — AI-summarized or manually grouped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub id: i64,
    pub name: String,
    /// Recurrence count across the observation log.
    pub count: u32,
    /// AI-written explanation of the cluster. Manual patterns leave it unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Verbatim observations the AI grouped under this pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_items: Option<Vec<String>>,
    /// Category scope the analysis ran against; `None` for manual entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// `YYYY-MM-DD` local date the idea was recorded.
    pub created_at: String,
}

/// Everything gathered while validating one idea.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct IdeaValidation {
    pub interviews: Vec<Interview>,
    pub online_validation: OnlineValidation,
}

/// One validation interview.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub category: String,
    /// How often the interviewee hits the pain point, free-form.
    #[serde(default)]
    pub frequency: String,
    /// 1–10 self-reported usefulness score.
    pub help_score: u8,
    /// Willingness to pay, free-form.
    #[serde(default)]
    pub payment: String,
    #[serde(default)]
    pub memo: String,
}

impl Interview {
    pub fn blank(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
            category: String::new(),
            frequency: String::new(),
            help_score: 5,
            payment: String::new(),
            memo: String::new(),
        }
    }
}

/// The four named online-research sections. A fixed record rather than an
/// open dictionary, so the shape is enumerable and testable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct OnlineValidation {
    pub search_research: ResearchSection,
    pub competitors: ResearchSection,
    pub community: ResearchSection,
    pub painpoints: ResearchSection,
}

/// Names a research section when routing an edit to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchTopic {
    SearchResearch,
    Competitors,
    Community,
    Painpoints,
}

impl OnlineValidation {
    pub fn section(&self, topic: ResearchTopic) -> &ResearchSection {
        match topic {
            ResearchTopic::SearchResearch => &self.search_research,
            ResearchTopic::Competitors => &self.competitors,
            ResearchTopic::Community => &self.community,
            ResearchTopic::Painpoints => &self.painpoints,
        }
    }

    pub fn section_mut(&mut self, topic: ResearchTopic) -> &mut ResearchSection {
        match topic {
            ResearchTopic::SearchResearch => &mut self.search_research,
            ResearchTopic::Competitors => &mut self.competitors,
            ResearchTopic::Community => &mut self.community,
            ResearchTopic::Painpoints => &mut self.painpoints,
        }
    }
}

/// Free-form notes plus attached media for one research section.
/// Images are data URLs; videos are plain links.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ResearchSection {
    pub text: String,
    pub images: Vec<String>,
    pub videos: Vec<String>,
}

/// AI-suggested minimal-test strategy for a validated idea.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MvpPlan {
    /// Candidate service names, typically three.
    pub service_names: Vec<String>,
    pub core_message: String,
    /// Landing page / beta signup / ads — the suggested delivery vehicle.
    pub delivery_method: String,
    pub test_plan: TestPlan,
    pub timeline: String,
    pub budget: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TestPlan {
    pub method: String,
    pub channels: Vec<String>,
    pub metrics: Vec<String>,
    pub success_criteria: String,
}
