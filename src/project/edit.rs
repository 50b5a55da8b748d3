// SPDX-License-Identifier: MIT
//! The single mutation entry point for a project.
//!
//! Every change to a [`Project`] goes through [`Project::apply`] so the
//! autosave snapshot always sees a consistent aggregate. Precondition
//! violations come back as [`EditError`] before anything is touched;
//! a successful apply refreshes `updated_at`.

use thiserror::Error;

use super::model::*;

/// Local precondition violations. Raised before any storage or network call;
/// the caller surfaces them immediately and the triggering action is blocked.
#[derive(Debug, Error, PartialEq)]
pub enum EditError {
    #[error("{0} is required")]
    EmptyInput(&'static str),
    #[error("category '{0}' does not exist")]
    UnknownCategory(String),
    #[error("category '{0}' already exists")]
    DuplicateCategory(String),
    #[error("at least one category is required")]
    LastCategory,
    #[error("category has {count} observation(s); deleting it removes them too")]
    ConfirmationRequired { count: usize },
    #[error("no pattern with id {0}")]
    UnknownPattern(i64),
    #[error("no idea with id {0}")]
    UnknownIdea(i64),
    #[error("no interview with id {0}")]
    UnknownInterview(i64),
    #[error("select an idea first")]
    NoSelectedIdea,
    #[error("stage must be between 1 and {STAGE_COUNT}, got {0}")]
    InvalidStage(u8),
}

/// One project mutation. Deletes are idempotent; updates on a missing id are
/// errors; `DeleteCategory` must be re-issued with `confirmed` when the
/// category still has observations.
#[derive(Debug, Clone)]
pub enum Edit {
    AddObservation { text: String, category: String },
    DeleteObservation { id: i64 },

    AddCategory { name: String },
    DeleteCategory { name: String, confirmed: bool },

    AddPattern,
    UpdatePattern { id: i64, name: Option<String>, count: Option<u32> },
    DeletePattern { id: i64 },
    /// Install an AI analysis result: replaces `patterns`, remembers it in
    /// `ai_patterns`, and marks the analysis complete.
    ApplyAnalysis { patterns: Vec<Pattern> },

    AddIdea { name: String, description: String },
    UpdateIdea { id: i64, name: String, description: String },
    DeleteIdea { id: i64 },
    SelectIdea { id: Option<i64> },

    AddInterview,
    UpdateInterview {
        id: i64,
        name: Option<String>,
        category: Option<String>,
        frequency: Option<String>,
        help_score: Option<u8>,
        payment: Option<String>,
        memo: Option<String>,
    },
    DeleteInterview { id: i64 },

    SetResearchText { topic: ResearchTopic, text: String },
    AddResearchImage { topic: ResearchTopic, data_url: String },
    RemoveResearchImage { topic: ResearchTopic, index: usize },
    AddResearchVideo { topic: ResearchTopic, url: String },
    RemoveResearchVideo { topic: ResearchTopic, index: usize },

    SetMvpPlan { plan: MvpPlan },
    UpdateMvp {
        core_message: Option<String>,
        delivery_method: Option<String>,
        timeline: Option<String>,
        budget: Option<String>,
    },

    SetStage { week: u8 },
}

impl Project {
    /// Apply one edit. On success `updated_at` is refreshed; on error the
    /// project is untouched.
    pub fn apply(&mut self, edit: Edit) -> Result<(), EditError> {
        match edit {
            Edit::SetStage { week } => {
                if !(1..=STAGE_COUNT).contains(&week) {
                    return Err(EditError::InvalidStage(week));
                }
                self.current_week = week;
            }
            other => self.data.apply(other, self.current_week)?,
        }
        self.touch();
        Ok(())
    }
}

impl ProjectData {
    fn apply(&mut self, edit: Edit, week: u8) -> Result<(), EditError> {
        match edit {
            Edit::AddObservation { text, category } => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Err(EditError::EmptyInput("observation text"));
                }
                if !self.categories.iter().any(|c| *c == category) {
                    return Err(EditError::UnknownCategory(category));
                }
                self.observations.push(Observation {
                    id: now_millis(),
                    text,
                    category,
                    date: today(),
                    week,
                });
            }
            Edit::DeleteObservation { id } => {
                self.observations.retain(|o| o.id != id);
            }

            Edit::AddCategory { name } => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(EditError::EmptyInput("category name"));
                }
                if self.categories.contains(&name) {
                    return Err(EditError::DuplicateCategory(name));
                }
                self.categories.push(name);
            }
            Edit::DeleteCategory { name, confirmed } => {
                if !self.categories.iter().any(|c| *c == name) {
                    return Err(EditError::UnknownCategory(name));
                }
                if self.categories.len() <= 1 {
                    return Err(EditError::LastCategory);
                }
                let count = self.observations.iter().filter(|o| o.category == name).count();
                if count > 0 && !confirmed {
                    return Err(EditError::ConfirmationRequired { count });
                }
                self.categories.retain(|c| *c != name);
                self.observations.retain(|o| o.category != name);
            }

            Edit::AddPattern => {
                self.patterns.push(Pattern {
                    id: now_millis(),
                    name: String::new(),
                    count: 0,
                    summary: None,
                    related_items: None,
                    category: None,
                });
            }
            Edit::UpdatePattern { id, name, count } => {
                let p = self
                    .patterns
                    .iter_mut()
                    .find(|p| p.id == id)
                    .ok_or(EditError::UnknownPattern(id))?;
                if let Some(name) = name {
                    p.name = name;
                }
                if let Some(count) = count {
                    p.count = count;
                }
            }
            Edit::DeletePattern { id } => {
                self.patterns.retain(|p| p.id != id);
            }
            Edit::ApplyAnalysis { patterns } => {
                self.ai_patterns = patterns.clone();
                self.patterns = patterns;
                self.analysis_complete = true;
            }

            Edit::AddIdea { name, description } => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(EditError::EmptyInput("idea name"));
                }
                let id = now_millis();
                self.ideas.push(Idea {
                    id,
                    name,
                    description,
                    created_at: today(),
                });
                // Validation workspace exists from the moment the idea does.
                self.validation_data.insert(id, IdeaValidation::default());
            }
            Edit::UpdateIdea { id, name, description } => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(EditError::EmptyInput("idea name"));
                }
                let idea = self
                    .ideas
                    .iter_mut()
                    .find(|i| i.id == id)
                    .ok_or(EditError::UnknownIdea(id))?;
                idea.name = name;
                idea.description = description;
            }
            Edit::DeleteIdea { id } => {
                self.ideas.retain(|i| i.id != id);
                self.validation_data.remove(&id);
                if self.selected_idea_id == Some(id) {
                    self.selected_idea_id = None;
                }
            }
            Edit::SelectIdea { id } => {
                if let Some(id) = id {
                    if !self.ideas.iter().any(|i| i.id == id) {
                        return Err(EditError::UnknownIdea(id));
                    }
                }
                self.selected_idea_id = id;
            }

            Edit::AddInterview => {
                let v = self.selected_validation_mut()?;
                v.interviews.push(Interview::blank(now_millis()));
            }
            Edit::UpdateInterview {
                id,
                name,
                category,
                frequency,
                help_score,
                payment,
                memo,
            } => {
                let v = self.selected_validation_mut()?;
                let i = v
                    .interviews
                    .iter_mut()
                    .find(|i| i.id == id)
                    .ok_or(EditError::UnknownInterview(id))?;
                if let Some(name) = name {
                    i.name = name;
                }
                if let Some(category) = category {
                    i.category = category;
                }
                if let Some(frequency) = frequency {
                    i.frequency = frequency;
                }
                if let Some(help_score) = help_score {
                    i.help_score = help_score;
                }
                if let Some(payment) = payment {
                    i.payment = payment;
                }
                if let Some(memo) = memo {
                    i.memo = memo;
                }
            }
            Edit::DeleteInterview { id } => {
                let v = self.selected_validation_mut()?;
                v.interviews.retain(|i| i.id != id);
            }

            Edit::SetResearchText { topic, text } => {
                self.selected_validation_mut()?
                    .online_validation
                    .section_mut(topic)
                    .text = text;
            }
            Edit::AddResearchImage { topic, data_url } => {
                self.selected_validation_mut()?
                    .online_validation
                    .section_mut(topic)
                    .images
                    .push(data_url);
            }
            Edit::RemoveResearchImage { topic, index } => {
                let images = &mut self
                    .selected_validation_mut()?
                    .online_validation
                    .section_mut(topic)
                    .images;
                if index < images.len() {
                    images.remove(index);
                }
            }
            Edit::AddResearchVideo { topic, url } => {
                self.selected_validation_mut()?
                    .online_validation
                    .section_mut(topic)
                    .videos
                    .push(url);
            }
            Edit::RemoveResearchVideo { topic, index } => {
                let videos = &mut self
                    .selected_validation_mut()?
                    .online_validation
                    .section_mut(topic)
                    .videos;
                if index < videos.len() {
                    videos.remove(index);
                }
            }

            Edit::SetMvpPlan { plan } => {
                self.mvp_plan = Some(plan);
            }
            Edit::UpdateMvp {
                core_message,
                delivery_method,
                timeline,
                budget,
            } => {
                let plan = self.mvp_plan.get_or_insert_with(MvpPlan::default);
                if let Some(core_message) = core_message {
                    plan.core_message = core_message;
                }
                if let Some(delivery_method) = delivery_method {
                    plan.delivery_method = delivery_method;
                }
                if let Some(timeline) = timeline {
                    plan.timeline = timeline;
                }
                if let Some(budget) = budget {
                    plan.budget = budget;
                }
            }

            Edit::SetStage { .. } => unreachable!("handled in Project::apply"),
        }
        Ok(())
    }

    fn selected_validation_mut(&mut self) -> Result<&mut IdeaValidation, EditError> {
        let id = self.selected_idea_id.ok_or(EditError::NoSelectedIdea)?;
        Ok(self.validation_data.entry(id).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with(categories: &[&str]) -> Project {
        let mut p = Project::new("t");
        p.data.categories = categories.iter().map(|c| c.to_string()).collect();
        p
    }

    fn observe(p: &mut Project, text: &str, category: &str) {
        p.apply(Edit::AddObservation {
            text: text.into(),
            category: category.into(),
        })
        .unwrap();
    }

    #[test]
    fn observation_requires_known_category() {
        let mut p = project_with(&["Work"]);
        let err = p
            .apply(Edit::AddObservation {
                text: "queue at the printer".into(),
                category: "Nope".into(),
            })
            .unwrap_err();
        assert_eq!(err, EditError::UnknownCategory("Nope".into()));
        assert!(p.data.observations.is_empty());
    }

    #[test]
    fn last_category_cannot_be_deleted() {
        let mut p = project_with(&["Work"]);
        let err = p
            .apply(Edit::DeleteCategory {
                name: "Work".into(),
                confirmed: true,
            })
            .unwrap_err();
        assert_eq!(err, EditError::LastCategory);
        assert_eq!(p.data.categories, vec!["Work"]);
    }

    #[test]
    fn category_with_observations_needs_confirmation_and_cascades() {
        let mut p = project_with(&["Work", "Spending"]);
        observe(&mut p, "meetings run over", "Work");
        observe(&mut p, "meetings start late", "Work");
        observe(&mut p, "impulse snacks", "Spending");

        let err = p
            .apply(Edit::DeleteCategory {
                name: "Work".into(),
                confirmed: false,
            })
            .unwrap_err();
        assert_eq!(err, EditError::ConfirmationRequired { count: 2 });
        assert_eq!(p.data.observations.len(), 3);

        p.apply(Edit::DeleteCategory {
            name: "Work".into(),
            confirmed: true,
        })
        .unwrap();
        assert_eq!(p.data.categories, vec!["Spending"]);
        assert_eq!(p.data.observations.len(), 1);
        assert_eq!(p.data.observations[0].category, "Spending");
    }

    #[test]
    fn empty_category_deletes_without_confirmation() {
        let mut p = project_with(&["Work", "Spending"]);
        p.apply(Edit::DeleteCategory {
            name: "Spending".into(),
            confirmed: false,
        })
        .unwrap();
        assert_eq!(p.data.categories, vec!["Work"]);
    }

    #[test]
    fn deleting_idea_cascades_validation_and_selection() {
        let mut p = project_with(&["Work"]);
        p.apply(Edit::AddIdea {
            name: "meeting broker".into(),
            description: String::new(),
        })
        .unwrap();
        let id = p.data.ideas[0].id;
        p.apply(Edit::SelectIdea { id: Some(id) }).unwrap();
        p.apply(Edit::AddInterview).unwrap();
        assert_eq!(p.data.validation_data[&id].interviews.len(), 1);

        p.apply(Edit::DeleteIdea { id }).unwrap();
        assert!(p.data.ideas.is_empty());
        assert!(!p.data.validation_data.contains_key(&id));
        assert_eq!(p.data.selected_idea_id, None);
    }

    #[test]
    fn interview_edits_require_a_selected_idea() {
        let mut p = project_with(&["Work"]);
        assert_eq!(p.apply(Edit::AddInterview), Err(EditError::NoSelectedIdea));
        assert_eq!(
            p.apply(Edit::SetResearchText {
                topic: ResearchTopic::Community,
                text: "reddit thread".into(),
            }),
            Err(EditError::NoSelectedIdea)
        );
    }

    #[test]
    fn analysis_result_lands_in_both_lists() {
        let mut p = project_with(&["Work"]);
        let patterns = vec![Pattern {
            id: 1,
            name: "information hunting".into(),
            count: 4,
            summary: Some("looking things up repeatedly".into()),
            related_items: None,
            category: Some("Work".into()),
        }];
        p.apply(Edit::ApplyAnalysis {
            patterns: patterns.clone(),
        })
        .unwrap();
        assert_eq!(p.data.patterns, patterns);
        assert_eq!(p.data.ai_patterns, patterns);
        assert!(p.data.analysis_complete);
    }

    #[test]
    fn stage_is_bounded() {
        let mut p = project_with(&["Work"]);
        assert_eq!(p.apply(Edit::SetStage { week: 0 }), Err(EditError::InvalidStage(0)));
        assert_eq!(p.apply(Edit::SetStage { week: 6 }), Err(EditError::InvalidStage(6)));
        p.apply(Edit::SetStage { week: 4 }).unwrap();
        assert_eq!(p.current_week, 4);
    }

    #[test]
    fn updated_at_moves_only_on_success() {
        let mut p = project_with(&["Work"]);
        let before = p.updated_at.clone();
        let _ = p.apply(Edit::AddCategory { name: "  ".into() });
        assert_eq!(p.updated_at, before);
    }
}
