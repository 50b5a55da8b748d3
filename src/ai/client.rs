//! The client side of the AI integration: prompt builders, fenced-JSON
//! response parsing, and the two analysis flows with their preconditions.
//!
//! Both flows check the daily quota and their minimum-item thresholds before
//! any network request goes out; only a successful, parseable response
//! counts against the quota.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use super::quota::QuotaTracker;
use super::{AiErrorBody, AiRequest, AiResponse};
use crate::project::{now_millis, MvpPlan, Pattern, ProjectData};

/// Category label stored on patterns from a whole-log analysis.
pub const ALL_CATEGORIES: &str = "All";

/// Minimum observations an analysis needs in its category scope.
const MIN_OBSERVATIONS: usize = 3;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("daily AI limit of {limit} reached — try again tomorrow")]
    QuotaExhausted { limit: u32 },
    #[error("at least {MIN_OBSERVATIONS} observations are needed in the selected category, got {got}")]
    NotEnoughObservations { got: usize },
    #[error("select an idea first")]
    NoSelectedIdea,
    #[error("at least one interview is required")]
    NoInterviews,
    #[error("AI request failed: {message}")]
    Proxy { status: u16, message: String },
    #[error("AI response was not in the expected shape: {0}")]
    BadResponse(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct AiClient {
    http: reqwest::Client,
    proxy_url: String,
    quota: QuotaTracker,
}

impl AiClient {
    pub fn new(proxy_url: String, quota: QuotaTracker) -> Self {
        Self {
            http: reqwest::Client::new(),
            proxy_url,
            quota,
        }
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// Cluster the observation log (optionally narrowed to one category)
    /// into the top three recurring patterns.
    pub async fn analyze_patterns(
        &self,
        data: &ProjectData,
        category: Option<&str>,
    ) -> Result<Vec<Pattern>, AiError> {
        self.check_quota().await?;

        let scoped = data.observations_in(category);
        if scoped.len() < MIN_OBSERVATIONS {
            return Err(AiError::NotEnoughObservations { got: scoped.len() });
        }

        let scope_label = category.unwrap_or(ALL_CATEGORIES);
        let texts: Vec<&str> = scoped.iter().map(|o| o.text.as_str()).collect();
        let prompt = pattern_prompt(scope_label, &texts);

        let raw = self.relay(&prompt, "pattern").await?;
        let patterns = parse_patterns(&raw, scope_label)?;

        self.quota.record_use().await?;
        info!(count = patterns.len(), scope = scope_label, "AI pattern analysis complete");
        Ok(patterns)
    }

    /// Turn the selected idea plus its validation data into an MVP test plan.
    pub async fn generate_mvp_plan(&self, data: &ProjectData) -> Result<MvpPlan, AiError> {
        self.check_quota().await?;

        let idea_id = data.selected_idea_id.ok_or(AiError::NoSelectedIdea)?;
        let idea = data
            .ideas
            .iter()
            .find(|i| i.id == idea_id)
            .ok_or(AiError::NoSelectedIdea)?;
        let validation = data
            .validation_data
            .get(&idea_id)
            .ok_or(AiError::NoInterviews)?;
        if validation.interviews.is_empty() {
            return Err(AiError::NoInterviews);
        }

        let prompt = mvp_prompt(
            &idea.name,
            &idea.description,
            validation,
        );

        let raw = self.relay(&prompt, "mvp").await?;
        let plan: MvpPlan = serde_json::from_str(&extract_json(&raw))
            .map_err(|e| AiError::BadResponse(e.to_string()))?;

        self.quota.record_use().await?;
        info!(idea = %idea.name, "AI MVP plan generated");
        Ok(plan)
    }

    async fn check_quota(&self) -> Result<(), AiError> {
        if !self.quota.can_use().await? {
            return Err(AiError::QuotaExhausted {
                limit: self.quota.limit(),
            });
        }
        Ok(())
    }

    async fn relay(&self, prompt: &str, kind: &str) -> Result<String, AiError> {
        let response = self
            .http
            .post(&self.proxy_url)
            .json(&AiRequest {
                prompt: prompt.to_string(),
                kind: kind.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<AiErrorBody>()
                .await
                .map(|b| b.error)
                .unwrap_or_else(|_| format!("status {status}"));
            return Err(AiError::Proxy {
                status: status.as_u16(),
                message,
            });
        }

        let body: AiResponse = response.json().await?;
        Ok(body.result)
    }
}

// ─── Prompts ──────────────────────────────────────────────────────────────────

fn pattern_prompt(scope: &str, observations: &[&str]) -> String {
    format!(
        r#"The following pain points were logged by the user in the "{scope}" area:

- {list}

Analyze these pain points and find the TOP 3 recurring patterns.

Respond with nothing but JSON in exactly this shape:

{{
  "patterns": [
    {{
      "name": "pattern name (e.g. Hard to find information)",
      "count": occurrence count,
      "summary": "2-3 sentence summary of the observations behind this pattern",
      "relatedObservations": ["original pain point 1", "original pain point 2"]
    }}
  ]
}}

Important:
- Find exactly 3 patterns
- count must be the number of pain points actually related to the pattern
- summary should briefly explain why the pattern keeps appearing
- Output only the JSON, no other text"#,
        list = observations.join("\n- ")
    )
}

fn mvp_prompt(idea_name: &str, idea_description: &str, validation: &crate::project::IdeaValidation) -> String {
    let interviews: Vec<String> = validation
        .interviews
        .iter()
        .map(|i| {
            format!(
                "- {}: frequency {}, usefulness {}/10, willingness to pay {}",
                i.name, i.frequency, i.help_score, i.payment
            )
        })
        .collect();

    let ov = &validation.online_validation;
    fn section(text: &str) -> &str {
        if text.is_empty() {
            "none"
        } else {
            text
        }
    }

    format!(
        r#"You are a lean-startup expert. Propose an MVP test plan based on the following.

**Idea:**
{idea_name}
{idea_description}

**Interview results:**
{interviews}

**Online validation:**
Search research: {search}
Competitor analysis: {competitors}
Community analysis: {community}
Pain point analysis: {painpoints}

Respond in this JSON shape:

{{
  "serviceNames": ["service name idea 1", "service name idea 2", "service name idea 3"],
  "coreMessage": "core selling point (1-2 sentences)",
  "deliveryMethod": "recommended delivery vehicle (landing page / beta signup / ads etc.)",
  "testPlan": {{
    "method": "concrete test method",
    "channels": ["channel 1", "channel 2"],
    "metrics": ["metric 1", "metric 2"],
    "successCriteria": "success criteria"
  }},
  "timeline": "recommended schedule (e.g. 2 weeks)",
  "budget": "expected cost range"
}}

Output only the JSON."#,
        interviews = interviews.join("\n"),
        search = section(&ov.search_research.text),
        competitors = section(&ov.competitors.text),
        community = section(&ov.community.text),
        painpoints = section(&ov.painpoints.text),
    )
}

// ─── Response parsing ─────────────────────────────────────────────────────────

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\n?").expect("valid regex"));

/// Models love wrapping JSON in Markdown fences; strip them off.
pub fn extract_json(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

#[derive(Debug, Deserialize)]
struct PatternsPayload {
    patterns: Vec<RawPattern>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPattern {
    name: String,
    #[serde(default)]
    count: u32,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    related_observations: Option<Vec<String>>,
}

fn parse_patterns(raw: &str, scope: &str) -> Result<Vec<Pattern>, AiError> {
    let payload: PatternsPayload = serde_json::from_str(&extract_json(raw))
        .map_err(|e| AiError::BadResponse(e.to_string()))?;
    let base_id = now_millis();
    Ok(payload
        .patterns
        .into_iter()
        .enumerate()
        .map(|(idx, p)| Pattern {
            // Several ids are minted in one call; offset by index so they
            // stay distinct within the document.
            id: base_id + idx as i64,
            name: p.name,
            count: p.count,
            summary: p.summary,
            related_items: p.related_observations,
            category: Some(scope.to_string()),
        })
        .collect())
}
