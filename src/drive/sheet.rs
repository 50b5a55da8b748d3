//! Derived spreadsheet projection.
//!
//! The spreadsheet is a disposable, human-readable mirror of the JSON
//! document: every save clears sheet 0 and rewrites the whole table —
//! project metadata, observations, patterns, AI patterns, ideas, MVP plan —
//! then restyles the header row and auto-sizes the columns. No merging with
//! out-of-band edits is attempted.

use anyhow::{Context as _, Result};
use serde_json::{json, Value};

use crate::project::Project;

/// Cell range rewritten on every save.
const VALUE_RANGE: &str = "A1:Z1000";

fn cell(s: impl Into<String>) -> Value {
    Value::String(s.into())
}

/// Date part of an RFC 3339 timestamp, for display cells.
fn date_of(ts: &str) -> &str {
    ts.split('T').next().unwrap_or(ts)
}

/// The full value grid, one `Vec` per row.
pub fn sheet_values(project: &Project) -> Vec<Vec<Value>> {
    let d = &project.data;
    let mut rows: Vec<Vec<Value>> = Vec::new();

    rows.push(vec![cell("IdeaLog Project Analysis")]);
    rows.push(vec![cell("Project"), cell(&project.name)]);
    rows.push(vec![cell("Created"), cell(date_of(&project.created_at))]);
    rows.push(vec![cell("Last updated"), cell(date_of(&project.updated_at))]);
    rows.push(vec![]);

    if !d.observations.is_empty() {
        rows.push(vec![cell("=== Observation Log ===")]);
        rows.push(vec![cell("Date"), cell("Category"), cell("Observation")]);
        for obs in &d.observations {
            rows.push(vec![cell(&obs.date), cell(&obs.category), cell(&obs.text)]);
        }
        rows.push(vec![]);
    }

    if !d.patterns.is_empty() {
        rows.push(vec![cell("=== Patterns ===")]);
        rows.push(vec![cell("Category"), cell("Pattern"), cell("Count")]);
        for p in &d.patterns {
            rows.push(vec![
                cell(p.category.as_deref().unwrap_or("All")),
                cell(&p.name),
                json!(p.count),
            ]);
        }
        rows.push(vec![]);
    }

    if !d.ai_patterns.is_empty() {
        rows.push(vec![cell("=== AI Pattern Analysis ===")]);
        rows.push(vec![
            cell("Category"),
            cell("Pattern"),
            cell("Summary"),
            cell("Related observations"),
        ]);
        for p in &d.ai_patterns {
            rows.push(vec![
                cell(p.category.as_deref().unwrap_or("All")),
                cell(&p.name),
                cell(p.summary.as_deref().unwrap_or("")),
                cell(p.related_items.as_deref().unwrap_or(&[]).join("; ")),
            ]);
        }
        rows.push(vec![]);
    }

    if !d.ideas.is_empty() {
        rows.push(vec![cell("=== Ideas ===")]);
        rows.push(vec![cell("Idea"), cell("Description"), cell("Created")]);
        for idea in &d.ideas {
            rows.push(vec![
                cell(&idea.name),
                cell(&idea.description),
                cell(&idea.created_at),
            ]);
        }
        rows.push(vec![]);
    }

    if let Some(plan) = &d.mvp_plan {
        rows.push(vec![cell("=== MVP Plan ===")]);
        rows.push(vec![cell("Field"), cell("Value")]);
        rows.push(vec![cell("Service name ideas"), cell(plan.service_names.join(", "))]);
        rows.push(vec![cell("Core message"), cell(&plan.core_message)]);
        rows.push(vec![cell("Delivery method"), cell(&plan.delivery_method)]);
        rows.push(vec![cell("Test method"), cell(&plan.test_plan.method)]);
        rows.push(vec![cell("Channels"), cell(plan.test_plan.channels.join(", "))]);
        rows.push(vec![cell("Metrics"), cell(plan.test_plan.metrics.join(", "))]);
        rows.push(vec![cell("Success criteria"), cell(&plan.test_plan.success_criteria)]);
        rows.push(vec![cell("Timeline"), cell(&plan.timeline)]);
        rows.push(vec![cell("Budget"), cell(&plan.budget)]);
    }

    rows
}

/// batchUpdate requests that wipe sheet 0 and retitle it.
pub fn clear_requests(project_name: &str) -> Value {
    json!({
        "requests": [
            { "updateCells": { "range": { "sheetId": 0 }, "fields": "*" } },
            {
                "updateSheetProperties": {
                    "properties": { "sheetId": 0, "title": format!("{project_name} analysis") },
                    "fields": "title"
                }
            }
        ]
    })
}

/// batchUpdate requests for the header-row style and column auto-sizing.
pub fn format_requests() -> Value {
    json!({
        "requests": [
            {
                "repeatCell": {
                    "range": { "sheetId": 0, "startRowIndex": 0, "endRowIndex": 1 },
                    "cell": {
                        "userEnteredFormat": {
                            "backgroundColor": { "red": 0.2, "green": 0.4, "blue": 0.8 },
                            "textFormat": {
                                "foregroundColor": { "red": 1, "green": 1, "blue": 1 },
                                "fontSize": 14,
                                "bold": true
                            }
                        }
                    },
                    "fields": "userEnteredFormat(backgroundColor,textFormat)"
                }
            },
            {
                "autoResizeDimensions": {
                    "dimensions": {
                        "sheetId": 0,
                        "dimension": "COLUMNS",
                        "startIndex": 0,
                        "endIndex": 10
                    }
                }
            }
        ]
    })
}

/// Clear, rewrite, and restyle an existing spreadsheet from the project.
pub async fn write_sheet(
    http: &reqwest::Client,
    sheets_base: &str,
    token: &str,
    spreadsheet_id: &str,
    project: &Project,
) -> Result<()> {
    http.post(format!("{sheets_base}/{spreadsheet_id}:batchUpdate"))
        .bearer_auth(token)
        .json(&clear_requests(&project.name))
        .send()
        .await
        .context("Failed to clear spreadsheet")?
        .error_for_status()?;

    http.put(format!(
        "{sheets_base}/{spreadsheet_id}/values/{VALUE_RANGE}?valueInputOption=USER_ENTERED"
    ))
    .bearer_auth(token)
    .json(&json!({ "values": sheet_values(project) }))
    .send()
    .await
    .context("Failed to write spreadsheet values")?
    .error_for_status()?;

    http.post(format!("{sheets_base}/{spreadsheet_id}:batchUpdate"))
        .bearer_auth(token)
        .json(&format_requests())
        .send()
        .await
        .context("Failed to format spreadsheet")?
        .error_for_status()?;

    Ok(())
}
