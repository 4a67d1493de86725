//! Goal intake: the submitted form, attached resources and the feasibility nudge

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

use super::id::message_id;

static PAPER_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"p[1-4]").expect("valid regex"));
static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"20\d{2}").expect("valid regex"));

/// Base hours assumed for any goal
const BASE_HOURS: f64 = 50.0;
/// Extra hours per attached resource
const HOURS_PER_RESOURCE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Syllabus,
    PastPaper,
    ExaminerReport,
    MarkingScheme,
    Textbook,
    Notes,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    Official,
    PublisherTextbook,
    TeacherNotes,
    StudentNotes,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
    Url,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(rename = "fileType", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// A study resource attached to a goal, with its detected kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedResource {
    pub id: String,
    pub source_type: SourceType,
    pub title_detected: String,
    #[serde(default)]
    pub metadata: ResourceMetadata,
    pub authority: Authority,
}

impl ClassifiedResource {
    /// Classify an uploaded file by its name
    ///
    /// Checks run in order; the first match wins.
    pub fn from_file_name(file_name: &str) -> Self {
        debug!(%file_name, "ClassifiedResource::from_file_name: called");
        let name = file_name.to_lowercase();
        let (source_type, authority, title) = if name.contains("syllabus") {
            (SourceType::Syllabus, Authority::Official, "Official Syllabus".to_string())
        } else if name.contains("paper") || PAPER_CODE.is_match(&name) {
            (SourceType::PastPaper, Authority::Official, "Past Paper".to_string())
        } else if name.contains("examiner") && name.contains("report") {
            (
                SourceType::ExaminerReport,
                Authority::Official,
                "Examiner Report".to_string(),
            )
        } else if name.contains("mark") && name.contains("scheme") {
            (SourceType::MarkingScheme, Authority::Official, "Marking Scheme".to_string())
        } else if name.contains("textbook") {
            (
                SourceType::Textbook,
                Authority::PublisherTextbook,
                "Textbook Chapter".to_string(),
            )
        } else if name.contains("notes") {
            (SourceType::Notes, Authority::StudentNotes, "Study Notes".to_string())
        } else {
            debug!("ClassifiedResource::from_file_name: no rule matched");
            (SourceType::Unknown, Authority::Unknown, file_name.to_string())
        };

        let year = YEAR.find(&name).and_then(|m| m.as_str().parse().ok());
        let file_type = if name.ends_with(".pdf") { FileType::Pdf } else { FileType::Docx };

        Self {
            id: message_id("res"),
            source_type,
            title_detected: title,
            metadata: ResourceMetadata {
                year,
                file_type: Some(file_type),
                ..Default::default()
            },
            authority,
        }
    }

    /// Wrap a resource found by the AI resource finder
    pub fn from_found(found: &AiFoundResource) -> Self {
        debug!(uri = %found.uri, "ClassifiedResource::from_found: called");
        Self {
            id: message_id("res-ai"),
            source_type: SourceType::Unknown,
            title_detected: found.title.clone(),
            metadata: ResourceMetadata {
                uri: Some(found.uri.clone()),
                file_type: Some(FileType::Url),
                ..Default::default()
            },
            authority: Authority::Official,
        }
    }
}

/// A resource suggested by the search-grounded finder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiFoundResource {
    pub title: String,
    pub uri: String,
    #[serde(default)]
    pub description: String,
}

/// Add found resources to `resources`, skipping URIs already present
pub fn merge_found_resources(resources: &mut Vec<ClassifiedResource>, found: &[AiFoundResource]) -> usize {
    debug!(existing = resources.len(), found = found.len(), "merge_found_resources: called");
    let mut added = 0;
    for item in found {
        let duplicate = resources
            .iter()
            .any(|r| r.metadata.uri.as_deref() == Some(item.uri.as_str()));
        if !duplicate {
            resources.push(ClassifiedResource::from_found(item));
            added += 1;
        }
    }
    added
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours_required: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudge: Option<String>,
}

/// The submitted goal form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalFormPayload {
    pub subject: String,
    #[serde(default)]
    pub subject_focus: Vec<String>,
    pub goal_text: String,
    /// Deadline as `YYYY-MM-DD`
    pub deadline_iso: String,
    pub hours_per_day: f64,
    pub days_per_week: u32,
    #[serde(default)]
    pub resources: Vec<ClassifiedResource>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub feasibility: FeasibilityHint,
}

impl GoalFormPayload {
    /// Build a payload and fill in the feasibility nudge relative to `today`
    pub fn new(
        subject: impl Into<String>,
        goal_text: impl Into<String>,
        deadline: NaiveDate,
        hours_per_day: f64,
        days_per_week: u32,
        resources: Vec<ClassifiedResource>,
        today: NaiveDate,
    ) -> Self {
        debug!(%deadline, hours_per_day, days_per_week, "GoalFormPayload::new: called");
        let check = Feasibility::assess(deadline, hours_per_day, days_per_week, resources.len(), today);
        Self {
            subject: subject.into().trim().to_string(),
            subject_focus: Vec::new(),
            goal_text: goal_text.into().trim().to_string(),
            deadline_iso: deadline.format("%Y-%m-%d").to_string(),
            hours_per_day,
            days_per_week,
            resources,
            suggestions: Vec::new(),
            feasibility: FeasibilityHint {
                estimated_hours_required: None,
                nudge: check.nudge,
            },
        }
    }

    pub fn deadline(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.deadline_iso, "%Y-%m-%d").ok()
    }

    /// "{h} hours per day, {d} days a week"
    pub fn study_time_commitment(&self) -> String {
        format!("{} hours per day, {} days a week", self.hours_per_day, self.days_per_week)
    }
}

/// Result of the quick pre-submission feasibility check
#[derive(Debug, Clone, PartialEq)]
pub struct Feasibility {
    pub available_hours: f64,
    pub estimated_hours: f64,
    pub nudge: Option<String>,
}

impl Feasibility {
    pub fn assess(
        deadline: NaiveDate,
        hours_per_day: f64,
        days_per_week: u32,
        resource_count: usize,
        today: NaiveDate,
    ) -> Self {
        debug!(%deadline, %today, resource_count, "Feasibility::assess: called");
        let days = (deadline - today).num_days().max(1) as f64;
        let available_hours = hours_per_day * (days_per_week as f64 / 7.0) * days;
        let estimated_hours = BASE_HOURS + resource_count as f64 * HOURS_PER_RESOURCE;

        let nudge = if available_hours < estimated_hours * 0.8 {
            debug!(available_hours, estimated_hours, "Feasibility::assess: tight timeline");
            Some(format!(
                "At {}h/day, this looks tight. Consider increasing your daily time or extending the deadline.",
                hours_per_day
            ))
        } else if available_hours < estimated_hours {
            debug!(available_hours, estimated_hours, "Feasibility::assess: challenging pace");
            Some("This looks achievable, but it will be a challenging pace.".to_string())
        } else {
            None
        };

        Self {
            available_hours,
            estimated_hours,
            nudge,
        }
    }
}

/// Goal countdown in days, counting the deadline day itself
pub fn days_until(deadline: NaiveDate, today: NaiveDate) -> u32 {
    ((deadline - today).num_days() + 1).max(1) as u32
}
