use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use super::question::{QuestionView, SubmittedValue};
use crate::services::experience::ExperienceBreakdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    /// Test over one unit's active questions.
    Unit,
    /// Up to ten previously-missed questions across a curriculum.
    Review,
    /// Curriculum-level gated final test.
    Final,
}

impl AttemptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptKind::Unit => "unit",
            AttemptKind::Review => "review",
            AttemptKind::Final => "final",
        }
    }
}

/// Attempt document in the "attempts" collection.
///
/// `question_order` is written once at creation and never changes;
/// `is_completed` only ever transitions false -> true. Attempts are never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub learner_id: String,
    pub kind: AttemptKind,
    /// Unit id, final-test id, or curriculum id for review attempts.
    pub target_id: String,
    pub total_questions: u32,
    /// Recomputed from answer records at completion, zero until then.
    pub correct_answers: u32,
    /// Percentage, write-once at completion.
    pub score: f64,
    pub is_completed: bool,
    #[serde(rename = "startedAt", with = "super::bson_datetime_as_chrono")]
    pub started_at: DateTime<Utc>,
    #[serde(
        rename = "completedAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "super::bson_datetime_as_chrono_option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    pub question_order: Vec<String>,
}

/// Answer record keyed by `"{attempt_id}:{question_id}"`, so the storage
/// layer admits exactly one record per pair. A re-answer within the same
/// incomplete attempt updates the record in place and bumps `attempts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub attempt_id: String,
    pub learner_id: String,
    pub question_id: String,
    pub value: SubmittedValue,
    pub is_correct: bool,
    /// Submissions for this question within the attempt; anything past 1 is
    /// a retry for the experience formula.
    pub attempts: u32,
    /// Accumulated seconds across submissions, when the client reports them.
    #[serde(default)]
    pub seconds_spent: u32,
    #[serde(rename = "submittedAt", with = "super::bson_datetime_as_chrono")]
    pub submitted_at: DateTime<Utc>,
}

impl AnswerRecord {
    pub fn key(attempt_id: &str, question_id: &str) -> String {
        format!("{}:{}", attempt_id, question_id)
    }
}

// ---- request / response DTOs ----

#[derive(Debug, Deserialize, Validate)]
pub struct StartAttemptRequest {
    #[validate(length(min = 1, message = "learner_id is required"))]
    pub learner_id: String,
    pub kind: AttemptKind,
    #[validate(length(min = 1, message = "target_id is required"))]
    pub target_id: String,
    /// Display language hint. The engine serves whatever language variant
    /// the content store holds; translation resolution happens upstream.
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartAttemptResponse {
    pub attempt_id: String,
    pub questions: Vec<QuestionView>,
    pub total_questions: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(length(min = 1, message = "question_id is required"))]
    pub question_id: String,
    pub value: SubmittedValue,
    pub seconds_spent: Option<u32>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub correct: bool,
    pub hearts_remaining: i32,
}

#[derive(Debug, Deserialize)]
pub struct ResumeQuery {
    pub learner_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmittedAnswerView {
    pub value: SubmittedValue,
    pub is_correct: bool,
}

#[derive(Debug, Serialize)]
pub struct ResumeAttemptResponse {
    pub attempt_id: String,
    pub questions: Vec<QuestionView>,
    pub total_questions: u32,
    /// Index of the first unanswered question in the stored order; last
    /// index when everything is answered.
    pub resume_index: usize,
    /// Previously-submitted answers keyed by question id.
    pub answers: HashMap<String, SubmittedAnswerView>,
}

#[derive(Debug, Serialize)]
pub struct CurriculumCompletion {
    pub curriculum_id: String,
    pub completed: bool,
    pub already_completed: bool,
    pub missing_unit_ids: Vec<String>,
    pub reward_dispatched: bool,
}

#[derive(Debug, Serialize)]
pub struct CompleteAttemptResponse {
    pub attempt_id: String,
    pub score: f64,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub passed: bool,
    /// Present when this completion granted experience.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<ExperienceBreakdown>,
    /// Present for final tests that passed the progression gate check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curriculum: Option<CurriculumCompletion>,
}
