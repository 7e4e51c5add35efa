use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-(learner, unit) completion record, `_id` = `"{learner_id}:{unit_id}"`.
/// `is_completed` transitions false -> true exactly once; re-passing the
/// unit test later changes nothing through this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitProgress {
    #[serde(rename = "_id")]
    pub id: String,
    pub learner_id: String,
    pub unit_id: String,
    pub is_completed: bool,
    #[serde(
        rename = "completedAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "super::bson_datetime_as_chrono_option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    /// Experience granted by the first completion.
    pub experience: i32,
    /// Score of the completing attempt.
    pub score: f64,
}

impl UnitProgress {
    pub fn key(learner_id: &str, unit_id: &str) -> String {
        format!("{}:{}", learner_id, unit_id)
    }
}

/// Per-(learner, curriculum) record, `_id` = `"{learner_id}:{curriculum_id}"`.
/// Written only by the progression gate; `is_completed` is write-once true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumProgress {
    #[serde(rename = "_id")]
    pub id: String,
    pub learner_id: String,
    pub curriculum_id: String,
    pub is_completed: bool,
    #[serde(
        rename = "completedAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "super::bson_datetime_as_chrono_option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    /// Experience accumulated for this curriculum at completion time.
    pub experience: i32,
}

impl CurriculumProgress {
    pub fn key(learner_id: &str, curriculum_id: &str) -> String {
        format!("{}:{}", learner_id, curriculum_id)
    }
}
