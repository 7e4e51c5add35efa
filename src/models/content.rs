use serde::{Deserialize, Serialize};

/// Read-only content definitions. The authoring pipeline owns these
/// collections; the engine never writes them.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Curriculum {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    #[serde(rename = "_id")]
    pub id: String,
    pub curriculum_id: String,
    pub title: String,
    /// Completion required before the curriculum can be marked complete.
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Base experience fed to the experience formula for this unit's test.
    pub base_experience: i32,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalTest {
    #[serde(rename = "_id")]
    pub id: String,
    pub curriculum_id: String,
    pub title: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Percentage required to pass, configured per test.
    pub passing_score: f64,
    pub base_experience: i32,
    /// Configured question set, in authoring order.
    pub question_ids: Vec<String>,
}

fn default_true() -> bool {
    true
}
