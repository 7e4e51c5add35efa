use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartTxReason {
    WrongAnswer,
    Purchase,
    Reward,
}

impl HeartTxReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeartTxReason::WrongAnswer => "wrong_answer",
            HeartTxReason::Purchase => "purchase",
            HeartTxReason::Reward => "reward",
        }
    }
}

/// Signed entry in the "heart_transactions" ledger. Appended with every
/// balance mutation, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartTransaction {
    #[serde(rename = "_id")]
    pub id: String,
    pub learner_id: String,
    /// Negative for debits, positive for credits. Records the applied
    /// (clamped) delta, not the requested one.
    pub amount: i32,
    pub reason: HeartTxReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
    #[serde(rename = "createdAt", with = "super::bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTxReason {
    HeartPurchase,
    AdReward,
    Grant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransaction {
    #[serde(rename = "_id")]
    pub id: String,
    pub learner_id: String,
    pub amount: i32,
    pub reason: TokenTxReason,
    #[serde(rename = "createdAt", with = "super::bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceTxReason {
    UnitCompletion,
    ReviewCompletion,
    FinalTestPass,
    CurriculumCompletion,
}

impl ExperienceTxReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceTxReason::UnitCompletion => "unit_completion",
            ExperienceTxReason::ReviewCompletion => "review_completion",
            ExperienceTxReason::FinalTestPass => "final_test_pass",
            ExperienceTxReason::CurriculumCompletion => "curriculum_completion",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceTransaction {
    #[serde(rename = "_id")]
    pub id: String,
    pub learner_id: String,
    pub amount: i32,
    pub reason: ExperienceTxReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
    #[serde(rename = "createdAt", with = "super::bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

// ---- request / response DTOs ----

#[derive(Debug, Deserialize, Validate)]
pub struct PurchaseHeartsRequest {
    #[validate(length(min = 1, message = "learner_id is required"))]
    pub learner_id: String,
    #[validate(range(min = 1, message = "hearts must be at least 1"))]
    pub hearts: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseHeartsResponse {
    pub hearts: i32,
    pub tokens: i32,
}

#[derive(Debug, Serialize)]
pub struct EconomyResponse {
    pub learner_id: String,
    pub hearts: i32,
    pub tokens: i32,
    pub experience: i32,
    pub streak: i32,
}
