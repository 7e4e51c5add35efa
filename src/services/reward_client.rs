use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Payload sent to the reward collaborator when a curriculum completes.
/// The collaborator owns NFT-certificate eligibility and minting; the
/// engine only notifies it.
#[derive(Debug, Clone, Serialize)]
pub struct RewardPayload {
    pub learner_id: String,
    pub curriculum_id: String,
    pub attempt_id: String,
    pub experience: i32,
    pub completed_at: DateTime<Utc>,
}

#[async_trait]
pub trait RewardDispatcher: Send + Sync {
    async fn dispatch(&self, payload: &RewardPayload) -> Result<()>;
}

/// HTTP implementation talking to the external reward service.
pub struct HttpRewardDispatcher {
    http_client: reqwest::Client,
    reward_api_url: String,
}

impl HttpRewardDispatcher {
    pub fn new(reward_api_url: String) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            reward_api_url,
        }
    }
}

#[async_trait]
impl RewardDispatcher for HttpRewardDispatcher {
    async fn dispatch(&self, payload: &RewardPayload) -> Result<()> {
        let url = format!("{}/internal/rewards/curriculum-completed", self.reward_api_url);

        tracing::debug!(
            "Dispatching completion reward: url={}, learner={}, curriculum={}",
            url,
            payload.learner_id,
            payload.curriculum_id
        );

        let response = self
            .http_client
            .post(&url)
            .json(payload)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .context("Failed to call reward service")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("Reward service returned {}: {}", status, error_text));
        }

        tracing::info!(
            "Reward dispatched for learner {} on curriculum {}",
            payload.learner_id,
            payload.curriculum_id
        );
        Ok(())
    }
}
