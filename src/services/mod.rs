use crate::config::Config;
use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;
use std::sync::Arc;

use reward_client::{HttpRewardDispatcher, RewardDispatcher};

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub redis: ConnectionManager,
    pub reward: Arc<dyn RewardDispatcher>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let reward: Arc<dyn RewardDispatcher> =
            Arc::new(HttpRewardDispatcher::new(config.reward_api_url.clone()));

        Ok(Self {
            config,
            mongo,
            redis,
            reward,
        })
    }
}

pub mod attempt_service;
pub mod content_service;
pub mod economy_service;
pub mod evaluator;
pub mod experience;
pub mod progression_service;
pub mod reward_client;
pub mod shuffle;
