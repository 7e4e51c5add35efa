use chrono::Utc;
use mongodb::bson::{doc, Document};
use mongodb::Database;
use std::collections::HashSet;
use std::sync::Arc;

use futures::TryStreamExt;

use crate::errors::{is_duplicate_key, EngineError};
use crate::metrics::CURRICULA_COMPLETED_TOTAL;
use crate::models::attempt::CurriculumCompletion;
use crate::models::economy::ExperienceTxReason;
use crate::models::progress::CurriculumProgress;
use crate::utils::time::chrono_to_bson;

use super::content_service::ContentService;
use super::economy_service::EconomyService;
use super::reward_client::{RewardDispatcher, RewardPayload};

/// Experience granted on top of the attempt award when a curriculum
/// completes for the first time.
pub const CURRICULUM_COMPLETION_BONUS: i32 = 100;

/// Gate behind every final-test pass. Curriculum completion happens at most
/// once per learner; the guarded upsert on the composite-keyed progress
/// document is the idempotency point.
pub struct ProgressionService {
    mongo: Database,
    reward: Arc<dyn RewardDispatcher>,
}

impl ProgressionService {
    pub fn new(mongo: Database, reward: Arc<dyn RewardDispatcher>) -> Self {
        Self { mongo, reward }
    }

    /// Called only after a passed final test. `attempt_experience` is the
    /// award already granted for the attempt itself; it is recorded on the
    /// progress document together with the completion bonus.
    pub async fn complete_curriculum(
        &self,
        learner_id: &str,
        curriculum_id: &str,
        attempt_id: &str,
        attempt_experience: i32,
    ) -> Result<CurriculumCompletion, EngineError> {
        let content = ContentService::new(self.mongo.clone());

        // Every mandatory unit needs a completion record first. A miss
        // withholds curriculum completion; the attempt-level award stands.
        let mandatory = content.mandatory_units(curriculum_id).await?;
        let completed_units = self
            .completed_unit_ids(learner_id, &mandatory.iter().map(|u| u.id.clone()).collect::<Vec<_>>())
            .await?;
        let missing: Vec<String> = mandatory
            .iter()
            .filter(|u| !completed_units.contains(&u.id))
            .map(|u| u.id.clone())
            .collect();
        if !missing.is_empty() {
            tracing::info!(
                learner = learner_id,
                curriculum = curriculum_id,
                missing = missing.len(),
                "curriculum completion withheld, mandatory units incomplete"
            );
            return Ok(CurriculumCompletion {
                curriculum_id: curriculum_id.to_string(),
                completed: false,
                already_completed: false,
                missing_unit_ids: missing,
                reward_dispatched: false,
            });
        }

        let now = Utc::now();
        let key = CurriculumProgress::key(learner_id, curriculum_id);
        let total_experience = attempt_experience + CURRICULUM_COMPLETION_BONUS;

        let claim = self
            .mongo
            .collection::<Document>("curriculum_progress")
            .update_one(
                doc! { "_id": &key, "is_completed": { "$ne": true } },
                doc! {
                    "$set": {
                        "is_completed": true,
                        "completedAt": chrono_to_bson(now),
                        "experience": total_experience,
                    },
                    "$setOnInsert": {
                        "learner_id": learner_id,
                        "curriculum_id": curriculum_id,
                    },
                },
            )
            .upsert(true)
            .await;

        let first_completion = match claim {
            Ok(result) => result.upserted_id.is_some() || result.modified_count > 0,
            // The record exists and is already completed; the upsert lost.
            Err(e) if is_duplicate_key(&e) => false,
            Err(e) => return Err(e.into()),
        };

        if !first_completion {
            return Ok(CurriculumCompletion {
                curriculum_id: curriculum_id.to_string(),
                completed: false,
                already_completed: true,
                missing_unit_ids: Vec::new(),
                reward_dispatched: false,
            });
        }

        let economy = EconomyService::new(self.mongo.clone());
        economy
            .grant_experience(
                learner_id,
                CURRICULUM_COMPLETION_BONUS,
                ExperienceTxReason::CurriculumCompletion,
                Some(attempt_id),
            )
            .await?;

        CURRICULA_COMPLETED_TOTAL.inc();
        tracing::info!(
            learner = learner_id,
            curriculum = curriculum_id,
            "curriculum completed"
        );

        // Our side effects are committed; the mint itself is the
        // collaborator's job and is retried out of band on failure.
        let payload = RewardPayload {
            learner_id: learner_id.to_string(),
            curriculum_id: curriculum_id.to_string(),
            attempt_id: attempt_id.to_string(),
            experience: total_experience,
            completed_at: now,
        };
        let reward_dispatched = match self.reward.dispatch(&payload).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Reward dispatch failed for {}: {:#}", key, e);
                false
            }
        };

        Ok(CurriculumCompletion {
            curriculum_id: curriculum_id.to_string(),
            completed: true,
            already_completed: false,
            missing_unit_ids: Vec::new(),
            reward_dispatched,
        })
    }

    async fn completed_unit_ids(
        &self,
        learner_id: &str,
        unit_ids: &[String],
    ) -> Result<HashSet<String>, EngineError> {
        if unit_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let keys: Vec<String> = unit_ids
            .iter()
            .map(|u| crate::models::progress::UnitProgress::key(learner_id, u))
            .collect();

        let mut cursor = self
            .mongo
            .collection::<crate::models::progress::UnitProgress>("unit_progress")
            .find(doc! { "_id": { "$in": keys }, "is_completed": true })
            .await?;

        let mut completed = HashSet::new();
        while let Some(progress) = cursor.try_next().await? {
            completed.insert(progress.unit_id);
        }
        Ok(completed)
    }
}
