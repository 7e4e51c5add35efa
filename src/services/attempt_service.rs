use chrono::Utc;
use mongodb::bson::{doc, Document};
use mongodb::Database;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use futures::TryStreamExt;

use crate::errors::EngineError;
use crate::metrics::{
    record_cache_hit, record_cache_miss, track_cache_operation, ANSWERS_SUBMITTED_TOTAL,
    ATTEMPTS_TOTAL,
};
use crate::models::attempt::{
    Attempt, AnswerRecord, AttemptKind, CompleteAttemptResponse, ResumeAttemptResponse,
    StartAttemptRequest, StartAttemptResponse, SubmitAnswerRequest, SubmitAnswerResponse,
    SubmittedAnswerView,
};
use crate::models::content::{FinalTest, Unit};
use crate::models::economy::{ExperienceTxReason, HeartTxReason};
use crate::models::progress::UnitProgress;
use crate::models::question::Question;
use crate::utils::retry::{retry_async_with_config, RetryConfig};
use crate::utils::time::chrono_to_bson;

use super::content_service::ContentService;
use super::economy_service::EconomyService;
use super::evaluator;
use super::experience::{self, ExperienceInput};
use super::progression_service::ProgressionService;
use super::reward_client::RewardDispatcher;
use super::shuffle;

/// Unit and review tests pass at this percentage; final tests carry their
/// own configured threshold.
pub const UNIT_PASSING_SCORE: f64 = 70.0;
/// A review attempt draws at most this many previously-missed questions.
pub const REVIEW_QUESTION_LIMIT: usize = 10;
/// Base experience for review attempts, which have no authored definition.
pub const REVIEW_BASE_EXPERIENCE: i32 = 20;

/// Lifecycle owner for one test attempt: Created -> InProgress -> Completed.
/// There is no abandoned state; an incomplete attempt stays resumable
/// indefinitely.
pub struct AttemptService {
    mongo: Database,
    redis: ConnectionManager,
    reward: Arc<dyn RewardDispatcher>,
}

impl AttemptService {
    pub fn new(mongo: Database, redis: ConnectionManager, reward: Arc<dyn RewardDispatcher>) -> Self {
        Self { mongo, redis, reward }
    }

    fn attempts(&self) -> mongodb::Collection<Attempt> {
        self.mongo.collection("attempts")
    }

    fn answer_records(&self) -> mongodb::Collection<AnswerRecord> {
        self.mongo.collection("answer_records")
    }

    /// Start a fresh attempt: resolve the target's question set, shuffle it,
    /// persist the question order, return the sanitized presentation.
    pub async fn start(&self, req: StartAttemptRequest) -> Result<StartAttemptResponse, EngineError> {
        let content = ContentService::new(self.mongo.clone());
        let economy = EconomyService::new(self.mongo.clone());

        // Both sides must exist before anything is written.
        economy.get_learner(&req.learner_id).await?;

        let questions: Vec<Question> = match req.kind {
            AttemptKind::Unit => {
                let unit = content.get_unit(&req.target_id).await?;
                content.active_unit_questions(&unit.id).await?
            }
            AttemptKind::Final => {
                let test = content.get_final_test(&req.target_id).await?;
                content.questions_in_order(&test.question_ids).await?
            }
            AttemptKind::Review => {
                let curriculum = content.get_curriculum(&req.target_id).await?;
                let missed = content
                    .missed_question_ids(&req.learner_id, &curriculum.id)
                    .await?;
                let sampled = shuffle::sample_review_ids(&missed, REVIEW_QUESTION_LIMIT);
                content.questions_in_order(&sampled).await?
            }
        };

        if questions.is_empty() {
            return Err(EngineError::invalid_state(format!(
                "target {} has no questions to attempt",
                req.target_id
            )));
        }

        let (question_order, views) = shuffle::build_presentation(&questions);

        let attempt = Attempt {
            id: Uuid::new_v4().to_string(),
            learner_id: req.learner_id.clone(),
            kind: req.kind,
            target_id: req.target_id.clone(),
            total_questions: questions.len() as u32,
            correct_answers: 0,
            score: 0.0,
            is_completed: false,
            started_at: Utc::now(),
            completed_at: None,
            question_order,
        };
        self.attempts().insert_one(&attempt).await?;

        ATTEMPTS_TOTAL
            .with_label_values(&[req.kind.as_str(), "started"])
            .inc();
        tracing::info!(
            attempt = %attempt.id,
            learner = %req.learner_id,
            kind = req.kind.as_str(),
            questions = attempt.total_questions,
            "attempt started"
        );

        Ok(StartAttemptResponse {
            attempt_id: attempt.id,
            total_questions: views.len() as u32,
            questions: views,
        })
    }

    /// Evaluate one answer. Wrong answers debit a heart (clamped at zero).
    /// A replayed request with the same idempotency key returns the cached
    /// response; a deliberate re-answer updates the single record in place
    /// and counts as a retry.
    pub async fn submit(
        &self,
        attempt_id: &str,
        req: &SubmitAnswerRequest,
    ) -> Result<SubmitAnswerResponse, EngineError> {
        let retry_cfg = RetryConfig::default();

        let idempotency_key = req
            .idempotency_key
            .clone()
            .unwrap_or_else(|| format!("{}:{}", attempt_id, req.question_id));

        if let Some(cached) = retry_async_with_config(retry_cfg.clone(), || async {
            self.check_idempotency(&idempotency_key).await
        })
        .await?
        {
            record_cache_hit();
            tracing::info!(
                "Returning cached response for idempotency_key={}",
                idempotency_key
            );
            return Ok(cached);
        }
        record_cache_miss();

        let attempt = self.get_attempt(attempt_id).await?;
        if attempt.is_completed {
            return Err(EngineError::invalid_state(format!(
                "attempt {} is already completed",
                attempt_id
            )));
        }
        if !attempt.question_order.iter().any(|id| id == &req.question_id) {
            return Err(EngineError::not_found(format!(
                "question {} in attempt {}",
                req.question_id, attempt_id
            )));
        }

        let content = ContentService::new(self.mongo.clone());
        let question = content.get_question(&req.question_id).await?;
        let is_correct = evaluator::evaluate(&question, &req.value);

        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[if is_correct { "true" } else { "false" }])
            .inc();

        let record_id = AnswerRecord::key(attempt_id, &req.question_id);
        let value = mongodb::bson::to_bson(&req.value)
            .map_err(|e| EngineError::Store(anyhow::Error::new(e)))?;
        let seconds = req.seconds_spent.unwrap_or(0) as i32;

        // Composite _id keeps the storage layer at one record per
        // (attempt, question); racing submissions land on the same document.
        self.mongo
            .collection::<Document>("answer_records")
            .update_one(
                doc! { "_id": &record_id },
                doc! {
                    "$set": { "value": value, "is_correct": is_correct },
                    "$inc": { "attempts": 1, "seconds_spent": seconds },
                    "$setOnInsert": {
                        "attempt_id": attempt_id,
                        "learner_id": &attempt.learner_id,
                        "question_id": &req.question_id,
                        "submittedAt": chrono_to_bson(Utc::now()),
                    },
                },
            )
            .upsert(true)
            .await?;

        let economy = EconomyService::new(self.mongo.clone());
        let hearts_remaining = if is_correct {
            economy.get_learner(&attempt.learner_id).await?.hearts
        } else {
            economy
                .debit_hearts(
                    &attempt.learner_id,
                    1,
                    HeartTxReason::WrongAnswer,
                    Some(attempt_id),
                )
                .await?
        };

        tracing::info!(
            attempt = attempt_id,
            question = %req.question_id,
            correct = is_correct,
            hearts = hearts_remaining,
            "answer submitted"
        );

        let response = SubmitAnswerResponse {
            correct: is_correct,
            hearts_remaining,
        };
        retry_async_with_config(retry_cfg, || async {
            self.cache_response(&idempotency_key, &response).await
        })
        .await?;

        Ok(response)
    }

    /// Rebuild the attempt exactly as started: the persisted question order,
    /// a cursor at the first unanswered question, and everything submitted
    /// so far. Options and word lists come back in stored (unshuffled) order.
    pub async fn resume(
        &self,
        attempt_id: &str,
        learner_id: &str,
    ) -> Result<ResumeAttemptResponse, EngineError> {
        let attempt = self.get_attempt(attempt_id).await?;
        if attempt.learner_id != learner_id {
            return Err(EngineError::not_found(format!(
                "attempt {} for learner {}",
                attempt_id, learner_id
            )));
        }
        if attempt.is_completed {
            return Err(EngineError::invalid_state(format!(
                "attempt {} is already completed",
                attempt_id
            )));
        }

        let content = ContentService::new(self.mongo.clone());
        let questions = content.questions_in_order(&attempt.question_order).await?;
        let views = questions.iter().map(shuffle::stored_view).collect();

        let answers: HashMap<String, SubmittedAnswerView> = self
            .records_for(attempt_id)
            .await?
            .into_iter()
            .map(|r| {
                (
                    r.question_id.clone(),
                    SubmittedAnswerView {
                        value: r.value,
                        is_correct: r.is_correct,
                    },
                )
            })
            .collect();

        let resume_index = attempt
            .question_order
            .iter()
            .position(|id| !answers.contains_key(id))
            .unwrap_or_else(|| attempt.question_order.len().saturating_sub(1));

        Ok(ResumeAttemptResponse {
            attempt_id: attempt.id,
            questions: views,
            total_questions: attempt.total_questions,
            resume_index,
            answers,
        })
    }

    /// Finish the attempt: recompute the result from the answer records,
    /// flip the completion flag exactly once, then run the per-kind
    /// postlude (unit progress, review reward, or final-test gate).
    pub async fn complete(&self, attempt_id: &str) -> Result<CompleteAttemptResponse, EngineError> {
        let attempt = self.get_attempt(attempt_id).await?;
        if attempt.is_completed {
            return Err(EngineError::invalid_state(format!(
                "attempt {} is already completed",
                attempt_id
            )));
        }

        let content = ContentService::new(self.mongo.clone());
        // Resolve the target before claiming completion so a missing target
        // cannot strand a half-completed attempt.
        let target: AttemptTarget = match attempt.kind {
            AttemptKind::Unit => AttemptTarget::Unit(content.get_unit(&attempt.target_id).await?),
            AttemptKind::Final => {
                AttemptTarget::Final(content.get_final_test(&attempt.target_id).await?)
            }
            AttemptKind::Review => AttemptTarget::Review,
        };

        let records = self.records_for(attempt_id).await?;

        // Recomputed from the records, not a running counter, so racing
        // submissions cannot skew the final result.
        let correct_answers = records.iter().filter(|r| r.is_correct).count() as u32;
        let total_questions = attempt.total_questions;
        let score = f64::from(correct_answers) / f64::from(total_questions) * 100.0;
        let total_submissions: u32 = records.iter().map(|r| r.attempts).sum();

        let now = Utc::now();
        // Client-reported per-answer timings, with wall clock as the
        // fallback when none were reported.
        let timed: u32 = records.iter().map(|r| r.seconds_spent).sum();
        let elapsed_seconds = if timed > 0 {
            timed
        } else {
            (now - attempt.started_at).num_seconds().max(0) as u32
        };

        // Exactly one caller wins the flag flip; the loser gets InvalidState.
        let claimed = self
            .attempts()
            .find_one_and_update(
                doc! { "_id": attempt_id, "is_completed": false },
                doc! { "$set": {
                    "is_completed": true,
                    "correct_answers": correct_answers as i32,
                    "score": score,
                    "completedAt": chrono_to_bson(now),
                }},
            )
            .await?;
        if claimed.is_none() {
            return Err(EngineError::invalid_state(format!(
                "attempt {} is already completed",
                attempt_id
            )));
        }

        ATTEMPTS_TOTAL
            .with_label_values(&[attempt.kind.as_str(), "completed"])
            .inc();
        tracing::info!(
            attempt = attempt_id,
            score,
            correct = correct_answers,
            total = total_questions,
            "attempt completed"
        );

        let mut response = CompleteAttemptResponse {
            attempt_id: attempt.id.clone(),
            score,
            correct_answers,
            total_questions,
            passed: false,
            experience: None,
            curriculum: None,
        };

        let stats = AttemptStats {
            correct_answers,
            total_questions,
            total_submissions,
            elapsed_seconds,
        };

        match target {
            AttemptTarget::Unit(unit) => {
                self.finish_unit(&attempt, &unit, &stats, &mut response).await?
            }
            AttemptTarget::Review => self.finish_review(&attempt, &stats, &mut response).await?,
            AttemptTarget::Final(test) => {
                self.finish_final(&attempt, &test, &stats, &mut response).await?
            }
        }

        Ok(response)
    }

    async fn finish_unit(
        &self,
        attempt: &Attempt,
        unit: &Unit,
        stats: &AttemptStats,
        response: &mut CompleteAttemptResponse,
    ) -> Result<(), EngineError> {
        response.passed = response.score >= UNIT_PASSING_SCORE;
        if !response.passed {
            return Ok(());
        }

        // First completion only: the guarded upsert on the composite key is
        // the idempotency point. A later re-pass changes nothing here.
        let breakdown = experience::calculate(&ExperienceInput {
            base_experience: unit.base_experience,
            total_questions: stats.total_questions,
            correct_answers: stats.correct_answers,
            total_submissions: stats.total_submissions,
            elapsed_seconds: stats.elapsed_seconds,
            is_first_attempt: true,
        });

        let key = UnitProgress::key(&attempt.learner_id, &unit.id);
        let claim = self
            .mongo
            .collection::<Document>("unit_progress")
            .update_one(
                doc! { "_id": &key, "is_completed": { "$ne": true } },
                doc! {
                    "$set": {
                        "is_completed": true,
                        "completedAt": chrono_to_bson(Utc::now()),
                        "score": response.score,
                        "experience": breakdown.total,
                    },
                    "$setOnInsert": {
                        "learner_id": &attempt.learner_id,
                        "unit_id": &unit.id,
                    },
                },
            )
            .upsert(true)
            .await;

        let first_completion = match claim {
            Ok(result) => result.upserted_id.is_some() || result.modified_count > 0,
            Err(e) if crate::errors::is_duplicate_key(&e) => false,
            Err(e) => return Err(e.into()),
        };

        if first_completion {
            let economy = EconomyService::new(self.mongo.clone());
            economy
                .grant_experience(
                    &attempt.learner_id,
                    breakdown.total,
                    ExperienceTxReason::UnitCompletion,
                    Some(&attempt.id),
                )
                .await?;
            economy.increment_streak(&attempt.learner_id).await?;
            response.experience = Some(breakdown);
        }
        Ok(())
    }

    async fn finish_review(
        &self,
        attempt: &Attempt,
        stats: &AttemptStats,
        response: &mut CompleteAttemptResponse,
    ) -> Result<(), EngineError> {
        response.passed = response.score >= UNIT_PASSING_SCORE;

        let is_first = !self.has_prior_completion(attempt).await?;
        let breakdown = experience::calculate(&ExperienceInput {
            base_experience: REVIEW_BASE_EXPERIENCE,
            total_questions: stats.total_questions,
            correct_answers: stats.correct_answers,
            total_submissions: stats.total_submissions,
            elapsed_seconds: stats.elapsed_seconds,
            is_first_attempt: is_first,
        });

        EconomyService::new(self.mongo.clone())
            .grant_experience(
                &attempt.learner_id,
                breakdown.total,
                ExperienceTxReason::ReviewCompletion,
                Some(&attempt.id),
            )
            .await?;
        response.experience = Some(breakdown);
        Ok(())
    }

    async fn finish_final(
        &self,
        attempt: &Attempt,
        test: &FinalTest,
        stats: &AttemptStats,
        response: &mut CompleteAttemptResponse,
    ) -> Result<(), EngineError> {
        response.passed = response.score >= test.passing_score;
        if !response.passed {
            return Ok(());
        }

        // A repeat completion of the same final test earns half.
        let is_first = !self.has_prior_completion(attempt).await?;
        let breakdown = experience::calculate(&ExperienceInput {
            base_experience: test.base_experience,
            total_questions: stats.total_questions,
            correct_answers: stats.correct_answers,
            total_submissions: stats.total_submissions,
            elapsed_seconds: stats.elapsed_seconds,
            is_first_attempt: is_first,
        });

        EconomyService::new(self.mongo.clone())
            .grant_experience(
                &attempt.learner_id,
                breakdown.total,
                ExperienceTxReason::FinalTestPass,
                Some(&attempt.id),
            )
            .await?;

        let gate = ProgressionService::new(self.mongo.clone(), self.reward.clone());
        let completion = gate
            .complete_curriculum(
                &attempt.learner_id,
                &test.curriculum_id,
                &attempt.id,
                breakdown.total,
            )
            .await?;

        response.experience = Some(breakdown);
        response.curriculum = Some(completion);
        Ok(())
    }

    async fn get_attempt(&self, attempt_id: &str) -> Result<Attempt, EngineError> {
        let attempt = self
            .attempts()
            .find_one(doc! { "_id": attempt_id })
            .await?
            .ok_or_else(|| EngineError::not_found(format!("attempt {}", attempt_id)))?;
        Ok(attempt)
    }

    async fn records_for(&self, attempt_id: &str) -> Result<Vec<AnswerRecord>, EngineError> {
        let mut cursor = self
            .answer_records()
            .find(doc! { "attempt_id": attempt_id })
            .await?;
        let mut records = Vec::new();
        while let Some(record) = cursor.try_next().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// Has this learner completed this exact target before (any score)?
    async fn has_prior_completion(&self, attempt: &Attempt) -> Result<bool, EngineError> {
        let prior = self
            .attempts()
            .find_one(doc! {
                "learner_id": &attempt.learner_id,
                "kind": attempt.kind.as_str(),
                "target_id": &attempt.target_id,
                "is_completed": true,
                "_id": { "$ne": &attempt.id },
            })
            .await?;
        Ok(prior.is_some())
    }

    // Check if this submission was already processed (idempotency)
    async fn check_idempotency(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<SubmitAnswerResponse>, EngineError> {
        let mut conn = self.redis.clone();
        let cache_key = format!("idempotency:answer:{}", idempotency_key);

        let cached: Option<String> = track_cache_operation("get", async {
            redis::cmd("GET")
                .arg(&cache_key)
                .query_async(&mut conn)
                .await
                .map_err(EngineError::from)
        })
        .await?;

        match cached {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    // Cache the submit response for replays (24 hour TTL)
    async fn cache_response(
        &self,
        idempotency_key: &str,
        response: &SubmitAnswerResponse,
    ) -> Result<(), EngineError> {
        let mut conn = self.redis.clone();
        let cache_key = format!("idempotency:answer:{}", idempotency_key);
        let json = serde_json::to_string(response)?;

        track_cache_operation("setex", async {
            redis::cmd("SETEX")
                .arg(&cache_key)
                .arg(86400)
                .arg(&json)
                .query_async::<()>(&mut conn)
                .await
                .map_err(EngineError::from)
        })
        .await?;

        Ok(())
    }
}

enum AttemptTarget {
    Unit(Unit),
    Review,
    Final(FinalTest),
}

struct AttemptStats {
    correct_answers: u32,
    total_questions: u32,
    total_submissions: u32,
    elapsed_seconds: u32,
}
