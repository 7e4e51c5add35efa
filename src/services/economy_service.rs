use chrono::Utc;
use mongodb::bson::doc;
use mongodb::options::ReturnDocument;
use mongodb::Database;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::metrics::{EXPERIENCE_AWARDED_TOTAL, HEART_PURCHASES_TOTAL, HEART_TRANSACTIONS_TOTAL};
use crate::models::economy::{
    ExperienceTransaction, ExperienceTxReason, HeartTransaction, HeartTxReason,
    PurchaseHeartsResponse, TokenTransaction, TokenTxReason,
};
use crate::models::Learner;

/// Hearts pool upper bound.
pub const MAX_HEARTS: i32 = 5;
/// Fixed purchase rate: tokens per heart.
pub const TOKENS_PER_HEART: i32 = 10;

/// The shared mutable economy: hearts, tokens and experience. Every balance
/// mutation is a single guarded document update on the learner plus an
/// append-only ledger entry; concurrent mutations cannot lose updates.
pub struct EconomyService {
    mongo: Database,
}

impl EconomyService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn learners(&self) -> mongodb::Collection<Learner> {
        self.mongo.collection("learners")
    }

    pub async fn get_learner(&self, learner_id: &str) -> Result<Learner, EngineError> {
        let learner = self
            .learners()
            .find_one(doc! { "_id": learner_id })
            .await?
            .ok_or_else(|| EngineError::not_found(format!("learner {}", learner_id)))?;
        Ok(learner)
    }

    /// Debit hearts, clamped at zero. A learner already at zero stays at
    /// zero without error and no ledger entry is written.
    /// Returns the new balance.
    pub async fn debit_hearts(
        &self,
        learner_id: &str,
        amount: u32,
        reason: HeartTxReason,
        attempt_id: Option<&str>,
    ) -> Result<i32, EngineError> {
        let amount = amount as i32;
        let update = vec![doc! {
            "$set": {
                "hearts": { "$max": [0, { "$subtract": ["$hearts", amount] }] },
                "updatedAt": "$$NOW",
            }
        }];

        // Pre-image read: the clamped delta is derived from the balance the
        // update actually saw, so two racing debits each ledger their own.
        let before = self
            .learners()
            .find_one_and_update(doc! { "_id": learner_id }, update)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("learner {}", learner_id)))?;

        let new_balance = (before.hearts - amount).max(0);
        let applied = new_balance - before.hearts;
        if applied != 0 {
            self.append_heart_tx(learner_id, applied, reason, attempt_id)
                .await?;
        }

        tracing::debug!(
            learner = learner_id,
            applied,
            balance = new_balance,
            "hearts debited"
        );
        Ok(new_balance)
    }

    /// Credit hearts. Rejected outright when the credit would push the pool
    /// past MAX_HEARTS; the caller must not request more than the room left.
    pub async fn credit_hearts(
        &self,
        learner_id: &str,
        amount: u32,
        reason: HeartTxReason,
    ) -> Result<i32, EngineError> {
        let amount = amount as i32;
        let updated = self
            .learners()
            .find_one_and_update(
                doc! { "_id": learner_id, "hearts": { "$lte": MAX_HEARTS - amount } },
                doc! { "$inc": { "hearts": amount }, "$currentDate": { "updatedAt": true } },
            )
            .return_document(ReturnDocument::After)
            .await?;

        match updated {
            Some(learner) => {
                self.append_heart_tx(learner_id, amount, reason, None).await?;
                Ok(learner.hearts)
            }
            None => {
                // Filter rejected the update: missing learner or no room.
                let learner = self.get_learner(learner_id).await?;
                Err(EngineError::invalid_state(format!(
                    "crediting {} hearts would exceed the maximum of {} (current: {})",
                    amount, MAX_HEARTS, learner.hearts
                )))
            }
        }
    }

    /// Exchange tokens for hearts at the fixed rate. All-or-nothing: a
    /// request that would overflow the pool or overdraw tokens is rejected
    /// with both balances untouched.
    pub async fn purchase_hearts(
        &self,
        learner_id: &str,
        hearts: u32,
    ) -> Result<PurchaseHeartsResponse, EngineError> {
        let hearts = hearts as i32;
        let cost = hearts * TOKENS_PER_HEART;

        let updated = self
            .learners()
            .find_one_and_update(
                doc! {
                    "_id": learner_id,
                    "tokens": { "$gte": cost },
                    "hearts": { "$lte": MAX_HEARTS - hearts },
                },
                doc! {
                    "$inc": { "hearts": hearts, "tokens": -cost },
                    "$currentDate": { "updatedAt": true },
                },
            )
            .return_document(ReturnDocument::After)
            .await?;

        match updated {
            Some(learner) => {
                self.append_heart_tx(learner_id, hearts, HeartTxReason::Purchase, None)
                    .await?;
                self.append_token_tx(learner_id, -cost, TokenTxReason::HeartPurchase)
                    .await?;
                HEART_PURCHASES_TOTAL.with_label_values(&["accepted"]).inc();
                tracing::info!(
                    learner = learner_id,
                    hearts,
                    cost,
                    "heart purchase completed"
                );
                Ok(PurchaseHeartsResponse {
                    hearts: learner.hearts,
                    tokens: learner.tokens,
                })
            }
            None => {
                HEART_PURCHASES_TOTAL.with_label_values(&["rejected"]).inc();
                let learner = self.get_learner(learner_id).await?;
                if learner.tokens < cost {
                    Err(EngineError::InsufficientResource(format!(
                        "purchase needs {} tokens, balance is {}",
                        cost, learner.tokens
                    )))
                } else {
                    Err(EngineError::invalid_state(format!(
                        "purchasing {} hearts would exceed the maximum of {} (current: {})",
                        hearts, MAX_HEARTS, learner.hearts
                    )))
                }
            }
        }
    }

    /// Increment the learner's experience total and append the ledger entry.
    /// Returns the new total.
    pub async fn grant_experience(
        &self,
        learner_id: &str,
        amount: i32,
        reason: ExperienceTxReason,
        attempt_id: Option<&str>,
    ) -> Result<i32, EngineError> {
        let updated = self
            .learners()
            .find_one_and_update(
                doc! { "_id": learner_id },
                doc! { "$inc": { "experience": amount }, "$currentDate": { "updatedAt": true } },
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("learner {}", learner_id)))?;

        let tx = ExperienceTransaction {
            id: Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            amount,
            reason,
            attempt_id: attempt_id.map(|s| s.to_string()),
            created_at: Utc::now(),
        };
        self.mongo
            .collection::<ExperienceTransaction>("experience_transactions")
            .insert_one(&tx)
            .await?;

        EXPERIENCE_AWARDED_TOTAL
            .with_label_values(&[reason.as_str()])
            .inc_by(amount.max(0) as u64);

        Ok(updated.experience)
    }

    pub async fn increment_streak(&self, learner_id: &str) -> Result<i32, EngineError> {
        let updated = self
            .learners()
            .find_one_and_update(
                doc! { "_id": learner_id },
                doc! { "$inc": { "streak": 1 }, "$currentDate": { "updatedAt": true } },
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("learner {}", learner_id)))?;
        Ok(updated.streak)
    }

    async fn append_heart_tx(
        &self,
        learner_id: &str,
        amount: i32,
        reason: HeartTxReason,
        attempt_id: Option<&str>,
    ) -> Result<(), EngineError> {
        let tx = HeartTransaction {
            id: Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            amount,
            reason,
            attempt_id: attempt_id.map(|s| s.to_string()),
            created_at: Utc::now(),
        };
        self.mongo
            .collection::<HeartTransaction>("heart_transactions")
            .insert_one(&tx)
            .await?;

        HEART_TRANSACTIONS_TOTAL
            .with_label_values(&[reason.as_str()])
            .inc();
        Ok(())
    }

    async fn append_token_tx(
        &self,
        learner_id: &str,
        amount: i32,
        reason: TokenTxReason,
    ) -> Result<(), EngineError> {
        let tx = TokenTransaction {
            id: Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            amount,
            reason,
            created_at: Utc::now(),
        };
        self.mongo
            .collection::<TokenTransaction>("token_transactions")
            .insert_one(&tx)
            .await?;
        Ok(())
    }
}
