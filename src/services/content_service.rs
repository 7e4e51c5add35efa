use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;
use std::collections::HashMap;

use crate::errors::EngineError;
use crate::models::content::{Curriculum, FinalTest, Unit};
use crate::models::question::Question;

/// Read-only gateway to the content store. The authoring pipeline owns these
/// collections; the engine only ever queries them.
pub struct ContentService {
    mongo: Database,
}

impl ContentService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    pub async fn get_curriculum(&self, curriculum_id: &str) -> Result<Curriculum, EngineError> {
        let curriculum = self
            .mongo
            .collection::<Curriculum>("curricula")
            .find_one(doc! { "_id": curriculum_id })
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| EngineError::not_found(format!("curriculum {}", curriculum_id)))?;
        Ok(curriculum)
    }

    pub async fn get_unit(&self, unit_id: &str) -> Result<Unit, EngineError> {
        let unit = self
            .mongo
            .collection::<Unit>("units")
            .find_one(doc! { "_id": unit_id })
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| EngineError::not_found(format!("unit {}", unit_id)))?;
        Ok(unit)
    }

    pub async fn get_final_test(&self, test_id: &str) -> Result<FinalTest, EngineError> {
        let test = self
            .mongo
            .collection::<FinalTest>("final_tests")
            .find_one(doc! { "_id": test_id })
            .await?
            .filter(|t| t.is_active)
            .ok_or_else(|| EngineError::not_found(format!("final test {}", test_id)))?;
        Ok(test)
    }

    pub async fn active_unit_questions(&self, unit_id: &str) -> Result<Vec<Question>, EngineError> {
        let mut cursor = self
            .mongo
            .collection::<Question>("questions")
            .find(doc! { "unit_id": unit_id, "is_active": true })
            .await?;

        let mut questions = Vec::new();
        while let Some(question) = cursor.try_next().await? {
            questions.push(question);
        }
        Ok(questions)
    }

    /// Questions for the given ids, in the exact order of `ids`. Errors when
    /// any id resolves to nothing; an attempt must never silently shrink.
    pub async fn questions_in_order(&self, ids: &[String]) -> Result<Vec<Question>, EngineError> {
        let mut cursor = self
            .mongo
            .collection::<Question>("questions")
            .find(doc! { "_id": { "$in": ids } })
            .await?;

        let mut by_id: HashMap<String, Question> = HashMap::new();
        while let Some(question) = cursor.try_next().await? {
            by_id.insert(question.id.clone(), question);
        }

        ids.iter()
            .map(|id| {
                by_id
                    .remove(id)
                    .ok_or_else(|| EngineError::not_found(format!("question {}", id)))
            })
            .collect()
    }

    pub async fn get_question(&self, question_id: &str) -> Result<Question, EngineError> {
        let question = self
            .mongo
            .collection::<Question>("questions")
            .find_one(doc! { "_id": question_id })
            .await?
            .ok_or_else(|| EngineError::not_found(format!("question {}", question_id)))?;
        Ok(question)
    }

    pub async fn mandatory_units(&self, curriculum_id: &str) -> Result<Vec<Unit>, EngineError> {
        let mut cursor = self
            .mongo
            .collection::<Unit>("units")
            .find(doc! { "curriculum_id": curriculum_id, "is_mandatory": true, "is_active": true })
            .await?;

        let mut units = Vec::new();
        while let Some(unit) = cursor.try_next().await? {
            units.push(unit);
        }
        Ok(units)
    }

    /// Question ids the learner has answered wrong at least once, restricted
    /// to the given curriculum's units. Feeds review attempts.
    pub async fn missed_question_ids(
        &self,
        learner_id: &str,
        curriculum_id: &str,
    ) -> Result<Vec<String>, EngineError> {
        let unit_ids: Vec<String> = {
            let mut cursor = self
                .mongo
                .collection::<Unit>("units")
                .find(doc! { "curriculum_id": curriculum_id, "is_active": true })
                .await?;
            let mut ids = Vec::new();
            while let Some(unit) = cursor.try_next().await? {
                ids.push(unit.id);
            }
            ids
        };
        if unit_ids.is_empty() {
            return Ok(Vec::new());
        }

        let missed = self
            .mongo
            .collection::<mongodb::bson::Document>("answer_records")
            .distinct(
                "question_id",
                doc! { "learner_id": learner_id, "is_correct": false },
            )
            .await?;
        let missed: Vec<String> = missed
            .into_iter()
            .filter_map(|b| b.as_str().map(|s| s.to_string()))
            .collect();
        if missed.is_empty() {
            return Ok(Vec::new());
        }

        let mut cursor = self
            .mongo
            .collection::<Question>("questions")
            .find(doc! {
                "_id": { "$in": missed },
                "unit_id": { "$in": unit_ids },
                "is_active": true,
            })
            .await?;

        let mut ids = Vec::new();
        while let Some(question) = cursor.try_next().await? {
            ids.push(question.id);
        }
        Ok(ids)
    }
}
