use serde::{Deserialize, Serialize};

/// Time budget per question used by the speed bonus.
pub const IDEAL_SECONDS_PER_QUESTION: u32 = 30;

#[derive(Debug, Clone)]
pub struct ExperienceInput {
    pub base_experience: i32,
    pub total_questions: u32,
    pub correct_answers: u32,
    /// Every submission within the attempt, retries included.
    pub total_submissions: u32,
    pub elapsed_seconds: u32,
    /// First-ever completion of this exact target by this learner.
    pub is_first_attempt: bool,
}

/// Rounded per-component values. Returned to the caller with every award;
/// clients and tests rely on the breakdown, it is not incidental logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceBreakdown {
    pub base: i32,
    pub accuracy_bonus: i32,
    pub speed_bonus: i32,
    pub perfect_bonus: i32,
    pub retry_multiplier: f64,
    pub first_attempt: bool,
    pub total: i32,
}

/// Weighted experience formula.
///
/// - base: 60% of base experience, always granted
/// - accuracy: 30% of base, scaled by correct/total
/// - speed: 10% of base, scaled by `clamp(2 - elapsed/ideal, 0, 2)` where
///   `ideal = IDEAL_SECONDS_PER_QUESTION * total`
/// - perfect: +20% of base when nothing was wrong and nothing was retried
/// - retry multiplier: `max(0.5, 1 - 0.5 * retries/total)` over the sum
/// - repeat completions of the same target earn half
///
/// The total is rounded and floored at 1.
pub fn calculate(input: &ExperienceInput) -> ExperienceBreakdown {
    let base_experience = f64::from(input.base_experience);
    let total_questions = input.total_questions;

    if total_questions == 0 {
        return ExperienceBreakdown {
            base: 0,
            accuracy_bonus: 0,
            speed_bonus: 0,
            perfect_bonus: 0,
            retry_multiplier: 1.0,
            first_attempt: input.is_first_attempt,
            total: 1,
        };
    }

    let total_f = f64::from(total_questions);
    let correct = f64::from(input.correct_answers.min(total_questions));
    let retries = input.total_submissions.saturating_sub(total_questions);

    let base = 0.60 * base_experience;
    let accuracy_bonus = 0.30 * base_experience * (correct / total_f);

    let ideal_seconds = f64::from(IDEAL_SECONDS_PER_QUESTION) * total_f;
    let speed_factor = (2.0 - f64::from(input.elapsed_seconds) / ideal_seconds).clamp(0.0, 2.0);
    let speed_bonus = 0.10 * base_experience * speed_factor;

    let perfect = input.correct_answers >= total_questions && retries == 0;
    let perfect_bonus = if perfect { 0.20 * base_experience } else { 0.0 };

    let retry_multiplier = (1.0 - 0.5 * f64::from(retries) / total_f).max(0.5);

    let mut total = (base + accuracy_bonus + speed_bonus + perfect_bonus) * retry_multiplier;
    if !input.is_first_attempt {
        total *= 0.5;
    }

    ExperienceBreakdown {
        base: base.round() as i32,
        accuracy_bonus: accuracy_bonus.round() as i32,
        speed_bonus: speed_bonus.round() as i32,
        perfect_bonus: perfect_bonus.round() as i32,
        retry_multiplier,
        first_attempt: input.is_first_attempt,
        total: (total.round() as i32).max(1),
    }
}
