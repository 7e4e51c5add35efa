use rand::seq::{IndexedRandom, SliceRandom};

use crate::models::question::{
    AnswerOptionView, Question, QuestionContent, QuestionPrompt, QuestionView,
};

/// Builds the presentation for a fresh attempt: a uniform Fisher-Yates
/// shuffle of the question sequence, of each question's options, and of
/// word-order word lists. Returns the shuffled question-id sequence (the
/// only piece that gets persisted) alongside the sanitized views.
pub fn build_presentation(questions: &[Question]) -> (Vec<String>, Vec<QuestionView>) {
    let mut rng = rand::rng();

    let mut ordered: Vec<&Question> = questions.iter().collect();
    ordered.shuffle(&mut rng);

    let order: Vec<String> = ordered.iter().map(|q| q.id.clone()).collect();
    let views = ordered.iter().map(|q| shuffled_view(q)).collect();
    (order, views)
}

/// View with freshly shuffled options and word lists. Option and word order
/// is not persisted; only the question sequence must survive a resume.
pub fn shuffled_view(question: &Question) -> QuestionView {
    let mut rng = rand::rng();

    let mut options: Vec<AnswerOptionView> = sanitized_options(question);
    options.shuffle(&mut rng);

    let content = match &question.content {
        QuestionContent::MultipleChoice { prompt } => QuestionPrompt::MultipleChoice {
            prompt: prompt.clone(),
        },
        QuestionContent::TrueFalse { statement } => QuestionPrompt::TrueFalse {
            statement: statement.clone(),
        },
        QuestionContent::FillInBlank { sentence, .. } => QuestionPrompt::FillInBlank {
            sentence: sentence.clone(),
        },
        QuestionContent::OrderWords { words, .. } => {
            let mut words = words.clone();
            words.shuffle(&mut rng);
            QuestionPrompt::OrderWords { words }
        }
        QuestionContent::Matching { pairs } => {
            let (left, right) = split_pairs(pairs, &mut rng);
            QuestionPrompt::Matching { left, right }
        }
        QuestionContent::DragDrop { pairs } => {
            let (left, right) = split_pairs(pairs, &mut rng);
            QuestionPrompt::DragDrop { left, right }
        }
    };

    QuestionView {
        id: question.id.clone(),
        question_type: question.question_type(),
        title: question.title.clone(),
        content,
        options,
    }
}

/// View in stored order, for resume: the persisted question sequence is
/// reproduced exactly, while options and word lists come back unshuffled.
pub fn stored_view(question: &Question) -> QuestionView {
    let content = match &question.content {
        QuestionContent::MultipleChoice { prompt } => QuestionPrompt::MultipleChoice {
            prompt: prompt.clone(),
        },
        QuestionContent::TrueFalse { statement } => QuestionPrompt::TrueFalse {
            statement: statement.clone(),
        },
        QuestionContent::FillInBlank { sentence, .. } => QuestionPrompt::FillInBlank {
            sentence: sentence.clone(),
        },
        QuestionContent::OrderWords { words, .. } => QuestionPrompt::OrderWords {
            words: words.clone(),
        },
        QuestionContent::Matching { pairs } => QuestionPrompt::Matching {
            left: pairs.iter().map(|p| p.left.clone()).collect(),
            right: pairs.iter().map(|p| p.right.clone()).collect(),
        },
        QuestionContent::DragDrop { pairs } => QuestionPrompt::DragDrop {
            left: pairs.iter().map(|p| p.left.clone()).collect(),
            right: pairs.iter().map(|p| p.right.clone()).collect(),
        },
    };

    QuestionView {
        id: question.id.clone(),
        question_type: question.question_type(),
        title: question.title.clone(),
        content,
        options: sanitized_options(question),
    }
}

/// Uniform sample without replacement for review attempts.
pub fn sample_review_ids(ids: &[String], limit: usize) -> Vec<String> {
    let mut rng = rand::rng();
    ids.choose_multiple(&mut rng, limit).cloned().collect()
}

fn sanitized_options(question: &Question) -> Vec<AnswerOptionView> {
    question
        .answers
        .iter()
        .map(|a| AnswerOptionView {
            id: a.id.clone(),
            text: a.text.clone(),
        })
        .collect()
}

fn split_pairs<R: rand::Rng>(
    pairs: &[crate::models::question::MatchPair],
    rng: &mut R,
) -> (Vec<String>, Vec<String>) {
    let left: Vec<String> = pairs.iter().map(|p| p.left.clone()).collect();
    let mut right: Vec<String> = pairs.iter().map(|p| p.right.clone()).collect();
    right.shuffle(rng);
    (left, right)
}
