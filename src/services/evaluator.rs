use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::question::{MatchPair, Question, QuestionContent, SubmittedValue};

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\p{L}\p{N}\s]").unwrap();
}

/// Pure answer evaluation. No I/O, deterministic; the submission shape must
/// fit the question type or the answer is wrong (fail closed).
pub fn evaluate(question: &Question, submitted: &SubmittedValue) -> bool {
    match (&question.content, submitted) {
        (QuestionContent::MultipleChoice { .. }, SubmittedValue::Text(option_id))
        | (QuestionContent::TrueFalse { .. }, SubmittedValue::Text(option_id)) => question
            .correct_option()
            .map(|option| option.id == *option_id)
            .unwrap_or(false),

        (QuestionContent::FillInBlank { correct_text, .. }, SubmittedValue::Text(text)) => {
            let canonical = correct_text
                .as_deref()
                .or_else(|| question.correct_option().map(|option| option.text.as_str()));
            match canonical {
                Some(canonical) => fill_in_blank_matches(canonical, text),
                None => false,
            }
        }

        (QuestionContent::OrderWords { correct_sentence, .. }, SubmittedValue::Tokens(tokens)) => {
            let canonical = correct_sentence
                .as_deref()
                .or_else(|| question.correct_option().map(|option| option.text.as_str()));
            match canonical {
                // Verbatim comparison: word-order puzzles tolerate no typos.
                Some(canonical) => tokens.join(" ") == canonical,
                None => false,
            }
        }

        (QuestionContent::Matching { pairs }, SubmittedValue::Pairs(submitted))
        | (QuestionContent::DragDrop { pairs }, SubmittedValue::Pairs(submitted)) => {
            pairs_match(pairs, submitted)
        }

        _ => false,
    }
}

/// Exact match after normalization, else a single edit is forgiven on
/// non-trivial words (canonical length > 5).
fn fill_in_blank_matches(canonical: &str, submitted: &str) -> bool {
    let canonical = normalize_text(canonical);
    let submitted = normalize_text(submitted);
    if canonical == submitted {
        return true;
    }
    canonical.chars().count() > 5 && levenshtein(&canonical, &submitted) <= 1
}

/// Casefold, strip diacritics and punctuation, collapse whitespace.
pub fn normalize_text(input: &str) -> String {
    let stripped: String = input
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect();
    let stripped = NON_WORD.replace_all(&stripped, "");
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Order-independent exact pairing: every canonical pair present, nothing
/// extra, no duplicates smuggled in.
fn pairs_match(canonical: &[MatchPair], submitted: &[MatchPair]) -> bool {
    use std::collections::HashSet;

    if canonical.len() != submitted.len() {
        return false;
    }
    let expected: HashSet<(&str, &str)> = canonical
        .iter()
        .map(|p| (p.left.as_str(), p.right.as_str()))
        .collect();
    let actual: HashSet<(&str, &str)> = submitted
        .iter()
        .map(|p| (p.left.as_str(), p.right.as_str()))
        .collect();
    actual.len() == submitted.len() && expected == actual
}

pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}
