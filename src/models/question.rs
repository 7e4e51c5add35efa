use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    FillInBlank,
    OrderWords,
    Matching,
    DragDrop,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::FillInBlank => "fill_in_blank",
            QuestionType::OrderWords => "order_words",
            QuestionType::Matching => "matching",
            QuestionType::DragDrop => "drag_drop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

/// Type-specific question payload, one shape per question type.
///
/// Stored as a tagged document so a payload that doesn't match its declared
/// type is rejected at deserialization instead of surfacing as a runtime
/// surprise in the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionContent {
    MultipleChoice {
        #[serde(default)]
        prompt: Option<String>,
    },
    TrueFalse {
        statement: String,
    },
    FillInBlank {
        /// Sentence shown to the learner, blank included.
        sentence: String,
        /// Canonical text for the blank; falls back to the correct answer
        /// option's text when absent.
        #[serde(default)]
        correct_text: Option<String>,
    },
    OrderWords {
        words: Vec<String>,
        /// Canonical sentence; falls back to the correct answer option's
        /// text when absent.
        #[serde(default)]
        correct_sentence: Option<String>,
    },
    Matching {
        pairs: Vec<MatchPair>,
    },
    DragDrop {
        pairs: Vec<MatchPair>,
    },
}

impl QuestionContent {
    pub fn question_type(&self) -> QuestionType {
        match self {
            QuestionContent::MultipleChoice { .. } => QuestionType::MultipleChoice,
            QuestionContent::TrueFalse { .. } => QuestionType::TrueFalse,
            QuestionContent::FillInBlank { .. } => QuestionType::FillInBlank,
            QuestionContent::OrderWords { .. } => QuestionType::OrderWords,
            QuestionContent::Matching { .. } => QuestionType::Matching,
            QuestionContent::DragDrop { .. } => QuestionType::DragDrop,
        }
    }
}

/// One answer option attached to a question. `is_correct` never leaves the
/// server; clients only ever see [`AnswerOptionView`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: String,
    pub text: String,
    pub is_correct: bool,
}

/// Question document in the "questions" collection. Immutable for the life
/// of any attempt that references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: String,
    /// Owning unit; absent for questions referenced only by a final test.
    #[serde(default)]
    pub unit_id: Option<String>,
    pub title: String,
    pub content: QuestionContent,
    #[serde(default)]
    pub answers: Vec<AnswerOption>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Question {
    pub fn question_type(&self) -> QuestionType {
        self.content.question_type()
    }

    /// The single option flagged correct, if the author provided one.
    pub fn correct_option(&self) -> Option<&AnswerOption> {
        self.answers.iter().find(|a| a.is_correct)
    }
}

/// Raw submitted answer value. Untagged: plain text for choice/blank
/// questions, a token list for word ordering, a pair list for matching and
/// drag-drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmittedValue {
    Pairs(Vec<MatchPair>),
    Tokens(Vec<String>),
    Text(String),
}

/// Client-facing payload: everything the learner needs to render the
/// question, nothing that gives the answer away.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionPrompt {
    MultipleChoice {
        #[serde(default)]
        prompt: Option<String>,
    },
    TrueFalse {
        statement: String,
    },
    FillInBlank {
        sentence: String,
    },
    OrderWords {
        words: Vec<String>,
    },
    Matching {
        left: Vec<String>,
        right: Vec<String>,
    },
    DragDrop {
        left: Vec<String>,
        right: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOptionView {
    pub id: String,
    pub text: String,
}

/// One question as presented to the client: sanitized content plus options
/// stripped of their correctness flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: String,
    pub question_type: QuestionType,
    pub title: String,
    pub content: QuestionPrompt,
    pub options: Vec<AnswerOptionView>,
}
