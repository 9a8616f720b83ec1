//! Validation of raw, loosely typed answers against the question schema.
//!
//! Clients submit answers as JSON objects whose fields may be missing or carry the wrong JSON
//! type. [`normalize`] turns one raw answer into an [`Answer`] whose payload matches the
//! question's effective type exactly, or explains which question rejected it and why.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{
    Answer, AnswerPayload, OtherOption, Question, QuestionId, QuestionKind, QuestionType,
    RatingScale, RootQuestion,
};

/// Answer exactly as submitted. Absent fields deserialize to `Value::Null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAnswer {
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub question_id: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub answer_text: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub rating: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub selected_option: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub selected_options: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub other_text: Value,
}

impl RawAnswer {
    /// The referenced question id rendered as text; numbers are accepted, anything else is blank.
    pub fn question_key(&self) -> String {
        match &self.question_id {
            Value::String(id) => id.trim().to_string(),
            Value::Number(id) => id.to_string(),
            _ => String::new(),
        }
    }
}

/// Why a single answer was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FailureReason {
    #[error("answerText is required")]
    MissingAnswerText,
    #[error("rating (number) is required")]
    MissingRating,
    #[error("rating must be between {min} and {max}")]
    RatingOutOfRange { min: f64, max: f64 },
    #[error("selectedOption is required")]
    MissingSelection,
    #[error("selectedOption \"{0}\" is not valid")]
    InvalidOption(String),
    #[error("selectedOptions (array) is required")]
    MissingSelections,
    #[error("Invalid options {}", .0.join(", "))]
    InvalidOptions(Vec<String>),
    #[error("otherText is required when selecting \"{0}\"")]
    MissingOtherText(String),
}

/// Rejection of one answer, naming the question it was given for.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason} for question: {question_text}")]
pub struct ValidationFailure {
    pub question_text: String,
    pub reason: FailureReason,
}

/// Rejection of a whole answer list (one response item).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnswerSetError {
    #[error("answers array is required and cannot be empty.")]
    Empty,
    #[error("Invalid questionId \"{0}\" for this survey.")]
    UnknownQuestion(String),
    #[error(transparent)]
    Answer(#[from] ValidationFailure),
    #[error("No valid answers found for this survey.")]
    NoValidAnswers,
}

/// Every question of one survey keyed by id, inactive ones included.
#[derive(Debug, Clone, Default)]
pub struct QuestionSet {
    by_id: HashMap<QuestionId, Question>,
}

impl QuestionSet {
    pub fn new(questions: impl IntoIterator<Item = Question>) -> Self {
        Self {
            by_id: questions
                .into_iter()
                .map(|question| (question.id.clone(), question))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.by_id.get(&QuestionId(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Normalize one raw answer. `Ok(None)` means the question type is not understood and the answer
/// is skipped.
pub fn normalize(raw: &RawAnswer, question: &Question) -> Result<Option<Answer>, ValidationFailure> {
    let fail = |reason| ValidationFailure {
        question_text: question.text.clone(),
        reason,
    };

    let (question_type, payload) = match &question.kind {
        QuestionKind::FollowUp(_) => (
            QuestionType::OpenEnded,
            open_ended(raw).map_err(fail)?,
        ),
        QuestionKind::Root(root) => {
            let payload = match root.question_type {
                QuestionType::OpenEnded => open_ended(raw),
                QuestionType::Rating => rating(raw, root.rating.as_ref()),
                QuestionType::McqSingle
                | QuestionType::Dropdown
                | QuestionType::Likert
                | QuestionType::YesNo => single_choice(raw, root),
                QuestionType::Checkbox => multi_choice(raw, root),
            }
            .map_err(fail)?;
            (root.question_type, payload)
        }
        QuestionKind::Unsupported { .. } => return Ok(None),
    };

    Ok(Some(Answer {
        question: question.id.clone(),
        question_text: question.text.clone(),
        question_type,
        payload,
    }))
}

/// Normalize every answer of one response item, stopping at the first failure.
pub fn normalize_answers(
    raw_answers: &[RawAnswer],
    questions: &QuestionSet,
) -> Result<Vec<Answer>, AnswerSetError> {
    if raw_answers.is_empty() {
        return Err(AnswerSetError::Empty);
    }

    let mut answers = Vec::with_capacity(raw_answers.len());
    for raw in raw_answers {
        let key = raw.question_key();
        let question = questions
            .get(&key)
            .ok_or_else(|| AnswerSetError::UnknownQuestion(key.clone()))?;
        if let Some(answer) = normalize(raw, question)? {
            answers.push(answer);
        }
    }

    if answers.is_empty() {
        return Err(AnswerSetError::NoValidAnswers);
    }
    Ok(answers)
}

fn open_ended(raw: &RawAnswer) -> Result<AnswerPayload, FailureReason> {
    match &raw.answer_text {
        Value::String(text) if !text.is_empty() => Ok(AnswerPayload::Text {
            answer_text: text.clone(),
        }),
        _ => Err(FailureReason::MissingAnswerText),
    }
}

fn rating(raw: &RawAnswer, scale: Option<&RatingScale>) -> Result<AnswerPayload, FailureReason> {
    let value = match &raw.rating {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|value| value.is_finite())
    .ok_or(FailureReason::MissingRating)?;

    if let Some(RatingScale {
        min: Some(min),
        max: Some(max),
        ..
    }) = scale
    {
        if value < *min || value > *max {
            return Err(FailureReason::RatingOutOfRange {
                min: *min,
                max: *max,
            });
        }
    }

    Ok(AnswerPayload::Rating { rating: value })
}

fn single_choice(raw: &RawAnswer, root: &RootQuestion) -> Result<AnswerPayload, FailureReason> {
    let candidate = if is_truthy(&raw.selected_option) {
        Some(&raw.selected_option)
    } else {
        raw.selected_options
            .as_array()
            .and_then(|values| values.first())
            .filter(|value| is_truthy(value))
    };

    let selected = candidate
        .and_then(Value::as_str)
        .ok_or(FailureReason::MissingSelection)?;

    let choice = classify(selected, root);
    if choice == Choice::Invalid {
        return Err(FailureReason::InvalidOption(selected.to_string()));
    }

    let other_text = match (choice, root.other_option.as_ref()) {
        (Choice::Other, Some(other)) => Some(required_other_text(raw, other)?),
        _ => None,
    };

    Ok(AnswerPayload::Choice {
        selected_options: vec![selected.to_string()],
        other_text,
    })
}

fn multi_choice(raw: &RawAnswer, root: &RootQuestion) -> Result<AnswerPayload, FailureReason> {
    let values = raw
        .selected_options
        .as_array()
        .filter(|values| !values.is_empty())
        .ok_or(FailureReason::MissingSelections)?;

    let mut selected = Vec::with_capacity(values.len());
    let mut invalid = Vec::new();
    let mut used_other = false;

    for value in values {
        match value.as_str() {
            Some(option) => match classify(option, root) {
                Choice::Listed => selected.push(option.to_string()),
                Choice::Other => {
                    used_other = true;
                    selected.push(option.to_string());
                }
                Choice::Invalid => invalid.push(option.to_string()),
            },
            None => invalid.push(render(value)),
        }
    }

    if !invalid.is_empty() {
        return Err(FailureReason::InvalidOptions(invalid));
    }

    let other_text = match (used_other, root.other_option.as_ref()) {
        (true, Some(other)) => Some(required_other_text(raw, other)?),
        _ => None,
    };

    Ok(AnswerPayload::Choice {
        selected_options: selected,
        other_text,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Listed,
    Other,
    Invalid,
}

/// The "Other" label wins over a listed option with the same text, so free text is still demanded.
fn classify(value: &str, root: &RootQuestion) -> Choice {
    if root
        .other_option
        .as_ref()
        .is_some_and(|other| other.label == value)
    {
        Choice::Other
    } else if root.options.iter().any(|option| option == value) {
        Choice::Listed
    } else {
        Choice::Invalid
    }
}

fn required_other_text(raw: &RawAnswer, other: &OtherOption) -> Result<String, FailureReason> {
    raw.other_text
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| FailureReason::MissingOtherText(other.label.clone()))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
