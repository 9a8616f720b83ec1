use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::approval::{ApprovalChannel, ApprovalState, ApprovalStatus};
use super::domain::{
    Answer, ApprovalView, AudioRef, FieldUser, RespondentSnapshot, ResponseId, Survey, SurveyId,
    SurveyLookup, SurveyResponse, SurveyResponseGroup, UserRole,
};
use super::normalizer::{normalize_answers, AnswerSetError, QuestionSet, RawAnswer};
use super::repository::{
    AudioUpload, MediaError, MediaStore, RepositoryError, ResponseRepository, SurveyStore,
};

const ACCEPTED_AUDIO_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/aac",
    "audio/ogg",
    "audio/x-m4a",
    "audio/mp4",
];

/// Error raised by the survey services.
#[derive(Debug, thiserror::Error)]
pub enum SurveyError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Answers(#[from] AnswerSetError),
    /// A bulk item failed; nothing from the batch was written.
    #[error("Response index {index}: {source}")]
    Item {
        index: usize,
        source: Box<SurveyError>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Media(#[from] MediaError),
    /// The worker running the request stopped before finishing.
    #[error("request interrupted: {0}")]
    Interrupted(String),
}

impl SurveyError {
    pub fn status(&self) -> StatusCode {
        match self {
            SurveyError::Validation(_) | SurveyError::Answers(_) => StatusCode::BAD_REQUEST,
            SurveyError::Item { source, .. } => source.status(),
            SurveyError::NotFound(_) | SurveyError::Repository(RepositoryError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            SurveyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SurveyError::Forbidden(_) => StatusCode::FORBIDDEN,
            SurveyError::Conflict(_) | SurveyError::Repository(RepositoryError::Conflict) => {
                StatusCode::CONFLICT
            }
            SurveyError::Repository(RepositoryError::Unavailable(_))
            | SurveyError::Media(_)
            | SurveyError::Interrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn item_index(&self) -> Option<usize> {
        match self {
            SurveyError::Item { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Store and media failures; their detail is logged, never returned to callers.
    pub fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

pub(crate) fn find_survey<S: SurveyStore + ?Sized>(
    store: &S,
    survey: &str,
) -> Result<Survey, SurveyError> {
    store
        .find_survey(&SurveyLookup::parse(survey))?
        .ok_or_else(|| SurveyError::NotFound("Survey not found.".to_string()))
}

/// One response with its recording, as submitted by a field user.
#[derive(Debug, Clone, Default)]
pub struct ResponseSubmission {
    pub user_code: String,
    pub answers: Vec<RawAnswer>,
    pub latitude: Value,
    pub longitude: Value,
    pub audio: Option<AudioUpload>,
}

/// One logical response inside a bulk submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseItem {
    #[serde(default)]
    pub answers: Vec<RawAnswer>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub latitude: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub longitude: Value,
}

impl ResponseItem {
    /// Read one bulk item as submitted. A `null` or non-object item reads as empty, and an
    /// `answers` value that is not an array reads as no answers, so the item fails validation
    /// under its own index instead of rejecting the whole batch.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return Self::default();
        };

        let answers = match fields.remove("answers") {
            Some(Value::Array(raw)) => raw
                .into_iter()
                .map(|answer| serde_json::from_value(answer).unwrap_or_default())
                .collect(),
            _ => Vec::new(),
        };

        Self {
            answers,
            latitude: fields.remove("latitude").unwrap_or(Value::Null),
            longitude: fields.remove("longitude").unwrap_or(Value::Null),
        }
    }
}

/// Several responses sharing one recording. Items stay raw JSON until validated one by one.
#[derive(Debug, Clone, Default)]
pub struct BulkSubmission {
    pub user_code: String,
    pub responses: Vec<Value>,
    pub audio: Option<AudioUpload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub response_id: ResponseId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    pub index: usize,
    pub response_id: ResponseId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReceipt {
    pub created_responses: Vec<CreatedResponse>,
}

struct Respondent {
    user: FieldUser,
    survey: Survey,
}

impl Respondent {
    fn response(
        &self,
        answers: Vec<Answer>,
        audio_url: AudioRef,
        location: Location,
        now: DateTime<Utc>,
    ) -> SurveyResponse {
        SurveyResponse {
            id: ResponseId::generate(),
            survey: self.survey.id.clone(),
            survey_code: self.survey.code.clone(),
            respondent: RespondentSnapshot::capture(&self.user),
            audio_url,
            latitude: location.latitude,
            longitude: location.longitude,
            is_completed: true,
            answers,
            approval: ApprovalState::pending(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Location {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl Location {
    fn parse(latitude: &Value, longitude: &Value) -> Result<Self, SurveyError> {
        Ok(Self {
            latitude: parse_coordinate("latitude", latitude)?,
            longitude: parse_coordinate("longitude", longitude)?,
        })
    }
}

/// Absent or blank coordinates are treated as not supplied.
fn parse_coordinate(field: &str, raw: &Value) -> Result<Option<f64>, SurveyError> {
    let invalid = || SurveyError::Validation(format!("{field} must be a valid number."));
    match raw {
        Value::Null => Ok(None),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Some)
            .ok_or_else(invalid),
        Value::Number(number) => number.as_f64().map(Some).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn require_audio(audio: Option<&AudioUpload>) -> Result<&AudioUpload, SurveyError> {
    let audio = audio
        .filter(|upload| !upload.bytes.is_empty())
        .ok_or_else(|| SurveyError::Validation("Audio recording (audio) is required.".to_string()))?;

    let accepted = audio
        .content_type
        .as_deref()
        .and_then(|raw| raw.parse::<mime::Mime>().ok())
        .is_some_and(|mime| ACCEPTED_AUDIO_TYPES.contains(&mime.essence_str()));
    if !accepted {
        return Err(SurveyError::Validation(
            "Invalid file type. Only audio files are allowed.".to_string(),
        ));
    }

    Ok(audio)
}

/// Service resolving respondents and surveys, validating answers, and persisting responses.
pub struct SurveyResponseService<S, R, M> {
    surveys: Arc<S>,
    responses: Arc<R>,
    media: Arc<M>,
}

impl<S, R, M> SurveyResponseService<S, R, M>
where
    S: SurveyStore + 'static,
    R: ResponseRepository + 'static,
    M: MediaStore + 'static,
{
    pub fn new(surveys: Arc<S>, responses: Arc<R>, media: Arc<M>) -> Self {
        Self {
            surveys,
            responses,
            media,
        }
    }

    fn resolve(&self, survey: &str, user_code: &str) -> Result<Respondent, SurveyError> {
        let user_code = user_code.trim();
        if user_code.is_empty() {
            return Err(SurveyError::Validation("userCode is required.".to_string()));
        }

        let user = self
            .surveys
            .find_user(user_code)?
            .filter(|user| user.role == UserRole::SurveyUser && user.is_active)
            .ok_or_else(|| {
                SurveyError::NotFound("Active SURVEY_USER not found for this userCode.".to_string())
            })?;

        let survey = find_survey(self.surveys.as_ref(), survey)?;
        Ok(Respondent { user, survey })
    }

    fn questions(&self, survey: &Survey) -> Result<QuestionSet, SurveyError> {
        Ok(QuestionSet::new(self.surveys.list_questions(&survey.id)?))
    }

    /// Submit one response with its recording.
    pub fn submit(
        &self,
        survey: &str,
        submission: ResponseSubmission,
    ) -> Result<SubmissionReceipt, SurveyError> {
        let respondent = self.resolve(survey, &submission.user_code)?;
        let audio = require_audio(submission.audio.as_ref())?;
        let location = Location::parse(&submission.latitude, &submission.longitude)?;

        let questions = self.questions(&respondent.survey)?;
        let answers = normalize_answers(&submission.answers, &questions)?;

        let audio_url = self.media.store_audio(audio)?;
        let response = respondent.response(answers, audio_url, location, Utc::now());
        let stored = self.responses.insert(response)?;

        info!(
            response_id = %stored.id,
            survey_code = %stored.survey_code,
            user_code = %stored.respondent.user_code,
            answers = stored.answers.len(),
            "survey response recorded"
        );

        Ok(SubmissionReceipt {
            response_id: stored.id,
        })
    }

    /// Submit several responses sharing one recording.
    ///
    /// Every item is validated before anything is uploaded or written; the first invalid item
    /// fails the request with its index and the batch is then persisted atomically.
    pub fn submit_bulk(
        &self,
        survey: &str,
        submission: BulkSubmission,
    ) -> Result<BulkReceipt, SurveyError> {
        let respondent = self.resolve(survey, &submission.user_code)?;
        let audio = require_audio(submission.audio.as_ref())?;

        if submission.responses.is_empty() {
            return Err(SurveyError::Validation(
                "responses array is required and cannot be empty.".to_string(),
            ));
        }

        let questions = self.questions(&respondent.survey)?;
        let mut prepared = Vec::with_capacity(submission.responses.len());
        for (index, raw) in submission.responses.into_iter().enumerate() {
            let item = ResponseItem::from_value(raw);
            let validated = Location::parse(&item.latitude, &item.longitude).and_then(|location| {
                let answers = normalize_answers(&item.answers, &questions)?;
                Ok((answers, location))
            });
            match validated {
                Ok(entry) => prepared.push(entry),
                Err(source) => {
                    return Err(SurveyError::Item {
                        index,
                        source: Box::new(source),
                    })
                }
            }
        }

        let audio_url = self.media.store_audio(audio)?;
        let now = Utc::now();
        let documents = prepared
            .into_iter()
            .map(|(answers, location)| {
                respondent.response(answers, audio_url.clone(), location, now)
            })
            .collect();
        let stored = self.responses.insert_batch(documents)?;

        info!(
            survey_code = %respondent.survey.code,
            user_code = %respondent.user.user_code,
            created = stored.len(),
            "bulk survey responses recorded"
        );

        Ok(BulkReceipt {
            created_responses: stored
                .into_iter()
                .enumerate()
                .map(|(index, response)| CreatedResponse {
                    index,
                    response_id: response.id,
                })
                .collect(),
        })
    }

    /// Classify a response. Both channels accept every status including a reset to PENDING.
    pub fn set_approval(
        &self,
        response_id: &str,
        approval_status: Option<&str>,
        channel: ApprovalChannel,
    ) -> Result<ApprovalView, SurveyError> {
        if !channel.is_permitted() {
            return Err(SurveyError::Forbidden(
                "Quality Engineer access only".to_string(),
            ));
        }

        let id = ResponseId::parse(response_id)
            .ok_or_else(|| SurveyError::Validation("Invalid responseId.".to_string()))?;

        let raw_status = approval_status
            .map(str::trim)
            .filter(|status| !status.is_empty())
            .ok_or_else(|| SurveyError::Validation("approvalStatus is required.".to_string()))?;
        let status = ApprovalStatus::parse(raw_status).ok_or_else(|| {
            let allowed = ApprovalStatus::ordered().map(ApprovalStatus::label).join(", ");
            SurveyError::Validation(format!("approvalStatus must be one of: {allowed}"))
        })?;

        let not_found = || SurveyError::NotFound("Survey response not found.".to_string());
        let mut response = self.responses.fetch(&id)?.ok_or_else(not_found)?;
        response
            .approval
            .transition(status, channel.reviewer().as_ref(), Utc::now());

        if channel == ApprovalChannel::Public {
            warn!(response_id = %id, status = status.label(), "approval changed through public link");
        } else {
            info!(response_id = %id, status = status.label(), "approval changed by reviewer");
        }

        let updated = self
            .responses
            .update_approval(&id, response.approval)?
            .ok_or_else(not_found)?;
        Ok(updated.approval_view())
    }

    /// Responses of one survey, newest first.
    pub fn list_for_survey(
        &self,
        survey: &str,
    ) -> Result<(Survey, Vec<SurveyResponse>), SurveyError> {
        let survey = find_survey(self.surveys.as_ref(), survey)?;
        let mut responses = self.responses.list_for_survey(&survey.id)?;
        responses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((survey, responses))
    }

    /// Every response grouped by survey, for field verifiers classifying through the public link.
    ///
    /// Responses are newest first and groups follow their newest response. Responses whose survey
    /// has been deleted are left out.
    pub fn public_overview(&self) -> Result<Vec<SurveyResponseGroup>, SurveyError> {
        let mut responses = self.responses.list_all()?;
        responses.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut groups: Vec<SurveyResponseGroup> = Vec::new();
        let mut slots: HashMap<SurveyId, Option<usize>> = HashMap::new();
        for response in responses {
            let slot = match slots.get(&response.survey) {
                Some(slot) => *slot,
                None => {
                    let lookup = SurveyLookup::Id(response.survey.clone());
                    let slot = self.surveys.find_survey(&lookup)?.map(|survey| {
                        groups.push(SurveyResponseGroup::empty(&survey));
                        groups.len() - 1
                    });
                    slots.insert(response.survey.clone(), slot);
                    slot
                }
            };
            if let Some(index) = slot {
                groups[index].responses.push(response.public_view());
            }
        }

        Ok(groups)
    }

    /// Fetch a response for read-back.
    pub fn get(&self, response_id: &str) -> Result<SurveyResponse, SurveyError> {
        let id = ResponseId::parse(response_id)
            .ok_or_else(|| SurveyError::Validation("Invalid responseId.".to_string()))?;
        self.responses
            .fetch(&id)?
            .ok_or_else(|| SurveyError::NotFound("Survey response not found.".to_string()))
    }
}
