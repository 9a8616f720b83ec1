use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use super::approval::ApprovalState;

macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Accepts only well-formed document identifiers.
            pub fn parse(raw: &str) -> Option<Self> {
                Uuid::parse_str(raw.trim())
                    .ok()
                    .map(|id| Self(id.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

document_id!(
    /// Identifier of a survey document.
    SurveyId
);
document_id!(
    /// Identifier of a question document.
    QuestionId
);
document_id!(
    /// Identifier of a persisted survey response.
    ResponseId
);
document_id!(
    /// Identifier of a field user or reviewer account.
    UserId
);

/// How a caller addresses a survey: document id when it parses as one, the human code otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurveyLookup {
    Id(SurveyId),
    Code(String),
}

impl SurveyLookup {
    pub fn parse(raw: &str) -> Self {
        match SurveyId::parse(raw) {
            Some(id) => Self::Id(id),
            None => Self::Code(raw.trim().to_string()),
        }
    }

    pub fn matches(&self, survey: &Survey) -> bool {
        match self {
            Self::Id(id) => &survey.id == id,
            Self::Code(code) => &survey.code == code,
        }
    }
}

/// The seven question types a survey may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    OpenEnded,
    McqSingle,
    Rating,
    Likert,
    Checkbox,
    Dropdown,
    YesNo,
}

impl QuestionType {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::OpenEnded,
            Self::McqSingle,
            Self::Rating,
            Self::Likert,
            Self::Checkbox,
            Self::Dropdown,
            Self::YesNo,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::OpenEnded => "OPEN_ENDED",
            Self::McqSingle => "MCQ_SINGLE",
            Self::Rating => "RATING",
            Self::Likert => "LIKERT",
            Self::Checkbox => "CHECKBOX",
            Self::Dropdown => "DROPDOWN",
            Self::YesNo => "YES_NO",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|kind| kind.label() == raw.trim())
    }

    /// Types whose answers must pick from a fixed option list.
    pub const fn is_option_based(self) -> bool {
        matches!(
            self,
            Self::McqSingle | Self::Likert | Self::Checkbox | Self::Dropdown | Self::YesNo
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SurveyStatus {
    #[default]
    Draft,
    Active,
    Closed,
}

impl SurveyStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "DRAFT" => Some(Self::Draft),
            "ACTIVE" => Some(Self::Active),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// A named, coded set of questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: SurveyId,
    #[serde(rename = "surveyCode")]
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    pub status: SurveyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub language: String,
    pub tags: Vec<String>,
    /// Empty means every type is allowed.
    pub allowed_question_types: Vec<QuestionType>,
    /// User codes the survey is assigned to; empty means everyone.
    pub assigned_users: Vec<String>,
    pub is_active: bool,
    pub created_by_admin: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Survey {
    pub fn allows(&self, question_type: QuestionType) -> bool {
        self.allowed_question_types.is_empty()
            || self.allowed_question_types.contains(&question_type)
    }
}

/// Bounds for RATING questions. Range checks apply only when both bounds are set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingScale {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: f64,
}

impl Default for RatingScale {
    fn default() -> Self {
        Self {
            min: Some(1.0),
            max: Some(5.0),
            step: 1.0,
        }
    }
}

/// Synthetic free-text option offered next to the fixed options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherOption {
    pub label: String,
}

impl OtherOption {
    pub const DEFAULT_LABEL: &'static str = "Other";

    pub fn new(label: Option<&str>) -> Self {
        let label = label
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .unwrap_or(Self::DEFAULT_LABEL);
        Self {
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootQuestion {
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub allow_multiple: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<RatingScale>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_option: Option<OtherOption>,
}

/// Free-text question that only applies when its parent was answered with `parent_option_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpQuestion {
    pub parent: QuestionId,
    pub parent_option_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionKind {
    Root(RootQuestion),
    FollowUp(FollowUpQuestion),
    /// Stored with a type string this release does not understand; answers to it are skipped.
    Unsupported { stored_type: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub survey: SurveyId,
    pub text: String,
    pub kind: QuestionKind,
    pub required: bool,
    pub order: i32,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    /// The type answers are validated against. Follow-ups are always OPEN_ENDED.
    pub fn effective_type(&self) -> Option<QuestionType> {
        match &self.kind {
            QuestionKind::Root(root) => Some(root.question_type),
            QuestionKind::FollowUp(_) => Some(QuestionType::OpenEnded),
            QuestionKind::Unsupported { .. } => None,
        }
    }

    pub fn type_label(&self) -> &str {
        match &self.kind {
            QuestionKind::Unsupported { stored_type } => stored_type,
            _ => self
                .effective_type()
                .map(QuestionType::label)
                .unwrap_or_default(),
        }
    }

    pub fn root(&self) -> Option<&RootQuestion> {
        match &self.kind {
            QuestionKind::Root(root) => Some(root),
            _ => None,
        }
    }

    pub fn follow_up(&self) -> Option<&FollowUpQuestion> {
        match &self.kind {
            QuestionKind::FollowUp(follow_up) => Some(follow_up),
            _ => None,
        }
    }

    /// Client-facing projection carrying only the fields meaningful for the question's type.
    pub fn view(&self) -> QuestionView {
        let mut view = QuestionView {
            id: self.id.clone(),
            survey: self.survey.clone(),
            question_text: self.text.clone(),
            question_type: self.type_label().to_string(),
            required: self.required,
            order: self.order,
            is_active: self.is_active,
            options: None,
            allow_multiple: None,
            min_rating: None,
            max_rating: None,
            rating_step: None,
            enable_other_option: None,
            other_option_label: None,
            parent_question: None,
            parent_option_value: None,
            help_text: self.help_text.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        };

        match &self.kind {
            QuestionKind::Root(root) => {
                let kind = root.question_type;
                if kind.is_option_based() {
                    view.options = Some(root.options.clone());
                    view.enable_other_option = Some(root.other_option.is_some());
                    view.other_option_label = root
                        .other_option
                        .as_ref()
                        .map(|other| other.label.clone());
                }
                if matches!(kind, QuestionType::McqSingle | QuestionType::Checkbox) {
                    view.allow_multiple = Some(root.allow_multiple);
                }
                if let Some(scale) = root.rating.filter(|_| kind == QuestionType::Rating) {
                    view.min_rating = scale.min;
                    view.max_rating = scale.max;
                    view.rating_step = Some(scale.step);
                }
            }
            QuestionKind::FollowUp(follow_up) => {
                view.parent_question = Some(follow_up.parent.clone());
                view.parent_option_value = Some(follow_up.parent_option_value.clone());
            }
            QuestionKind::Unsupported { .. } => {}
        }

        view
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: QuestionId,
    pub survey: SurveyId,
    pub question_text: String,
    #[serde(rename = "type")]
    pub question_type: String,
    pub required: bool,
    pub order: i32,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_multiple: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_other_option: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_option_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_question: Option<QuestionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_option_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    SurveyUser,
    QualityEngineer,
}

impl UserRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SurveyUser => "SURVEY_USER",
            Self::QualityEngineer => "QUALITY_ENGINEER",
        }
    }
}

/// Field account as returned by the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUser {
    pub id: UserId,
    pub user_code: String,
    pub full_name: String,
    pub mobile: String,
    pub role: UserRole,
    pub is_active: bool,
}

/// Respondent identity copied into the response at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondentSnapshot {
    pub user: UserId,
    pub user_code: String,
    pub user_name: String,
    pub user_mobile: String,
    pub user_role: UserRole,
}

impl RespondentSnapshot {
    pub fn capture(user: &FieldUser) -> Self {
        Self {
            user: user.id.clone(),
            user_code: user.user_code.clone(),
            user_name: user.full_name.clone(),
            user_mobile: user.mobile.clone(),
            user_role: user.role,
        }
    }
}

/// Type-appropriate payload of a normalized answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerPayload {
    #[serde(rename_all = "camelCase")]
    Text { answer_text: String },
    Rating {
        #[serde(serialize_with = "whole_or_fractional")]
        rating: f64,
    },
    #[serde(rename_all = "camelCase")]
    Choice {
        selected_options: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        other_text: Option<String>,
    },
}

/// Whole ratings are written as JSON integers (`3`, not `3.0`).
fn whole_or_fractional<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    const EXACT_LIMIT: f64 = 9_007_199_254_740_992.0;
    if value.fract() == 0.0 && value.abs() < EXACT_LIMIT {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// A validated answer, with question text and type frozen at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question: QuestionId,
    pub question_text: String,
    pub question_type: QuestionType,
    #[serde(flatten)]
    pub payload: AnswerPayload,
}

/// Opaque durable reference returned by the media store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioRef(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponse {
    pub id: ResponseId,
    pub survey: SurveyId,
    pub survey_code: String,
    #[serde(flatten)]
    pub respondent: RespondentSnapshot,
    pub audio_url: AudioRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub is_completed: bool,
    pub answers: Vec<Answer>,
    #[serde(flatten)]
    pub approval: ApprovalState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SurveyResponse {
    pub fn public_view(&self) -> PublicResponseView {
        PublicResponseView {
            response_id: self.id.clone(),
            user_code: self.respondent.user_code.clone(),
            user_name: self.respondent.user_name.clone(),
            user_mobile: self.respondent.user_mobile.clone(),
            user_role: self.respondent.user_role,
            audio_url: self.audio_url.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            is_completed: self.is_completed,
            approval: self.approval.clone(),
            created_at: self.created_at,
            answers: self.answers.clone(),
        }
    }

    pub fn approval_view(&self) -> ApprovalView {
        ApprovalView {
            response_id: self.id.clone(),
            survey: self.survey.clone(),
            survey_code: self.survey_code.clone(),
            user_code: self.respondent.user_code.clone(),
            user_name: self.respondent.user_name.clone(),
            user_mobile: self.respondent.user_mobile.clone(),
            is_completed: self.is_completed,
            approval: self.approval.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Projection returned after an approval change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalView {
    pub response_id: ResponseId,
    pub survey: SurveyId,
    pub survey_code: String,
    pub user_code: String,
    pub user_name: String,
    pub user_mobile: String,
    pub is_completed: bool,
    #[serde(flatten)]
    pub approval: ApprovalState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One response on the public verification listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicResponseView {
    pub response_id: ResponseId,
    pub user_code: String,
    pub user_name: String,
    pub user_mobile: String,
    pub user_role: UserRole,
    pub audio_url: AudioRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub is_completed: bool,
    #[serde(flatten)]
    pub approval: ApprovalState,
    pub created_at: DateTime<Utc>,
    pub answers: Vec<Answer>,
}

/// Responses of one survey on the public verification listing, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponseGroup {
    pub survey_id: SurveyId,
    pub survey_code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: SurveyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub responses: Vec<PublicResponseView>,
}

impl SurveyResponseGroup {
    pub fn empty(survey: &Survey) -> Self {
        Self {
            survey_id: survey.id.clone(),
            survey_code: survey.code.clone(),
            name: survey.name.clone(),
            description: survey.description.clone(),
            status: survey.status,
            category: survey.category.clone(),
            project_name: survey.project_name.clone(),
            responses: Vec::new(),
        }
    }
}
