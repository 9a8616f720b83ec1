use super::domain::{
    AudioRef, FieldUser, Question, QuestionId, ResponseId, Survey, SurveyId, SurveyLookup,
    SurveyResponse,
};
use super::approval::ApprovalState;
use super::support::SupportSettings;

/// Survey, question, and user documents.
pub trait SurveyStore: Send + Sync {
    fn find_user(&self, user_code: &str) -> Result<Option<FieldUser>, RepositoryError>;
    fn find_survey(&self, lookup: &SurveyLookup) -> Result<Option<Survey>, RepositoryError>;
    fn list_surveys(&self) -> Result<Vec<Survey>, RepositoryError>;
    fn insert_survey(&self, survey: Survey) -> Result<Survey, RepositoryError>;
    fn update_survey(&self, survey: Survey) -> Result<(), RepositoryError>;
    /// Removes the survey and every question that belongs to it.
    fn delete_survey(&self, id: &SurveyId) -> Result<(), RepositoryError>;
    /// All questions of the survey regardless of their active flag.
    fn list_questions(&self, survey: &SurveyId) -> Result<Vec<Question>, RepositoryError>;
    fn find_question(&self, id: &QuestionId) -> Result<Option<Question>, RepositoryError>;
    fn insert_question(&self, question: Question) -> Result<Question, RepositoryError>;
    fn update_question(&self, question: Question) -> Result<(), RepositoryError>;
    fn delete_questions(&self, ids: &[QuestionId]) -> Result<(), RepositoryError>;
}

/// Response documents. Submission appends; review only rewrites approval fields.
pub trait ResponseRepository: Send + Sync {
    fn insert(&self, response: SurveyResponse) -> Result<SurveyResponse, RepositoryError>;
    /// Persist every response or none of them.
    fn insert_batch(
        &self,
        responses: Vec<SurveyResponse>,
    ) -> Result<Vec<SurveyResponse>, RepositoryError>;
    fn fetch(&self, id: &ResponseId) -> Result<Option<SurveyResponse>, RepositoryError>;
    fn update_approval(
        &self,
        id: &ResponseId,
        approval: ApprovalState,
    ) -> Result<Option<SurveyResponse>, RepositoryError>;
    fn list_for_survey(&self, survey: &SurveyId) -> Result<Vec<SurveyResponse>, RepositoryError>;
    fn list_all(&self) -> Result<Vec<SurveyResponse>, RepositoryError>;
}

/// Single-row store backing the support settings.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Option<SupportSettings>, RepositoryError>;
    fn save(&self, settings: SupportSettings) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Recording received with a submission, before upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Durable storage for proof-of-conduct recordings.
pub trait MediaStore: Send + Sync {
    fn store_audio(&self, upload: &AudioUpload) -> Result<AudioRef, MediaError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media store rejected upload: {0}")]
    Rejected(String),
    #[error("media store unavailable: {0}")]
    Unavailable(String),
}
