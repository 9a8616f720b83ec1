//! Survey catalog, response intake with audio proof, and quality review.
//!
//! Services are synchronous and generic over the storage seams in [`repository`]; the axum
//! router in [`router`] adapts them to HTTP.

pub mod access;
pub mod approval;
pub mod catalog;
pub mod domain;
pub mod normalizer;
pub mod repository;
pub mod router;
pub mod service;
pub mod support;

#[cfg(test)]
mod tests;

pub use access::{Principal, PrincipalRole, SessionHandle, SessionVerifier};
pub use approval::{ApprovalChannel, ApprovalState, ApprovalStatus};
pub use catalog::{QuestionDraft, SurveyCatalogService, SurveyDetail, SurveyDraft};
pub use domain::{
    Answer, AnswerPayload, ApprovalView, AudioRef, FieldUser, FollowUpQuestion, OtherOption,
    PublicResponseView, Question, QuestionId, QuestionKind, QuestionType, QuestionView,
    RatingScale, RespondentSnapshot, ResponseId, RootQuestion, Survey, SurveyId, SurveyLookup,
    SurveyResponse, SurveyResponseGroup, SurveyStatus, UserId, UserRole,
};
pub use normalizer::{
    normalize, normalize_answers, AnswerSetError, FailureReason, QuestionSet, RawAnswer,
    ValidationFailure,
};
pub use repository::{
    AudioUpload, MediaError, MediaStore, RepositoryError, ResponseRepository, SettingsStore,
    SurveyStore,
};
pub use router::survey_router;
pub use service::{
    BulkReceipt, BulkSubmission, CreatedResponse, ResponseItem, ResponseSubmission,
    SubmissionReceipt, SurveyError, SurveyResponseService,
};
pub use support::{
    Faq, OfficeAddress, OfficeHours, SocialLinks, SupportDesk, SupportPatch, SupportSettings,
};
