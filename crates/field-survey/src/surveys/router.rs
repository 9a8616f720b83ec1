use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use super::access::{authenticate, require_role, PrincipalRole, SessionHandle};
use super::approval::ApprovalChannel;
use super::catalog::{QuestionDraft, SurveyCatalogService, SurveyDraft};
use super::normalizer::RawAnswer;
use super::repository::{
    AudioUpload, MediaStore, ResponseRepository, SettingsStore, SurveyStore,
};
use super::service::{
    BulkSubmission, ResponseSubmission, SurveyError, SurveyResponseService,
};
use super::support::{SupportDesk, SupportPatch};

impl IntoResponse for SurveyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_internal() {
            error!(error = %self, "survey request failed");
            let payload = json!({ "message": "Server error" });
            return (status, Json(payload)).into_response();
        }

        let payload = match self.item_index() {
            Some(index) => json!({ "message": self.to_string(), "index": index }),
            None => json!({ "message": self.to_string() }),
        };
        (status, Json(payload)).into_response()
    }
}

/// Router exposing survey administration, response intake, review and the help page.
///
/// Authenticated routes expect an `Extension<SessionHandle>` layered on by the caller.
pub fn survey_router<S, R, M, T>(
    catalog: Arc<SurveyCatalogService<S>>,
    responses: Arc<SurveyResponseService<S, R, M>>,
    support: Arc<SupportDesk<T>>,
) -> Router
where
    S: SurveyStore + 'static,
    R: ResponseRepository + 'static,
    M: MediaStore + 'static,
    T: SettingsStore + 'static,
{
    catalog_router(catalog)
        .merge(response_router(responses))
        .merge(support_router(support))
}

pub fn catalog_router<S>(service: Arc<SurveyCatalogService<S>>) -> Router
where
    S: SurveyStore + 'static,
{
    Router::new()
        .route("/survey/create", post(create_survey_handler::<S>))
        .route("/survey/list", get(list_surveys_handler::<S>))
        .route(
            "/survey/:survey",
            get(survey_detail_handler::<S>)
                .put(update_survey_handler::<S>)
                .delete(delete_survey_handler::<S>),
        )
        .route("/survey/:survey/questions", post(add_question_handler::<S>))
        .route(
            "/survey/questions/:question",
            put(update_question_handler::<S>).delete(delete_question_handler::<S>),
        )
        .with_state(service)
}

pub fn response_router<S, R, M>(service: Arc<SurveyResponseService<S, R, M>>) -> Router
where
    S: SurveyStore + 'static,
    R: ResponseRepository + 'static,
    M: MediaStore + 'static,
{
    Router::new()
        .route("/survey/:survey/respond", post(respond_handler::<S, R, M>))
        .route(
            "/survey/:survey/respond/bulk",
            post(respond_bulk_handler::<S, R, M>),
        )
        .route(
            "/survey/:survey/responses",
            get(list_responses_handler::<S, R, M>),
        )
        .route(
            "/survey/responses/:response/approval",
            patch(approval_handler::<S, R, M>),
        )
        .route(
            "/survey/public/responses/all",
            get(public_responses_handler::<S, R, M>),
        )
        .route(
            "/survey/public/responses/:response/approval",
            patch(public_approval_handler::<S, R, M>),
        )
        .with_state(service)
}

pub fn support_router<T>(desk: Arc<SupportDesk<T>>) -> Router
where
    T: SettingsStore + 'static,
{
    Router::new()
        .route("/help", get(help_handler::<T>).put(update_help_handler::<T>))
        .with_state(desk)
}

pub(crate) async fn create_survey_handler<S>(
    State(service): State<Arc<SurveyCatalogService<S>>>,
    Extension(sessions): Extension<SessionHandle>,
    headers: HeaderMap,
    Json(draft): Json<SurveyDraft>,
) -> Response
where
    S: SurveyStore + 'static,
{
    let result = require_role(&headers, sessions.as_ref(), PrincipalRole::Admin)
        .and_then(|admin| service.create_survey(draft, &admin.subject));
    match result {
        Ok(survey) => {
            let payload = json!({
                "message": "Survey created successfully",
                "survey": survey,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn list_surveys_handler<S>(
    State(service): State<Arc<SurveyCatalogService<S>>>,
    Extension(sessions): Extension<SessionHandle>,
    headers: HeaderMap,
) -> Response
where
    S: SurveyStore + 'static,
{
    let result = require_role(&headers, sessions.as_ref(), PrincipalRole::Admin)
        .and_then(|_| service.list_surveys());
    match result {
        Ok(surveys) => Json(json!({ "surveys": surveys })).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn survey_detail_handler<S>(
    State(service): State<Arc<SurveyCatalogService<S>>>,
    Path(survey): Path<String>,
) -> Response
where
    S: SurveyStore + 'static,
{
    match service.get_survey_with_questions(&survey) {
        Ok(detail) => Json(detail).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn update_survey_handler<S>(
    State(service): State<Arc<SurveyCatalogService<S>>>,
    Extension(sessions): Extension<SessionHandle>,
    Path(survey): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<SurveyDraft>,
) -> Response
where
    S: SurveyStore + 'static,
{
    let result = require_role(&headers, sessions.as_ref(), PrincipalRole::Admin)
        .and_then(|_| service.update_survey(&survey, draft));
    match result {
        Ok(survey) => Json(json!({
            "message": "Survey updated successfully",
            "survey": survey,
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn delete_survey_handler<S>(
    State(service): State<Arc<SurveyCatalogService<S>>>,
    Extension(sessions): Extension<SessionHandle>,
    Path(survey): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: SurveyStore + 'static,
{
    let result = require_role(&headers, sessions.as_ref(), PrincipalRole::Admin)
        .and_then(|_| service.delete_survey(&survey));
    match result {
        Ok(survey) => Json(json!({
            "message": "Survey deleted successfully",
            "surveyCode": survey.code,
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn add_question_handler<S>(
    State(service): State<Arc<SurveyCatalogService<S>>>,
    Extension(sessions): Extension<SessionHandle>,
    Path(survey): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<QuestionDraft>,
) -> Response
where
    S: SurveyStore + 'static,
{
    let result = require_role(&headers, sessions.as_ref(), PrincipalRole::Admin)
        .and_then(|_| service.add_question(&survey, draft));
    match result {
        Ok(question) => {
            let payload = json!({
                "message": "Question added to survey successfully",
                "question": question.view(),
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn update_question_handler<S>(
    State(service): State<Arc<SurveyCatalogService<S>>>,
    Extension(sessions): Extension<SessionHandle>,
    Path(question): Path<String>,
    headers: HeaderMap,
    Json(draft): Json<QuestionDraft>,
) -> Response
where
    S: SurveyStore + 'static,
{
    let result = require_role(&headers, sessions.as_ref(), PrincipalRole::Admin)
        .and_then(|_| service.update_question(&question, draft));
    match result {
        Ok(question) => Json(json!({
            "message": "Question updated successfully",
            "question": question.view(),
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn delete_question_handler<S>(
    State(service): State<Arc<SurveyCatalogService<S>>>,
    Extension(sessions): Extension<SessionHandle>,
    Path(question): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: SurveyStore + 'static,
{
    let result = require_role(&headers, sessions.as_ref(), PrincipalRole::Admin)
        .and_then(|_| service.delete_question(&question));
    match result {
        Ok(removed) => Json(json!({
            "message": "Question deleted successfully",
            "deletedQuestionIds": removed,
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Text fields and the optional `audio` file of a multipart submission.
#[derive(Debug, Default)]
struct SubmissionForm {
    fields: HashMap<String, String>,
    audio: Option<AudioUpload>,
}

impl SubmissionForm {
    async fn read(mut multipart: Multipart) -> Result<Self, SurveyError> {
        let malformed =
            |err: axum::extract::multipart::MultipartError| {
                SurveyError::Validation(format!("Invalid multipart body: {}", err.body_text()))
            };

        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "audio" {
                let file_name = field.file_name().unwrap_or("audio").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(malformed)?;
                form.audio = Some(AudioUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            } else {
                let text = field.text().await.map_err(malformed)?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    fn value(&self, name: &str) -> Value {
        self.fields
            .get(name)
            .map(|text| Value::String(text.clone()))
            .unwrap_or(Value::Null)
    }

    /// Parse a JSON array field. An absent field reads as an empty list.
    fn json_list<T>(&self, name: &str) -> Result<Vec<T>, SurveyError>
    where
        T: serde::de::DeserializeOwned,
    {
        match self.fields.get(name).map(|raw| raw.trim()) {
            None | Some("") => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(raw).map_err(|_| {
                SurveyError::Validation(format!("{name} must be a valid JSON array."))
            }),
        }
    }
}

/// Run a submission off the async workers; the stores and media upload block.
async fn off_runtime<T, F>(call: F) -> Result<T, SurveyError>
where
    F: FnOnce() -> Result<T, SurveyError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|err| SurveyError::Interrupted(err.to_string()))?
}

fn rejected_submission(survey: &str, err: SurveyError) -> Response {
    if !err.is_internal() {
        warn!(survey = survey, error = %err, "survey submission rejected");
    }
    err.into_response()
}

pub(crate) async fn respond_handler<S, R, M>(
    State(service): State<Arc<SurveyResponseService<S, R, M>>>,
    Path(survey): Path<String>,
    multipart: Multipart,
) -> Response
where
    S: SurveyStore + 'static,
    R: ResponseRepository + 'static,
    M: MediaStore + 'static,
{
    let result = async {
        let form = SubmissionForm::read(multipart).await?;
        let answers: Vec<RawAnswer> = form.json_list("answers")?;
        let submission = ResponseSubmission {
            user_code: form.text("userCode"),
            answers,
            latitude: form.value("latitude"),
            longitude: form.value("longitude"),
            audio: form.audio,
        };
        let (service, target) = (service.clone(), survey.clone());
        off_runtime(move || service.submit(&target, submission)).await
    }
    .await;

    match result {
        Ok(receipt) => {
            let payload = json!({
                "message": "Survey response submitted successfully",
                "responseId": receipt.response_id,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => rejected_submission(&survey, err),
    }
}

pub(crate) async fn respond_bulk_handler<S, R, M>(
    State(service): State<Arc<SurveyResponseService<S, R, M>>>,
    Path(survey): Path<String>,
    multipart: Multipart,
) -> Response
where
    S: SurveyStore + 'static,
    R: ResponseRepository + 'static,
    M: MediaStore + 'static,
{
    let result = async {
        let form = SubmissionForm::read(multipart).await?;
        let responses: Vec<Value> = form.json_list("responses")?;
        let submission = BulkSubmission {
            user_code: form.text("userCode"),
            responses,
            audio: form.audio,
        };
        let (service, target) = (service.clone(), survey.clone());
        off_runtime(move || service.submit_bulk(&target, submission)).await
    }
    .await;

    match result {
        Ok(receipt) => {
            let payload = json!({
                "message": "Bulk survey responses submitted successfully",
                "count": receipt.created_responses.len(),
                "createdResponses": receipt.created_responses,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => rejected_submission(&survey, err),
    }
}

pub(crate) async fn list_responses_handler<S, R, M>(
    State(service): State<Arc<SurveyResponseService<S, R, M>>>,
    Extension(sessions): Extension<SessionHandle>,
    Path(survey): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: SurveyStore + 'static,
    R: ResponseRepository + 'static,
    M: MediaStore + 'static,
{
    let result = require_role(&headers, sessions.as_ref(), PrincipalRole::Admin)
        .and_then(|_| service.list_for_survey(&survey));
    match result {
        Ok((survey, responses)) => Json(json!({
            "survey": {
                "id": survey.id,
                "surveyCode": survey.code,
                "name": survey.name,
            },
            "count": responses.len(),
            "responses": responses,
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn public_responses_handler<S, R, M>(
    State(service): State<Arc<SurveyResponseService<S, R, M>>>,
) -> Response
where
    S: SurveyStore + 'static,
    R: ResponseRepository + 'static,
    M: MediaStore + 'static,
{
    match service.public_overview() {
        Ok(surveys) => Json(json!({ "surveys": surveys })).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApprovalRequest {
    #[serde(default)]
    approval_status: Option<String>,
}

fn approval_response<S, R, M>(
    service: &SurveyResponseService<S, R, M>,
    response: &str,
    request: Option<Json<ApprovalRequest>>,
    channel: ApprovalChannel,
) -> Response
where
    S: SurveyStore + 'static,
    R: ResponseRepository + 'static,
    M: MediaStore + 'static,
{
    let request = request.map(|Json(request)| request).unwrap_or_default();
    match service.set_approval(response, request.approval_status.as_deref(), channel) {
        Ok(view) => Json(json!({
            "message": "Approval status updated successfully",
            "response": view,
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn approval_handler<S, R, M>(
    State(service): State<Arc<SurveyResponseService<S, R, M>>>,
    Extension(sessions): Extension<SessionHandle>,
    Path(response): Path<String>,
    headers: HeaderMap,
    request: Option<Json<ApprovalRequest>>,
) -> Response
where
    S: SurveyStore + 'static,
    R: ResponseRepository + 'static,
    M: MediaStore + 'static,
{
    match authenticate(&headers, sessions.as_ref()) {
        Ok(principal) => approval_response(
            &service,
            &response,
            request,
            ApprovalChannel::Reviewer(principal),
        ),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn public_approval_handler<S, R, M>(
    State(service): State<Arc<SurveyResponseService<S, R, M>>>,
    Path(response): Path<String>,
    request: Option<Json<ApprovalRequest>>,
) -> Response
where
    S: SurveyStore + 'static,
    R: ResponseRepository + 'static,
    M: MediaStore + 'static,
{
    approval_response(&service, &response, request, ApprovalChannel::Public)
}

pub(crate) async fn help_handler<T>(State(desk): State<Arc<SupportDesk<T>>>) -> Response
where
    T: SettingsStore + 'static,
{
    match desk.current() {
        Ok(settings) => Json(settings).into_response(),
        Err(err) => SurveyError::from(err).into_response(),
    }
}

pub(crate) async fn update_help_handler<T>(
    State(desk): State<Arc<SupportDesk<T>>>,
    Extension(sessions): Extension<SessionHandle>,
    headers: HeaderMap,
    Json(patch): Json<SupportPatch>,
) -> Response
where
    T: SettingsStore + 'static,
{
    let result = require_role(&headers, sessions.as_ref(), PrincipalRole::Admin).and_then(
        |admin| {
            desk.update(patch, &admin.subject)
                .map_err(SurveyError::from)
        },
    );
    match result {
        Ok(help) => Json(json!({
            "message": "Help & Support updated successfully",
            "help": help,
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}
