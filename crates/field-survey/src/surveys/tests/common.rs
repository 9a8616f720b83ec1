use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::{Extension, Router};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::surveys::access::{Principal, PrincipalRole, SessionHandle, SessionVerifier};
use crate::surveys::domain::{
    AudioRef, FieldUser, FollowUpQuestion, OtherOption, Question, QuestionId, QuestionKind,
    QuestionType, RatingScale, ResponseId, RootQuestion, Survey, SurveyId, SurveyLookup,
    SurveyResponse, SurveyStatus, UserId, UserRole,
};
use crate::surveys::normalizer::{QuestionSet, RawAnswer};
use crate::surveys::repository::{
    AudioUpload, MediaError, MediaStore, RepositoryError, ResponseRepository, SettingsStore,
    SurveyStore,
};
use crate::surveys::support::SupportSettings;
use crate::surveys::{
    survey_router, ApprovalState, SupportDesk, SurveyCatalogService, SurveyResponseService,
};

pub(super) const SURVEY_ID: &str = "5d9c1f0e-3a7b-4c2d-9e8f-00000000a001";
pub(super) const SURVEY_CODE: &str = "SRV-1A2B3C4D";
pub(super) const OPEN_ID: &str = "5d9c1f0e-3a7b-4c2d-9e8f-00000000b001";
pub(super) const RATING_ID: &str = "5d9c1f0e-3a7b-4c2d-9e8f-00000000b002";
pub(super) const MCQ_ID: &str = "5d9c1f0e-3a7b-4c2d-9e8f-00000000b003";
pub(super) const CHECKBOX_ID: &str = "5d9c1f0e-3a7b-4c2d-9e8f-00000000b004";
pub(super) const YES_NO_ID: &str = "5d9c1f0e-3a7b-4c2d-9e8f-00000000b005";
pub(super) const FOLLOW_UP_ID: &str = "5d9c1f0e-3a7b-4c2d-9e8f-00000000b006";
pub(super) const LEGACY_ID: &str = "5d9c1f0e-3a7b-4c2d-9e8f-00000000b007";
pub(super) const DROPDOWN_ID: &str = "5d9c1f0e-3a7b-4c2d-9e8f-00000000b008";
pub(super) const LIKERT_ID: &str = "5d9c1f0e-3a7b-4c2d-9e8f-00000000b009";
pub(super) const USER_CODE: &str = "USR-0001";
pub(super) const INACTIVE_CODE: &str = "USR-0002";
pub(super) const REVIEWER_CODE: &str = "QE-0001";
pub(super) const REVIEWER_ID: &str = "5d9c1f0e-3a7b-4c2d-9e8f-00000000c001";
pub(super) const ADMIN_TOKEN: &str = "admin-token";
pub(super) const REVIEWER_TOKEN: &str = "qe-token";
pub(super) const FIELD_TOKEN: &str = "field-token";
pub(super) const BOUNDARY: &str = "field-survey-boundary";

pub(super) fn timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn field_user(code: &str, role: UserRole, is_active: bool) -> FieldUser {
    FieldUser {
        id: UserId::generate(),
        user_code: code.to_string(),
        full_name: "Asha Verma".to_string(),
        mobile: "9876543210".to_string(),
        role,
        is_active,
    }
}

pub(super) fn survey() -> Survey {
    Survey {
        id: SurveyId(SURVEY_ID.to_string()),
        code: SURVEY_CODE.to_string(),
        name: "Household media habits".to_string(),
        description: None,
        category: Some("Media".to_string()),
        project_name: None,
        target_audience: None,
        status: SurveyStatus::Active,
        start_date: None,
        end_date: None,
        language: "hi".to_string(),
        tags: Vec::new(),
        allowed_question_types: Vec::new(),
        assigned_users: Vec::new(),
        is_active: true,
        created_by_admin: "admin-1".to_string(),
        created_at: timestamp(),
        updated_at: timestamp(),
    }
}

fn question(id: &str, text: &str, order: i32, kind: QuestionKind) -> Question {
    Question {
        id: QuestionId(id.to_string()),
        survey: SurveyId(SURVEY_ID.to_string()),
        text: text.to_string(),
        kind,
        required: true,
        order,
        is_active: true,
        help_text: None,
        created_at: timestamp(),
        updated_at: timestamp(),
    }
}

fn root(question_type: QuestionType, options: &[&str], other: Option<&str>) -> RootQuestion {
    RootQuestion {
        question_type,
        options: options.iter().map(|option| option.to_string()).collect(),
        allow_multiple: question_type == QuestionType::Checkbox,
        rating: None,
        other_option: other.map(|label| OtherOption::new(Some(label))),
    }
}

pub(super) fn open_question() -> Question {
    question(
        OPEN_ID,
        "What did you eat today?",
        1,
        QuestionKind::Root(root(QuestionType::OpenEnded, &[], None)),
    )
}

pub(super) fn rating_question() -> Question {
    let mut config = root(QuestionType::Rating, &[], None);
    config.rating = Some(RatingScale::default());
    question(RATING_ID, "Rate the service", 2, QuestionKind::Root(config))
}

pub(super) fn mcq_question() -> Question {
    question(
        MCQ_ID,
        "Preferred channel",
        3,
        QuestionKind::Root(root(
            QuestionType::McqSingle,
            &["Radio", "TV", "Newspaper"],
            Some("Other"),
        )),
    )
}

pub(super) fn checkbox_question() -> Question {
    question(
        CHECKBOX_ID,
        "Which brands do you use?",
        4,
        QuestionKind::Root(root(
            QuestionType::Checkbox,
            &["Alpha", "Beta", "Gamma"],
            Some("Something else"),
        )),
    )
}

pub(super) fn yes_no_question() -> Question {
    question(
        YES_NO_ID,
        "Do you own a phone?",
        5,
        QuestionKind::Root(root(QuestionType::YesNo, &["Yes", "No"], None)),
    )
}

pub(super) fn follow_up_question() -> Question {
    question(
        FOLLOW_UP_ID,
        "Why not?",
        6,
        QuestionKind::FollowUp(FollowUpQuestion {
            parent: QuestionId(YES_NO_ID.to_string()),
            parent_option_value: "No".to_string(),
        }),
    )
}

pub(super) fn legacy_question() -> Question {
    question(
        LEGACY_ID,
        "Grid question",
        7,
        QuestionKind::Unsupported {
            stored_type: "MATRIX".to_string(),
        },
    )
}

pub(super) fn dropdown_question() -> Question {
    question(
        DROPDOWN_ID,
        "Which zone is the household in?",
        8,
        QuestionKind::Root(root(
            QuestionType::Dropdown,
            &["North", "South", "East", "West"],
            None,
        )),
    )
}

pub(super) fn likert_question() -> Question {
    question(
        LIKERT_ID,
        "The ration shop opens on time",
        9,
        QuestionKind::Root(root(
            QuestionType::Likert,
            &["Strongly disagree", "Disagree", "Neutral", "Agree", "Strongly agree"],
            None,
        )),
    )
}

pub(super) fn all_questions() -> Vec<Question> {
    vec![
        open_question(),
        rating_question(),
        mcq_question(),
        checkbox_question(),
        yes_no_question(),
        follow_up_question(),
        legacy_question(),
        dropdown_question(),
        likert_question(),
    ]
}

pub(super) fn question_set() -> QuestionSet {
    QuestionSet::new(all_questions())
}

pub(super) fn raw(value: Value) -> RawAnswer {
    serde_json::from_value(value).expect("raw answer")
}

pub(super) fn audio() -> AudioUpload {
    AudioUpload {
        file_name: "visit.mp3".to_string(),
        content_type: Some("audio/mpeg".to_string()),
        bytes: vec![0x49, 0x44, 0x33, 0x04],
    }
}

pub(super) fn stored_response(approval: ApprovalState) -> SurveyResponse {
    let user = field_user(USER_CODE, UserRole::SurveyUser, true);
    SurveyResponse {
        id: ResponseId::generate(),
        survey: SurveyId(SURVEY_ID.to_string()),
        survey_code: SURVEY_CODE.to_string(),
        respondent: crate::surveys::domain::RespondentSnapshot::capture(&user),
        audio_url: AudioRef("/media/visit.mp3".to_string()),
        latitude: Some(26.85),
        longitude: Some(80.95),
        is_completed: true,
        answers: Vec::new(),
        approval,
        created_at: timestamp(),
        updated_at: timestamp(),
    }
}

#[derive(Default, Clone)]
pub(super) struct MemorySurveyStore {
    pub(super) users: Arc<Mutex<HashMap<String, FieldUser>>>,
    pub(super) surveys: Arc<Mutex<HashMap<SurveyId, Survey>>>,
    pub(super) questions: Arc<Mutex<HashMap<QuestionId, Question>>>,
}

impl MemorySurveyStore {
    pub(super) fn seeded() -> Self {
        let store = Self::default();
        store.add_user(field_user(USER_CODE, UserRole::SurveyUser, true));
        store.add_user(field_user(INACTIVE_CODE, UserRole::SurveyUser, false));
        store.add_user(field_user(REVIEWER_CODE, UserRole::QualityEngineer, true));
        store
            .insert_survey(survey())
            .expect("survey fixture inserted");
        for question in all_questions() {
            store.insert_question(question).expect("question inserted");
        }
        store
    }

    pub(super) fn add_user(&self, user: FieldUser) {
        self.users
            .lock()
            .expect("store mutex poisoned")
            .insert(user.user_code.clone(), user);
    }

    pub(super) fn question_count(&self) -> usize {
        self.questions.lock().expect("store mutex poisoned").len()
    }
}

impl SurveyStore for MemorySurveyStore {
    fn find_user(&self, user_code: &str) -> Result<Option<FieldUser>, RepositoryError> {
        let guard = self.users.lock().expect("store mutex poisoned");
        Ok(guard.get(user_code).cloned())
    }

    fn find_survey(&self, lookup: &SurveyLookup) -> Result<Option<Survey>, RepositoryError> {
        let guard = self.surveys.lock().expect("store mutex poisoned");
        Ok(guard.values().find(|survey| lookup.matches(survey)).cloned())
    }

    fn list_surveys(&self) -> Result<Vec<Survey>, RepositoryError> {
        let guard = self.surveys.lock().expect("store mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn insert_survey(&self, survey: Survey) -> Result<Survey, RepositoryError> {
        let mut guard = self.surveys.lock().expect("store mutex poisoned");
        if guard.values().any(|existing| existing.code == survey.code) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(survey.id.clone(), survey.clone());
        Ok(survey)
    }

    fn update_survey(&self, survey: Survey) -> Result<(), RepositoryError> {
        let mut guard = self.surveys.lock().expect("store mutex poisoned");
        match guard.get_mut(&survey.id) {
            Some(slot) => {
                *slot = survey;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn delete_survey(&self, id: &SurveyId) -> Result<(), RepositoryError> {
        self.surveys
            .lock()
            .expect("store mutex poisoned")
            .remove(id);
        self.questions
            .lock()
            .expect("store mutex poisoned")
            .retain(|_, question| &question.survey != id);
        Ok(())
    }

    fn list_questions(&self, survey: &SurveyId) -> Result<Vec<Question>, RepositoryError> {
        let guard = self.questions.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .filter(|question| &question.survey == survey)
            .cloned()
            .collect())
    }

    fn find_question(&self, id: &QuestionId) -> Result<Option<Question>, RepositoryError> {
        let guard = self.questions.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn insert_question(&self, question: Question) -> Result<Question, RepositoryError> {
        let mut guard = self.questions.lock().expect("store mutex poisoned");
        if guard.contains_key(&question.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(question.id.clone(), question.clone());
        Ok(question)
    }

    fn update_question(&self, question: Question) -> Result<(), RepositoryError> {
        let mut guard = self.questions.lock().expect("store mutex poisoned");
        guard.insert(question.id.clone(), question);
        Ok(())
    }

    fn delete_questions(&self, ids: &[QuestionId]) -> Result<(), RepositoryError> {
        let mut guard = self.questions.lock().expect("store mutex poisoned");
        for id in ids {
            guard.remove(id);
        }
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryResponses {
    pub(super) records: Arc<Mutex<Vec<SurveyResponse>>>,
}

impl MemoryResponses {
    pub(super) fn all(&self) -> Vec<SurveyResponse> {
        self.records.lock().expect("responses mutex poisoned").clone()
    }

    pub(super) fn seed(&self, response: SurveyResponse) {
        self.records
            .lock()
            .expect("responses mutex poisoned")
            .push(response);
    }
}

impl ResponseRepository for MemoryResponses {
    fn insert(&self, response: SurveyResponse) -> Result<SurveyResponse, RepositoryError> {
        self.records
            .lock()
            .expect("responses mutex poisoned")
            .push(response.clone());
        Ok(response)
    }

    fn insert_batch(
        &self,
        responses: Vec<SurveyResponse>,
    ) -> Result<Vec<SurveyResponse>, RepositoryError> {
        self.records
            .lock()
            .expect("responses mutex poisoned")
            .extend(responses.iter().cloned());
        Ok(responses)
    }

    fn fetch(&self, id: &ResponseId) -> Result<Option<SurveyResponse>, RepositoryError> {
        let guard = self.records.lock().expect("responses mutex poisoned");
        Ok(guard.iter().find(|response| &response.id == id).cloned())
    }

    fn update_approval(
        &self,
        id: &ResponseId,
        approval: ApprovalState,
    ) -> Result<Option<SurveyResponse>, RepositoryError> {
        let mut guard = self.records.lock().expect("responses mutex poisoned");
        Ok(guard.iter_mut().find(|response| &response.id == id).map(|response| {
            response.approval = approval;
            response.updated_at = Utc::now();
            response.clone()
        }))
    }

    fn list_for_survey(&self, survey: &SurveyId) -> Result<Vec<SurveyResponse>, RepositoryError> {
        let guard = self.records.lock().expect("responses mutex poisoned");
        Ok(guard
            .iter()
            .filter(|response| &response.survey == survey)
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<SurveyResponse>, RepositoryError> {
        Ok(self.all())
    }
}

pub(super) struct UnavailableResponses;

impl ResponseRepository for UnavailableResponses {
    fn insert(&self, _response: SurveyResponse) -> Result<SurveyResponse, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_batch(
        &self,
        _responses: Vec<SurveyResponse>,
    ) -> Result<Vec<SurveyResponse>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ResponseId) -> Result<Option<SurveyResponse>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update_approval(
        &self,
        _id: &ResponseId,
        _approval: ApprovalState,
    ) -> Result<Option<SurveyResponse>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_for_survey(&self, _survey: &SurveyId) -> Result<Vec<SurveyResponse>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_all(&self) -> Result<Vec<SurveyResponse>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingMedia {
    uploads: Arc<Mutex<Vec<AudioUpload>>>,
}

impl RecordingMedia {
    pub(super) fn uploads(&self) -> Vec<AudioUpload> {
        self.uploads.lock().expect("media mutex poisoned").clone()
    }
}

impl MediaStore for RecordingMedia {
    fn store_audio(&self, upload: &AudioUpload) -> Result<AudioRef, MediaError> {
        let mut guard = self.uploads.lock().expect("media mutex poisoned");
        guard.push(upload.clone());
        Ok(AudioRef(format!("/media/{}-{}", guard.len(), upload.file_name)))
    }
}

pub(super) struct OfflineMedia;

impl MediaStore for OfflineMedia {
    fn store_audio(&self, _upload: &AudioUpload) -> Result<AudioRef, MediaError> {
        Err(MediaError::Unavailable("bucket unreachable".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemorySettings {
    record: Arc<Mutex<Option<SupportSettings>>>,
}

impl SettingsStore for MemorySettings {
    fn load(&self) -> Result<Option<SupportSettings>, RepositoryError> {
        Ok(self.record.lock().expect("settings mutex poisoned").clone())
    }

    fn save(&self, settings: SupportSettings) -> Result<(), RepositoryError> {
        *self.record.lock().expect("settings mutex poisoned") = Some(settings);
        Ok(())
    }
}

pub(super) struct StaticSessions;

impl SessionVerifier for StaticSessions {
    fn verify(&self, token: &str) -> Option<Principal> {
        let (subject, role) = match token {
            ADMIN_TOKEN => ("admin-1", PrincipalRole::Admin),
            REVIEWER_TOKEN => (REVIEWER_ID, PrincipalRole::QualityEngineer),
            FIELD_TOKEN => ("field-1", PrincipalRole::SurveyUser),
            _ => return None,
        };
        Some(Principal {
            subject: subject.to_string(),
            role,
        })
    }
}

pub(super) fn reviewer() -> Principal {
    Principal {
        subject: REVIEWER_ID.to_string(),
        role: PrincipalRole::QualityEngineer,
    }
}

pub(super) type ResponseService =
    SurveyResponseService<MemorySurveyStore, MemoryResponses, RecordingMedia>;

pub(super) struct Harness {
    pub(super) store: Arc<MemorySurveyStore>,
    pub(super) responses: Arc<MemoryResponses>,
    pub(super) media: Arc<RecordingMedia>,
    pub(super) service: Arc<ResponseService>,
}

pub(super) fn harness() -> Harness {
    let store = Arc::new(MemorySurveyStore::seeded());
    let responses = Arc::new(MemoryResponses::default());
    let media = Arc::new(RecordingMedia::default());
    let service = Arc::new(SurveyResponseService::new(
        store.clone(),
        responses.clone(),
        media.clone(),
    ));
    Harness {
        store,
        responses,
        media,
        service,
    }
}

impl Harness {
    pub(super) fn router(&self) -> Router {
        let sessions: SessionHandle = Arc::new(StaticSessions);
        survey_router(
            Arc::new(SurveyCatalogService::new(self.store.clone())),
            self.service.clone(),
            Arc::new(SupportDesk::new(Arc::new(MemorySettings::default()))),
        )
        .layer(Extension(sessions))
    }
}

/// Hand-built `multipart/form-data` request.
pub(super) fn multipart_request(
    uri: &str,
    fields: &[(&str, &str)],
    audio: Option<(&str, &str, &[u8])>,
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = audio {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("multipart request")
}

pub(super) fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).expect("json body")))
        .expect("json request")
}

pub(super) fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("get request")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
