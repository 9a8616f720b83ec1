use field_survey::config::{AuthConfig, MediaConfig};
use field_survey::error::AppError;
use field_survey::surveys::{
    ApprovalState, AudioRef, AudioUpload, FieldUser, MediaError, MediaStore, Principal, Question,
    QuestionId, RepositoryError, ResponseId, ResponseRepository, SessionVerifier, SettingsStore,
    SupportDesk, SupportSettings, Survey, SurveyCatalogService, SurveyId, SurveyLookup,
    SurveyResponse, SurveyResponseService, SurveyStore, UserId, UserRole,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) media: Arc<LocalMediaStore>,
}

fn guard<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store mutex poisoned".to_string()))
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySurveyStore {
    users: Arc<Mutex<HashMap<String, FieldUser>>>,
    surveys: Arc<Mutex<HashMap<SurveyId, Survey>>>,
    questions: Arc<Mutex<HashMap<QuestionId, Question>>>,
}

impl InMemorySurveyStore {
    /// Register accounts in the user directory, replacing any with the same user code.
    pub(crate) fn add_users(&self, users: Vec<FieldUser>) -> Result<(), RepositoryError> {
        let mut directory = guard(&self.users)?;
        for user in users {
            directory.insert(user.user_code.clone(), user);
        }
        Ok(())
    }
}

impl SurveyStore for InMemorySurveyStore {
    fn find_user(&self, user_code: &str) -> Result<Option<FieldUser>, RepositoryError> {
        Ok(guard(&self.users)?.get(user_code).cloned())
    }

    fn find_survey(&self, lookup: &SurveyLookup) -> Result<Option<Survey>, RepositoryError> {
        let surveys = guard(&self.surveys)?;
        Ok(surveys.values().find(|survey| lookup.matches(survey)).cloned())
    }

    fn list_surveys(&self) -> Result<Vec<Survey>, RepositoryError> {
        Ok(guard(&self.surveys)?.values().cloned().collect())
    }

    fn insert_survey(&self, survey: Survey) -> Result<Survey, RepositoryError> {
        let mut surveys = guard(&self.surveys)?;
        let taken = surveys
            .values()
            .any(|existing| existing.id == survey.id || existing.code == survey.code);
        if taken {
            return Err(RepositoryError::Conflict);
        }
        surveys.insert(survey.id.clone(), survey.clone());
        Ok(survey)
    }

    fn update_survey(&self, survey: Survey) -> Result<(), RepositoryError> {
        let mut surveys = guard(&self.surveys)?;
        match surveys.get_mut(&survey.id) {
            Some(slot) => {
                *slot = survey;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn delete_survey(&self, id: &SurveyId) -> Result<(), RepositoryError> {
        let mut surveys = guard(&self.surveys)?;
        let mut questions = guard(&self.questions)?;
        surveys.remove(id).ok_or(RepositoryError::NotFound)?;
        questions.retain(|_, question| &question.survey != id);
        Ok(())
    }

    fn list_questions(&self, survey: &SurveyId) -> Result<Vec<Question>, RepositoryError> {
        let questions = guard(&self.questions)?;
        Ok(questions
            .values()
            .filter(|question| &question.survey == survey)
            .cloned()
            .collect())
    }

    fn find_question(&self, id: &QuestionId) -> Result<Option<Question>, RepositoryError> {
        Ok(guard(&self.questions)?.get(id).cloned())
    }

    fn insert_question(&self, question: Question) -> Result<Question, RepositoryError> {
        let mut questions = guard(&self.questions)?;
        if questions.contains_key(&question.id) {
            return Err(RepositoryError::Conflict);
        }
        questions.insert(question.id.clone(), question.clone());
        Ok(question)
    }

    fn update_question(&self, question: Question) -> Result<(), RepositoryError> {
        let mut questions = guard(&self.questions)?;
        match questions.get_mut(&question.id) {
            Some(slot) => {
                *slot = question;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn delete_questions(&self, ids: &[QuestionId]) -> Result<(), RepositoryError> {
        let mut questions = guard(&self.questions)?;
        for id in ids {
            questions.remove(id);
        }
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryResponseRepository {
    records: Arc<Mutex<HashMap<ResponseId, SurveyResponse>>>,
}

impl ResponseRepository for InMemoryResponseRepository {
    fn insert(&self, response: SurveyResponse) -> Result<SurveyResponse, RepositoryError> {
        let mut records = guard(&self.records)?;
        if records.contains_key(&response.id) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(response.id.clone(), response.clone());
        Ok(response)
    }

    fn insert_batch(
        &self,
        responses: Vec<SurveyResponse>,
    ) -> Result<Vec<SurveyResponse>, RepositoryError> {
        let mut records = guard(&self.records)?;
        if responses
            .iter()
            .any(|response| records.contains_key(&response.id))
        {
            return Err(RepositoryError::Conflict);
        }
        for response in &responses {
            records.insert(response.id.clone(), response.clone());
        }
        Ok(responses)
    }

    fn fetch(&self, id: &ResponseId) -> Result<Option<SurveyResponse>, RepositoryError> {
        Ok(guard(&self.records)?.get(id).cloned())
    }

    fn update_approval(
        &self,
        id: &ResponseId,
        approval: ApprovalState,
    ) -> Result<Option<SurveyResponse>, RepositoryError> {
        let mut records = guard(&self.records)?;
        Ok(records.get_mut(id).map(|response| {
            response.approval = approval;
            response.updated_at = chrono::Utc::now();
            response.clone()
        }))
    }

    fn list_for_survey(&self, survey: &SurveyId) -> Result<Vec<SurveyResponse>, RepositoryError> {
        let records = guard(&self.records)?;
        Ok(records
            .values()
            .filter(|response| &response.survey == survey)
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<SurveyResponse>, RepositoryError> {
        Ok(guard(&self.records)?.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySettingsStore {
    settings: Arc<Mutex<Option<SupportSettings>>>,
}

impl SettingsStore for InMemorySettingsStore {
    fn load(&self) -> Result<Option<SupportSettings>, RepositoryError> {
        Ok(guard(&self.settings)?.clone())
    }

    fn save(&self, settings: SupportSettings) -> Result<(), RepositoryError> {
        *guard(&self.settings)? = Some(settings);
        Ok(())
    }
}

/// Writes recordings under `root` and addresses them below `public_url`.
#[derive(Debug, Clone)]
pub(crate) struct LocalMediaStore {
    root: PathBuf,
    public_url: String,
}

impl LocalMediaStore {
    pub(crate) fn new(config: &MediaConfig) -> Self {
        Self {
            root: config.root.clone(),
            public_url: config.public_url.clone(),
        }
    }

    /// Path of a stored file, if `name` is a bare file name.
    pub(crate) fn resolve(&self, name: &str) -> Option<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.root.join(name)),
            _ => None,
        }
    }

    fn extension(upload: &AudioUpload) -> Option<String> {
        let from_name = Path::new(&upload.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
        match from_name {
            Some(ext) => Some(ext.to_ascii_lowercase()),
            None => upload
                .content_type
                .as_deref()
                .and_then(mime_guess::get_mime_extensions_str)
                .and_then(|extensions| extensions.first())
                .map(|ext| ext.to_string()),
        }
    }
}

impl MediaStore for LocalMediaStore {
    fn store_audio(&self, upload: &AudioUpload) -> Result<AudioRef, MediaError> {
        fs::create_dir_all(&self.root)
            .map_err(|err| MediaError::Unavailable(format!("{}: {err}", self.root.display())))?;

        let stem = Uuid::new_v4().simple().to_string();
        let name = match Self::extension(upload) {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem,
        };
        fs::write(self.root.join(&name), &upload.bytes)
            .map_err(|err| MediaError::Unavailable(format!("{name}: {err}")))?;

        Ok(AudioRef(format!("{}/{name}", self.public_url)))
    }
}

/// Bearer tokens configured through `APP_SESSION_TOKENS`.
#[derive(Debug, Clone, Default)]
pub(crate) struct StaticSessionVerifier {
    tokens: HashMap<String, Principal>,
}

impl StaticSessionVerifier {
    pub(crate) fn from_config(config: &AuthConfig) -> Self {
        Self {
            tokens: config
                .sessions
                .iter()
                .map(|session| (session.token.clone(), session.principal.clone()))
                .collect(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl SessionVerifier for StaticSessionVerifier {
    fn verify(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).cloned()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedUser {
    #[serde(default)]
    id: Option<UserId>,
    user_code: String,
    full_name: String,
    #[serde(default)]
    mobile: String,
    #[serde(default = "default_seed_role")]
    role: UserRole,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_seed_role() -> UserRole {
    UserRole::SurveyUser
}

fn default_active() -> bool {
    true
}

impl From<SeedUser> for FieldUser {
    fn from(seed: SeedUser) -> Self {
        FieldUser {
            id: seed.id.unwrap_or_else(UserId::generate),
            user_code: seed.user_code.trim().to_string(),
            full_name: seed.full_name,
            mobile: seed.mobile,
            role: seed.role,
            is_active: seed.is_active,
        }
    }
}

/// Parse a JSON array of field users.
pub(crate) fn parse_users(raw: &[u8]) -> Result<Vec<FieldUser>, AppError> {
    let seeds: Vec<SeedUser> = serde_json::from_slice(raw)?;
    Ok(seeds.into_iter().map(FieldUser::from).collect())
}

pub(crate) fn load_users(path: &Path) -> Result<Vec<FieldUser>, AppError> {
    let raw = fs::read(path)?;
    parse_users(&raw)
}

pub(crate) type CatalogService = SurveyCatalogService<InMemorySurveyStore>;
pub(crate) type IntakeService =
    SurveyResponseService<InMemorySurveyStore, InMemoryResponseRepository, LocalMediaStore>;

/// In-process storage shared by the services behind the router.
#[derive(Clone)]
pub(crate) struct SurveyBackend {
    pub(crate) store: Arc<InMemorySurveyStore>,
    pub(crate) responses: Arc<InMemoryResponseRepository>,
    pub(crate) settings: Arc<InMemorySettingsStore>,
    pub(crate) media: Arc<LocalMediaStore>,
}

impl SurveyBackend {
    pub(crate) fn new(media: LocalMediaStore) -> Self {
        Self {
            store: Arc::new(InMemorySurveyStore::default()),
            responses: Arc::new(InMemoryResponseRepository::default()),
            settings: Arc::new(InMemorySettingsStore::default()),
            media: Arc::new(media),
        }
    }

    pub(crate) fn catalog(&self) -> Arc<CatalogService> {
        Arc::new(SurveyCatalogService::new(self.store.clone()))
    }

    pub(crate) fn intake(&self) -> Arc<IntakeService> {
        Arc::new(SurveyResponseService::new(
            self.store.clone(),
            self.responses.clone(),
            self.media.clone(),
        ))
    }

    pub(crate) fn support(&self) -> Arc<SupportDesk<InMemorySettingsStore>> {
        Arc::new(SupportDesk::new(self.settings.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use field_survey::config::SessionToken;
    use field_survey::surveys::PrincipalRole;

    fn media_at(root: &Path) -> LocalMediaStore {
        LocalMediaStore::new(&MediaConfig {
            root: root.to_path_buf(),
            public_url: "/media".to_string(),
            max_upload_bytes: 1024,
        })
    }

    #[test]
    fn local_media_store_writes_under_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        let media = media_at(dir.path());

        let stored = media
            .store_audio(&AudioUpload {
                file_name: "Interview.MP3".to_string(),
                content_type: Some("audio/mpeg".to_string()),
                bytes: b"ID3".to_vec(),
            })
            .expect("stored");

        let name = stored.0.strip_prefix("/media/").expect("public prefix");
        assert!(name.ends_with(".mp3"));
        let path = media.resolve(name).expect("bare name");
        assert_eq!(fs::read(path).expect("file written"), b"ID3");
    }

    #[test]
    fn local_media_store_falls_back_to_mime_extension() {
        let dir = tempfile::tempdir().expect("temp dir");
        let media = media_at(dir.path());

        let stored = media
            .store_audio(&AudioUpload {
                file_name: "blob".to_string(),
                content_type: Some("audio/wav".to_string()),
                bytes: b"RIFF".to_vec(),
            })
            .expect("stored");
        let (_, ext) = stored.0.rsplit_once('.').expect("extension added");
        let known = mime_guess::get_mime_extensions_str("audio/wav").expect("wav is known");
        assert!(known.contains(&ext));
    }

    #[test]
    fn resolve_rejects_paths() {
        let media = media_at(Path::new("/srv/uploads"));
        assert!(media.resolve("../secrets").is_none());
        assert!(media.resolve("nested/file.mp3").is_none());
        assert!(media.resolve("").is_none());
        assert_eq!(
            media.resolve("abc.mp3"),
            Some(PathBuf::from("/srv/uploads/abc.mp3"))
        );
    }

    #[test]
    fn batch_insert_rejects_duplicates_without_partial_writes() {
        let store = InMemorySurveyStore::default();
        store
            .add_users(vec![FieldUser {
                id: UserId::generate(),
                user_code: "USR-1".to_string(),
                full_name: "Asha".to_string(),
                mobile: String::new(),
                role: UserRole::SurveyUser,
                is_active: true,
            }])
            .expect("users added");
        assert!(store.find_user("USR-1").expect("lookup").is_some());

        let repository = InMemoryResponseRepository::default();
        let existing_id = ResponseId::generate();
        let existing = serde_json::from_value::<SurveyResponse>(serde_json::json!({
            "id": existing_id.as_str(),
            "survey": SurveyId::generate().as_str(),
            "surveyCode": "SRV-00000000",
            "user": UserId::generate().as_str(),
            "userCode": "USR-1",
            "userName": "Asha",
            "userMobile": "",
            "userRole": "SURVEY_USER",
            "audioUrl": "/media/a.mp3",
            "isCompleted": true,
            "answers": [],
            "approvalStatus": "PENDING",
            "isApproved": false,
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z",
        }))
        .expect("response fixture");
        repository.insert(existing.clone()).expect("first insert");

        let mut fresh = existing.clone();
        fresh.id = ResponseId::generate();
        let result = repository.insert_batch(vec![fresh.clone(), existing]);
        assert!(matches!(result, Err(RepositoryError::Conflict)));
        assert!(repository.fetch(&fresh.id).expect("lookup").is_none());
    }

    #[test]
    fn seed_users_default_to_active_survey_users() {
        let users = parse_users(
            br#"[
                { "userCode": " USR-0007 ", "fullName": "Meera", "mobile": "9000000007" },
                { "userCode": "QE-1", "fullName": "Dev", "role": "QUALITY_ENGINEER", "isActive": false }
            ]"#,
        )
        .expect("seed parses");

        assert_eq!(users[0].user_code, "USR-0007");
        assert_eq!(users[0].role, UserRole::SurveyUser);
        assert!(users[0].is_active);
        assert_eq!(users[1].role, UserRole::QualityEngineer);
        assert!(!users[1].is_active);
    }

    #[test]
    fn malformed_seed_is_a_seed_error() {
        assert!(matches!(
            parse_users(br#"{ "userCode": "x" }"#),
            Err(AppError::Seed(_))
        ));
    }

    #[test]
    fn static_sessions_come_from_config() {
        let verifier = StaticSessionVerifier::from_config(&AuthConfig {
            sessions: vec![SessionToken {
                token: "qe-token".to_string(),
                principal: Principal {
                    subject: "qe-1".to_string(),
                    role: PrincipalRole::QualityEngineer,
                },
            }],
        });
        assert!(!verifier.is_empty());
        assert_eq!(
            verifier.verify("qe-token").map(|principal| principal.role),
            Some(PrincipalRole::QualityEngineer)
        );
        assert!(verifier.verify("other").is_none());
    }
}
