//! Admin-side maintenance of surveys and their questions.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::domain::{
    FollowUpQuestion, OtherOption, Question, QuestionId, QuestionKind, QuestionType, QuestionView,
    RatingScale, RootQuestion, Survey, SurveyId, SurveyLookup, SurveyStatus,
};
use super::repository::{RepositoryError, SurveyStore};
use super::service::{find_survey, SurveyError};

const DEFAULT_LANGUAGE: &str = "hi";

fn generate_survey_code() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("SRV-{}", hex[..8].to_uppercase())
}

fn invalid(message: impl Into<String>) -> SurveyError {
    SurveyError::Validation(message.into())
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Survey fields accepted on create and update. On update, absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyDraft {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub project_name: Option<String>,
    pub target_audience: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub language: Option<String>,
    pub tags: Option<Vec<String>>,
    pub allowed_question_types: Option<Vec<String>>,
    pub assigned_users: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl SurveyDraft {
    fn status(&self) -> Result<Option<SurveyStatus>, SurveyError> {
        self.status
            .as_deref()
            .map(|raw| SurveyStatus::parse(raw).ok_or_else(|| invalid("Invalid status.")))
            .transpose()
    }

    /// Unknown type names are dropped; a non-empty list with nothing usable is rejected.
    fn allowed_types(&self) -> Result<Option<Vec<QuestionType>>, SurveyError> {
        let Some(raw) = self.allowed_question_types.as_ref() else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(Some(Vec::new()));
        }
        let mut allowed: Vec<QuestionType> = Vec::with_capacity(raw.len());
        for kind in raw.iter().filter_map(|name| QuestionType::parse(name)) {
            if !allowed.contains(&kind) {
                allowed.push(kind);
            }
        }
        if allowed.is_empty() {
            return Err(invalid("Invalid allowedQuestionTypes"));
        }
        Ok(Some(allowed))
    }

    fn check_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), SurveyError> {
        match (start, end) {
            (Some(start), Some(end)) if end < start => {
                Err(invalid("endDate cannot be before startDate."))
            }
            _ => Ok(()),
        }
    }
}

fn clean_list(values: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(values.len());
    for value in values.iter().filter_map(|value| trimmed(Some(value))) {
        if !cleaned.contains(&value) {
            cleaned.push(value);
        }
    }
    cleaned
}

/// Question fields accepted on create and update.
///
/// Setting `parentQuestion` on create makes a follow-up; type, option, rating and "Other" fields
/// are then ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub question_text: Option<String>,
    #[serde(rename = "type")]
    pub question_type: Option<String>,
    pub options: Option<Vec<String>>,
    pub allow_multiple: Option<bool>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub rating_step: Option<f64>,
    pub enable_other_option: Option<bool>,
    pub other_option_label: Option<String>,
    pub required: Option<bool>,
    pub order: Option<i32>,
    pub help_text: Option<String>,
    pub parent_question: Option<String>,
    pub parent_option_value: Option<String>,
    pub is_active: Option<bool>,
}

impl QuestionDraft {
    fn question_type(&self) -> Result<Option<QuestionType>, SurveyError> {
        match trimmed(self.question_type.as_deref()) {
            Some(raw) => QuestionType::parse(&raw)
                .map(Some)
                .ok_or_else(|| invalid("Invalid question type.")),
            None => Ok(None),
        }
    }

    /// Build the root configuration for `question_type`, falling back to `current` for fields the
    /// draft leaves out.
    fn root(
        &self,
        question_type: QuestionType,
        current: Option<&RootQuestion>,
    ) -> Result<RootQuestion, SurveyError> {
        let option_based = question_type.is_option_based();

        let options = match (option_based, self.options.as_ref()) {
            (false, _) => Vec::new(),
            (true, Some(options)) => clean_list(options),
            (true, None) => current.map(|root| root.options.clone()).unwrap_or_default(),
        };
        if option_based && options.is_empty() {
            return Err(invalid("options are required for this question type."));
        }

        let allow_multiple = match question_type {
            QuestionType::Checkbox => true,
            QuestionType::McqSingle => self
                .allow_multiple
                .or(current.map(|root| root.allow_multiple))
                .unwrap_or(false),
            _ => false,
        };

        let rating = if question_type == QuestionType::Rating {
            let base = current.and_then(|root| root.rating).unwrap_or_default();
            let scale = RatingScale {
                min: self.min_rating.or(base.min),
                max: self.max_rating.or(base.max),
                step: self.rating_step.unwrap_or(base.step),
            };
            if let (Some(min), Some(max)) = (scale.min, scale.max) {
                if min > max {
                    return Err(invalid("minRating cannot exceed maxRating."));
                }
            }
            if scale.step.is_nan() || scale.step <= 0.0 {
                return Err(invalid("ratingStep must be positive."));
            }
            Some(scale)
        } else {
            None
        };

        let current_other = current.and_then(|root| root.other_option.as_ref());
        let other_option = if option_based
            && self
                .enable_other_option
                .unwrap_or(current_other.is_some())
        {
            let label = self
                .other_option_label
                .as_deref()
                .or(current_other.map(|other| other.label.as_str()));
            Some(OtherOption::new(label))
        } else {
            None
        };

        Ok(RootQuestion {
            question_type,
            options,
            allow_multiple,
            rating,
            other_option,
        })
    }
}

/// A survey with the questions a respondent currently sees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyDetail {
    pub survey: Survey,
    pub questions: Vec<QuestionView>,
}

/// Survey and question administration.
pub struct SurveyCatalogService<S> {
    store: Arc<S>,
}

impl<S> SurveyCatalogService<S>
where
    S: SurveyStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn create_survey(&self, draft: SurveyDraft, admin: &str) -> Result<Survey, SurveyError> {
        let name = trimmed(draft.name.as_deref()).ok_or_else(|| invalid("name is required"))?;
        let status = draft.status()?.unwrap_or_default();
        let allowed_question_types = draft.allowed_types()?.unwrap_or_default();
        SurveyDraft::check_dates(draft.start_date, draft.end_date)?;

        let now = Utc::now();
        let survey = Survey {
            id: SurveyId::generate(),
            code: generate_survey_code(),
            name,
            description: trimmed(draft.description.as_deref()),
            category: trimmed(draft.category.as_deref()),
            project_name: trimmed(draft.project_name.as_deref()),
            target_audience: trimmed(draft.target_audience.as_deref()),
            status,
            start_date: draft.start_date,
            end_date: draft.end_date,
            language: trimmed(draft.language.as_deref())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            tags: draft.tags.as_deref().map(clean_list).unwrap_or_default(),
            allowed_question_types,
            assigned_users: draft
                .assigned_users
                .as_deref()
                .map(clean_list)
                .unwrap_or_default(),
            is_active: draft.is_active.unwrap_or(true),
            created_by_admin: admin.to_string(),
            created_at: now,
            updated_at: now,
        };

        let survey = self.store.insert_survey(survey).map_err(|err| match err {
            RepositoryError::Conflict => SurveyError::Conflict(
                "Duplicate key error (surveyCode already exists).".to_string(),
            ),
            other => SurveyError::Repository(other),
        })?;

        info!(survey_code = %survey.code, admin = admin, "survey created");
        Ok(survey)
    }

    pub fn update_survey(&self, survey: &str, draft: SurveyDraft) -> Result<Survey, SurveyError> {
        let mut survey = find_survey(self.store.as_ref(), survey)?;

        if let Some(name) = draft.name.as_deref() {
            survey.name = trimmed(Some(name)).ok_or_else(|| invalid("name cannot be empty."))?;
        }
        if let Some(status) = draft.status()? {
            survey.status = status;
        }
        if let Some(allowed) = draft.allowed_types()? {
            survey.allowed_question_types = allowed;
        }
        if draft.description.is_some() {
            survey.description = trimmed(draft.description.as_deref());
        }
        if draft.category.is_some() {
            survey.category = trimmed(draft.category.as_deref());
        }
        if draft.project_name.is_some() {
            survey.project_name = trimmed(draft.project_name.as_deref());
        }
        if draft.target_audience.is_some() {
            survey.target_audience = trimmed(draft.target_audience.as_deref());
        }
        if let Some(language) = trimmed(draft.language.as_deref()) {
            survey.language = language;
        }
        if let Some(tags) = draft.tags.as_deref() {
            survey.tags = clean_list(tags);
        }
        if let Some(users) = draft.assigned_users.as_deref() {
            survey.assigned_users = clean_list(users);
        }
        if let Some(active) = draft.is_active {
            survey.is_active = active;
        }
        survey.start_date = draft.start_date.or(survey.start_date);
        survey.end_date = draft.end_date.or(survey.end_date);
        SurveyDraft::check_dates(survey.start_date, survey.end_date)?;

        survey.updated_at = Utc::now();
        self.store.update_survey(survey.clone())?;
        Ok(survey)
    }

    /// Remove a survey and its questions. Responses already collected are kept.
    pub fn delete_survey(&self, survey: &str) -> Result<Survey, SurveyError> {
        let survey = find_survey(self.store.as_ref(), survey)?;
        self.store.delete_survey(&survey.id)?;
        info!(survey_code = %survey.code, "survey deleted");
        Ok(survey)
    }

    /// Every survey, newest first.
    pub fn list_surveys(&self) -> Result<Vec<Survey>, SurveyError> {
        let mut surveys = self.store.list_surveys()?;
        surveys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(surveys)
    }

    pub fn get_survey_with_questions(&self, survey: &str) -> Result<SurveyDetail, SurveyError> {
        let survey = find_survey(self.store.as_ref(), survey)?;
        let mut questions: Vec<Question> = self
            .store
            .list_questions(&survey.id)?
            .into_iter()
            .filter(|question| question.is_active)
            .collect();
        questions.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        Ok(SurveyDetail {
            survey,
            questions: questions.iter().map(Question::view).collect(),
        })
    }

    pub fn add_question(&self, survey: &str, draft: QuestionDraft) -> Result<Question, SurveyError> {
        let text = trimmed(draft.question_text.as_deref())
            .ok_or_else(|| invalid("questionText is required."))?;
        let survey = find_survey(self.store.as_ref(), survey)?;

        let kind = match trimmed(draft.parent_question.as_deref()) {
            Some(parent) => QuestionKind::FollowUp(self.follow_up(&survey, &parent, &draft)?),
            None => {
                let question_type = draft
                    .question_type()?
                    .ok_or_else(|| invalid("questionText and type are required."))?;
                ensure_allowed(&survey, question_type)?;
                QuestionKind::Root(draft.root(question_type, None)?)
            }
        };

        let now = Utc::now();
        let question = Question {
            id: QuestionId::generate(),
            survey: survey.id.clone(),
            text,
            kind,
            required: draft.required.unwrap_or(true),
            order: draft.order.unwrap_or(0),
            is_active: draft.is_active.unwrap_or(true),
            help_text: trimmed(draft.help_text.as_deref()),
            created_at: now,
            updated_at: now,
        };

        let question = self.store.insert_question(question)?;
        info!(
            survey_code = %survey.code,
            question_id = %question.id,
            question_type = question.type_label(),
            "question added"
        );
        Ok(question)
    }

    fn follow_up(
        &self,
        survey: &Survey,
        parent: &str,
        draft: &QuestionDraft,
    ) -> Result<FollowUpQuestion, SurveyError> {
        let not_root = || invalid("parentQuestion must be a root question of this survey.");
        let parent = QuestionId::parse(parent).ok_or_else(not_root)?;
        let parent = self
            .store
            .find_question(&parent)?
            .filter(|question| question.survey == survey.id)
            .ok_or_else(not_root)?;
        let root = parent.root().ok_or_else(not_root)?;

        let value = trimmed(draft.parent_option_value.as_deref())
            .ok_or_else(|| invalid("parentOptionValue is required for follow-up questions."))?;
        let known = root.options.contains(&value)
            || root
                .other_option
                .as_ref()
                .is_some_and(|other| other.label == value);
        if !known {
            return Err(invalid(format!(
                "parentOptionValue \"{value}\" is not an option of the parent question."
            )));
        }

        Ok(FollowUpQuestion {
            parent: parent.id,
            parent_option_value: value,
        })
    }

    pub fn update_question(
        &self,
        question: &str,
        draft: QuestionDraft,
    ) -> Result<Question, SurveyError> {
        let mut question = self.find_question(question)?;

        if let Some(text) = draft.question_text.as_deref() {
            question.text =
                trimmed(Some(text)).ok_or_else(|| invalid("questionText cannot be empty."))?;
        }

        let requested_type = draft.question_type()?;
        let kind = match &question.kind {
            QuestionKind::FollowUp(_) => {
                if requested_type.is_some_and(|kind| kind != QuestionType::OpenEnded) {
                    return Err(invalid("Follow-up questions are always OPEN_ENDED."));
                }
                None
            }
            QuestionKind::Root(current) => {
                let question_type = requested_type.unwrap_or(current.question_type);
                if question_type != current.question_type {
                    ensure_allowed(&self.owning_survey(&question)?, question_type)?;
                }
                Some(QuestionKind::Root(draft.root(question_type, Some(current))?))
            }
            QuestionKind::Unsupported { .. } => match requested_type {
                Some(question_type) => {
                    ensure_allowed(&self.owning_survey(&question)?, question_type)?;
                    Some(QuestionKind::Root(draft.root(question_type, None)?))
                }
                None => None,
            },
        };
        if let Some(kind) = kind {
            question.kind = kind;
        }

        if let Some(required) = draft.required {
            question.required = required;
        }
        if let Some(order) = draft.order {
            question.order = order;
        }
        if let Some(active) = draft.is_active {
            question.is_active = active;
        }
        if draft.help_text.is_some() {
            question.help_text = trimmed(draft.help_text.as_deref());
        }

        question.updated_at = Utc::now();
        self.store.update_question(question.clone())?;
        Ok(question)
    }

    /// Delete a question together with the follow-ups hanging off it.
    pub fn delete_question(&self, question: &str) -> Result<Vec<QuestionId>, SurveyError> {
        let question = self.find_question(question)?;
        let mut removed = vec![question.id.clone()];
        removed.extend(
            self.store
                .list_questions(&question.survey)?
                .into_iter()
                .filter(|candidate| {
                    candidate
                        .follow_up()
                        .is_some_and(|follow_up| follow_up.parent == question.id)
                })
                .map(|follow_up| follow_up.id),
        );

        self.store.delete_questions(&removed)?;
        info!(question_id = %question.id, removed = removed.len(), "question deleted");
        Ok(removed)
    }

    fn find_question(&self, raw: &str) -> Result<Question, SurveyError> {
        let id = QuestionId::parse(raw).ok_or_else(|| invalid("Invalid questionId."))?;
        self.store
            .find_question(&id)?
            .ok_or_else(|| SurveyError::NotFound("Question not found.".to_string()))
    }

    fn owning_survey(&self, question: &Question) -> Result<Survey, SurveyError> {
        self.store
            .find_survey(&SurveyLookup::Id(question.survey.clone()))?
            .ok_or_else(|| SurveyError::NotFound("Survey not found.".to_string()))
    }
}

fn ensure_allowed(survey: &Survey, question_type: QuestionType) -> Result<(), SurveyError> {
    if survey.allows(question_type) {
        return Ok(());
    }
    let allowed: Vec<&str> = survey
        .allowed_question_types
        .iter()
        .map(|kind| kind.label())
        .collect();
    Err(invalid(format!(
        "This question type is not allowed for this survey. Allowed: {}",
        allowed.join(", ")
    )))
}
