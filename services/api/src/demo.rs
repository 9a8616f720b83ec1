use crate::infra::{LocalMediaStore, SurveyBackend};
use clap::Args;
use field_survey::config::MediaConfig;
use field_survey::error::AppError;
use field_survey::surveys::{
    Answer, AnswerPayload, ApprovalChannel, AudioUpload, FieldUser, Principal, PrincipalRole,
    QuestionDraft, RawAnswer, ResponseSubmission, SurveyDraft, SurveyError, UserId, UserRole,
};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Directory that receives the demo recording. Defaults to a folder under the system temp dir.
    #[arg(long)]
    pub(crate) media_root: Option<PathBuf>,
    /// Review outcome applied to the demo response.
    #[arg(long, default_value = "CORRECTLY_DONE")]
    pub(crate) approval_status: String,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let outcome = match walkthrough(args) {
        Ok(outcome) => outcome,
        Err(DemoFailure::App(err)) => return Err(err),
        Err(DemoFailure::Survey(err)) => {
            println!("Demo stopped: {err} (HTTP {})", err.status().as_u16());
            return Ok(());
        }
    };

    println!("Field survey demo");
    println!("  Survey: {} ({})", outcome.survey_name, outcome.survey_code);
    println!("  Respondent: {}", outcome.respondent);
    println!("  Recording: {}", outcome.audio_url);
    println!("\nAnswers");
    for answer in &outcome.answers {
        println!("  - {}: {}", answer.question_text, describe(&answer.payload));
    }
    println!("\nReview");
    println!("  Status: {}", outcome.approval_status);
    println!("  Approved: {}", if outcome.approved { "yes" } else { "no" });
    if let Some(at) = &outcome.approved_at {
        println!("  Approved at: {at}");
    }

    Ok(())
}

enum DemoFailure {
    App(AppError),
    Survey(SurveyError),
}

impl From<AppError> for DemoFailure {
    fn from(value: AppError) -> Self {
        Self::App(value)
    }
}

impl From<SurveyError> for DemoFailure {
    fn from(value: SurveyError) -> Self {
        Self::Survey(value)
    }
}

#[derive(Debug)]
struct DemoOutcome {
    survey_name: String,
    survey_code: String,
    respondent: String,
    audio_url: String,
    answers: Vec<Answer>,
    approval_status: String,
    approved: bool,
    approved_at: Option<String>,
}

fn question(body: Value) -> Result<QuestionDraft, AppError> {
    Ok(serde_json::from_value(body)?)
}

fn walkthrough(args: DemoArgs) -> Result<DemoOutcome, DemoFailure> {
    let media_root = args
        .media_root
        .unwrap_or_else(|| std::env::temp_dir().join("field-survey-demo"));
    let backend = SurveyBackend::new(LocalMediaStore::new(&MediaConfig {
        root: media_root,
        public_url: "/media".to_string(),
        max_upload_bytes: 1024 * 1024,
    }));
    backend
        .store
        .add_users(vec![FieldUser {
            id: UserId::generate(),
            user_code: "USR-DEMO".to_string(),
            full_name: "Demo Field Agent".to_string(),
            mobile: "9000000000".to_string(),
            role: UserRole::SurveyUser,
            is_active: true,
        }])
        .map_err(AppError::from)?;

    let catalog = backend.catalog();
    let intake = backend.intake();

    let survey = catalog.create_survey(
        SurveyDraft {
            name: Some("Household water access".to_string()),
            status: Some("ACTIVE".to_string()),
            ..SurveyDraft::default()
        },
        "demo-admin",
    )?;
    let source = catalog.add_question(
        &survey.code,
        question(json!({
            "questionText": "Main source of drinking water",
            "type": "MCQ_SINGLE",
            "options": ["Piped", "Borewell", "Tanker"],
            "enableOtherOption": true,
            "order": 1,
        }))?,
    )?;
    let reliability = catalog.add_question(
        &survey.code,
        question(json!({
            "questionText": "How reliable is the supply?",
            "type": "RATING",
            "order": 2,
        }))?,
    )?;
    let other = catalog.add_question(
        &survey.code,
        question(json!({
            "questionText": "Who operates the other source?",
            "parentQuestion": source.id.as_str(),
            "parentOptionValue": "Other",
            "order": 3,
        }))?,
    )?;

    let answers: Vec<RawAnswer> = serde_json::from_value(json!([
        { "questionId": source.id.as_str(), "selectedOption": "Other", "otherText": "Community well" },
        { "questionId": reliability.id.as_str(), "rating": "3" },
        { "questionId": other.id.as_str(), "answerText": "Panchayat committee" },
    ]))
    .map_err(AppError::from)?;

    let receipt = intake.submit(
        &survey.code,
        ResponseSubmission {
            user_code: "USR-DEMO".to_string(),
            answers,
            latitude: json!("12.9716"),
            longitude: json!(77.5946),
            audio: Some(AudioUpload {
                file_name: "demo-visit.mp3".to_string(),
                content_type: Some("audio/mpeg".to_string()),
                bytes: b"ID3 demo recording".to_vec(),
            }),
        },
    )?;

    let reviewer = Principal {
        subject: UserId::generate().to_string(),
        role: PrincipalRole::QualityEngineer,
    };
    let review = intake.set_approval(
        receipt.response_id.as_str(),
        Some(args.approval_status.as_str()),
        ApprovalChannel::Reviewer(reviewer),
    )?;
    let stored = intake.get(receipt.response_id.as_str())?;

    Ok(DemoOutcome {
        survey_name: survey.name,
        survey_code: survey.code,
        respondent: format!(
            "{} ({})",
            stored.respondent.user_name, stored.respondent.user_code
        ),
        audio_url: stored.audio_url.0,
        answers: stored.answers,
        approval_status: review.approval.status().label().to_string(),
        approved: review.approval.is_approved(),
        approved_at: review.approval.approved_at().map(|at| at.to_rfc3339()),
    })
}

fn describe(payload: &AnswerPayload) -> String {
    match payload {
        AnswerPayload::Text { answer_text } => answer_text.clone(),
        AnswerPayload::Rating { rating } => format!("{rating}"),
        AnswerPayload::Choice {
            selected_options,
            other_text,
        } => match other_text {
            Some(text) => format!("{} ({text})", selected_options.join(", ")),
            None => selected_options.join(", "),
        },
    }
}
