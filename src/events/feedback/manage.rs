use axum::{Json, extract::Path};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, StorageError},
    events::{
        Event,
        feedback::{FeedbackForm, FeedbackQuestion, QuestionKind},
    },
    identity::Identity,
    schema::{feedback_forms, feedback_questions},
    state::Conn,
};

#[derive(Deserialize)]
pub struct CreateFormRequest {
    pub name: String,
    #[serde(default)]
    pub anonymous_enabled: bool,
    pub questions: Vec<NewQuestion>,
}

#[derive(Deserialize)]
pub struct NewQuestion {
    pub question: String,
    pub kind: QuestionKind,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

#[derive(Serialize)]
pub struct FormView {
    pub id: String,
    pub name: String,
    pub anonymous_enabled: bool,
    pub questions: Vec<QuestionView>,
}

#[derive(Serialize)]
pub struct QuestionView {
    pub id: String,
    pub question: String,
    pub kind: QuestionKind,
    pub required: bool,
    pub seq: i64,
}

impl FormView {
    fn new(form: FeedbackForm, questions: Vec<FeedbackQuestion>) -> Self {
        FormView {
            id: form.id,
            name: form.name,
            anonymous_enabled: form.anonymous_enabled,
            questions: questions
                .into_iter()
                .map(|q| QuestionView {
                    kind: q.kind(),
                    id: q.id,
                    question: q.question,
                    required: q.required,
                    seq: q.seq,
                })
                .collect(),
        }
    }
}

fn check_question(question: &NewQuestion) -> Result<(), ApiError> {
    if question.question.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "question text must not be empty".into(),
        ));
    }
    match &question.kind {
        QuestionKind::Rating { scale } if !(2..=10).contains(scale) => {
            Err(ApiError::BadRequest(
                "rating scale must be between 2 and 10".into(),
            ))
        }
        QuestionKind::MultipleChoice { options } if options.len() < 2 => {
            Err(ApiError::BadRequest(
                "multiple choice questions need at least two options".into(),
            ))
        }
        _ => Ok(()),
    }
}

/// Creates the event's feedback form. There is at most one active form per
/// event, so any previously active form is retired in the same transaction.
pub async fn create_form(
    Path(event_id): Path<String>,
    identity: Identity,
    mut conn: Conn,
    Json(req): Json<CreateFormRequest>,
) -> ApiResult<Json<FormView>> {
    identity.require_staff()?;
    let event = Event::fetch(&event_id, &mut *conn)?;

    if req.questions.is_empty() {
        return Err(ApiError::BadRequest(
            "a feedback form needs at least one question".into(),
        ));
    }
    for question in &req.questions {
        check_question(question)?;
    }

    let form = FeedbackForm {
        id: Uuid::now_v7().to_string(),
        event_id: Some(event.id.clone()),
        name: req.name,
        anonymous_enabled: req.anonymous_enabled,
        active: true,
        created_at: Utc::now().naive_utc(),
    };

    let questions: Vec<FeedbackQuestion> = req
        .questions
        .iter()
        .enumerate()
        .map(|(i, q)| FeedbackQuestion {
            id: Uuid::now_v7().to_string(),
            form_id: form.id.clone(),
            question: q.question.clone(),
            kind: serde_json::to_string(&q.kind).unwrap(),
            required: q.required,
            seq: i as i64 + 1,
        })
        .collect();

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::update(
            feedback_forms::table
                .filter(feedback_forms::event_id.eq(&event.id))
                .filter(feedback_forms::active.eq(true)),
        )
        .set(feedback_forms::active.eq(false))
        .execute(conn)?;

        diesel::insert_into(feedback_forms::table)
            .values(&form)
            .execute(conn)?;

        for question in &questions {
            diesel::insert_into(feedback_questions::table)
                .values(question)
                .execute(conn)?;
        }

        Ok(())
    })
    .map_err(StorageError::from)?;

    Ok(Json(FormView::new(form, questions)))
}

pub async fn active_form(
    Path(event_id): Path<String>,
    mut conn: Conn,
) -> ApiResult<Json<FormView>> {
    let event = Event::fetch(&event_id, &mut *conn)?;

    let form = FeedbackForm::active_for_event(&event.id, &mut *conn)?
        .ok_or(ApiError::FormNotFound)?;
    let questions = form.questions(&mut *conn)?;

    Ok(Json(FormView::new(form, questions)))
}
