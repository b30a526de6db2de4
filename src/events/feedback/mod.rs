use std::collections::HashMap;

use chrono::NaiveDateTime;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{QuestionError, StorageError},
    schema::{
        feedback_answers, feedback_forms, feedback_questions,
        feedback_responses,
    },
};

pub mod manage;
pub mod submit;

#[derive(
    Queryable, Selectable, Identifiable, Insertable, Debug, Clone, Serialize,
)]
#[diesel(table_name = feedback_forms)]
pub struct FeedbackForm {
    pub id: String,
    pub event_id: Option<String>,
    pub name: String,
    pub anonymous_enabled: bool,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(
    Queryable, Selectable, Identifiable, Insertable, Debug, Clone, Serialize,
)]
#[diesel(table_name = feedback_questions)]
pub struct FeedbackQuestion {
    pub id: String,
    pub form_id: String,
    pub question: String,
    pub kind: String,
    pub required: bool,
    pub seq: i64,
}

#[derive(
    Queryable, Selectable, Identifiable, Insertable, Debug, Clone, Serialize,
)]
#[diesel(table_name = feedback_responses)]
pub struct FeedbackResponse {
    pub id: String,
    pub form_id: String,
    pub event_id: String,
    pub user_id: Option<String>,
    pub booking_id: Option<String>,
    pub submitted_at: NaiveDateTime,
}

#[derive(
    Queryable, Selectable, Identifiable, Insertable, Debug, Clone, Serialize,
)]
#[diesel(table_name = feedback_answers)]
pub struct FeedbackAnswer {
    pub id: String,
    pub response_id: String,
    pub question_id: String,
    pub answer: String,
}

/// What a question asks for. Stored serialized in the `kind` column, so new
/// variants do not need a schema change.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Rating { scale: i64 },
    Text,
    LongText,
    YesNo,
    MultipleChoice { options: Vec<String> },
}

impl FeedbackQuestion {
    pub fn kind(&self) -> QuestionKind {
        serde_json::from_str(&self.kind).unwrap()
    }
}

impl FeedbackForm {
    pub fn active_for_event(
        event_id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Option<FeedbackForm>, StorageError> {
        feedback_forms::table
            .filter(feedback_forms::event_id.eq(event_id))
            .filter(feedback_forms::active.eq(true))
            .order_by(feedback_forms::created_at.desc())
            .first::<FeedbackForm>(conn)
            .optional()
            .map_err(StorageError::from)
    }

    pub fn questions(
        &self,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Vec<FeedbackQuestion>, StorageError> {
        feedback_questions::table
            .filter(feedback_questions::form_id.eq(&self.id))
            .order_by(feedback_questions::seq.asc())
            .load::<FeedbackQuestion>(conn)
            .map_err(StorageError::from)
    }
}

/// A validated answer, typed against its question kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Rating(i64),
    Text(String),
    YesNo(bool),
    Choice(String),
}

impl Answer {
    /// Canonical storage form.
    pub fn canonical(&self) -> String {
        match self {
            Answer::Rating(n) => n.to_string(),
            Answer::Text(s) => s.clone(),
            Answer::YesNo(true) => "yes".to_string(),
            Answer::YesNo(false) => "no".to_string(),
            Answer::Choice(s) => s.clone(),
        }
    }
}

/// Validate a submission against its form.
///
/// Every violation is collected before failing so the submitter sees the
/// complete list in one round trip, not one problem at a time.
pub fn validate_answers(
    questions: &[FeedbackQuestion],
    answers: &IndexMap<String, Value>,
) -> Result<Vec<(String, Answer)>, Vec<QuestionError>> {
    let known: HashMap<&str, &FeedbackQuestion> =
        questions.iter().map(|q| (q.id.as_str(), q)).collect();

    let mut problems = Vec::new();

    for question_id in answers.keys() {
        if !known.contains_key(question_id.as_str()) {
            problems.push(QuestionError {
                question_id: question_id.clone(),
                message: "answer references an unknown question".to_string(),
            });
        }
    }

    let mut validated = Vec::new();
    for question in questions {
        match validate_one(question, answers.get(&question.id)) {
            Ok(Some(answer)) => validated.push((question.id.clone(), answer)),
            Ok(None) => {}
            Err(message) => problems.push(QuestionError {
                question_id: question.id.clone(),
                message,
            }),
        }
    }

    if problems.is_empty() {
        Ok(validated)
    } else {
        Err(problems)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn validate_one(
    question: &FeedbackQuestion,
    raw: Option<&Value>,
) -> Result<Option<Answer>, String> {
    let raw = match raw {
        Some(value) if !is_blank(value) => value,
        _ => {
            return if question.required {
                Err(format!("\"{}\" requires an answer", question.question))
            } else {
                Ok(None)
            };
        }
    };

    let answer = match question.kind() {
        QuestionKind::Rating { scale } => {
            let n = raw
                .as_i64()
                .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| {
                    format!("\"{}\" expects a number", question.question)
                })?;
            if !(1..=scale).contains(&n) {
                return Err(format!(
                    "\"{}\" must be between 1 and {scale}",
                    question.question
                ));
            }
            Answer::Rating(n)
        }
        QuestionKind::Text | QuestionKind::LongText => {
            let s = raw.as_str().ok_or_else(|| {
                format!("\"{}\" expects text", question.question)
            })?;
            Answer::Text(s.trim().to_string())
        }
        QuestionKind::YesNo => {
            let normalized = match raw {
                Value::Bool(b) => Some(*b),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str()
                {
                    "yes" => Some(true),
                    "no" => Some(false),
                    _ => None,
                },
                _ => None,
            };
            match normalized {
                Some(b) => Answer::YesNo(b),
                None => {
                    return Err(format!(
                        "\"{}\" must be answered yes or no",
                        question.question
                    ));
                }
            }
        }
        QuestionKind::MultipleChoice { options } => {
            let s = raw.as_str().ok_or_else(|| {
                format!(
                    "\"{}\" expects one of the listed options",
                    question.question
                )
            })?;
            match options.iter().find(|option| option.as_str() == s.trim()) {
                Some(option) => Answer::Choice(option.clone()),
                None => {
                    return Err(format!(
                        "\"{}\" must be one of: {}",
                        question.question,
                        options.iter().join(", ")
                    ));
                }
            }
        }
    };

    Ok(Some(answer))
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::{Value, json};

    use super::{
        Answer, FeedbackQuestion, QuestionKind, validate_answers,
    };

    fn question(
        id: &str,
        text: &str,
        kind: QuestionKind,
        required: bool,
        seq: i64,
    ) -> FeedbackQuestion {
        FeedbackQuestion {
            id: id.to_string(),
            form_id: "form".to_string(),
            question: text.to_string(),
            kind: serde_json::to_string(&kind).unwrap(),
            required,
            seq,
        }
    }

    fn answers(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(id, value)| (id.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn all_violations_are_reported_together() {
        let questions = vec![
            question(
                "q1",
                "Rate the speaker",
                QuestionKind::Rating { scale: 5 },
                true,
                1,
            ),
            question("q2", "Any comments?", QuestionKind::Text, true, 2),
        ];

        let problems =
            validate_answers(&questions, &answers(&[("q1", json!(6))]))
                .unwrap_err();

        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].question_id, "q1");
        assert!(problems[0].message.contains("between 1 and 5"));
        assert_eq!(problems[1].question_id, "q2");
        assert!(problems[1].message.contains("requires an answer"));
    }

    #[test]
    fn yes_no_normalizes_case_insensitively() {
        let questions = vec![question(
            "q1",
            "Would you recommend this course?",
            QuestionKind::YesNo,
            true,
            1,
        )];

        let validated =
            validate_answers(&questions, &answers(&[("q1", json!("YES"))]))
                .unwrap();
        assert_eq!(validated, vec![("q1".to_string(), Answer::YesNo(true))]);

        let validated =
            validate_answers(&questions, &answers(&[("q1", json!("No"))]))
                .unwrap();
        assert_eq!(validated[0].1.canonical(), "no");

        let problems =
            validate_answers(&questions, &answers(&[("q1", json!("maybe"))]))
                .unwrap_err();
        assert_eq!(problems.len(), 1);
    }

    #[test]
    fn optional_questions_may_be_left_blank() {
        let questions = vec![question(
            "q1",
            "Anything else?",
            QuestionKind::LongText,
            false,
            1,
        )];

        let validated =
            validate_answers(&questions, &answers(&[("q1", json!("  "))]))
                .unwrap();
        assert!(validated.is_empty());

        let validated = validate_answers(&questions, &answers(&[])).unwrap();
        assert!(validated.is_empty());
    }

    #[test]
    fn multiple_choice_must_name_an_option() {
        let questions = vec![question(
            "q1",
            "Which session did you attend?",
            QuestionKind::MultipleChoice {
                options: vec!["morning".to_string(), "afternoon".to_string()],
            },
            true,
            1,
        )];

        let validated = validate_answers(
            &questions,
            &answers(&[("q1", json!("afternoon"))]),
        )
        .unwrap();
        assert_eq!(
            validated,
            vec![("q1".to_string(), Answer::Choice("afternoon".to_string()))]
        );

        let problems =
            validate_answers(&questions, &answers(&[("q1", json!("evening"))]))
                .unwrap_err();
        assert!(problems[0].message.contains("morning, afternoon"));
    }

    #[test]
    fn unknown_question_ids_are_rejected() {
        let questions = vec![question(
            "q1",
            "Rate the venue",
            QuestionKind::Rating { scale: 10 },
            true,
            1,
        )];

        let problems = validate_answers(
            &questions,
            &answers(&[("q1", json!(10)), ("bogus", json!("x"))]),
        )
        .unwrap_err();

        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].question_id, "bogus");
    }

    #[test]
    fn ratings_accept_numeric_strings() {
        let questions = vec![question(
            "q1",
            "Rate the handouts",
            QuestionKind::Rating { scale: 5 },
            true,
            1,
        )];

        let validated =
            validate_answers(&questions, &answers(&[("q1", json!("4"))]))
                .unwrap();
        assert_eq!(validated, vec![("q1".to_string(), Answer::Rating(4))]);
    }
}
