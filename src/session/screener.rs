use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::model::Screener;

/// A submitted value: either a single choice or several
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    One(String),
    Many(Vec<String>),
}

impl AnswerValue {
    fn values(&self) -> &[String] {
        match self {
            Self::One(v) => std::slice::from_ref(v),
            Self::Many(vs) => vs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerAnswer {
    pub question_id: String,
    pub value: AnswerValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenerOutcome {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

/// A participant passes when every screener question has at least one
/// submitted value in its qualifying set. Studies without a screener pass everyone.
pub fn evaluate(screener: Option<&Screener>, answers: &[ScreenerAnswer]) -> ScreenerOutcome {
    let Some(screener) = screener else {
        return ScreenerOutcome {
            passed: true,
            redirect_url: None,
        };
    };

    let by_question: HashMap<&str, &AnswerValue> = answers
        .iter()
        .map(|a| (a.question_id.as_str(), &a.value))
        .collect();

    let passed = screener.questions.iter().all(|q| {
        by_question
            .get(q.id.as_str())
            .is_some_and(|answer| answer.values().iter().any(|v| q.qualifying.contains(v)))
    });

    ScreenerOutcome {
        passed,
        redirect_url: if passed {
            None
        } else {
            screener.disqualify_redirect_url.clone()
        },
    }
}
