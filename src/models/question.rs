// src/models/question.rs

use serde::{Deserialize, Serialize};

fn default_marks() -> i32 {
    4
}

fn default_negative_marks() -> i32 {
    -1
}

/// One selectable option of a multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Short stable id, e.g. "A".
    pub id: String,
    pub text: String,
}

/// A question inside a test's bank snapshot, as produced by the extraction
/// pipeline and validated at the bank boundary.
///
/// `negative_marks` is stored signed: the value added to the total on a
/// wrong answer (typically -1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<ChoiceOption>,
    pub correct_option: String,
    #[serde(default = "default_marks")]
    pub marks: i32,
    #[serde(default = "default_negative_marks")]
    pub negative_marks: i32,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Question {
    /// Looks up an option by id.
    pub fn option(&self, option_id: &str) -> Option<&ChoiceOption> {
        self.options.iter().find(|o| o.id == option_id)
    }
}

/// DTO for sending a question to a test-taker.
/// Excludes the correct option, hint and explanation.
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<ChoiceOption>,
    pub marks: i32,
    pub negative_marks: i32,
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub has_hint: bool,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            text: q.text.clone(),
            options: q.options.clone(),
            marks: q.marks,
            negative_marks: q.negative_marks,
            subject: q.subject.clone(),
            topic: q.topic.clone(),
            has_hint: q.hint.is_some(),
        }
    }
}
