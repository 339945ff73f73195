//! Loading a pack's questions.
//!
//! A pack body is a JSON document:
//!
//! ```json
//! {
//!   "title": "Capitals",
//!   "questions": [
//!     {
//!       "title": "Capital of France?",
//!       "image_url": "",
//!       "value": 100,
//!       "answers": [
//!         { "text": "Paris", "correct": true },
//!         { "text": "Lyon", "correct": false }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! It is read once, when a room is created. Editing the pack afterwards
//! doesn't affect rooms already using it.

use std::sync::Arc;

use quizhall_protocol::{PackId, QuestionView};
use quizhall_store::{Store, StoreError};
use serde::Deserialize;

/// One answer option.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Answer {
    pub text: String,
    pub correct: bool,
}

/// One question, as loaded from a pack.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Question {
    pub title: String,
    /// Empty strings in stored packs are read as "no image".
    #[serde(default, deserialize_with = "empty_as_none")]
    pub image_url: Option<String>,
    pub value: u32,
    pub answers: Vec<Answer>,
}

impl Question {
    /// Whether `index` selects a correct answer. Out-of-range is wrong.
    pub fn is_correct(&self, index: usize) -> bool {
        self.answers.get(index).is_some_and(|a| a.correct)
    }

    /// The client-facing view, without correctness flags.
    pub fn view(&self, index: usize) -> QuestionView {
        QuestionView {
            index,
            title: self.title.clone(),
            image_url: self.image_url.clone(),
            value: self.value,
            answers: self.answers.iter().map(|a| a.text.clone()).collect(),
        }
    }
}

/// Only `questions` matters here; the pack title is for the catalogue.
#[derive(Debug, Deserialize)]
struct PackDocument {
    questions: Vec<Question>,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Why a pack couldn't be loaded.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("pack not found")]
    NotFound,

    /// The stored body isn't a valid pack document.
    #[error("malformed pack: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Parses a pack body into its question sequence.
pub fn parse_pack(body: &str) -> Result<Vec<Question>, PackError> {
    let doc: PackDocument = serde_json::from_str(body).map_err(PackError::Malformed)?;
    Ok(doc.questions)
}

/// Fetches and parses packs from a [`Store`].
#[derive(Debug)]
pub struct PackLoader<S> {
    store: Arc<S>,
}

impl<S: Store> PackLoader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Loads the questions of `pack_id`.
    ///
    /// # Errors
    /// [`PackError::NotFound`] if there is no such pack,
    /// [`PackError::Malformed`] if its body doesn't parse.
    pub async fn load(&self, pack_id: PackId) -> Result<Arc<[Question]>, PackError> {
        let body = self
            .store
            .pack_body(pack_id)
            .await?
            .ok_or(PackError::NotFound)?;
        let questions = parse_pack(&body)?;
        tracing::debug!(%pack_id, questions = questions.len(), "pack loaded");
        Ok(questions.into())
    }
}
