//! Reader highlights recorded during a study session.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult, FieldError};
use crate::storage::{Highlight, SqliteStorage, Storage};
use crate::study::{active_session_id, SessionStore, STUDY_SESSION_ID_KEY};

/// Longest stored highlight text, in characters.
pub const MAX_HIGHLIGHT_CHARS: usize = 400;

/// Body of a highlight update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightInput {
    pub text: String,
    /// Client-side id of the highlighted page region.
    pub content_id: String,
    /// Page region markup including the highlight.
    pub content: String,
}

impl HighlightInput {
    fn validate(&self) -> AppResult<()> {
        let errors: Vec<FieldError> = [
            ("text", &self.text),
            ("contentId", &self.content_id),
            ("content", &self.content),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| FieldError::new(field, "This field is required."))
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation { errors })
        }
    }
}

/// Highlight create/update/delete for the active study session.
#[derive(Clone)]
pub struct HighlightService {
    storage: SqliteStorage,
}

impl HighlightService {
    pub fn new(storage: SqliteStorage) -> Self {
        Self { storage }
    }

    /// Start an empty highlight in the visitor's study session.
    pub async fn create(&self, session: &dyn SessionStore) -> AppResult<Highlight> {
        let session_id = active_session_id(session)
            .ok_or_else(|| FieldError::new(STUDY_SESSION_ID_KEY, "No session id"))?;

        if self.storage.get_study_session(session_id).await?.is_none() {
            return Err(FieldError::new(STUDY_SESSION_ID_KEY, "Study session not found").into());
        }

        let highlight = self.storage.create_highlight(session_id).await?;
        info!(highlight_id = highlight.id, study_session_id = session_id, "Created highlight");
        Ok(highlight)
    }

    pub async fn get(&self, id: i64) -> AppResult<Highlight> {
        self.storage
            .get_highlight(id)
            .await?
            .ok_or_else(|| AppError::not_found("Highlight", id))
    }

    /// Store the highlight text and the page snapshot it belongs to.
    pub async fn update(&self, id: i64, input: &HighlightInput) -> AppResult<Highlight> {
        let mut highlight = self.get(id).await?;
        input.validate()?;

        highlight.text = Some(input.text.chars().take(MAX_HIGHLIGHT_CHARS).collect());
        highlight.updated_at = Utc::now();

        match highlight.content_id {
            Some(content_id) => {
                self.storage
                    .update_highlighted_content(content_id, &input.content)
                    .await?;
            }
            None => {
                let content = self
                    .storage
                    .get_or_create_highlighted_content(highlight.session_id, &input.content_id)
                    .await?;
                self.storage
                    .update_highlighted_content(content.id, &input.content)
                    .await?;
                highlight.content_id = Some(content.id);
            }
        }

        self.storage.update_highlight(&highlight).await?;
        info!(highlight_id = id, "Updated highlight");
        Ok(highlight)
    }

    /// Soft-delete a highlight, refreshing its snapshot when given one.
    pub async fn delete(&self, id: i64, content: Option<&str>) -> AppResult<()> {
        let mut highlight = self.get(id).await?;

        if let (Some(content), Some(content_id)) = (content, highlight.content_id) {
            self.storage
                .update_highlighted_content(content_id, content)
                .await?;
        }

        highlight.deleted = true;
        highlight.updated_at = Utc::now();
        self.storage.update_highlight(&highlight).await?;

        info!(highlight_id = id, "Deleted highlight");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_validation_reports_each_blank_field() {
        let input = HighlightInput {
            text: "  ".to_string(),
            content_id: "story-3".to_string(),
            content: String::new(),
        };
        match input.validate() {
            Err(AppError::Validation { errors }) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["text", "content"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_input_uses_client_field_names() {
        let input: HighlightInput = serde_json::from_str(
            r#"{"text": "breathing", "contentId": "story-3", "content": "<p>...</p>"}"#,
        )
        .unwrap();
        assert_eq!(input.content_id, "story-3");
        assert!(input.validate().is_ok());
    }
}
