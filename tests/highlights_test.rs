//! Integration tests for study-session highlights.

use pretty_assertions::assert_eq;
use serde_json::json;

use story_site::highlights::{HighlightInput, MAX_HIGHLIGHT_CHARS};
use story_site::storage::{SqliteStorage, Storage};
use story_site::study::{MemorySessionStore, SessionStore, StudyVariant, STUDY_SESSION_ID_KEY};
use story_site::{AppError, AppState, Config};

async fn create_test_state() -> AppState {
    let storage = SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage");
    AppState::new(Config::default(), storage)
}

async fn study_session(state: &AppState) -> MemorySessionStore {
    let session = MemorySessionStore::new();
    state
        .study
        .assign_variant(&session, Some("parent"), StudyVariant::new(false, true))
        .await
        .unwrap();
    session
}

fn input(text: &str, content: &str) -> HighlightInput {
    HighlightInput {
        text: text.to_string(),
        content_id: "story-body".to_string(),
        content: content.to_string(),
    }
}

fn validation_fields(err: AppError) -> Vec<String> {
    match err {
        AppError::Validation { errors } => errors.into_iter().map(|e| e.field).collect(),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_requires_active_study_session() {
    let state = create_test_state().await;

    let anonymous = MemorySessionStore::new();
    let err = state.highlights.create(&anonymous).await.unwrap_err();
    assert_eq!(validation_fields(err), vec![STUDY_SESSION_ID_KEY]);

    let dangling = MemorySessionStore::new();
    dangling.set(STUDY_SESSION_ID_KEY, json!(4242));
    let err = state.highlights.create(&dangling).await.unwrap_err();
    assert_eq!(validation_fields(err), vec![STUDY_SESSION_ID_KEY]);
}

#[tokio::test]
async fn test_create_starts_empty_highlight() {
    let state = create_test_state().await;
    let session = study_session(&state).await;

    let highlight = state.highlights.create(&session).await.unwrap();
    assert_eq!(highlight.text, None);
    assert_eq!(highlight.content_id, None);
    assert!(!highlight.deleted);

    let fetched = state.highlights.get(highlight.id).await.unwrap();
    assert_eq!(fetched.session_id, highlight.session_id);
}

#[tokio::test]
async fn test_update_truncates_text_and_links_content() {
    let state = create_test_state().await;
    let session = study_session(&state).await;
    let highlight = state.highlights.create(&session).await.unwrap();

    let long_text = "é".repeat(MAX_HIGHLIGHT_CHARS + 50);
    let updated = state
        .highlights
        .update(highlight.id, &input(&long_text, "<p>one</p>"))
        .await
        .unwrap();

    let text = updated.text.clone().unwrap();
    assert_eq!(text.chars().count(), MAX_HIGHLIGHT_CHARS);

    let content_id = updated.content_id.expect("content linked");
    let content = state
        .storage
        .get_highlighted_content(content_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(content.content_id, "story-body");
    assert_eq!(content.content.as_deref(), Some("<p>one</p>"));
    assert_eq!(state.highlights.get(highlight.id).await.unwrap().text, Some(text));
}

#[tokio::test]
async fn test_highlights_on_same_region_share_content() {
    let state = create_test_state().await;
    let session = study_session(&state).await;
    let first = state.highlights.create(&session).await.unwrap();
    let second = state.highlights.create(&session).await.unwrap();

    let first = state
        .highlights
        .update(first.id, &input("breathing", "<p>v1</p>"))
        .await
        .unwrap();
    let second = state
        .highlights
        .update(second.id, &input("clinic", "<p>v2</p>"))
        .await
        .unwrap();
    assert_eq!(first.content_id, second.content_id);

    // A later edit rewrites the already-linked snapshot.
    let again = state
        .highlights
        .update(first.id, &input("breathing exercises", "<p>v3</p>"))
        .await
        .unwrap();
    assert_eq!(again.content_id, first.content_id);

    let content = state
        .storage
        .get_highlighted_content(again.content_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(content.content.as_deref(), Some("<p>v3</p>"));
}

#[tokio::test]
async fn test_update_rejects_blank_fields() {
    let state = create_test_state().await;
    let session = study_session(&state).await;
    let highlight = state.highlights.create(&session).await.unwrap();

    let err = state
        .highlights
        .update(highlight.id, &input("", ""))
        .await
        .unwrap_err();
    assert_eq!(validation_fields(err), vec!["text", "content"]);

    let stored = state.highlights.get(highlight.id).await.unwrap();
    assert_eq!(stored.text, None);
}

#[tokio::test]
async fn test_delete_is_soft_and_refreshes_content() {
    let state = create_test_state().await;
    let session = study_session(&state).await;
    let highlight = state.highlights.create(&session).await.unwrap();
    let highlight = state
        .highlights
        .update(highlight.id, &input("breathing", "<p><mark>breathing</mark></p>"))
        .await
        .unwrap();

    state
        .highlights
        .delete(highlight.id, Some("<p>breathing</p>"))
        .await
        .unwrap();

    let stored = state.highlights.get(highlight.id).await.unwrap();
    assert!(stored.deleted);
    assert_eq!(stored.text.as_deref(), Some("breathing"));

    let content = state
        .storage
        .get_highlighted_content(highlight.content_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(content.content.as_deref(), Some("<p>breathing</p>"));
}

#[tokio::test]
async fn test_missing_highlight_is_not_found() {
    let state = create_test_state().await;

    let err = state.highlights.get(999).await.unwrap_err();
    assert!(err.is_not_found());

    let err = state
        .highlights
        .update(999, &input("text", "content"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    assert!(state.highlights.delete(999, None).await.unwrap_err().is_not_found());
}
