//! Integration tests for SQLite storage layer
//!
//! Tests database operations using an in-memory SQLite database.

use pretty_assertions::assert_eq;

use story_site::config::DatabaseConfig;
use story_site::content::{
    Answer, Article, Author, ContentItem, ContentKind, ContentReference, Patient, PatientStory,
    Question,
};
use story_site::storage::{
    Attribute, ContentFilter, ContentOrder, FaqCategory, FaqHighlight, RelatedChanges,
    RelatedSync, SqliteStorage, Storage, StudySession, Tag, TagCategory,
};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

fn ids(items: &[ContentItem]) -> Vec<i64> {
    items.iter().map(|i| i.id()).collect()
}

#[cfg(test)]
mod content_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_and_get_patient() {
        let storage = create_test_storage().await;

        let patient = storage
            .create_patient(&Patient::new("Riley").with_published(true))
            .await
            .unwrap();
        assert!(patient.id > 0);

        let found = storage
            .get_content(ContentReference::new(ContentKind::Patient, patient.id))
            .await
            .unwrap();
        assert_eq!(found, Some(ContentItem::Patient(patient)));
    }

    #[tokio::test]
    async fn test_get_missing_content() {
        let storage = create_test_storage().await;

        let found = storage
            .get_content(ContentReference::new(ContentKind::Article, 99))
            .await
            .unwrap();
        assert!(found.is_none(), "Should return None for missing content");
    }

    #[tokio::test]
    async fn test_answer_carries_author_name() {
        let storage = create_test_storage().await;

        let question = storage
            .create_question(&Question::new("When did you get diagnosed?"))
            .await
            .unwrap();
        let author = storage
            .create_author(&Author::new("Dr. Lee").as_provider())
            .await
            .unwrap();
        let answer = storage
            .create_answer(
                &Answer::new(question.id)
                    .with_author(&author)
                    .with_text("It varies."),
            )
            .await
            .unwrap();

        assert_eq!(answer.author_name.as_deref(), Some("Dr. Lee"));
        assert_eq!(answer.author_id, Some(author.id));

        let anonymous = storage
            .create_answer(&Answer::new(question.id))
            .await
            .unwrap();
        assert_eq!(anonymous.author_name, None);
    }

    #[tokio::test]
    async fn test_query_published_only() {
        let storage = create_test_storage().await;

        let visible = storage
            .create_patient(&Patient::new("Visible").with_published(true))
            .await
            .unwrap();
        storage
            .create_patient(&Patient::new("Hidden"))
            .await
            .unwrap();

        let all = storage
            .query_content(ContentKind::Patient, &ContentFilter::all())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let published = storage
            .query_content(ContentKind::Patient, &ContentFilter::published())
            .await
            .unwrap();
        assert_eq!(ids(&published), vec![visible.id]);
    }

    #[tokio::test]
    async fn test_query_by_parent_and_order() {
        let storage = create_test_storage().await;

        let patient = storage
            .create_patient(&Patient::new("Casey").with_published(true))
            .await
            .unwrap();
        let other = storage
            .create_patient(&Patient::new("Drew").with_published(true))
            .await
            .unwrap();

        let second = storage
            .create_patient_story(&PatientStory::new(patient.id, "After").with_order(20))
            .await
            .unwrap();
        let first = storage
            .create_patient_story(&PatientStory::new(patient.id, "Before").with_order(10))
            .await
            .unwrap();
        storage
            .create_patient_story(&PatientStory::new(other.id, "Elsewhere"))
            .await
            .unwrap();

        let stories = storage
            .query_content(
                ContentKind::PatientStory,
                &ContentFilter::published()
                    .with_parent(patient.id)
                    .ordered_by(ContentOrder::Order),
            )
            .await
            .unwrap();
        assert_eq!(ids(&stories), vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_query_top_level_articles() {
        let storage = create_test_storage().await;

        let parent = storage
            .create_article(&Article::new("Living with CF").with_order(20))
            .await
            .unwrap();
        let other = storage
            .create_article(&Article::new("Nutrition").with_order(10))
            .await
            .unwrap();
        storage
            .create_article(&Article::new("Enzymes").with_parent(parent.id))
            .await
            .unwrap();

        let top = storage
            .query_content(
                ContentKind::Article,
                &ContentFilter::published()
                    .top_level()
                    .ordered_by(ContentOrder::Order),
            )
            .await
            .unwrap();
        assert_eq!(ids(&top), vec![other.id, parent.id]);

        let by_title = storage
            .query_content(
                ContentKind::Article,
                &ContentFilter::all().ordered_by(ContentOrder::Title),
            )
            .await
            .unwrap();
        assert_eq!(by_title.len(), 3);
        match &by_title[0] {
            ContentItem::Article(a) => assert_eq!(a.title, "Enzymes"),
            other => panic!("expected article, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_content() {
        let storage = create_test_storage().await;

        let question = storage
            .create_question(&Question::new("Is it contagious?"))
            .await
            .unwrap();
        let reference = ContentReference::new(ContentKind::Question, question.id);

        storage.delete_content(reference).await.unwrap();
        assert!(storage.get_content(reference).await.unwrap().is_none());
    }
}

#[cfg(test)]
mod attribute_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_patient_attributes_are_upserted_and_filtered() {
        let storage = create_test_storage().await;

        let patient = storage
            .create_patient(&Patient::new("Morgan").with_published(true))
            .await
            .unwrap();
        let age = storage
            .create_attribute(&Attribute::new("Age").with_order(1))
            .await
            .unwrap();
        let secret = storage
            .create_attribute(&Attribute::new("Internal note").with_published(false))
            .await
            .unwrap();

        storage
            .set_patient_attribute(patient.id, age.id, "44", 0)
            .await
            .unwrap();
        storage
            .set_patient_attribute(patient.id, age.id, "45 yrs", 0)
            .await
            .unwrap();
        storage
            .set_patient_attribute(patient.id, secret.id, "hidden", 1)
            .await
            .unwrap();

        let attributes = storage.get_patient_attributes(&[patient.id]).await.unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].value, "45 yrs");
        assert_eq!(attributes[0].key(), "age");

        assert!(storage.get_patient_attributes(&[]).await.unwrap().is_empty());
    }
}

#[cfg(test)]
mod tag_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_tag_content_is_idempotent() {
        let storage = create_test_storage().await;

        let tag = storage.create_tag(&Tag::new("Red")).await.unwrap();
        let reference = ContentReference::new(ContentKind::Patient, 1);

        storage.tag_content(tag.id, reference).await.unwrap();
        storage.tag_content(tag.id, reference).await.unwrap();

        assert_eq!(
            storage.get_tagged_references(tag.id).await.unwrap(),
            vec![reference]
        );
        assert_eq!(storage.get_content_tags(reference).await.unwrap(), vec![tag]);
    }

    #[tokio::test]
    async fn test_deleting_category_detaches_tags() {
        let storage = create_test_storage().await;

        let category = storage
            .create_tag_category(&TagCategory::new("Color"))
            .await
            .unwrap();
        let tag = storage
            .create_tag(&Tag::new("Blue").with_category(category.id))
            .await
            .unwrap();

        storage.delete_tag_category(category.id).await.unwrap();

        let tags = storage.get_tags().await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].id, tag.id);
        assert_eq!(tags[0].category_id, None);
        assert!(storage.get_tag_categories().await.unwrap().is_empty());
    }
}

#[cfg(test)]
mod related_list_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let storage = create_test_storage().await;

        let first = storage.get_or_create_related_list("question-1").await.unwrap();
        let second = storage.get_or_create_related_list("question-1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_insert_assigns_count_based_order() {
        let storage = create_test_storage().await;
        let list = storage.get_or_create_related_list("homepage").await.unwrap();

        let changes = RelatedChanges {
            insert: vec![
                ContentReference::new(ContentKind::Article, 1),
                ContentReference::new(ContentKind::Patient, 2),
                ContentReference::new(ContentKind::Article, 1),
            ],
            ..Default::default()
        };
        storage.apply_related_changes(list.id, &changes).await.unwrap();

        let items = storage.get_related_items(list.id).await.unwrap();
        let orders: Vec<i64> = items.iter().map(|i| i.order).collect();
        assert_eq!(orders, vec![10, 20]);
    }

    #[tokio::test]
    async fn test_deleting_list_cascades_items() {
        let storage = create_test_storage().await;
        let list = storage.get_or_create_related_list("homepage").await.unwrap();

        let changes = RelatedChanges {
            insert: vec![ContentReference::new(ContentKind::Question, 3)],
            ..Default::default()
        };
        storage.apply_related_changes(list.id, &changes).await.unwrap();
        storage.delete_related_list(list.id).await.unwrap();

        assert!(storage.get_related_items(list.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_diffs_against_stored_members() {
        let storage = create_test_storage().await;
        let list = storage.get_or_create_related_list("homepage").await.unwrap();
        let a = ContentReference::new(ContentKind::Article, 1);
        let b = ContentReference::new(ContentKind::Article, 2);
        let c = ContentReference::new(ContentKind::Article, 3);

        let diff = storage
            .sync_related_items(list.id, &RelatedSync::Replace(vec![a, b]))
            .await
            .unwrap();
        assert_eq!(diff.added, vec![a, b]);

        let diff = storage
            .sync_related_items(list.id, &RelatedSync::Replace(vec![b, c]))
            .await
            .unwrap();
        assert_eq!(diff.removed, vec![a]);
        assert_eq!(diff.added, vec![c]);

        let diff = storage
            .sync_related_items(list.id, &RelatedSync::Reorder(vec![c, a, b]))
            .await
            .unwrap();
        assert_eq!(diff.ignored, vec![a]);

        let items = storage.get_related_items(list.id).await.unwrap();
        let positions: Vec<(ContentReference, i64)> =
            items.iter().map(|i| (i.reference, i.order)).collect();
        assert_eq!(positions, vec![(c, 10), (b, 20)]);
    }
}

#[cfg(test)]
mod faq_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_category_without_order_gets_next_step() {
        let storage = create_test_storage().await;

        let first = storage
            .create_faq_category(&FaqCategory::new("Diagnosis"))
            .await
            .unwrap();
        let pinned = storage
            .create_faq_category(&FaqCategory::new("Pinned").with_order(5))
            .await
            .unwrap();
        let third = storage
            .create_faq_category(&FaqCategory::new("Treatment"))
            .await
            .unwrap();
        assert_eq!(first.order, 10);
        assert_eq!(pinned.order, 5);
        assert_eq!(third.order, 30);

        let names: Vec<String> = storage
            .get_faq_categories(false)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Pinned", "Diagnosis", "Treatment"]);
        assert_eq!(
            storage.get_faq_category(first.id).await.unwrap(),
            Some(first)
        );
        assert_eq!(storage.get_faq_category(999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_readding_question_updates_its_position() {
        let storage = create_test_storage().await;
        let category = storage
            .create_faq_category(&FaqCategory::new("Diagnosis"))
            .await
            .unwrap();
        let one = storage.create_question(&Question::new("One")).await.unwrap();
        let two = storage.create_question(&Question::new("Two")).await.unwrap();

        storage.add_question_to_category(category.id, one.id, 1).await.unwrap();
        storage.add_question_to_category(category.id, two.id, 2).await.unwrap();
        storage.add_question_to_category(category.id, one.id, 3).await.unwrap();

        let texts: Vec<String> = storage
            .get_category_questions(category.id)
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.text)
            .collect();
        assert_eq!(texts, vec!["Two", "One"]);
    }

    #[tokio::test]
    async fn test_deleting_question_drops_memberships_and_highlights() {
        let storage = create_test_storage().await;
        let category = storage
            .create_faq_category(&FaqCategory::new("Diagnosis"))
            .await
            .unwrap();
        let question = storage.create_question(&Question::new("Gone")).await.unwrap();
        storage
            .add_question_to_category(category.id, question.id, 1)
            .await
            .unwrap();
        storage
            .create_faq_highlight(&FaqHighlight::new(question.id).with_content("Note"))
            .await
            .unwrap();

        storage
            .delete_content(ContentReference::new(ContentKind::Question, question.id))
            .await
            .unwrap();

        assert!(storage.get_category_questions(category.id).await.unwrap().is_empty());
        assert!(storage.get_faq_highlights(question.id).await.unwrap().is_empty());
    }
}

#[cfg(test)]
mod study_session_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_and_get_study_session() {
        let storage = create_test_storage().await;

        let session = storage
            .create_study_session(&StudySession::new(Some("teen".to_string()), true, true))
            .await
            .unwrap();
        assert!(session.id > 0);

        let found = storage.get_study_session(session.id).await.unwrap().unwrap();
        assert_eq!(found.persona.as_deref(), Some("teen"));
        assert!(found.high_agency_version);
        assert!(found.integrated_content_version);
        assert_eq!(found.start.timestamp(), session.start.timestamp());
    }

    #[tokio::test]
    async fn test_sessions_are_never_reused() {
        let storage = create_test_storage().await;

        let a = storage
            .create_study_session(&StudySession::new(None, false, false))
            .await
            .unwrap();
        let b = storage
            .create_study_session(&StudySession::new(None, false, false))
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }
}

#[cfg(test)]
mod file_backed_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_file_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("story-site.db"),
            max_connections: 2,
        };

        let patient = {
            let storage = SqliteStorage::new(&config).await.unwrap();
            storage
                .create_patient(&Patient::new("Avery").with_published(true))
                .await
                .unwrap()
        };

        let storage = SqliteStorage::new(&config).await.unwrap();
        let found = storage
            .get_content(ContentReference::new(ContentKind::Patient, patient.id))
            .await
            .unwrap();
        assert_eq!(found, Some(ContentItem::Patient(patient)));
    }
}
