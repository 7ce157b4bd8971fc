//! Storage layer for site content and curation state.
//!
//! This module provides SQLite-based storage for content entities, patient
//! attributes, tags, related-content lists, FAQ categories, study sessions,
//! and highlights.

mod sqlite;


pub use sqlite::SqliteStorage;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{
    slugify, Answer, Article, Author, ContentItem, ContentKind, ContentReference, Patient,
    PatientStory, Question,
};
use crate::error::StorageResult;

/// Grouping for tags. Unpublished categories never produce facets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagCategory {
    /// Row identifier (0 until inserted).
    pub id: i64,
    /// Display name; its slug is the query-string key.
    pub name: String,
    /// Position among categories.
    pub order: i64,
    /// Whether the category is offered as a facet.
    pub published: bool,
}

/// A tag attachable to any content kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Row identifier (0 until inserted).
    pub id: i64,
    /// Display name; its slug is the filter value.
    pub name: String,
    /// Whether the tag is shown.
    pub published: bool,
    /// Content warning marker.
    pub warning: bool,
    /// Position within its category.
    pub order: i64,
    /// Owning category, if any.
    pub category_id: Option<i64>,
}

/// Named, ordered list of related content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedItemsList {
    /// Row identifier.
    pub id: i64,
    /// Owner reference key or a well-known list name.
    pub name: String,
}

/// One member of a related list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedItem {
    /// Row identifier.
    pub id: i64,
    /// Owning list.
    pub list_id: i64,
    /// Referenced content.
    pub reference: ContentReference,
    /// Sort position, normally a multiple of ten.
    pub order: i64,
}

/// Mutations applied to one related list inside a single transaction.
///
/// Removals run first, then reorders, then inserts. Inserted members get
/// `(member count + 1) * 10` at the time of their insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelatedChanges {
    /// Related item ids to delete.
    pub remove: Vec<i64>,
    /// `(related item id, new order)` pairs.
    pub reorder: Vec<(i64, i64)>,
    /// References to append.
    pub insert: Vec<ContentReference>,
}

impl RelatedChanges {
    /// True when applying would change nothing.
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.reorder.is_empty() && self.insert.is_empty()
    }
}

/// Spacing between consecutive related-list positions.
pub const ORDER_STEP: i64 = 10;

/// Desired state of a related list. It is diffed against the current members
/// inside the same transaction that writes the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelatedSync {
    /// Membership becomes exactly these references. Members that stay keep
    /// their row and order; new ones are appended.
    Replace(Vec<ContentReference>),
    /// Members are re-sequenced in this order and omitted members removed.
    /// References that are not members are ignored.
    Reorder(Vec<ContentReference>),
}

/// What a [`RelatedSync`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelatedDiff {
    pub added: Vec<ContentReference>,
    pub removed: Vec<ContentReference>,
    pub reordered: Vec<ContentReference>,
    /// Reorder targets that were not members.
    pub ignored: Vec<ContentReference>,
}

impl RelatedSync {
    /// Changes that bring `members` to this state. Repeated references count once.
    pub fn plan(&self, members: &[RelatedItem]) -> (RelatedChanges, RelatedDiff) {
        let mut changes = RelatedChanges::default();
        let mut diff = RelatedDiff::default();
        let mut seen = HashSet::new();

        match self {
            RelatedSync::Replace(references) => {
                let desired: Vec<ContentReference> = references
                    .iter()
                    .copied()
                    .filter(|r| seen.insert(*r))
                    .collect();
                let current: HashSet<ContentReference> =
                    members.iter().map(|m| m.reference).collect();

                for member in members.iter().filter(|m| !seen.contains(&m.reference)) {
                    changes.remove.push(member.id);
                    diff.removed.push(member.reference);
                }
                for reference in desired.into_iter().filter(|r| !current.contains(r)) {
                    changes.insert.push(reference);
                    diff.added.push(reference);
                }
            }
            RelatedSync::Reorder(references) => {
                let by_reference: HashMap<ContentReference, &RelatedItem> =
                    members.iter().map(|m| (m.reference, m)).collect();

                let mut retained = Vec::new();
                for reference in references {
                    match by_reference.get(reference) {
                        Some(member) => {
                            if seen.insert(*reference) {
                                retained.push(*member);
                            }
                        }
                        None => diff.ignored.push(*reference),
                    }
                }

                for member in members.iter().filter(|m| !seen.contains(&m.reference)) {
                    changes.remove.push(member.id);
                    diff.removed.push(member.reference);
                }
                for (index, member) in retained.into_iter().enumerate() {
                    let order = (index as i64 + 1) * ORDER_STEP;
                    if member.order != order {
                        changes.reorder.push((member.id, order));
                        diff.reordered.push(member.reference);
                    }
                }
            }
        }

        (changes, diff)
    }
}

/// A persisted study-variant assignment. Rows are never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySession {
    /// Row identifier (0 until inserted).
    pub id: i64,
    /// Persona label chosen by the researcher.
    pub persona: Option<String>,
    /// High-agency axis.
    pub high_agency_version: bool,
    /// Integrated-content axis.
    pub integrated_content_version: bool,
    /// When the assignment was made.
    pub start: DateTime<Utc>,
}

/// A reader highlight made during a study session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    /// Row identifier.
    pub id: i64,
    /// Owning study session.
    pub session_id: i64,
    /// Snapshot of the highlighted page content.
    pub content_id: Option<i64>,
    /// Highlighted text.
    pub text: Option<String>,
    /// Soft-delete marker.
    pub deleted: bool,
    /// When the highlight was created.
    pub created_at: DateTime<Utc>,
    /// When the highlight was last changed.
    pub updated_at: DateTime<Utc>,
}

/// Page content snapshot shared by the highlights of one session and page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightedContent {
    /// Row identifier.
    pub id: i64,
    /// Owning study session.
    pub session_id: i64,
    /// Client-side identifier of the page region.
    pub content_id: String,
    /// Serialized content with highlight markup.
    pub content: Option<String>,
}

/// A named patient attribute such as "Age".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Row identifier (0 until inserted).
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Position among attributes.
    pub order: i64,
    /// Whether values are exposed.
    pub published: bool,
}

/// One attribute value of one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientAttribute {
    /// Owning patient.
    pub patient_id: i64,
    /// Attribute row.
    pub attribute_id: i64,
    /// Attribute display name.
    pub name: String,
    /// Free-text value, e.g. "45 yrs".
    pub value: String,
    /// Position on the patient's profile.
    pub order: i64,
}

/// A group of questions on the FAQ page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqCategory {
    /// Row identifier (0 until inserted).
    pub id: i64,
    pub name: String,
    /// Position among categories; 0 asks storage to append.
    pub order: i64,
    pub published: bool,
}

/// Short callout shown with a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqHighlight {
    pub id: i64,
    pub question_id: i64,
    pub title: Option<String>,
    pub content: Option<String>,
    pub order: i64,
    pub published: bool,
}

/// Which rows `query_content` returns, and in what order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentFilter {
    /// Only rows with `published = true`.
    pub published_only: bool,
    /// Foreign-key membership filter.
    pub parent: ParentFilter,
    /// Ordering key; ties break by id.
    pub order_by: ContentOrder,
}

/// Foreign-key filter: patient for stories, question for answers, parent
/// article for articles. Ignored for kinds without a parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParentFilter {
    /// No restriction.
    #[default]
    Any,
    /// Rows without a parent.
    TopLevel,
    /// Rows under the given parent id.
    Parent(i64),
}

/// Ordering key for content queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentOrder {
    /// Display title (name, title, question text, author name).
    Title,
    /// Manual order field; kinds without one fall back to title.
    Order,
    /// Insertion order.
    #[default]
    Id,
}

impl TagCategory {
    /// Create a new published category.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            order: 0,
            published: true,
        }
    }

    /// Set the order.
    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    /// Set the published flag.
    pub fn with_published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }

    /// Query-string key for this category.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

impl Tag {
    /// Create a new published, uncategorized tag.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            published: true,
            warning: false,
            order: 0,
            category_id: None,
        }
    }

    /// Place the tag in a category.
    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Set the order.
    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    /// Set the published flag.
    pub fn with_published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }

    /// Mark as a content warning.
    pub fn as_warning(mut self) -> Self {
        self.warning = true;
        self
    }

    /// Filter value for this tag.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

impl StudySession {
    /// Create a new session record for the given variant.
    pub fn new(persona: Option<String>, high_agency: bool, integrated_content: bool) -> Self {
        Self {
            id: 0,
            persona,
            high_agency_version: high_agency,
            integrated_content_version: integrated_content,
            start: Utc::now(),
        }
    }
}

impl Attribute {
    /// Create a new published attribute.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            order: 0,
            published: true,
        }
    }

    /// Set the order.
    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    /// Set the published flag.
    pub fn with_published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }

    /// Sort key for this attribute.
    pub fn key(&self) -> String {
        slugify(&self.name)
    }
}

impl PatientAttribute {
    /// Sort key of the attribute this value belongs to.
    pub fn key(&self) -> String {
        slugify(&self.name)
    }
}

impl FaqCategory {
    /// Create a new published category placed after the existing ones.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            order: 0,
            published: true,
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn with_published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }
}

impl FaqHighlight {
    pub fn new(question_id: i64) -> Self {
        Self {
            id: 0,
            question_id,
            title: None,
            content: None,
            order: 0,
            published: true,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn with_published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }
}

impl ContentFilter {
    /// Every row, in id order.
    pub fn all() -> Self {
        Self::default()
    }

    /// Published rows only.
    pub fn published() -> Self {
        Self {
            published_only: true,
            ..Self::default()
        }
    }

    /// Restrict to children of `parent_id`.
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent = ParentFilter::Parent(parent_id);
        self
    }

    /// Restrict to rows without a parent.
    pub fn top_level(mut self) -> Self {
        self.parent = ParentFilter::TopLevel;
        self
    }

    /// Set the ordering key.
    pub fn ordered_by(mut self, order_by: ContentOrder) -> Self {
        self.order_by = order_by;
        self
    }
}

/// Storage trait for database operations.
///
/// This trait is the entity store the content engine reads from, plus the
/// curation state it owns: tags, related lists, study sessions, highlights.
#[async_trait]
pub trait Storage: Send + Sync {
    // Content entities

    /// Insert a patient; returns it with its id.
    async fn create_patient(&self, patient: &Patient) -> StorageResult<Patient>;
    /// Insert a patient story; returns it with its id.
    async fn create_patient_story(&self, story: &PatientStory) -> StorageResult<PatientStory>;
    /// Insert a question; returns it with its id.
    async fn create_question(&self, question: &Question) -> StorageResult<Question>;
    /// Insert an author; returns it with its id.
    async fn create_author(&self, author: &Author) -> StorageResult<Author>;
    /// Insert an answer; returns it with its id and author name.
    async fn create_answer(&self, answer: &Answer) -> StorageResult<Answer>;
    /// Insert an article; returns it with its id.
    async fn create_article(&self, article: &Article) -> StorageResult<Article>;
    /// Look up one entity by kind and id.
    async fn get_content(&self, reference: ContentReference) -> StorageResult<Option<ContentItem>>;
    /// List entities of one kind.
    async fn query_content(
        &self,
        kind: ContentKind,
        filter: &ContentFilter,
    ) -> StorageResult<Vec<ContentItem>>;
    /// Delete one entity. References to it elsewhere are left in place.
    async fn delete_content(&self, reference: ContentReference) -> StorageResult<()>;

    // Patient attributes

    /// Insert an attribute definition.
    async fn create_attribute(&self, attribute: &Attribute) -> StorageResult<Attribute>;
    /// Set (insert or overwrite) a patient's value for an attribute.
    async fn set_patient_attribute(
        &self,
        patient_id: i64,
        attribute_id: i64,
        value: &str,
        order: i64,
    ) -> StorageResult<()>;
    /// Published attribute values of the given patients, by patient then order.
    async fn get_patient_attributes(
        &self,
        patient_ids: &[i64],
    ) -> StorageResult<Vec<PatientAttribute>>;

    // Tags

    /// Insert a tag category.
    async fn create_tag_category(&self, category: &TagCategory) -> StorageResult<TagCategory>;
    /// Delete a category; its tags become uncategorized.
    async fn delete_tag_category(&self, id: i64) -> StorageResult<()>;
    /// All categories by order.
    async fn get_tag_categories(&self) -> StorageResult<Vec<TagCategory>>;
    /// Insert a tag.
    async fn create_tag(&self, tag: &Tag) -> StorageResult<Tag>;
    /// All tags by order.
    async fn get_tags(&self) -> StorageResult<Vec<Tag>>;
    /// Attach a tag to a content item. Attaching twice is a no-op.
    async fn tag_content(&self, tag_id: i64, reference: ContentReference) -> StorageResult<()>;
    /// Tags attached to a content item, in attachment order.
    async fn get_content_tags(&self, reference: ContentReference) -> StorageResult<Vec<Tag>>;
    /// Content items carrying a tag.
    async fn get_tagged_references(&self, tag_id: i64) -> StorageResult<Vec<ContentReference>>;

    // Related lists

    /// Fetch the list with this name, creating it when absent.
    async fn get_or_create_related_list(&self, name: &str) -> StorageResult<RelatedItemsList>;
    /// Members of a list by order, then id.
    async fn get_related_items(&self, list_id: i64) -> StorageResult<Vec<RelatedItem>>;
    /// Apply removals, reorders and inserts in one transaction.
    async fn apply_related_changes(
        &self,
        list_id: i64,
        changes: &RelatedChanges,
    ) -> StorageResult<()>;
    /// Read, diff and write a list in one transaction that holds the write
    /// lock from its first statement, so overlapping syncs of a list
    /// serialize and the last to commit wins.
    async fn sync_related_items(
        &self,
        list_id: i64,
        target: &RelatedSync,
    ) -> StorageResult<RelatedDiff>;
    /// Delete a list and all of its members.
    async fn delete_related_list(&self, list_id: i64) -> StorageResult<()>;

    // FAQ categories

    /// Insert a category. An order of 0 becomes `(category count + 1) * 10`.
    async fn create_faq_category(&self, category: &FaqCategory) -> StorageResult<FaqCategory>;
    /// Look up a category.
    async fn get_faq_category(&self, id: i64) -> StorageResult<Option<FaqCategory>>;
    /// Categories by order, then id.
    async fn get_faq_categories(&self, published_only: bool) -> StorageResult<Vec<FaqCategory>>;
    /// Place a question in a category. Placing it again updates its order.
    async fn add_question_to_category(
        &self,
        category_id: i64,
        question_id: i64,
        order: i64,
    ) -> StorageResult<()>;
    /// Questions of a category by membership order.
    async fn get_category_questions(&self, category_id: i64) -> StorageResult<Vec<Question>>;
    /// Insert a question highlight.
    async fn create_faq_highlight(&self, highlight: &FaqHighlight) -> StorageResult<FaqHighlight>;
    /// Published highlights of a question by order.
    async fn get_faq_highlights(&self, question_id: i64) -> StorageResult<Vec<FaqHighlight>>;

    // Study sessions

    /// Insert a study session; returns it with its id.
    async fn create_study_session(&self, session: &StudySession) -> StorageResult<StudySession>;
    /// Look up a study session.
    async fn get_study_session(&self, id: i64) -> StorageResult<Option<StudySession>>;
    /// Delete a study session and its highlights.
    async fn delete_study_session(&self, id: i64) -> StorageResult<()>;

    // Highlights

    /// Insert an empty highlight for a study session.
    async fn create_highlight(&self, session_id: i64) -> StorageResult<Highlight>;
    /// Look up a highlight.
    async fn get_highlight(&self, id: i64) -> StorageResult<Option<Highlight>>;
    /// Persist text, content link and deleted flag of a highlight.
    async fn update_highlight(&self, highlight: &Highlight) -> StorageResult<()>;
    /// Fetch the content snapshot for (session, content id), creating it when absent.
    async fn get_or_create_highlighted_content(
        &self,
        session_id: i64,
        content_id: &str,
    ) -> StorageResult<HighlightedContent>;
    /// Look up a content snapshot.
    async fn get_highlighted_content(&self, id: i64) -> StorageResult<Option<HighlightedContent>>;
    /// Replace the body of a content snapshot.
    async fn update_highlighted_content(&self, id: i64, content: &str) -> StorageResult<()>;
}
