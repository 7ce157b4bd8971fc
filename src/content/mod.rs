//! Content kinds, typed references, and the entity records the site serves.
//!
//! Every piece of content belongs to one of a closed set of kinds. A
//! [`ContentReference`] addresses any of them uniformly through the string key
//! `"{kind}-{id}"`, which is what related lists and tag rows store.

mod registry;
mod resolver;
mod routes;
mod slug;

pub use registry::{KindRegistry, KindSpec, TitleFn, UrlFn};
pub use resolver::IdentityResolver;
pub use routes::{RouteTable, UrlResolver};
pub use slug::slugify;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of content kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// A patient profile.
    Patient,
    /// A story told by a patient.
    PatientStory,
    /// A frequently asked question.
    Question,
    /// An answer to a question.
    Answer,
    /// A resource library article.
    Article,
}

impl ContentKind {
    /// All kinds, in registration order.
    pub const ALL: [ContentKind; 5] = [
        ContentKind::Patient,
        ContentKind::PatientStory,
        ContentKind::Question,
        ContentKind::Answer,
        ContentKind::Article,
    ];

    /// Tag used in reference keys and stored kind columns.
    ///
    /// Tags never contain `-`, since the reference key splits on the first one.
    pub fn tag(&self) -> &'static str {
        match self {
            ContentKind::Patient => "patient",
            ContentKind::PatientStory => "patientstory",
            ContentKind::Question => "question",
            ContentKind::Answer => "answer",
            ContentKind::Article => "article",
        }
    }

    /// Human-readable kind name used in not-found messages.
    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Patient => "Patient",
            ContentKind::PatientStory => "Patient story",
            ContentKind::Question => "Question",
            ContentKind::Answer => "Answer",
            ContentKind::Article => "Article",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| format!("Unknown content kind: {}", s))
    }
}

/// Typed address of one content item: kind plus numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ContentReference {
    pub kind: ContentKind,
    pub id: i64,
}

impl ContentReference {
    pub fn new(kind: ContentKind, id: i64) -> Self {
        Self { kind, id }
    }

    /// Parse a `"{kind}-{id}"` key.
    ///
    /// Splits on the first `-`. Anything that is not a known kind followed by
    /// a positive integer yields `None`.
    pub fn parse(key: &str) -> Option<Self> {
        let (tag, id) = key.split_once('-')?;
        let kind = tag.parse::<ContentKind>().ok()?;
        let id = id.parse::<i64>().ok().filter(|id| *id > 0)?;
        Some(Self { kind, id })
    }
}

impl fmt::Display for ContentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.tag(), self.id)
    }
}

impl From<ContentReference> for String {
    fn from(reference: ContentReference) -> Self {
        reference.to_string()
    }
}

impl TryFrom<String> for ContentReference {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ContentReference::parse(&value).ok_or_else(|| format!("Invalid content reference: {}", value))
    }
}

/// A patient profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub published: bool,
}

/// One story belonging to a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientStory {
    pub id: i64,
    pub patient_id: i64,
    pub title: String,
    pub order: i64,
    pub published: bool,
    pub content: Option<String>,
}

/// A frequently asked question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub published: bool,
}

/// Author of answers; optionally a patient, optionally a care provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub provider: bool,
    pub patient_id: Option<i64>,
    pub description: Option<String>,
}

/// An answer to a question. `author_name` is joined in from the author row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub text: Option<String>,
    pub order: i64,
    pub published: bool,
}

/// A resource library article; children point at their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub order: i64,
    pub published: bool,
}

/// Any content entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Patient(Patient),
    PatientStory(PatientStory),
    Question(Question),
    Answer(Answer),
    Article(Article),
}

impl ContentItem {
    pub fn kind(&self) -> ContentKind {
        match self {
            ContentItem::Patient(_) => ContentKind::Patient,
            ContentItem::PatientStory(_) => ContentKind::PatientStory,
            ContentItem::Question(_) => ContentKind::Question,
            ContentItem::Answer(_) => ContentKind::Answer,
            ContentItem::Article(_) => ContentKind::Article,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            ContentItem::Patient(p) => p.id,
            ContentItem::PatientStory(s) => s.id,
            ContentItem::Question(q) => q.id,
            ContentItem::Answer(a) => a.id,
            ContentItem::Article(a) => a.id,
        }
    }

    pub fn published(&self) -> bool {
        match self {
            ContentItem::Patient(p) => p.published,
            ContentItem::PatientStory(s) => s.published,
            ContentItem::Question(q) => q.published,
            ContentItem::Answer(a) => a.published,
            ContentItem::Article(a) => a.published,
        }
    }
}

impl AsRef<ContentItem> for ContentItem {
    fn as_ref(&self) -> &ContentItem {
        self
    }
}

impl Patient {
    /// New unpublished patient; the id is assigned on insert.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            published: false,
        }
    }

    pub fn with_published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }
}

impl PatientStory {
    pub fn new(patient_id: i64, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            patient_id,
            title: title.into(),
            order: 0,
            published: true,
            content: None,
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

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

impl Question {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: 0,
            text: text.into(),
            published: true,
        }
    }

    pub fn with_published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            provider: false,
            patient_id: None,
            description: None,
        }
    }

    pub fn as_provider(mut self) -> Self {
        self.provider = true;
        self
    }

    pub fn with_patient(mut self, patient_id: i64) -> Self {
        self.patient_id = Some(patient_id);
        self
    }
}

impl Answer {
    pub fn new(question_id: i64) -> Self {
        Self {
            id: 0,
            question_id,
            author_id: None,
            author_name: None,
            text: None,
            order: 0,
            published: true,
        }
    }

    pub fn with_author(mut self, author: &Author) -> Self {
        self.author_id = Some(author.id);
        self.author_name = Some(author.name.clone());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
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

impl Article {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: 0,
            parent_id: None,
            title: title.into(),
            description: None,
            content: None,
            order: 0,
            published: true,
        }
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
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
