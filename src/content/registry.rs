//! Capability table for content kinds.
//!
//! Each registered kind contributes a title function and a URL function.
//! Adding a kind means adding one [`KindSpec`]; nothing else branches on type.

use super::routes::UrlResolver;
use super::{ContentItem, ContentKind};

/// Display title of an item of this kind.
pub type TitleFn = fn(&ContentItem) -> String;
/// Canonical URL of an item of this kind, if it has a page.
pub type UrlFn = fn(&ContentItem, &dyn UrlResolver) -> Option<String>;

/// One row of the capability table.
#[derive(Clone, Copy)]
pub struct KindSpec {
    pub kind: ContentKind,
    pub title: TitleFn,
    pub url: UrlFn,
}

impl std::fmt::Debug for KindSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindSpec").field("kind", &self.kind).finish()
    }
}

/// Registered content kinds.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    specs: Vec<KindSpec>,
}

impl KindRegistry {
    /// A registry with no kinds; every lookup fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All five site kinds.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(KindSpec {
            kind: ContentKind::Patient,
            title: patient_title,
            url: patient_url,
        });
        registry.register(KindSpec {
            kind: ContentKind::PatientStory,
            title: story_title,
            url: story_url,
        });
        registry.register(KindSpec {
            kind: ContentKind::Question,
            title: question_title,
            url: question_url,
        });
        registry.register(KindSpec {
            kind: ContentKind::Answer,
            title: answer_title,
            url: no_url,
        });
        registry.register(KindSpec {
            kind: ContentKind::Article,
            title: article_title,
            url: article_url,
        });
        registry
    }

    /// Register a kind, replacing any previous entry for it.
    pub fn register(&mut self, spec: KindSpec) {
        self.specs.retain(|s| s.kind != spec.kind);
        self.specs.push(spec);
    }

    pub fn get(&self, kind: ContentKind) -> Option<&KindSpec> {
        self.specs.iter().find(|s| s.kind == kind)
    }

    pub fn is_registered(&self, kind: ContentKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn kinds(&self) -> impl Iterator<Item = ContentKind> + '_ {
        self.specs.iter().map(|s| s.kind)
    }
}

fn patient_title(item: &ContentItem) -> String {
    match item {
        ContentItem::Patient(p) => p.name.clone(),
        _ => String::new(),
    }
}

fn story_title(item: &ContentItem) -> String {
    match item {
        ContentItem::PatientStory(s) => s.title.clone(),
        _ => String::new(),
    }
}

fn question_title(item: &ContentItem) -> String {
    match item {
        ContentItem::Question(q) => q.text.clone(),
        _ => String::new(),
    }
}

fn answer_title(item: &ContentItem) -> String {
    match item {
        ContentItem::Answer(a) => a
            .author_name
            .clone()
            .unwrap_or_else(|| "Anonymous".to_string()),
        _ => String::new(),
    }
}

fn article_title(item: &ContentItem) -> String {
    match item {
        ContentItem::Article(a) => a.title.clone(),
        _ => String::new(),
    }
}

fn patient_url(item: &ContentItem, routes: &dyn UrlResolver) -> Option<String> {
    routes.reverse("patient-story", &[("patient_id", item.id().to_string())])
}

fn story_url(item: &ContentItem, routes: &dyn UrlResolver) -> Option<String> {
    match item {
        ContentItem::PatientStory(s) => routes.reverse(
            "patient-story-detail",
            &[
                ("patient_id", s.patient_id.to_string()),
                ("story_id", s.id.to_string()),
            ],
        ),
        _ => None,
    }
}

fn question_url(item: &ContentItem, routes: &dyn UrlResolver) -> Option<String> {
    routes.reverse("website-faq", &[("question_id", item.id().to_string())])
}

fn article_url(item: &ContentItem, routes: &dyn UrlResolver) -> Option<String> {
    routes.reverse(
        "website-resource-article",
        &[("article_id", item.id().to_string())],
    )
}

fn no_url(_item: &ContentItem, _routes: &dyn UrlResolver) -> Option<String> {
    None
}
