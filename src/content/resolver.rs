use std::sync::Arc;

use tracing::debug;

use super::registry::KindRegistry;
use super::routes::UrlResolver;
use super::{ContentItem, ContentReference};
use crate::error::AppResult;
use crate::storage::{SqliteStorage, Storage};

/// Maps content items to reference keys and back, and answers polymorphic
/// title and URL questions through the kind registry.
#[derive(Clone)]
pub struct IdentityResolver {
    storage: SqliteStorage,
    registry: Arc<KindRegistry>,
    routes: Arc<dyn UrlResolver>,
}

impl IdentityResolver {
    pub fn new(
        storage: SqliteStorage,
        registry: Arc<KindRegistry>,
        routes: Arc<dyn UrlResolver>,
    ) -> Self {
        Self {
            storage,
            registry,
            routes,
        }
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Reference for an item, or `None` when its kind is not registered.
    pub fn identify(&self, item: &ContentItem) -> Option<ContentReference> {
        let kind = item.kind();
        if !self.registry.is_registered(kind) {
            return None;
        }
        Some(ContentReference::new(kind, item.id()))
    }

    /// Parse a reference key, accepting registered kinds only.
    pub fn parse(&self, key: &str) -> Option<ContentReference> {
        ContentReference::parse(key).filter(|r| self.registry.is_registered(r.kind))
    }

    /// Resolve a reference key to its entity.
    ///
    /// Malformed keys, unregistered kinds and missing rows all give `Ok(None)`.
    /// Only storage failures are errors.
    pub async fn resolve(&self, key: &str) -> AppResult<Option<ContentItem>> {
        match self.parse(key) {
            Some(reference) => self.resolve_reference(reference).await,
            None => {
                debug!(key = %key, "Ignoring invalid content reference");
                Ok(None)
            }
        }
    }

    pub async fn resolve_reference(
        &self,
        reference: ContentReference,
    ) -> AppResult<Option<ContentItem>> {
        if !self.registry.is_registered(reference.kind) {
            return Ok(None);
        }
        Ok(self.storage.get_content(reference).await?)
    }

    /// Display title, empty for an unregistered kind.
    pub fn title_of(&self, item: &ContentItem) -> String {
        self.registry
            .get(item.kind())
            .map(|spec| (spec.title)(item))
            .unwrap_or_default()
    }

    /// Canonical page URL, if the kind has a page.
    pub fn url_of(&self, item: &ContentItem) -> Option<String> {
        let spec = self.registry.get(item.kind())?;
        (spec.url)(item, self.routes.as_ref())
    }
}
