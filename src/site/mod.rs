//! Site assembly.
//!
//! This module provides:
//! - Shared application state wiring storage to the content services
//! - Page view models for the public website

mod pages;

pub use pages::*;

use std::sync::Arc;

use crate::config::Config;
use crate::content::{IdentityResolver, KindRegistry, RouteTable, UrlResolver};
use crate::highlights::HighlightService;
use crate::listing::{ListingPipeline, SortRegistry};
use crate::related::RelatedContent;
use crate::storage::SqliteStorage;
use crate::study::StudyController;
use crate::tags::TagFacets;

/// Application state shared across requests.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// Named routes for URL reverse lookup.
    pub routes: Arc<RouteTable>,
    /// Content identity and addressing.
    pub resolver: IdentityResolver,
    /// Tag faceting engine.
    pub tags: TagFacets,
    /// Curated related-content lists.
    pub related: RelatedContent,
    /// Study variant assignment and display flags.
    pub study: StudyController,
    /// Listing sort/filter pipeline.
    pub listing: ListingPipeline,
    /// Reader highlights.
    pub highlights: HighlightService,
}

/// Shared state handle.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Create application state with the standard kinds, routes and sorts.
    pub fn new(config: Config, storage: SqliteStorage) -> Self {
        Self::with_registries(
            config,
            storage,
            KindRegistry::standard(),
            RouteTable::site(),
            SortRegistry::standard(),
        )
    }

    pub fn with_registries(
        config: Config,
        storage: SqliteStorage,
        kinds: KindRegistry,
        routes: RouteTable,
        sorts: SortRegistry,
    ) -> Self {
        tracing::info!(
            kinds = kinds.kinds().count(),
            homepage_list = %config.site.homepage_list,
            default_sort = %config.site.default_sort,
            "AppState initializing"
        );

        let routes = Arc::new(routes);
        let url_resolver: Arc<dyn UrlResolver> = routes.clone();
        let resolver = IdentityResolver::new(storage.clone(), Arc::new(kinds), url_resolver);

        let tags = TagFacets::new(storage.clone(), resolver.clone());
        let related = RelatedContent::new(storage.clone(), resolver.clone());
        let study = StudyController::new(storage.clone(), config.study.defaults);
        let listing = ListingPipeline::new(
            storage.clone(),
            resolver.clone(),
            sorts,
            config.site.default_sort.clone(),
        );
        let highlights = HighlightService::new(storage.clone());

        Self {
            config,
            storage,
            routes,
            resolver,
            tags,
            related,
            study,
            listing,
            highlights,
        }
    }

    /// Shared handle to this state.
    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }
}
