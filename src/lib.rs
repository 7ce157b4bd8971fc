//! # Story Site
//!
//! Content engine for a patient-story website used in a content-presentation
//! study. Researchers compare a "high-agency" and an "integrated-content"
//! variant of the same site across visitor cohorts.
//!
//! ## Features
//!
//! - **Content identity**: uniform `"{kind}-{id}"` addressing over patients,
//!   stories, questions, answers and articles
//! - **Tag faceting**: per-category filters with "Show all" reset
//! - **Related content**: curated, ordered "see also" lists per content item
//! - **Study sessions**: variant assignment and display-flag resolution
//! - **Listings**: pluggable sort comparators composed with faceting
//! - **FAQ**: ordered question categories and per-question highlights
//!
//! ## Architecture
//!
//! ```text
//! Request → StudyController (flags) → ListingPipeline / RelatedContent
//!                                            ↓
//!                              IdentityResolver + TagFacets
//!                                            ↓
//!                                     SQLite (Storage)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use story_site::{AppState, Config};
//! use story_site::storage::SqliteStorage;
//! use story_site::study::MemorySessionStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let state = AppState::new(config, storage).shared();
//!     let session = MemorySessionStore::new();
//!     let home = state.home_page(&session).await?;
//!     println!("{:?}", home.context.flags);
//!     Ok(())
//! }
//! ```

/// Configuration loaded from the environment.
pub mod config;
/// Content kinds, references, identity resolution and routes.
pub mod content;
/// Error types and result aliases.
pub mod error;
/// Study-session reader highlights.
pub mod highlights;
/// Listing sort/filter pipeline.
pub mod listing;
/// Curated related-content lists.
pub mod related;
/// Page assembly and shared application state.
pub mod site;
/// SQLite storage layer.
pub mod storage;
/// Study variant controller and session store.
pub mod study;
/// Tag faceting engine.
pub mod tags;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use site::{AppState, SharedState};
