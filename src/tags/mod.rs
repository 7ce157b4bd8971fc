//! Tag faceting engine.
//!
//! Discovers the tags attached to a set of content items, groups them into
//! per-category facets, and narrows item lists by the facet values selected in
//! the query string. Only published tags under published categories take part;
//! uncategorized tags are never offered as facets.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::{ContentItem, ContentReference, IdentityResolver};
use crate::error::AppResult;
use crate::storage::{SqliteStorage, Storage, Tag, TagCategory};

/// Query-string parameters of a listing request.
pub type QueryParams = HashMap<String, String>;

/// Label of the synthetic option that clears a category filter.
pub const SHOW_ALL_LABEL: &str = "Show all";

/// One selectable option of a facet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetOption {
    /// Tag behind the option; `None` for "Show all".
    pub tag_id: Option<i64>,
    pub label: String,
    /// Query value selecting this option; empty for "Show all".
    pub value: String,
    pub selected: bool,
    /// Number of candidate items carrying the tag (all items for "Show all").
    pub count: usize,
}

/// A filterable tag category with its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryFacet {
    pub category: TagCategory,
    /// Query-string key for this facet.
    pub slug: String,
    pub options: Vec<FacetOption>,
}

impl CategoryFacet {
    /// The currently selected option, if any.
    pub fn selected(&self) -> Option<&FacetOption> {
        self.options.iter().find(|o| o.selected)
    }
}

/// Group tags into facets.
///
/// Categories keep their own order and only published ones appear. Within a
/// category, published tags are sorted by `order` (stable) and tags sharing a
/// slug collapse into the first one's option. "Show all" is appended last. It
/// is selected when the query carries no value for the category slug.
pub fn group_by_category(
    categories: &[TagCategory],
    tags: &[Tag],
    query: &QueryParams,
) -> Vec<CategoryFacet> {
    categories
        .iter()
        .filter(|c| c.published)
        .filter_map(|category| {
            let slug = category.slug();
            let current = query.get(&slug).map(String::as_str).unwrap_or("");

            let mut members: Vec<&Tag> = tags
                .iter()
                .filter(|t| t.published && t.category_id == Some(category.id))
                .collect();
            if members.is_empty() {
                return None;
            }
            members.sort_by_key(|t| t.order);

            let mut seen = HashSet::new();
            let mut options: Vec<FacetOption> = members
                .into_iter()
                .filter(|t| seen.insert(t.slug()))
                .map(|t| {
                    let value = t.slug();
                    FacetOption {
                        tag_id: Some(t.id),
                        label: t.name.clone(),
                        selected: !current.is_empty() && current == value,
                        value,
                        count: 0,
                    }
                })
                .collect();

            options.push(FacetOption {
                tag_id: None,
                label: SHOW_ALL_LABEL.to_string(),
                value: String::new(),
                selected: current.is_empty(),
                count: 0,
            });

            Some(CategoryFacet {
                category: category.clone(),
                slug,
                options,
            })
        })
        .collect()
}

/// Tag lookups over the content store.
#[derive(Clone)]
pub struct TagFacets {
    storage: SqliteStorage,
    resolver: IdentityResolver,
}

impl TagFacets {
    pub fn new(storage: SqliteStorage, resolver: IdentityResolver) -> Self {
        Self { storage, resolver }
    }

    /// Distinct tags attached to any of the items, in first-seen order.
    pub async fn tags_for<I: AsRef<ContentItem>>(&self, items: &[I]) -> AppResult<Vec<Tag>> {
        let (tags, _) = self.collect_tags(items).await?;
        Ok(tags)
    }

    /// Facets for the candidate items with per-option counts.
    pub async fn facets<I: AsRef<ContentItem>>(
        &self,
        items: &[I],
        query: &QueryParams,
    ) -> AppResult<Vec<CategoryFacet>> {
        let (tags, item_tags) = self.collect_tags(items).await?;
        let categories = self.storage.get_tag_categories().await?;

        let mut facets = group_by_category(&categories, &tags, query);
        for facet in &mut facets {
            for option in &mut facet.options {
                option.count = match option.tag_id {
                    Some(_) => {
                        let group = slug_group(&tags, facet.category.id, &option.value);
                        item_tags
                            .iter()
                            .filter(|ids| !ids.is_disjoint(&group))
                            .count()
                    }
                    None => items.len(),
                };
            }
        }

        Ok(facets)
    }

    /// Narrow items by every published category present in the query.
    ///
    /// Categories compose as AND. Published tags of one category that share
    /// the selected slug act as a single value: an item carrying any of them
    /// matches. An empty value or one that matches no published tag of the
    /// category leaves the items untouched.
    pub async fn filter<I: AsRef<ContentItem>>(
        &self,
        items: Vec<I>,
        query: &QueryParams,
    ) -> AppResult<Vec<I>> {
        if query.is_empty() {
            return Ok(items);
        }

        let categories = self.storage.get_tag_categories().await?;
        let tags = self.storage.get_tags().await?;
        let mut items = items;

        for category in categories.iter().filter(|c| c.published) {
            let slug = category.slug();
            let value = match query.get(&slug) {
                Some(v) if !v.is_empty() => v,
                _ => continue,
            };

            let group = slug_group(&tags, category.id, value);
            if group.is_empty() {
                debug!(category = %slug, value = %value, "Ignoring unmatched facet value");
                continue;
            }

            let mut tagged: HashSet<ContentReference> = HashSet::new();
            for tag_id in group {
                tagged.extend(self.storage.get_tagged_references(tag_id).await?);
            }

            items.retain(|item| {
                self.resolver
                    .identify(item.as_ref())
                    .map(|r| tagged.contains(&r))
                    .unwrap_or(false)
            });
        }

        Ok(items)
    }

    /// Distinct tags in first-seen order, plus each item's tag ids.
    async fn collect_tags<I: AsRef<ContentItem>>(
        &self,
        items: &[I],
    ) -> AppResult<(Vec<Tag>, Vec<HashSet<i64>>)> {
        let mut tags = Vec::new();
        let mut seen = HashSet::new();
        let mut item_tags = Vec::with_capacity(items.len());

        for item in items {
            let mut ids = HashSet::new();
            if let Some(reference) = self.resolver.identify(item.as_ref()) {
                for tag in self.storage.get_content_tags(reference).await? {
                    ids.insert(tag.id);
                    if seen.insert(tag.id) {
                        tags.push(tag);
                    }
                }
            }
            item_tags.push(ids);
        }

        Ok((tags, item_tags))
    }
}

/// Ids of the published tags of a category whose slug is `value`.
fn slug_group(tags: &[Tag], category_id: i64, value: &str) -> HashSet<i64> {
    tags.iter()
        .filter(|t| t.published && t.category_id == Some(category_id) && t.slug() == value)
        .map(|t| t.id)
        .collect()
}
