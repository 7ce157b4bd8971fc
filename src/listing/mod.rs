//! Content listing pipeline: view-model entries, named sort comparators,
//! and tag faceting composed into one ordered, filtered view.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::{ContentItem, ContentKind, ContentReference, IdentityResolver};
use crate::error::{AppResult, FieldError};
use crate::storage::{PatientAttribute, SqliteStorage, Storage};
use crate::tags::{CategoryFacet, QueryParams, TagFacets};

/// Query-string key selecting the comparator.
pub const SORT_PARAM: &str = "sort";

static TITLE_ORDER: SortComparator = SortComparator::Title;

/// One row of a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub reference: ContentReference,
    pub title: String,
    pub url: Option<String>,
    /// Published attribute values; only patients carry any.
    pub attributes: Vec<PatientAttribute>,
    pub item: ContentItem,
}

impl ListingEntry {
    /// Value of the attribute whose key matches.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key() == key)
            .map(|a| a.value.as_str())
    }
}

impl AsRef<ContentItem> for ListingEntry {
    fn as_ref(&self) -> &ContentItem {
        &self.item
    }
}

/// Number formed by the digits of a free-text value, ignoring everything
/// else. `"45 yrs"` gives 45, `"70%"` gives 70.
pub fn extract_number(value: &str) -> Option<i64> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Ordering applied to listing entries. Sorting is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortComparator {
    /// Case-insensitive display title.
    Title,
    /// Descending by the first attribute key with a numeric value. Entries
    /// with none sort as 0.
    NumericDesc { keys: Vec<String> },
}

impl SortComparator {
    pub fn numeric_desc<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        SortComparator::NumericDesc {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sort(&self, entries: &mut [ListingEntry]) {
        match self {
            SortComparator::Title => {
                entries.sort_by_cached_key(|e| e.title.to_lowercase());
            }
            SortComparator::NumericDesc { keys } => {
                entries.sort_by_cached_key(|e| std::cmp::Reverse(numeric_value(e, keys)));
            }
        }
    }

    pub fn compare(&self, a: &ListingEntry, b: &ListingEntry) -> Ordering {
        match self {
            SortComparator::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortComparator::NumericDesc { keys } => {
                numeric_value(b, keys).cmp(&numeric_value(a, keys))
            }
        }
    }
}

/// First numeric value among `keys`, in priority order, or 0.
pub fn numeric_value(entry: &ListingEntry, keys: &[String]) -> i64 {
    keys.iter()
        .filter_map(|key| entry.attribute(key).and_then(extract_number))
        .next()
        .unwrap_or(0)
}

/// Named comparators selectable through `?sort=`.
#[derive(Debug, Clone, Default)]
pub struct SortRegistry {
    comparators: Vec<(String, SortComparator)>,
}

impl SortRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `name` by title and `age` by age, then age at transplant.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("name", SortComparator::Title);
        registry.register(
            "age",
            SortComparator::numeric_desc(["age", "age-at-transplant"]),
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, comparator: SortComparator) {
        let name = name.into();
        self.comparators.retain(|(n, _)| *n != name);
        self.comparators.push((name, comparator));
    }

    pub fn get(&self, name: &str) -> Option<&SortComparator> {
        self.comparators
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.comparators.iter().map(|(n, _)| n.as_str())
    }
}

/// Result of [`ListingPipeline::render_list`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingView {
    pub entries: Vec<ListingEntry>,
    /// Facets over every candidate, not just the filtered entries.
    pub facets: Vec<CategoryFacet>,
    /// Comparator actually applied.
    pub sort: String,
    /// Problems with the submitted sort or filter input.
    pub errors: Vec<FieldError>,
}

/// Builds listing pages.
#[derive(Clone)]
pub struct ListingPipeline {
    storage: SqliteStorage,
    resolver: IdentityResolver,
    facets: TagFacets,
    sorts: SortRegistry,
    default_sort: String,
}

impl ListingPipeline {
    pub fn new(
        storage: SqliteStorage,
        resolver: IdentityResolver,
        sorts: SortRegistry,
        default_sort: impl Into<String>,
    ) -> Self {
        let facets = TagFacets::new(storage.clone(), resolver.clone());
        Self {
            storage,
            resolver,
            facets,
            sorts,
            default_sort: default_sort.into(),
        }
    }

    pub fn sorts(&self) -> &SortRegistry {
        &self.sorts
    }

    /// Wrap items as entries. Items of unregistered kinds are dropped.
    pub async fn entries_for(&self, items: Vec<ContentItem>) -> AppResult<Vec<ListingEntry>> {
        let patient_ids: Vec<i64> = items
            .iter()
            .filter(|i| i.kind() == ContentKind::Patient)
            .map(|i| i.id())
            .collect();

        let mut attributes: HashMap<i64, Vec<PatientAttribute>> = HashMap::new();
        for attribute in self.storage.get_patient_attributes(&patient_ids).await? {
            attributes
                .entry(attribute.patient_id)
                .or_default()
                .push(attribute);
        }

        let entries = items
            .into_iter()
            .filter_map(|item| {
                let reference = self.resolver.identify(&item)?;
                let attributes = match item.kind() {
                    ContentKind::Patient => attributes.remove(&item.id()).unwrap_or_default(),
                    _ => Vec::new(),
                };
                Some(ListingEntry {
                    reference,
                    title: self.resolver.title_of(&item),
                    url: self.resolver.url_of(&item),
                    attributes,
                    item,
                })
            })
            .collect();

        Ok(entries)
    }

    /// Sort, facet, then filter.
    ///
    /// `sort_key` falls back to the `sort` query parameter and then to the
    /// default comparator. An unknown key is reported in `errors` and the
    /// default applies.
    pub async fn render_list(
        &self,
        raw_items: Vec<ContentItem>,
        sort_key: Option<&str>,
        query: &QueryParams,
    ) -> AppResult<ListingView> {
        let mut errors = Vec::new();
        let requested = sort_key
            .or_else(|| query.get(SORT_PARAM).map(String::as_str))
            .filter(|k| !k.is_empty());

        let (sort, comparator) = match requested.and_then(|k| self.sorts.get(k).map(|c| (k, c))) {
            Some(found) => found,
            None => {
                if let Some(key) = requested {
                    errors.push(FieldError::new(
                        SORT_PARAM,
                        format!(
                            "Select a valid choice. {} is not one of the available choices.",
                            key
                        ),
                    ));
                }
                let default = self.sorts.get(&self.default_sort);
                (self.default_sort.as_str(), default.unwrap_or(&TITLE_ORDER))
            }
        };
        let sort = sort.to_string();

        let mut entries = self.entries_for(raw_items).await?;
        comparator.sort(&mut entries);

        let facets = self.facets.facets(&entries, query).await?;
        let entries = self.facets.filter(entries, query).await?;

        debug!(
            sort = %sort,
            entries = entries.len(),
            facets = facets.len(),
            "Rendered listing"
        );

        Ok(ListingView {
            entries,
            facets,
            sort,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Patient;
    use pretty_assertions::assert_eq;

    fn entry(id: i64, name: &str, attributes: &[(&str, &str)]) -> ListingEntry {
        ListingEntry {
            reference: ContentReference::new(ContentKind::Patient, id),
            title: name.to_string(),
            url: None,
            attributes: attributes
                .iter()
                .map(|(key, value)| PatientAttribute {
                    patient_id: id,
                    attribute_id: 0,
                    name: key.to_string(),
                    value: value.to_string(),
                    order: 0,
                })
                .collect(),
            item: ContentItem::Patient(Patient {
                id,
                ..Patient::new(name)
            }),
        }
    }

    fn titles(entries: &[ListingEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn test_extract_number() {
        assert_eq!(extract_number("45 yrs"), Some(45));
        assert_eq!(extract_number("70%"), Some(70));
        assert_eq!(extract_number("70 %"), Some(70));
        assert_eq!(extract_number("unknown"), None);
        assert_eq!(extract_number(""), None);
    }

    #[test]
    fn test_extract_number_concatenates_all_digits() {
        // Every digit counts, including ones inside a label.
        assert_eq!(extract_number("FEV1: 70"), Some(170));
        assert_eq!(extract_number("3-5"), Some(35));
    }

    #[test]
    fn test_numeric_sort_with_key_fallback() {
        let mut entries = vec![
            entry(1, "Missing", &[]),
            entry(2, "Transplant", &[("Age at transplant", "30")]),
            entry(3, "Aged", &[("Age", "45 yrs")]),
        ];
        SortRegistry::standard().get("age").unwrap().sort(&mut entries);
        assert_eq!(titles(&entries), vec!["Aged", "Transplant", "Missing"]);
    }

    #[test]
    fn test_numeric_key_without_digits_falls_through() {
        let keys = vec!["age".to_string(), "age-at-transplant".to_string()];
        let e = entry(1, "A", &[("Age", "unknown"), ("Age at transplant", "22")]);
        assert_eq!(numeric_value(&e, &keys), 22);
    }

    #[test]
    fn test_title_sort_is_stable_and_case_insensitive() {
        let mut entries = vec![
            entry(1, "bea", &[]),
            entry(2, "Alex", &[]),
            entry(3, "Bea", &[]),
        ];
        SortComparator::Title.sort(&mut entries);
        assert_eq!(titles(&entries), vec!["Alex", "bea", "Bea"]);
        assert_eq!(
            SortComparator::Title.compare(&entries[1], &entries[2]),
            Ordering::Equal
        );
    }

    #[test]
    fn test_sort_registry_replaces_by_name() {
        let mut registry = SortRegistry::standard();
        registry.register("age", SortComparator::Title);
        assert_eq!(registry.get("age"), Some(&SortComparator::Title));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["name", "age"]);
        assert!(registry.get("height").is_none());
    }
}
