//! Curated related-content lists.
//!
//! A list is anchored to one owner: either a content item (the list is named
//! after its reference key) or a well-known editorial name such as the
//! homepage collection. Lists are created on first access. Members are
//! ordered by a step-10 `order` field and never duplicated.
//!
//! `replace` and `reorder` read the members, diff and write in one
//! transaction that holds the database write lock from its first statement.
//! Overlapping edits of the same list serialize and the last to commit wins.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::content::{ContentItem, ContentReference, IdentityResolver};
use crate::error::AppResult;
use crate::storage::{
    RelatedChanges, RelatedItem, RelatedItemsList, RelatedSync, SqliteStorage, Storage,
};

pub use crate::storage::ORDER_STEP;

/// Whose list is being addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListOwner {
    /// "See also" list of one content item.
    Content(ContentReference),
    /// Singleton editorial list.
    Named(String),
}

impl ListOwner {
    pub fn named(name: impl Into<String>) -> Self {
        ListOwner::Named(name.into())
    }

    /// Storage name of the owner's list.
    pub fn list_name(&self) -> String {
        match self {
            ListOwner::Content(reference) => reference.to_string(),
            ListOwner::Named(name) => name.clone(),
        }
    }

    /// A reference key becomes a content owner; anything else is a list name.
    pub fn parse(value: &str) -> Self {
        match ContentReference::parse(value) {
            Some(reference) => ListOwner::Content(reference),
            None => ListOwner::Named(value.to_string()),
        }
    }
}

impl From<ContentReference> for ListOwner {
    fn from(reference: ContentReference) -> Self {
        ListOwner::Content(reference)
    }
}

impl fmt::Display for ListOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.list_name())
    }
}

/// A live member of a related list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntry {
    pub reference: ContentReference,
    pub order: i64,
    pub item: ContentItem,
}

/// What an edit did to a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedChangeSummary {
    pub added: Vec<ContentReference>,
    pub removed: Vec<ContentReference>,
    /// Members whose position changed.
    pub reordered: Vec<ContentReference>,
    /// Supplied keys that were invalid, unresolvable or not members.
    pub skipped: Vec<String>,
}

impl RelatedChangeSummary {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.reordered.is_empty()
    }
}

/// Related-list operations over the content store.
#[derive(Clone)]
pub struct RelatedContent {
    storage: SqliteStorage,
    resolver: IdentityResolver,
}

impl RelatedContent {
    pub fn new(storage: SqliteStorage, resolver: IdentityResolver) -> Self {
        Self { storage, resolver }
    }

    /// The owner's list, created when absent.
    pub async fn list(&self, owner: &ListOwner) -> AppResult<RelatedItemsList> {
        Ok(self
            .storage
            .get_or_create_related_list(&owner.list_name())
            .await?)
    }

    /// Raw membership rows, including stale ones.
    pub async fn members(&self, owner: &ListOwner) -> AppResult<Vec<RelatedItem>> {
        let list = self.list(owner).await?;
        Ok(self.storage.get_related_items(list.id).await?)
    }

    /// Live members in order. References to deleted content are skipped.
    pub async fn get(&self, owner: &ListOwner) -> AppResult<Vec<RelatedEntry>> {
        let mut entries = Vec::new();

        for member in self.members(owner).await? {
            match self.resolver.resolve_reference(member.reference).await? {
                Some(item) => entries.push(RelatedEntry {
                    reference: member.reference,
                    order: member.order,
                    item,
                }),
                None => {
                    debug!(
                        owner = %owner,
                        reference = %member.reference,
                        "Skipping stale related item"
                    );
                }
            }
        }

        Ok(entries)
    }

    /// Add one member at the end. Already-present references are left alone.
    pub async fn append(&self, owner: &ListOwner, key: &str) -> AppResult<RelatedChangeSummary> {
        let list = self.list(owner).await?;
        let existing = self.storage.get_related_items(list.id).await?;
        let mut summary = RelatedChangeSummary::default();

        let reference = match self.resolve_key(key).await? {
            Some(reference) => reference,
            None => {
                summary.skipped.push(key.to_string());
                return Ok(summary);
            }
        };

        if existing.iter().any(|m| m.reference == reference) {
            return Ok(summary);
        }

        let changes = RelatedChanges {
            insert: vec![reference],
            ..Default::default()
        };
        self.storage.apply_related_changes(list.id, &changes).await?;
        summary.added.push(reference);

        info!(owner = %owner, reference = %reference, "Appended related item");
        Ok(summary)
    }

    /// Remove one member. Non-members are ignored.
    pub async fn remove(&self, owner: &ListOwner, key: &str) -> AppResult<RelatedChangeSummary> {
        let list = self.list(owner).await?;
        let existing = self.storage.get_related_items(list.id).await?;
        let mut summary = RelatedChangeSummary::default();

        let member = ContentReference::parse(key)
            .and_then(|r| existing.iter().find(|m| m.reference == r));
        let member = match member {
            Some(member) => member,
            None => {
                summary.skipped.push(key.to_string());
                return Ok(summary);
            }
        };

        let changes = RelatedChanges {
            remove: vec![member.id],
            ..Default::default()
        };
        self.storage.apply_related_changes(list.id, &changes).await?;
        summary.removed.push(member.reference);

        info!(owner = %owner, reference = %member.reference, "Removed related item");
        Ok(summary)
    }

    /// Make the membership equal to `keys`.
    ///
    /// Members missing from `keys` are deleted and new references appended in
    /// the given order. Members present on both sides keep their row and
    /// position. Invalid or unresolvable keys are skipped.
    pub async fn replace(
        &self,
        owner: &ListOwner,
        keys: &[String],
    ) -> AppResult<RelatedChangeSummary> {
        let list = self.list(owner).await?;
        let mut summary = RelatedChangeSummary::default();

        let mut desired = Vec::new();
        for key in keys {
            match self.resolve_key(key).await? {
                Some(reference) => desired.push(reference),
                None => summary.skipped.push(key.clone()),
            }
        }

        let diff = self
            .storage
            .sync_related_items(list.id, &RelatedSync::Replace(desired))
            .await?;
        summary.added = diff.added;
        summary.removed = diff.removed;

        info!(
            owner = %owner,
            added = summary.added.len(),
            removed = summary.removed.len(),
            skipped = summary.skipped.len(),
            "Replaced related items"
        );
        Ok(summary)
    }

    /// Re-sequence members in the given order as 10, 20, 30...
    ///
    /// Positions count retained members only. Members left out are deleted;
    /// keys that are not current members are ignored.
    pub async fn reorder(
        &self,
        owner: &ListOwner,
        keys: &[String],
    ) -> AppResult<RelatedChangeSummary> {
        let list = self.list(owner).await?;
        let parsed: Vec<Option<ContentReference>> =
            keys.iter().map(|key| self.resolver.parse(key)).collect();
        let target = RelatedSync::Reorder(parsed.iter().flatten().copied().collect());

        let diff = self.storage.sync_related_items(list.id, &target).await?;

        let skipped = keys
            .iter()
            .zip(&parsed)
            .filter(|(_, reference)| match reference {
                Some(reference) => diff.ignored.contains(reference),
                None => true,
            })
            .map(|(key, _)| key.clone())
            .collect();
        let summary = RelatedChangeSummary {
            added: Vec::new(),
            removed: diff.removed,
            reordered: diff.reordered,
            skipped,
        };

        info!(
            owner = %owner,
            removed = summary.removed.len(),
            reordered = summary.reordered.len(),
            "Reordered related items"
        );
        Ok(summary)
    }

    /// Delete the owner's list and every member.
    pub async fn delete_list(&self, owner: &ListOwner) -> AppResult<()> {
        let list = self.list(owner).await?;
        self.storage.delete_related_list(list.id).await?;
        info!(owner = %owner, "Deleted related list");
        Ok(())
    }

    async fn resolve_key(&self, key: &str) -> AppResult<Option<ContentReference>> {
        let reference = match self.resolver.parse(key) {
            Some(reference) => reference,
            None => {
                debug!(key = %key, "Skipping invalid related reference");
                return Ok(None);
            }
        };
        if self.resolver.resolve_reference(reference).await?.is_none() {
            debug!(key = %key, "Skipping unresolvable related reference");
            return Ok(None);
        }
        Ok(Some(reference))
    }
}
