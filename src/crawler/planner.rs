//! Sync planner
//!
//! Decides, entry by entry, whether an article has to be fetched again. The
//! store is brought up to date before the decision is returned, so a URL is
//! never handed to the fetch manager ahead of its placeholder.

use crate::sitemap::DiscoveryEntry;
use crate::storage::{ArticleRecord, ArticleStore, StorageResult};
use chrono::{DateTime, Utc};

/// What the planner did with one discovery entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDecision {
    /// New article; placeholder created, fetch required
    Created,
    /// Known article whose content was never written; fetch required
    Incomplete,
    /// Known article with a new timestamp; fetch required
    Stale {
        /// Timestamp stored before this pass, for undoing the update
        previous: DateTime<Utc>,
    },
    /// Known article with the same timestamp; only images were reconciled
    Unchanged {
        images_created: usize,
        images_updated: usize,
    },
}

impl PlanDecision {
    pub fn needs_fetch(&self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }
}

/// Compares discovery entries against an [`ArticleStore`]
pub struct SyncPlanner<S> {
    store: S,
}

impl<S: ArticleStore> SyncPlanner<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Reconciles one entry with the store
    ///
    /// Store failures are returned as-is; nothing about the entry should be
    /// assumed to have been written when this errors.
    pub fn plan(&self, entry: &DiscoveryEntry) -> StorageResult<PlanDecision> {
        let Some(existing) = self.store.find_by_url(&entry.url)? else {
            self.store.create_placeholder(entry)?;
            tracing::debug!(url = %entry.url, rank = entry.rank, "Created placeholder");
            return Ok(PlanDecision::Created);
        };

        if existing.rank != entry.rank {
            self.store.update_rank(&entry.url, entry.rank)?;
        }

        if existing.last_modified != entry.last_modified {
            self.store
                .update_last_modified(&entry.url, entry.last_modified)?;
            tracing::debug!(
                url = %entry.url,
                stored = %existing.last_modified,
                discovered = %entry.last_modified,
                "Article changed"
            );
            return Ok(PlanDecision::Stale {
                previous: existing.last_modified,
            });
        }

        let (images_created, images_updated) = self.reconcile_images(&existing, entry)?;

        // A placeholder left behind by an earlier pass still needs its content
        if existing.is_placeholder() {
            tracing::debug!(url = %entry.url, "Placeholder without content; fetching again");
            return Ok(PlanDecision::Incomplete);
        }

        Ok(PlanDecision::Unchanged {
            images_created,
            images_updated,
        })
    }

    /// Reverts the store changes of a fetch that never completed
    ///
    /// A placeholder is dropped and a stale article gets its previous
    /// timestamp back, so the next pass fetches the URL again.
    pub fn undo(&self, url: &str, decision: PlanDecision) -> StorageResult<()> {
        match decision {
            PlanDecision::Created | PlanDecision::Incomplete => {
                let still_placeholder = self
                    .store
                    .find_by_url(url)?
                    .is_some_and(|record| record.is_placeholder());
                if still_placeholder {
                    self.store.delete(url)?;
                }
            }
            PlanDecision::Stale { previous } => {
                if self.store.find_by_url(url)?.is_some() {
                    self.store.update_last_modified(url, previous)?;
                }
            }
            PlanDecision::Unchanged { .. } => {}
        }
        Ok(())
    }

    fn reconcile_images(
        &self,
        existing: &ArticleRecord,
        entry: &DiscoveryEntry,
    ) -> StorageResult<(usize, usize)> {
        let mut images_created = 0;
        let mut images_updated = 0;

        for image in &entry.images {
            match self.store.find_image(existing.id, &image.url)? {
                None => {
                    self.store.create_image(existing.id, image)?;
                    images_created += 1;
                }
                Some(stored) if stored.last_modified != image.last_modified => {
                    self.store.update_image(stored.id, image)?;
                    images_updated += 1;
                }
                Some(_) => {}
            }
        }

        if images_created + images_updated > 0 {
            tracing::debug!(
                url = %entry.url,
                images_created,
                images_updated,
                "Reconciled images"
            );
        }

        Ok((images_created, images_updated))
    }
}
