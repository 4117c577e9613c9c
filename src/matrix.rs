//! Forward/reverse storage for one named sparse relation.
//!
//! A matrix records which items belong to which sets (a set being a user, a
//! tag, a topic, ...). Each mutation maintains two mirrored Redis sets: the
//! forward set `{prefix}:{label}:sets:{set_id}` and, per item, the reverse
//! set `{prefix}:{label}:items:{item}` listing the sets that contain it. The
//! two writes are not atomic across keys; a crash in between is repaired by
//! the next full reprocess or a `clean` + rebuild.

use tracing::debug;

use crate::error::Result;
use crate::store::SetStore;

pub(crate) fn forward_key(prefix: &str, label: &str, set_id: &str) -> String {
    format!("{}:{}:sets:{}", prefix, label, set_id)
}

pub(crate) fn reverse_key(prefix: &str, label: &str, item: &str) -> String {
    format!("{}:{}:items:{}", prefix, label, item)
}

/// One weighted bipartite relation between sets and items.
#[derive(Clone)]
pub struct Matrix {
    label: String,
    weight: f64,
    prefix: String,
    store: SetStore,
}

impl Matrix {
    pub(crate) fn new(store: SetStore, prefix: &str, label: &str, weight: f64) -> Self {
        Self {
            label: label.to_string(),
            weight,
            prefix: prefix.to_string(),
            store,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    fn set_key(&self, set_id: &str) -> String {
        forward_key(&self.prefix, &self.label, set_id)
    }

    fn item_key(&self, item: &str) -> String {
        reverse_key(&self.prefix, &self.label, item)
    }

    /// Insert items into the set and mirror the membership into each item's
    /// reverse set. Idempotent per (set, item) pair.
    pub async fn add(&self, set_id: &str, items: &[String]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.store.sadd(&self.set_key(set_id), items).await?;
        for item in items {
            self.store
                .sadd(&self.item_key(item), &[set_id.to_string()])
                .await?;
        }
        debug!(matrix = %self.label, set_id, count = items.len(), "Added items to set");
        Ok(())
    }

    /// Remove items from the set and from each item's reverse set.
    /// Idempotent per (set, item) pair.
    pub async fn remove(&self, set_id: &str, items: &[String]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.store.srem(&self.set_key(set_id), items).await?;
        for item in items {
            self.store
                .srem(&self.item_key(item), &[set_id.to_string()])
                .await?;
        }
        debug!(matrix = %self.label, set_id, count = items.len(), "Removed items from set");
        Ok(())
    }

    pub async fn members_of_set(&self, set_id: &str) -> Result<Vec<String>> {
        self.store.smembers(&self.set_key(set_id)).await
    }

    pub async fn sets_containing(&self, item: &str) -> Result<Vec<String>> {
        self.store.smembers(&self.item_key(item)).await
    }

    /// Remove the item from every set it appears in, then drop its reverse
    /// set.
    pub async fn delete_item(&self, item: &str) -> Result<()> {
        let sets = self.sets_containing(item).await?;
        for set_id in &sets {
            self.store
                .srem(&self.set_key(set_id), &[item.to_string()])
                .await?;
        }
        self.store.del(&[self.item_key(item)]).await?;
        debug!(matrix = %self.label, item, sets = sets.len(), "Deleted item from matrix");
        Ok(())
    }

    /// Remove the set from every member's reverse set, then drop the set.
    pub async fn delete_set(&self, set_id: &str) -> Result<()> {
        let items = self.members_of_set(set_id).await?;
        for item in &items {
            self.store
                .srem(&self.item_key(item), &[set_id.to_string()])
                .await?;
        }
        self.store.del(&[self.set_key(set_id)]).await?;
        debug!(matrix = %self.label, set_id, items = items.len(), "Deleted set from matrix");
        Ok(())
    }

    /// Items sharing at least one set with `item` within this matrix,
    /// excluding the item itself.
    pub async fn neighbors(&self, item: &str) -> Result<Vec<String>> {
        let sets = self.sets_containing(item).await?;
        if sets.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = sets.iter().map(|s| self.set_key(s)).collect();
        let mut union = self.store.sunion(&keys).await?;
        union.retain(|other| other != item);
        Ok(union)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(
            forward_key("courses", "users", "u1"),
            "courses:users:sets:u1"
        );
        assert_eq!(
            reverse_key("courses", "users", "c1"),
            "courses:users:items:c1"
        );
    }
}
