//! Recommender composition: matrix dispatch, processing triggers, queries,
//! and maintenance.

use std::collections::HashSet;
use tracing::{debug, info, instrument};

use crate::config::RecommenderConfig;
use crate::error::{Result, SimrecError};
use crate::matrix::Matrix;
use crate::prediction::{PredictionQuery, PredictionSource};
use crate::ranking::{rank, QueryOptions, ScoredItem};
use crate::similarity::{similarity_key, SimilarityEngine};
use crate::store::SetStore;

/// Whether a mutation reprocesses the affected similarity rows right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processing {
    /// After the write, rebuild the rows of the mutated items and of their
    /// co-occurrents through the touched set.
    Immediate,
    /// Write only; the caller reprocesses later via [`Recommender::process_items`]
    /// or [`Recommender::process_all`].
    Deferred,
}

/// A configured recommender class owning one keyspace prefix.
///
/// All mutable state lives in the store, so a `Recommender` is cheap to
/// clone and safe to share across tasks; concurrent row rebuilds are
/// last-writer-wins per row.
#[derive(Clone)]
pub struct Recommender {
    store: SetStore,
    prefix: String,
    matrices: Vec<Matrix>,
    engine: SimilarityEngine,
    predictor: PredictionQuery,
}

impl Recommender {
    /// Build from an explicit store handle. Validates the configuration
    /// before any store traffic.
    pub fn new(store: SetStore, config: &RecommenderConfig) -> Result<Self> {
        config.validate()?;

        let prefix = config.name.clone();
        let matrices: Vec<Matrix> = config
            .matrices
            .iter()
            .map(|m| Matrix::new(store.clone(), &prefix, &m.label, m.weight))
            .collect();

        let pairs: Vec<(String, f64)> = config
            .matrices
            .iter()
            .map(|m| (m.label.clone(), m.weight))
            .collect();
        let engine = SimilarityEngine::new(
            store.clone(),
            &prefix,
            config.similarity_limit,
            &pairs,
        );
        let predictor = PredictionQuery::new(store.clone(), &prefix);

        Ok(Self {
            store,
            prefix,
            matrices,
            engine,
            predictor,
        })
    }

    /// Connect to the configured Redis URL and build.
    pub async fn connect(config: &RecommenderConfig) -> anyhow::Result<Self> {
        let store = SetStore::connect(&config.redis.url).await?;
        Ok(Self::new(store, config)?)
    }

    /// The class name, also the keyspace prefix.
    pub fn name(&self) -> &str {
        &self.prefix
    }

    /// Look up a configured matrix by label. Unknown labels fail loudly.
    pub fn matrix(&self, label: &str) -> Result<&Matrix> {
        self.matrices
            .iter()
            .find(|m| m.label() == label)
            .ok_or_else(|| SimrecError::UnknownMatrix(label.to_string()))
    }

    fn all_items_key(&self) -> String {
        format!("{}:all_items", self.prefix)
    }

    /// Add items to one set of one matrix.
    #[instrument(skip(self, items), fields(recommender = %self.prefix))]
    pub async fn add_to_matrix(
        &self,
        label: &str,
        set_id: &str,
        items: &[&str],
        processing: Processing,
    ) -> Result<()> {
        let items = owned_ids(set_id, items)?;
        let matrix = self.matrix(label)?;

        matrix.add(set_id, &items).await?;
        self.store.sadd(&self.all_items_key(), &items).await?;

        if processing == Processing::Immediate {
            self.reprocess_touched(matrix, set_id, &items).await?;
        }
        Ok(())
    }

    /// Remove items from one set of one matrix.
    #[instrument(skip(self, items), fields(recommender = %self.prefix))]
    pub async fn remove_from_matrix(
        &self,
        label: &str,
        set_id: &str,
        items: &[&str],
        processing: Processing,
    ) -> Result<()> {
        let items = owned_ids(set_id, items)?;
        let matrix = self.matrix(label)?;

        matrix.remove(set_id, &items).await?;

        if processing == Processing::Immediate {
            self.reprocess_touched(matrix, set_id, &items).await?;
        }
        Ok(())
    }

    /// Rebuild the rows of the mutated items and of everything left in the
    /// touched set.
    async fn reprocess_touched(
        &self,
        matrix: &Matrix,
        set_id: &str,
        items: &[String],
    ) -> Result<()> {
        let mut focal = matrix.members_of_set(set_id).await?;
        focal.extend(items.iter().cloned());
        self.engine.process_many(&focal).await?;
        Ok(())
    }

    /// Remove an item everywhere in one matrix, then rebuild its row and
    /// the rows of its former co-occurrents (gathered across all matrices,
    /// since scores blend every matrix).
    #[instrument(skip(self), fields(recommender = %self.prefix))]
    pub async fn delete_from_matrix(&self, label: &str, item: &str) -> Result<()> {
        ensure_id(item)?;
        let matrix = self.matrix(label)?;

        let mut affected = self.cooccurrents(item).await?;
        matrix.delete_item(item).await?;
        affected.insert(item.to_string());

        let affected: Vec<String> = affected.into_iter().collect();
        self.engine.process_many(&affected).await?;
        self.prune_all_items(item).await?;
        Ok(())
    }

    /// Remove an item from every matrix, drop its similarity row, and
    /// rebuild the rows of its former co-occurrents.
    #[instrument(skip(self), fields(recommender = %self.prefix))]
    pub async fn delete_item(&self, item: &str) -> Result<()> {
        ensure_id(item)?;

        let affected = self.cooccurrents(item).await?;
        for matrix in &self.matrices {
            matrix.delete_item(item).await?;
        }
        self.store
            .del(&[similarity_key(&self.prefix, item)])
            .await?;
        self.store
            .srem(&self.all_items_key(), &[item.to_string()])
            .await?;

        let affected: Vec<String> = affected.into_iter().collect();
        self.engine.process_many(&affected).await?;
        info!(item, affected = affected.len(), "Deleted item");
        Ok(())
    }

    /// Drop the bookkeeping entry once no matrix contains the item anymore.
    async fn prune_all_items(&self, item: &str) -> Result<()> {
        for matrix in &self.matrices {
            if !matrix.sets_containing(item).await?.is_empty() {
                return Ok(());
            }
        }
        self.store
            .srem(&self.all_items_key(), &[item.to_string()])
            .await
    }

    /// Items co-occurring with `item` through any set of any matrix.
    async fn cooccurrents(&self, item: &str) -> Result<HashSet<String>> {
        let mut out = HashSet::new();
        for matrix in &self.matrices {
            out.extend(matrix.neighbors(item).await?);
        }
        out.remove(item);
        Ok(out)
    }

    /// Explicitly rebuild the rows of the given items.
    pub async fn process_items(&self, items: &[&str]) -> Result<usize> {
        for item in items {
            ensure_id(item)?;
        }
        let items: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        self.engine.process_many(&items).await
    }

    /// Rebuild every known item's row. Returns the number of items
    /// processed.
    #[instrument(skip(self), fields(recommender = %self.prefix))]
    pub async fn process_all(&self) -> Result<usize> {
        let items = self.store.smembers(&self.all_items_key()).await?;
        self.engine.process_many(&items).await
    }

    /// Ranked similar items from the cached row, highest score first.
    /// The focal item is always excluded.
    pub async fn similarities_for(
        &self,
        item: &str,
        opts: &QueryOptions,
    ) -> Result<Vec<ScoredItem>> {
        ensure_id(item)?;

        let row = self
            .store
            .zrevrange_withscores(&similarity_key(&self.prefix, item), 0, -1)
            .await?;

        let mut exclude = opts.exclude.clone();
        exclude.insert(item.to_string());
        Ok(rank(row, &exclude, opts.offset, opts.limit))
    }

    /// Ranked predictions aggregated across the input's cached rows.
    /// Input items are always excluded; items without a cached row simply
    /// contribute nothing.
    pub async fn predictions_for(
        &self,
        source: &PredictionSource,
        opts: &QueryOptions,
    ) -> Result<Vec<ScoredItem>> {
        let input = match source {
            PredictionSource::Items(items) => {
                for item in items {
                    ensure_id(item)?;
                }
                items.clone()
            }
            PredictionSource::MatrixSet { label, set_id } => {
                ensure_id(set_id)?;
                self.matrix(label)?.members_of_set(set_id).await?
            }
        };

        debug!(inputs = input.len(), "Running prediction query");
        self.predictor.run(&input, opts).await
    }

    /// Delete every key under this recommender's prefix. Returns the number
    /// of keys removed. This is the recovery path after any external
    /// inconsistency.
    #[instrument(skip(self), fields(recommender = %self.prefix))]
    pub async fn clean(&self) -> Result<u64> {
        self.store.del_pattern(&format!("{}:*", self.prefix)).await
    }
}

fn ensure_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(SimrecError::EmptyId);
    }
    Ok(())
}

fn owned_ids(set_id: &str, items: &[&str]) -> Result<Vec<String>> {
    ensure_id(set_id)?;
    for item in items {
        ensure_id(item)?;
    }
    Ok(items.iter().map(|s| s.to_string()).collect())
}
