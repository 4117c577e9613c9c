//! Per-item similarity recomputation.
//!
//! One similarity row `{prefix}:similarities:{item}` holds the blended
//! Jaccard score of every item co-occurring with the focal item, capped at
//! the configured row limit. The whole rebuild of a row runs as a single
//! server-side Lua script: candidate discovery through the reverse indexes,
//! per-matrix intersection/union cardinalities, the row rewrite, and the
//! top-K trim all happen in one atomic step, so concurrent readers observe
//! either the old row or the fully new one.
//!
//! A rebuild only ever writes the focal item's own row. Under a row cap the
//! relation is deliberately asymmetric: an item can sit in a neighbor's
//! top K without the neighbor making it into the item's own top K. Callers
//! that want both directions current process both items.

use futures::stream::{self, StreamExt};
use redis::Script;
use std::collections::HashSet;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::store::SetStore;

/// How many per-item rebuild scripts are in flight during batch reprocessing.
const REPROCESS_CONCURRENCY: usize = 8;

pub(crate) fn similarity_key(prefix: &str, item: &str) -> String {
    format!("{}:similarities:{}", prefix, item)
}

/// Rebuilds one row. KEYS[1] is the row key; ARGV is
/// `prefix, item, limit, matrix count, then (label, weight) pairs`.
///
/// The score of a candidate j is
/// `sum_m(w_m * |rev_m(i) n rev_m(j)| / |rev_m(i) u rev_m(j)|) / sum_m(w_m)`,
/// taking a matrix's term as 0 when the union is empty. Only positive scores
/// are written; a positive limit keeps the highest-scoring entries, ties
/// resolved by member id.
const REBUILD_ROW: &str = r#"
local row_key = KEYS[1]
local prefix = ARGV[1]
local item = ARGV[2]
local limit = tonumber(ARGV[3])
local nmat = tonumber(ARGV[4])

local labels = {}
local weights = {}
local total_weight = 0
for m = 1, nmat do
  labels[m] = ARGV[2 * m + 3]
  weights[m] = tonumber(ARGV[2 * m + 4])
  total_weight = total_weight + weights[m]
end

local candidates = {}
for m = 1, nmat do
  local sets = redis.call('SMEMBERS', prefix .. ':' .. labels[m] .. ':items:' .. item)
  for _, s in ipairs(sets) do
    local members = redis.call('SMEMBERS', prefix .. ':' .. labels[m] .. ':sets:' .. s)
    for _, other in ipairs(members) do
      if other ~= item then
        candidates[other] = true
      end
    end
  end
end

redis.call('DEL', row_key)
if total_weight == 0 then
  return 0
end

local own_cards = {}
for m = 1, nmat do
  own_cards[m] = redis.call('SCARD', prefix .. ':' .. labels[m] .. ':items:' .. item)
end

local written = 0
for other, _ in pairs(candidates) do
  local score = 0
  for m = 1, nmat do
    local a = prefix .. ':' .. labels[m] .. ':items:' .. item
    local b = prefix .. ':' .. labels[m] .. ':items:' .. other
    local inter = #redis.call('SINTER', a, b)
    if inter > 0 then
      local union = own_cards[m] + redis.call('SCARD', b) - inter
      score = score + weights[m] * (inter / union)
    end
  end
  if score > 0 then
    redis.call('ZADD', row_key, score / total_weight, other)
    written = written + 1
  end
end

if limit > 0 then
  redis.call('ZREMRANGEBYRANK', row_key, 0, -(limit + 1))
end
return written
"#;

pub(crate) fn encode_matrix_args(matrices: &[(String, f64)]) -> Vec<String> {
    let mut args = Vec::with_capacity(matrices.len() * 2);
    for (label, weight) in matrices {
        args.push(label.clone());
        args.push(weight.to_string());
    }
    args
}

/// Recomputes similarity rows from current matrix contents.
#[derive(Clone)]
pub struct SimilarityEngine {
    store: SetStore,
    prefix: String,
    limit: usize,
    matrix_count: usize,
    matrix_args: Vec<String>,
    script: Script,
}

impl SimilarityEngine {
    pub fn new(store: SetStore, prefix: &str, limit: usize, matrices: &[(String, f64)]) -> Self {
        Self {
            store,
            prefix: prefix.to_string(),
            limit,
            matrix_count: matrices.len(),
            matrix_args: encode_matrix_args(matrices),
            script: Script::new(REBUILD_ROW),
        }
    }

    fn row_args(&self, item: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(4 + self.matrix_args.len());
        args.push(self.prefix.clone());
        args.push(item.to_string());
        args.push(self.limit.to_string());
        args.push(self.matrix_count.to_string());
        args.extend(self.matrix_args.iter().cloned());
        args
    }

    /// Rebuild one item's row, returning how many entries it now holds
    /// before the top-K trim.
    pub async fn process_item(&self, item: &str) -> Result<u64> {
        let keys = [similarity_key(&self.prefix, item)];
        let written: u64 = self
            .store
            .eval_script(&self.script, &keys, &self.row_args(item))
            .await?;
        debug!(item, written, "Rebuilt similarity row");
        Ok(written)
    }

    /// Rebuild each distinct item's row, a bounded number at a time.
    /// Returns the number of items processed.
    #[instrument(skip_all, fields(candidates = items.len()))]
    pub async fn process_many(&self, items: &[String]) -> Result<usize> {
        let unique: HashSet<&str> = items.iter().map(String::as_str).collect();
        let total = unique.len();

        let mut rebuilds = stream::iter(unique.into_iter().map(|item| self.process_item(item)))
            .buffer_unordered(REPROCESS_CONCURRENCY);
        while let Some(result) = rebuilds.next().await {
            result?;
        }

        debug!(processed = total, "Batch reprocess complete");
        Ok(total)
    }
}
