//! Prediction: score aggregation across cached similarity rows.
//!
//! Given the items a user already has, every other item's predicted score is
//! the sum of its cached similarity to each input item (missing rows
//! contribute 0 and never error). The union runs on the store as a
//! `ZUNIONSTORE` into a scratch key inside one script, so the scratch key
//! never outlives the call; exclusion, ordering, and pagination happen
//! client-side on the merged rows.

use redis::Script;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Result;
use crate::ranking::{rank, QueryOptions, ScoredItem};
use crate::similarity::similarity_key;
use crate::store::SetStore;

/// Input universe for a prediction query.
#[derive(Debug, Clone)]
pub enum PredictionSource {
    /// An explicit list of items the user already has.
    Items(Vec<String>),
    /// A matrix set resolved at call time, e.g. a user's set in the
    /// "users" matrix.
    MatrixSet { label: String, set_id: String },
}

impl PredictionSource {
    /// Convenience constructor for an explicit item list.
    pub fn items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Items(items.into_iter().map(Into::into).collect())
    }

    /// Convenience constructor for a matrix-resolved input.
    pub fn matrix_set(label: impl Into<String>, set_id: impl Into<String>) -> Self {
        Self::MatrixSet {
            label: label.into(),
            set_id: set_id.into(),
        }
    }
}

/// Union the cached rows into a scratch key, read the merge back, drop the
/// scratch key. KEYS[1] is the scratch key, the rest are the rows.
const UNION_ROWS: &str = r#"
local dest = KEYS[1]
local rows = #KEYS - 1
if rows == 0 then
  return {}
end
local row_keys = {}
for i = 2, #KEYS do
  row_keys[i - 1] = KEYS[i]
end
redis.call('ZUNIONSTORE', dest, rows, unpack(row_keys))
local merged = redis.call('ZRANGE', dest, 0, -1, 'WITHSCORES')
redis.call('DEL', dest)
return merged
"#;

/// Parse the flat member/score reply of a WITHSCORES range.
pub(crate) fn parse_member_scores(flat: &[String]) -> Vec<(String, f64)> {
    flat.chunks_exact(2)
        .filter_map(|pair| {
            pair[1]
                .parse::<f64>()
                .ok()
                .map(|score| (pair[0].clone(), score))
        })
        .collect()
}

#[derive(Clone)]
pub(crate) struct PredictionQuery {
    store: SetStore,
    prefix: String,
    script: Script,
}

impl PredictionQuery {
    pub(crate) fn new(store: SetStore, prefix: &str) -> Self {
        Self {
            store,
            prefix: prefix.to_string(),
            script: Script::new(UNION_ROWS),
        }
    }

    /// Aggregate cached scores over the input items' rows. Input items are
    /// always excluded from the output; an empty input yields an empty
    /// result.
    pub(crate) async fn run(
        &self,
        input: &[String],
        opts: &QueryOptions,
    ) -> Result<Vec<ScoredItem>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::with_capacity(input.len() + 1);
        keys.push(format!("{}:predictions:{}", self.prefix, Uuid::new_v4()));
        keys.extend(input.iter().map(|item| similarity_key(&self.prefix, item)));

        let flat: Vec<String> = self.store.eval_script(&self.script, &keys, &[]).await?;
        let merged = parse_member_scores(&flat);

        let mut exclude: HashSet<String> = opts.exclude.clone();
        exclude.extend(input.iter().cloned());

        Ok(rank(merged, &exclude, opts.offset, opts.limit))
    }
}
