//! Output shaping shared by similarity and prediction reads: exclusion
//! filtering, deterministic ordering, offset/limit pagination.

use std::cmp::Ordering;
use std::collections::HashSet;

/// A result row: an item and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub id: String,
    pub score: f64,
}

/// Read-side options shared by similarity and prediction queries.
///
/// Pagination applies after exclusion filtering, so offset and limit count
/// only returned items.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Maximum number of results (`None` = unbounded).
    pub limit: Option<usize>,
    /// Results to skip after exclusion filtering.
    pub offset: usize,
    /// Items to drop from the result set.
    pub exclude: HashSet<String>,
}

impl QueryOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_excluded<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(items.into_iter().map(Into::into));
        self
    }
}

/// Filter, order, and paginate raw (item, score) rows.
///
/// Ordering is score-descending with item-id-ascending tie-breaks, which
/// keeps equal-score output deterministic regardless of how the store
/// returned the rows.
pub(crate) fn rank(
    entries: Vec<(String, f64)>,
    exclude: &HashSet<String>,
    offset: usize,
    limit: Option<usize>,
) -> Vec<ScoredItem> {
    let mut rows: Vec<ScoredItem> = entries
        .into_iter()
        .filter(|(id, _)| !exclude.contains(id))
        .map(|(id, score)| ScoredItem { id, score })
        .collect();

    rows.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    rows.into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}
