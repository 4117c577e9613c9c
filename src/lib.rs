//! # simrec
//!
//! Item-item similarities and user-to-item predictions over sparse binary
//! relations, backed entirely by Redis sets and sorted sets.
//!
//! A recommender class composes several weighted *matrices*, each a
//! bipartite relation between sets (users, tags, topics, ...) and items.
//! Similarity between two items blends a per-matrix Jaccard coefficient
//! over the sets containing each item, weighted and normalized so scores
//! stay in `[0, 1]`. Each item's similar-items row is cached in a sorted
//! set, optionally capped at the top K, and rebuilt atomically by a
//! server-side script whenever memberships change. Predictions aggregate
//! the cached rows of the items a user already has.
//!
//! ## Modules
//!
//! - `config`: recommender, matrix, and Redis configuration
//! - `error`: error types
//! - `store`: the Redis adapter (sets, sorted sets, atomic scripts)
//! - `matrix`: forward/reverse storage for one named relation
//! - `similarity`: atomic per-item row recomputation
//! - `prediction`: score aggregation across cached rows
//! - `ranking`: exclusion, ordering, and pagination of results
//! - `recommender`: the public composition
//!
//! ## Example
//!
//! ```no_run
//! use simrec::{PredictionSource, Processing, QueryOptions, Recommender, RecommenderConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RecommenderConfig::new("courses")
//!     .with_matrix("users", 3.0)
//!     .with_matrix("tags", 2.0)
//!     .with_similarity_limit(100);
//!
//! let rec = Recommender::connect(&config).await?;
//!
//! rec.add_to_matrix("users", "u1", &["c1", "c2"], Processing::Immediate)
//!     .await?;
//!
//! let similar = rec.similarities_for("c1", &QueryOptions::default()).await?;
//! let predicted = rec
//!     .predictions_for(
//!         &PredictionSource::matrix_set("users", "u1"),
//!         &QueryOptions::default().with_limit(10),
//!     )
//!     .await?;
//! # let _ = (similar, predicted);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod matrix;
pub mod prediction;
pub mod ranking;
pub mod recommender;
pub mod similarity;
pub mod store;

pub use config::{MatrixConfig, RecommenderConfig, RedisConfig};
pub use error::{Result, SimrecError};
pub use matrix::Matrix;
pub use prediction::PredictionSource;
pub use ranking::{QueryOptions, ScoredItem};
pub use recommender::{Processing, Recommender};
pub use similarity::SimilarityEngine;
pub use store::SetStore;
