//! Recommender configuration: keyspace name, input matrices, row cap, Redis.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, SimrecError};

/// Configuration for one recommender class.
///
/// The `name` doubles as the keyspace prefix: every key the recommender
/// writes lives under `{name}:`. Matrix labels must be distinct and weights
/// strictly positive; `validate` enforces both before any store traffic.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecommenderConfig {
    /// Class name, used as the keyspace prefix
    pub name: String,

    /// Input matrices in declaration order
    #[serde(default)]
    pub matrices: Vec<MatrixConfig>,

    /// Per-item similarity row cap (0 = unbounded)
    #[serde(default)]
    pub similarity_limit: usize,

    /// Redis connection configuration
    #[serde(default)]
    pub redis: RedisConfig,
}

/// One weighted input matrix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatrixConfig {
    /// Matrix label, unique within the recommender
    pub label: String,

    /// Relative weight of this matrix in the blended score
    pub weight: f64,
}

/// Redis connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

impl RecommenderConfig {
    /// Create a configuration with no matrices and an unbounded row cap.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matrices: Vec::new(),
            similarity_limit: 0,
            redis: RedisConfig::default(),
        }
    }

    /// Append an input matrix.
    pub fn with_matrix(mut self, label: impl Into<String>, weight: f64) -> Self {
        self.matrices.push(MatrixConfig {
            label: label.into(),
            weight,
        });
        self
    }

    /// Cap every similarity row at `limit` entries (0 = unbounded).
    pub fn with_similarity_limit(mut self, limit: usize) -> Self {
        self.similarity_limit = limit;
        self
    }

    /// Override the Redis connection URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis = RedisConfig { url: url.into() };
        self
    }

    /// Load configuration from an optional `config/simrec` file and
    /// `SIMREC_*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/simrec").required(false))
            .add_source(config::Environment::with_prefix("SIMREC").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Check structural validity: non-empty name and labels, distinct
    /// labels, strictly positive weights.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SimrecError::EmptyName);
        }

        let mut seen = HashSet::new();
        for matrix in &self.matrices {
            if matrix.label.trim().is_empty() {
                return Err(SimrecError::EmptyLabel);
            }
            if !seen.insert(matrix.label.as_str()) {
                return Err(SimrecError::DuplicateLabel(matrix.label.clone()));
            }
            if !(matrix.weight > 0.0) {
                return Err(SimrecError::InvalidWeight {
                    label: matrix.label.clone(),
                    weight: matrix.weight,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_matrices_in_order() {
        let config = RecommenderConfig::new("courses")
            .with_matrix("users", 3.0)
            .with_matrix("tags", 2.0)
            .with_similarity_limit(50);

        assert_eq!(config.name, "courses");
        assert_eq!(config.matrices.len(), 2);
        assert_eq!(config.matrices[0].label, "users");
        assert_eq!(config.matrices[1].weight, 2.0);
        assert_eq!(config.similarity_limit, 50);
        config.validate().unwrap();
    }

    #[test]
    fn default_limit_is_unbounded() {
        let config = RecommenderConfig::new("courses").with_matrix("users", 1.0);
        assert_eq!(config.similarity_limit, 0);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_empty_name() {
        let config = RecommenderConfig::new("  ");
        assert!(matches!(config.validate(), Err(SimrecError::EmptyName)));
    }

    #[test]
    fn rejects_duplicate_label() {
        let config = RecommenderConfig::new("courses")
            .with_matrix("users", 1.0)
            .with_matrix("users", 2.0);
        assert!(matches!(
            config.validate(),
            Err(SimrecError::DuplicateLabel(label)) if label == "users"
        ));
    }

    #[test]
    fn rejects_non_positive_weight() {
        let zero = RecommenderConfig::new("courses").with_matrix("users", 0.0);
        assert!(matches!(
            zero.validate(),
            Err(SimrecError::InvalidWeight { .. })
        ));

        let negative = RecommenderConfig::new("courses").with_matrix("users", -1.5);
        assert!(matches!(
            negative.validate(),
            Err(SimrecError::InvalidWeight { .. })
        ));

        let nan = RecommenderConfig::new("courses").with_matrix("users", f64::NAN);
        assert!(matches!(
            nan.validate(),
            Err(SimrecError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn rejects_blank_label() {
        let config = RecommenderConfig::new("courses").with_matrix("", 1.0);
        assert!(matches!(config.validate(), Err(SimrecError::EmptyLabel)));
    }
}
