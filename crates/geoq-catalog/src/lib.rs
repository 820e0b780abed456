use std::path::{Path, PathBuf};

use geoq_entities::GeoQuery;
use serde::{Deserialize, Serialize};

mod static_catalog;

pub use static_catalog::{POOL_FAULT_PREFIX, StaticCatalog};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInfo {
  pub product: String,
  /// The role a caller must hold (or `admin`) to access this product.
  /// Absent means `public`.
  #[serde(default)]
  pub role: Option<String>,
  #[serde(default = "default_max_query_size_gb")]
  pub maximum_query_size_gb: f64,
  #[serde(default)]
  pub metadata: serde_json::Value,
}

fn default_max_query_size_gb() -> f64 {
  10.0
}

impl ProductInfo {
  pub fn role_or_public(&self) -> &str {
    self.role.as_deref().unwrap_or(geoq_entities::user::ROLE_PUBLIC)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
  pub dataset: String,
  pub products: Vec<ProductInfo>,
}

/// The catalog & query engine collaborator: given `(dataset, product,
/// query)` it estimates or produces a result. Treated as an external,
/// read-mostly system — the core only consumes this trait.
pub trait CatalogEngine: Send + Sync {
  fn list_datasets(
    &self,
  ) -> impl Future<Output = anyhow::Result<Vec<DatasetInfo>>> + Send;

  fn get_product(
    &self,
    dataset: &str,
    product: &str,
  ) -> impl Future<Output = anyhow::Result<Option<ProductInfo>>> + Send;

  fn estimate(
    &self,
    dataset: &str,
    product: &str,
    query: &GeoQuery,
  ) -> impl Future<Output = anyhow::Result<u64>> + Send;

  /// Runs the query to completion and returns the produced artifact
  /// path, or `None` if the result set was empty.
  fn execute(
    &self,
    dataset: &str,
    product: &str,
    query: &GeoQuery,
    out_dir: &Path,
    format: &str,
  ) -> impl Future<Output = anyhow::Result<Option<PathBuf>>> + Send;
}
