use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use geoq_entities::GeoQuery;

use crate::{CatalogEngine, DatasetInfo, ProductInfo};

/// Error message prefix the executor watches for to decide that a
/// failure indicates the shared compute pool, not just the one job,
/// is compromised. Reserved for tests: the reference catalog never
/// emits it unless a query's `filters` explicitly opt in via
/// `__simulate_pool_fault`.
pub const POOL_FAULT_PREFIX: &str = "pool fault";

/// A YAML-file-backed, read-only catalog loaded once at startup. The
/// reference implementation used by the binaries and integration
/// tests; it has no notion of a real compute cluster, so `estimate`
/// derives a plausible byte count from query cardinality and
/// `execute` writes a small deterministic artifact.
pub struct StaticCatalog {
  datasets: Vec<DatasetInfo>,
}

impl StaticCatalog {
  pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
    let raw = std::fs::read_to_string(path).with_context(|| {
      format!("failed to read catalog file {path:?}")
    })?;
    let datasets: Vec<DatasetInfo> = serde_yaml_ng::from_str(&raw)
      .with_context(|| format!("failed to parse catalog file {path:?}"))?;
    Ok(Self { datasets })
  }

  pub fn from_datasets(datasets: Vec<DatasetInfo>) -> Self {
    Self { datasets }
  }

  fn find_product(
    &self,
    dataset: &str,
    product: &str,
  ) -> Option<&ProductInfo> {
    self
      .datasets
      .iter()
      .find(|d| d.dataset == dataset)?
      .products
      .iter()
      .find(|p| p.product == product)
  }
}

fn query_cardinality(query: &GeoQuery) -> u64 {
  let variable_count = query
    .variable
    .as_ref()
    .map(|v| v.as_slice().len() as u64)
    .unwrap_or(1)
    .max(1);

  let area_factor = if query.area.is_some() { 64 } else { 1 };
  let vertical_factor = match &query.vertical {
    Some(geoq_entities::query::VerticalSelector::Many(levels)) => {
      levels.len() as u64
    }
    Some(_) => 1,
    None => 1,
  };

  // A stand-in for "one grid-cell-timestep is ~8 bytes of float64".
  variable_count * area_factor * vertical_factor * 8
}

impl CatalogEngine for StaticCatalog {
  async fn list_datasets(&self) -> anyhow::Result<Vec<DatasetInfo>> {
    Ok(self.datasets.clone())
  }

  async fn get_product(
    &self,
    dataset: &str,
    product: &str,
  ) -> anyhow::Result<Option<ProductInfo>> {
    Ok(self.find_product(dataset, product).cloned())
  }

  async fn estimate(
    &self,
    dataset: &str,
    product: &str,
    query: &GeoQuery,
  ) -> anyhow::Result<u64> {
    self
      .find_product(dataset, product)
      .ok_or_else(|| anyhow!("unknown product '{product}' in '{dataset}'"))?;
    Ok(query_cardinality(query))
  }

  async fn execute(
    &self,
    dataset: &str,
    product: &str,
    query: &GeoQuery,
    out_dir: &Path,
    format: &str,
  ) -> anyhow::Result<Option<PathBuf>> {
    if query
      .filters
      .get("__simulate_pool_fault")
      .and_then(|v| v.as_bool())
      .unwrap_or(false)
    {
      return Err(anyhow!(
        "{POOL_FAULT_PREFIX}: simulated compute pool corruption"
      ));
    }

    let size = query_cardinality(query);
    if size == 0 {
      return Ok(None);
    }

    tokio::fs::create_dir_all(out_dir)
      .await
      .context("failed to create output directory")?;
    let file_name = format!("{dataset}_{product}.{format}");
    let out_path = out_dir.join(file_name);
    tokio::fs::write(&out_path, vec![0u8; size as usize])
      .await
      .context("failed to write result artifact")?;
    Ok(Some(out_path))
  }
}
