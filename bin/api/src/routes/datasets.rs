use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use geoq_catalog::CatalogEngine;
use geoq_entities::bytes::{ByteUnit, bytes_in_unit, bytes_to_human};
use geoq_entities::error::ApiError;
use geoq_entities::query::GeoQuery;
use serde::{Deserialize, Serialize};

use crate::auth::authenticate;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
  Router::new()
    .route("/", get(list_datasets))
    .route("/{dataset}/{product}", get(get_product))
    .route("/{dataset}/{product}/metadata", get(get_metadata))
    .route("/{dataset}/{product}/estimate", post(estimate))
}

#[derive(Serialize)]
struct ProductView {
  product: String,
  role: String,
  maximum_query_size_gb: f64,
}

#[derive(Serialize)]
struct DatasetView {
  dataset: String,
  products: Vec<ProductView>,
}

async fn list_datasets(
  State(state): State<AppState>,
  headers: HeaderMap,
) -> Result<Json<Vec<DatasetView>>, ApiError> {
  let ctx = authenticate(&state, &headers).await?;

  let datasets = state.catalog.list_datasets().await?;
  let views = datasets
    .into_iter()
    .map(|d| DatasetView {
      dataset: d.dataset,
      products: d
        .products
        .into_iter()
        .filter(|p| ctx.authorized_for_product_role(p.role_or_public()))
        .map(|p| ProductView {
          product: p.product,
          role: p.role_or_public().to_string(),
          maximum_query_size_gb: p.maximum_query_size_gb,
        })
        .collect(),
    })
    .collect();
  Ok(Json(views))
}

pub(crate) async fn authorized_product(
  state: &AppState,
  headers: &HeaderMap,
  dataset: &str,
  product: &str,
) -> Result<geoq_catalog::ProductInfo, ApiError> {
  let ctx = authenticate(state, headers).await?;

  let Some(info) = state.catalog.get_product(dataset, product).await?
  else {
    let datasets = state.catalog.list_datasets().await?;
    if !datasets.iter().any(|d| d.dataset == dataset) {
      return Err(ApiError::MissingDataset(dataset.to_string()));
    }
    return Err(ApiError::MissingProduct(
      product.to_string(),
      dataset.to_string(),
    ));
  };

  if !ctx.authorized_for_product_role(info.role_or_public()) {
    return Err(ApiError::AuthorizationFailed);
  }

  Ok(info)
}

#[derive(Serialize)]
struct ProductDetail {
  dataset: String,
  product: String,
  role: String,
  maximum_query_size_gb: f64,
}

async fn get_product(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path((dataset, product)): Path<(String, String)>,
) -> Result<Json<ProductDetail>, ApiError> {
  let info =
    authorized_product(&state, &headers, &dataset, &product).await?;
  Ok(Json(ProductDetail {
    dataset,
    product,
    role: info.role_or_public().to_string(),
    maximum_query_size_gb: info.maximum_query_size_gb,
  }))
}

async fn get_metadata(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path((dataset, product)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
  let info =
    authorized_product(&state, &headers, &dataset, &product).await?;
  Ok(Json(info.metadata))
}

#[derive(Deserialize)]
struct EstimateParams {
  unit: Option<String>,
}

#[derive(Serialize)]
struct EstimateResponse {
  value: f64,
  units: String,
}

async fn estimate(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path((dataset, product)): Path<(String, String)>,
  Query(params): Query<EstimateParams>,
  Json(query): Json<GeoQuery>,
) -> Result<Json<EstimateResponse>, ApiError> {
  authorized_product(&state, &headers, &dataset, &product).await?;
  query.validate().map_err(|e| ApiError::InvalidQuery(e.to_string()))?;

  let bytes =
    state.catalog.estimate(&dataset, &product, &query).await?;

  let (value, unit) = match params.unit {
    Some(requested) => {
      let unit = ByteUnit::parse(&requested).ok_or_else(|| {
        ApiError::InvalidQuery(format!("unknown unit '{requested}'"))
      })?;
      (bytes_in_unit(bytes, unit), unit)
    }
    None => bytes_to_human(bytes),
  };

  Ok(Json(EstimateResponse { value, units: unit.label().to_string() }))
}
