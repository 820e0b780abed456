use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Accepts either a bare value or a list of values on the wire, and
/// re-serializes whichever shape it was constructed with — so a
/// single value submitted by a client never turns into a one-element
/// array on the way back out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
  One(T),
  Many(Vec<T>),
}

impl<T> OneOrMany<T> {
  pub fn as_slice(&self) -> &[T] {
    match self {
      OneOrMany::One(v) => std::slice::from_ref(v),
      OneOrMany::Many(v) => v,
    }
  }
}

/// A half-open `{start, stop, step}` range. Values are left as raw
/// JSON since the catalog collaborator defines what a coordinate
/// looks like (numeric index, ISO timestamp, ...).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RangeSelector {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub stop: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub step: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimeComponents {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub year: Option<Vec<i64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub month: Option<Vec<i64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub day: Option<Vec<i64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hour: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeSelector {
  Range(RangeSelector),
  Components(TimeComponents),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
  pub north: f64,
  pub south: f64,
  pub east: f64,
  pub west: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSelector {
  pub latitude: OneOrMany<f64>,
  pub longitude: OneOrMany<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerticalSelector {
  Single(f64),
  Many(Vec<f64>),
  Range(RangeSelector),
}

/// The declarative subset/filter specification submitted by clients.
/// `area` and `location` are mutually exclusive (validated, not
/// type-enforced — see [`GeoQuery::validate`]); unrecognized top-level
/// keys survive round trips inside `filters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoQuery {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub variable: Option<OneOrMany<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub time: Option<TimeSelector>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub area: Option<BoundingBox>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location: Option<LocationSelector>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub vertical: Option<VerticalSelector>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub format: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub format_args: Option<Value>,
  #[serde(flatten)]
  pub filters: serde_json::Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum GeoQueryError {
  #[error(
    "'area' and 'location' are mutually exclusive in a single query"
  )]
  AreaAndLocationBothPresent,
}

impl GeoQuery {
  pub fn validate(&self) -> Result<(), GeoQueryError> {
    if self.area.is_some() && self.location.is_some() {
      return Err(GeoQueryError::AreaAndLocationBothPresent);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn one_or_many_roundtrips_scalar() {
    let value: OneOrMany<String> =
      serde_json::from_str("\"t2m\"").unwrap();
    assert_eq!(value, OneOrMany::One("t2m".to_string()));
    let back = serde_json::to_string(&value).unwrap();
    assert_eq!(back, "\"t2m\"");
  }

  #[test]
  fn one_or_many_roundtrips_list() {
    let value: OneOrMany<String> =
      serde_json::from_str("[\"t2m\",\"u10\"]").unwrap();
    assert_eq!(
      value,
      OneOrMany::Many(vec!["t2m".to_string(), "u10".to_string()])
    );
  }

  #[test]
  fn unknown_top_level_keys_survive_in_filters() {
    let raw = serde_json::json!({
      "variable": "t2m",
      "custom_extension": {"nested": true},
    });
    let query: GeoQuery = serde_json::from_value(raw.clone()).unwrap();
    assert!(query.filters.contains_key("custom_extension"));
    let back = serde_json::to_value(&query).unwrap();
    assert_eq!(back["custom_extension"], raw["custom_extension"]);
  }

  #[test]
  fn area_and_location_together_is_rejected() {
    let query = GeoQuery {
      variable: None,
      time: None,
      area: Some(BoundingBox { north: 1.0, south: 0.0, east: 1.0, west: 0.0 }),
      location: Some(LocationSelector {
        latitude: OneOrMany::One(0.0),
        longitude: OneOrMany::One(0.0),
      }),
      vertical: None,
      format: None,
      format_args: None,
      filters: Default::default(),
    };
    assert!(matches!(
      query.validate(),
      Err(GeoQueryError::AreaAndLocationBothPresent)
    ));
  }
}
