use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// The five states a [`crate::Request`](crate::request::Request) can
/// be in. Transitions are monotone except `Running -> Pending`, which
/// only an out-of-band reaper may perform (see executor design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
  Pending,
  Queued,
  Running,
  Done,
  Failed,
}

impl RequestStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, RequestStatus::Done | RequestStatus::Failed)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      RequestStatus::Pending => "PENDING",
      RequestStatus::Queued => "QUEUED",
      RequestStatus::Running => "RUNNING",
      RequestStatus::Done => "DONE",
      RequestStatus::Failed => "FAILED",
    }
  }
}

impl fmt::Display for RequestStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Unknown/future status strings map to `Pending` (forward
/// compatibility rule) rather than failing deserialization.
impl<'de> Deserialize<'de> for RequestStatus {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw = String::deserialize(deserializer)?;
    Ok(match raw.as_str() {
      "QUEUED" => RequestStatus::Queued,
      "RUNNING" => RequestStatus::Running,
      "DONE" => RequestStatus::Done,
      "FAILED" => RequestStatus::Failed,
      _ => RequestStatus::Pending,
    })
  }
}

impl std::str::FromStr for RequestStatus {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      "QUEUED" => RequestStatus::Queued,
      "RUNNING" => RequestStatus::Running,
      "DONE" => RequestStatus::Done,
      "FAILED" => RequestStatus::Failed,
      _ => RequestStatus::Pending,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_status_maps_to_pending() {
    assert_eq!(
      "TOTALLY_NEW_STATUS".parse::<RequestStatus>().unwrap(),
      RequestStatus::Pending
    );
  }

  #[test]
  fn known_statuses_roundtrip_through_as_str() {
    for status in [
      RequestStatus::Pending,
      RequestStatus::Queued,
      RequestStatus::Running,
      RequestStatus::Done,
      RequestStatus::Failed,
    ] {
      assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
    }
  }

  #[test]
  fn terminal_states() {
    assert!(RequestStatus::Done.is_terminal());
    assert!(RequestStatus::Failed.is_terminal());
    assert!(!RequestStatus::Running.is_terminal());
  }
}
