use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved role names with system-wide meaning.
pub const ROLE_PUBLIC: &str = "public";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_INTERNAL: &str = "internal";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
  pub role_id: i64,
  pub role_name: String,
}

/// A registered caller. `api_key` is marked `skip_serializing` below,
/// so no read endpoint can ever hand it back to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub user_id: Uuid,
  #[serde(skip_serializing)]
  pub api_key: String,
  pub contact_name: String,
  pub roles: HashSet<String>,
}

impl User {
  pub fn is_admin(&self) -> bool {
    self.roles.iter().any(|r| r == ROLE_ADMIN)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
  pub worker_id: i64,
  pub host: String,
  pub status: String,
  pub scheduler_port: i32,
  pub dashboard_address: String,
  pub created_on: DateTime<Utc>,
}
