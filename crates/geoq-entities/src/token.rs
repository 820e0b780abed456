use std::collections::HashSet;

use uuid::Uuid;

use crate::error::ApiError;
use crate::user::ROLE_ADMIN;

/// The parsed, not-yet-authenticated contents of a `User-Token`
/// header. Parsing never touches the store; [`crate::user::User`]
/// lookup and key comparison happen downstream, in geoq-auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserToken {
  Anonymous,
  Present { user_id: Uuid, api_key: String },
}

/// Parses a `User-Token: <uuidv4>:<api_key>` header value.
///
/// - Missing/empty header -> `Anonymous`.
/// - Anything other than exactly one colon, or a non-UUIDv4 first
///   part -> `ImproperUserToken`.
/// - An empty key half of an otherwise well-formed token ->
///   `EmptyUserToken`.
pub fn parse_user_token(
  header: Option<&str>,
) -> Result<UserToken, ApiError> {
  let Some(raw) = header else {
    return Ok(UserToken::Anonymous);
  };
  if raw.is_empty() {
    return Ok(UserToken::Anonymous);
  }

  let parts: Vec<&str> = raw.split(':').collect();
  if parts.len() != 2 {
    return Err(ApiError::ImproperUserToken);
  }
  let (id_part, key_part) = (parts[0], parts[1]);

  if id_part.is_empty() || key_part.is_empty() {
    return Err(ApiError::EmptyUserToken);
  }

  let user_id = Uuid::parse_str(id_part)
    .map_err(|_| ApiError::ImproperUserToken)?;
  if user_id.get_version_num() != 4 {
    return Err(ApiError::ImproperUserToken);
  }

  Ok(UserToken::Present {
    user_id,
    api_key: key_part.to_string(),
  })
}

/// Derives the scope set for a user's roles: every authenticated user
/// gets `AUTHENTICATED`; the `admin` role adds `ADMIN` only (it does
/// not also appear as a plain role scope); every other role name adds
/// itself verbatim.
pub fn scopes_for_roles(roles: &HashSet<String>) -> HashSet<String> {
  let mut scopes = HashSet::new();
  scopes.insert("AUTHENTICATED".to_string());
  for role in roles {
    if role == ROLE_ADMIN {
      scopes.insert("ADMIN".to_string());
    } else {
      scopes.insert(role.clone());
    }
  }
  scopes
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_header_is_anonymous() {
    assert_eq!(parse_user_token(None).unwrap(), UserToken::Anonymous);
    assert_eq!(parse_user_token(Some("")).unwrap(), UserToken::Anonymous);
  }

  #[test]
  fn well_formed_token_roundtrips_id_and_key() {
    let id = Uuid::new_v4();
    let raw = format!("{id}:secret-key");
    let parsed = parse_user_token(Some(&raw)).unwrap();
    assert_eq!(
      parsed,
      UserToken::Present { user_id: id, api_key: "secret-key".to_string() }
    );
  }

  #[test]
  fn more_than_one_colon_is_improper() {
    let id = Uuid::new_v4();
    let raw = format!("{id}:se:cret");
    assert!(matches!(
      parse_user_token(Some(&raw)),
      Err(ApiError::ImproperUserToken)
    ));
  }

  #[test]
  fn malformed_uuid_is_improper() {
    assert!(matches!(
      parse_user_token(Some("not-a-uuid:key")),
      Err(ApiError::ImproperUserToken)
    ));
  }

  #[test]
  fn admin_role_only_yields_admin_scope() {
    let roles = HashSet::from(["admin".to_string()]);
    let scopes = scopes_for_roles(&roles);
    assert!(scopes.contains("ADMIN"));
    assert!(!scopes.contains("admin"));
    assert!(scopes.contains("AUTHENTICATED"));
  }

  #[test]
  fn other_roles_pass_through_verbatim() {
    let roles = HashSet::from(["public".to_string(), "internal".to_string()]);
    let scopes = scopes_for_roles(&roles);
    assert!(scopes.contains("public"));
    assert!(scopes.contains("internal"));
  }
}
