//! Nodes and webhook token verification.
//!
//! A node is the destination within a workspace that webhook URLs and product
//! mappings are scoped to. Its token is stored only as a SHA-256 digest.

use rand_core::{OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq as _;
use thiserror::Error;

/// A registered node as read from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
  pub node_id:      String,
  pub workspace_id: String,
  /// Lowercase hex SHA-256 of the node's webhook token.
  pub token_sha256: String,
}

/// Why a URL's (workspace, node, token) triple was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
  #[error("unknown node")]
  UnknownNode,
  #[error("node does not belong to this workspace")]
  WorkspaceMismatch,
  #[error("token does not match")]
  TokenMismatch,
}

impl AuthFailure {
  pub fn reason(&self) -> &'static str {
    match self {
      Self::UnknownNode => "unknown_node",
      Self::WorkspaceMismatch => "workspace_mismatch",
      Self::TokenMismatch => "token_mismatch",
    }
  }
}

/// Hex SHA-256 digest of a plaintext token.
pub fn hash_token(token: &str) -> String {
  hex::encode(Sha256::digest(token.as_bytes()))
}

/// A fresh 256-bit random token rendered as hex.
pub fn generate_token() -> String {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

/// Check a looked-up node against the workspace and token from the URL.
pub fn authorize(
  node: Option<NodeRecord>,
  workspace_id: &str,
  token: &str,
) -> Result<NodeRecord, AuthFailure> {
  let node = node.ok_or(AuthFailure::UnknownNode)?;
  if node.workspace_id != workspace_id {
    return Err(AuthFailure::WorkspaceMismatch);
  }
  if !digests_equal(&hash_token(token), &node.token_sha256) {
    return Err(AuthFailure::TokenMismatch);
  }
  Ok(node)
}

fn digests_equal(a: &str, b: &str) -> bool { a.as_bytes().ct_eq(b.as_bytes()).into() }

#[cfg(test)]
mod tests {
  use super::*;

  fn node(token: &str) -> NodeRecord {
    NodeRecord {
      node_id:      "node_1".into(),
      workspace_id: "ws_1".into(),
      token_sha256: hash_token(token),
    }
  }

  #[test]
  fn valid_triple_authorizes() {
    let n = authorize(Some(node("secret")), "ws_1", "secret").unwrap();
    assert_eq!(n.node_id, "node_1");
  }

  #[test]
  fn unknown_node() {
    assert_eq!(authorize(None, "ws_1", "secret"), Err(AuthFailure::UnknownNode));
  }

  #[test]
  fn workspace_mismatch_checked_before_token() {
    assert_eq!(
      authorize(Some(node("secret")), "ws_2", "wrong"),
      Err(AuthFailure::WorkspaceMismatch)
    );
  }

  #[test]
  fn wrong_token() {
    assert_eq!(
      authorize(Some(node("secret")), "ws_1", "guess"),
      Err(AuthFailure::TokenMismatch)
    );
  }

  #[test]
  fn digest_comparison() {
    let h = hash_token("secret");
    assert!(digests_equal(&h, &hash_token("secret")));
    assert!(!digests_equal(&h, &hash_token("secreu")));
    assert!(!digests_equal(&h, &h[..63]));
    assert!(!digests_equal(&h, ""));
  }

  #[test]
  fn hash_is_stable_hex() {
    let h = hash_token("abc");
    assert_eq!(h.len(), 64);
    assert_eq!(h, hash_token("abc"));
    assert_ne!(h, hash_token("abd"));
  }

  #[test]
  fn generated_tokens_are_unique_hex() {
    let a = generate_token();
    let b = generate_token();
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, b);
  }
}
