//! Strong type definitions for Design Sync.
//!
//! Identifiers are string newtypes so a project token can never be passed
//! where a peer id is expected.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Maximum length of a project id in bytes.
pub const MAX_PROJECT_ID_LEN: usize = 64;

const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Shareable token identifying one design document across every client.
///
/// Stable for the lifetime of the document. Carried out-of-band, usually as
/// the `project` query parameter of a share link.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    /// Parse and validate a project token.
    pub fn parse(token: impl Into<String>) -> Result<Self, CoreError> {
        let token = token.into();
        if token.is_empty() {
            return Err(CoreError::InvalidProjectId("empty".into()));
        }
        if token.len() > MAX_PROJECT_ID_LEN {
            return Err(CoreError::InvalidProjectId(format!(
                "{} bytes exceeds {}",
                token.len(),
                MAX_PROJECT_ID_LEN
            )));
        }
        if let Some(c) = token
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(CoreError::InvalidProjectId(format!(
                "unexpected character {c:?}"
            )));
        }
        Ok(Self(token))
    }

    /// Generate a fresh token of the form `p-xxxxxx`.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..6)
            .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
            .collect();
        Self(format!("p-{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjectId({})", self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProjectId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

/// The id a process is reachable under on the peer network.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an existing peer id.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::InvalidPeerId("empty".into()));
        }
        Ok(Self(id))
    }

    /// Generate a random guest id.
    pub fn random() -> Self {
        let bytes: [u8; 8] = rand::thread_rng().gen();
        Self(format!("peer-{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The peer id the host of a project registers under.
///
/// Derived from Blake3("design-sync-host-v0:" || project) so every client
/// computes the same key without publishing the raw project token.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct RendezvousKey(PeerId);

impl RendezvousKey {
    /// Derive the rendezvous key for a project.
    pub fn derive(project: &ProjectId) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"design-sync-host-v0:");
        hasher.update(project.as_str().as_bytes());
        let digest = hasher.finalize();
        Self(PeerId(format!("design-{}", &hex::encode(digest.as_bytes())[..24])))
    }

    /// The peer id a host claims for this key.
    pub fn peer_id(&self) -> &PeerId {
        &self.0
    }
}

impl fmt::Display for RendezvousKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The application user a client acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
