//! Content identifiers and their canonical form.
//!
//! Two textual encodings can denote the same identifier: the legacy v0 form
//! (base58, `Qm...`) and the canonical v1 form (base32-lower, `bafy...`).
//! Every cache key, registry key, and distance-metric input in the node uses
//! the canonical form, so normalization happens exactly once, at parse time.

use std::fmt;

use cid::{Cid, Version};
use multibase::Base;

use crate::errors::EdgeError;

/// A validated, normalized content identifier.
///
/// Invariants:
/// - `canonical()` is idempotent and total: every parseable identifier has
///   exactly one canonical rendering, and re-parsing that rendering yields
///   the same value.
/// - v0 and v1 encodings of the same multihash canonicalize identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentId {
    cid: Cid,
    canonical: String,
}

impl ContentId {
    /// Parse an identifier from its textual form (legacy v0 or v1).
    pub fn parse(s: &str) -> Result<Self, EdgeError> {
        let cid =
            Cid::try_from(s).map_err(|e| EdgeError::InvalidIdentifier(format!("{s}: {e}")))?;
        Ok(Self::from_cid(cid))
    }

    /// Normalize an already-decoded identifier.
    pub fn from_cid(cid: Cid) -> Self {
        let v1 = match cid.version() {
            Version::V0 => Cid::new_v1(cid.codec(), *cid.hash()),
            _ => cid,
        };
        // Base32-lower rendering of a v1 identifier cannot fail; fall back to
        // the default rendering rather than panicking if it ever does.
        let canonical = v1
            .to_string_of_base(Base::Base32Lower)
            .unwrap_or_else(|_| v1.to_string());
        Self { cid: v1, canonical }
    }

    /// The canonical textual form (v1, base32-lower).
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// The content-encoding tag carried in the identifier.
    pub fn codec(&self) -> u64 {
        self.cid.codec()
    }

    /// The multihash algorithm tag.
    pub fn hash_code(&self) -> u64 {
        self.cid.hash().code()
    }

    /// The declared digest bytes.
    pub fn digest(&self) -> &[u8] {
        self.cid.hash().digest()
    }

    /// The underlying (normalized) CID.
    pub fn as_cid(&self) -> &Cid {
        &self.cid
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl From<Cid> for ContentId {
    fn from(cid: Cid) -> Self {
        Self::from_cid(cid)
    }
}
