//! Content-addressed caching for remote artifacts and chart bundles
//!
//! Entries are keyed by unique references (commit SHA, tag, blob SHA) so a key
//! always names the same bytes. The cache root is append-only: entries are
//! created lazily on first use and never mutated or evicted afterwards, which
//! makes a cache hit equivalent to the original fetch.

pub mod artifact;
pub mod chart;

pub use artifact::{ArtifactStore, RemoteArtifact};
pub use chart::{ChartCache, ChartFetcher, HelmCli};

use sha2::{Digest, Sha256};

/// Normalize a human-supplied key component to the filesystem-safe alphabet
/// `[A-Za-z0-9-]`.
///
/// Distinct inputs can normalize to the same string (`a/b` and `a.b` both
/// become `a-b`), so keys built from normalized components must also fold in
/// an immutable reference that disambiguates content.
pub fn safe_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Short digest used to namespace same-named packages from different sources:
/// sha256 over the source string, first four bytes, lowercase hex.
pub fn short_digest(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}
