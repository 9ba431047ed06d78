use std::fmt;
use std::sync::Arc;

use cycompile_source::TranslationUnit;
use sha1::{Digest, Sha1};

use crate::profile::CompilerConfig;

/// Keeps generated artifact names apart from unrelated files in the cache
/// root; also makes every identifier a valid module name.
pub const KEY_PREFIX: &str = "mod_";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(pub Arc<String>);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content identifier of a (configuration, translation unit) pair.
///
/// Pure and deterministic: structurally identical units built with the same
/// configuration share one identifier, in this process and in any other.
pub fn compute_key(unit: &TranslationUnit, config: &CompilerConfig) -> CacheKey {
    let mut hasher = Sha1::new();
    hasher.update(config.fingerprint().as_bytes());
    hasher.update(b"\n");
    hasher.update(unit.text().as_bytes());
    CacheKey(Arc::new(format!("{KEY_PREFIX}{:x}", hasher.finalize())))
}
