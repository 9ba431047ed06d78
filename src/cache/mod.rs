pub mod eviction;
pub mod key;
pub mod loaded;
pub mod manager;
pub mod path;

pub use eviction::{EvictionPolicy, InsertionOrderPolicy};
pub use key::{compute_key, CacheKey, KEY_PREFIX};
pub use loaded::LoadedArtifacts;
pub use manager::{ArtifactCache, ArtifactInfo, CacheStats};
pub use path::{ARTIFACT_EXTENSION, STAGED_EXTENSION};
