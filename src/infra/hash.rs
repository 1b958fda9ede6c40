//! Content hashing for provisioned contexts.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Deterministic digest of everything that determines what an install root
/// contains: the ordered dependency list, the resolved interpreter and the
/// installer template. Order matters; `["a", "b"]` and `["b", "a"]` differ.
pub fn dependency_digest(
    dependencies: &[String],
    interpreter: Option<&Path>,
    installer: &[String],
) -> String {
    let mut hasher = Sha256::new();

    hasher.update(b"deps");
    for dep in dependencies {
        hasher.update(dep.as_bytes());
        hasher.update(b"\0");
    }

    hasher.update(b"\x1finterpreter");
    if let Some(path) = interpreter {
        hasher.update(path.to_string_lossy().as_bytes());
    }

    hasher.update(b"\x1finstaller");
    for arg in installer {
        hasher.update(arg.as_bytes());
        hasher.update(b"\0");
    }

    hex::encode(hasher.finalize())
}

/// The first 12 hex characters of a digest, for logs.
pub fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}
