//! Model path discovery utilities
//!
//! Decides where the in-process model's files are cached.

use std::path::{Path, PathBuf};

/// Directory name used under the user's home
const HOME_DIR: &str = ".vecmem";

/// Find the model cache directory with priority:
/// 1. Explicit path from configuration (`VECMEM_MODELS_PATH`)
/// 2. `FASTEMBED_CACHE_PATH` environment variable
/// 3. User home directory (~/.vecmem/models)
/// 4. `.fastembed_cache` in the working directory
pub fn find_model_cache_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        log::info!("Using configured model cache: {}", path.display());
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        if !path.is_empty() {
            log::info!("Using FASTEMBED_CACHE_PATH: {}", path);
            return PathBuf::from(path);
        }
    }

    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        let user_path = PathBuf::from(home).join(HOME_DIR).join("models");
        log::debug!("Using user model cache: {}", user_path.display());
        return user_path;
    }

    PathBuf::from(".fastembed_cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let dir = PathBuf::from("/tmp/vecmem-models");
        assert_eq!(find_model_cache_dir(Some(&dir)), dir);
    }

    #[test]
    fn test_fallback_is_never_empty() {
        let path = find_model_cache_dir(None);
        assert!(!path.as_os_str().is_empty());
    }
}
