// Copyright 2021 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Local cache for unpacked model archives
//!
//! Archived checkpoints are extracted once into the cache directory and reused by every rank
//! (and every later run) afterwards. Concurrent extraction by several ranks is serialized by the
//! cache's own file lock.

use crate::common::error::BatchTranslationError;
use cached_path::{Cache, Options};
use std::path::{Path, PathBuf};

/// # Cache directory for extracted archives
/// If the environment variable `TRANSLATE_DDP_CACHE` is set, archives are unpacked at that
/// location. Otherwise defaults to `$HOME/.cache/.translate-ddp`.
pub fn get_cache_directory() -> Result<PathBuf, BatchTranslationError> {
    match std::env::var("TRANSLATE_DDP_CACHE") {
        Ok(value) => Ok(PathBuf::from(value)),
        Err(_) => {
            let mut home = dirs::home_dir().ok_or_else(|| {
                BatchTranslationError::ResourceError(
                    "could not determine the home directory, set TRANSLATE_DDP_CACHE".into(),
                )
            })?;
            home.push(".cache");
            home.push(".translate-ddp");
            Ok(home)
        }
    }
}

/// Extracts a local `.tar.gz` archive into the cache and returns the extraction directory.
pub fn extract_archive(archive_path: &Path) -> Result<PathBuf, BatchTranslationError> {
    let cache = Cache::builder()
        .dir(get_cache_directory()?)
        .progress_bar(None)
        .build()?;
    let resource = archive_path.to_str().ok_or_else(|| {
        BatchTranslationError::ResourceError(format!(
            "non UTF-8 archive path: {}",
            archive_path.display()
        ))
    })?;
    Ok(cache.cached_path_with_options(resource, &Options::default().subdir("models").extract())?)
}
