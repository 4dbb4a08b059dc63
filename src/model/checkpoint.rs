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

use crate::common::error::BatchTranslationError;
use crate::common::resources::extract_archive;
use std::path::{Path, PathBuf};

const WEIGHTS_FILE_NAMES: [&str; 2] = ["rust_model.ot", "model.ot"];
const SHARED_SPM_FILE_NAME: &str = "spiece.model";

/// # Supported checkpoint containers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// `.tar.gz` / `.tgz` bundle holding weights, configuration and vocabularies
    Archive,
    /// Bare `.ot` weights, with the configuration and vocabularies next to them
    Weights,
}

impl CheckpointFormat {
    /// Selects the checkpoint format from the file extension.
    ///
    /// # Example
    ///
    /// ```
    /// use std::path::Path;
    /// use translate_ddp::model::CheckpointFormat;
    ///
    /// let format = CheckpointFormat::from_path(Path::new("en-de.tar.gz")).unwrap();
    /// assert_eq!(format, CheckpointFormat::Archive);
    /// assert!(CheckpointFormat::from_path(Path::new("en-de.bin")).is_err());
    /// ```
    pub fn from_path(path: &Path) -> Result<CheckpointFormat, BatchTranslationError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
            Ok(CheckpointFormat::Archive)
        } else if file_name.ends_with(".ot") {
            Ok(CheckpointFormat::Weights)
        } else {
            Err(BatchTranslationError::UnsupportedCheckpointFormat(
                path.display().to_string(),
            ))
        }
    }
}

/// # Files required to restore a Marian translation model
#[derive(Clone, Debug, PartialEq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub vocab: PathBuf,
    pub weights: PathBuf,
    /// SentencePiece model of the encoder (source language)
    pub source_spm: PathBuf,
    /// SentencePiece model of the decoder (target language)
    pub target_spm: PathBuf,
}

impl ModelFiles {
    /// Locates the model files of a checkpoint, extracting archives into the local cache.
    pub fn resolve(checkpoint: &Path) -> Result<ModelFiles, BatchTranslationError> {
        if !checkpoint.is_file() {
            return Err(BatchTranslationError::IOError(format!(
                "checkpoint {} does not exist",
                checkpoint.display()
            )));
        }
        match CheckpointFormat::from_path(checkpoint)? {
            CheckpointFormat::Archive => {
                tracing::info!(checkpoint = %checkpoint.display(), "initializing from archive");
                let extracted = extract_archive(checkpoint)?;
                let root = Self::find_model_root(&extracted)?;
                Self::from_directory(&root, None)
            }
            CheckpointFormat::Weights => {
                tracing::info!(checkpoint = %checkpoint.display(), "initializing from weights");
                let directory = checkpoint.parent().unwrap_or_else(|| Path::new("."));
                Self::from_directory(directory, Some(checkpoint.to_path_buf()))
            }
        }
    }

    /// Collects the model files from a directory. The weights file is looked up by name when not
    /// provided.
    pub fn from_directory(
        directory: &Path,
        weights: Option<PathBuf>,
    ) -> Result<ModelFiles, BatchTranslationError> {
        let weights = match weights {
            Some(weights) => weights,
            None => WEIGHTS_FILE_NAMES
                .iter()
                .map(|name| directory.join(name))
                .find(|path| path.is_file())
                .ok_or_else(|| missing_file(directory, WEIGHTS_FILE_NAMES.join(" or ").as_str()))?,
        };
        let config = required_file(directory, "config.json")?;
        let vocab = required_file(directory, "vocab.json")?;
        let source_spm = match required_file(directory, "source.spm") {
            Ok(path) => path,
            Err(_) => required_file(directory, SHARED_SPM_FILE_NAME)?,
        };
        let target_spm = match required_file(directory, "target.spm") {
            Ok(path) => path,
            Err(_) => source_spm.clone(),
        };
        Ok(ModelFiles {
            config,
            vocab,
            weights,
            source_spm,
            target_spm,
        })
    }

    fn find_model_root(extracted: &Path) -> Result<PathBuf, BatchTranslationError> {
        if extracted.join("config.json").is_file() {
            return Ok(extracted.to_path_buf());
        }
        let mut subdirectories = Vec::new();
        for entry in std::fs::read_dir(extracted)? {
            let path = entry?.path();
            if path.is_dir() {
                subdirectories.push(path);
            }
        }
        match subdirectories.as_slice() {
            [single] if single.join("config.json").is_file() => Ok(single.clone()),
            _ => Err(missing_file(extracted, "config.json")),
        }
    }
}

fn required_file(directory: &Path, name: &str) -> Result<PathBuf, BatchTranslationError> {
    let path = directory.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(missing_file(directory, name))
    }
}

fn missing_file(directory: &Path, name: &str) -> BatchTranslationError {
    BatchTranslationError::InvalidConfigurationError(format!(
        "{} not found in {}",
        name,
        directory.display()
    ))
}
