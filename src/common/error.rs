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

use rust_bert::RustBertError;
use rust_tokenizers::error::TokenizerError;
use tch::TchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchTranslationError {
    #[error("IO error: {0}")]
    IOError(String),

    #[error("Tch tensor error: {0}")]
    TchError(String),

    #[error("Tokenizer error: {0}")]
    TokenizerError(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Resource error: {0}")]
    ResourceError(String),

    #[error("Invalid configuration error: {0}")]
    InvalidConfigurationError(String),

    #[error("Unsupported checkpoint format: {0} (expected a .tar.gz/.tgz archive or .ot weights)")]
    UnsupportedCheckpointFormat(String),

    #[error("Dataset error: {0}")]
    DatasetError(String),

    #[error("Rendezvous error: {0}")]
    RendezvousError(String),

    #[error("Worker failure: {0}")]
    WorkerFailure(String),
}

impl From<std::io::Error> for BatchTranslationError {
    fn from(error: std::io::Error) -> Self {
        BatchTranslationError::IOError(error.to_string())
    }
}

impl From<TokenizerError> for BatchTranslationError {
    fn from(error: TokenizerError) -> Self {
        BatchTranslationError::TokenizerError(error.to_string())
    }
}

impl From<TchError> for BatchTranslationError {
    fn from(error: TchError) -> Self {
        BatchTranslationError::TchError(error.to_string())
    }
}

impl From<RustBertError> for BatchTranslationError {
    fn from(error: RustBertError) -> Self {
        BatchTranslationError::ModelError(error.to_string())
    }
}

impl From<serde_json::Error> for BatchTranslationError {
    fn from(error: serde_json::Error) -> Self {
        BatchTranslationError::InvalidConfigurationError(error.to_string())
    }
}

impl From<cached_path::Error> for BatchTranslationError {
    fn from(error: cached_path::Error) -> Self {
        BatchTranslationError::ResourceError(error.to_string())
    }
}
