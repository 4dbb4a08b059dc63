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

use crate::common::Config;
use serde::{Deserialize, Serialize};

/// # Tarred corpus metadata
/// Written alongside the tarred batches by the corpus preprocessing step.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TarredDatasetMetadata {
    /// Total number of batches across all tar files
    pub num_batches: usize,
    /// Tar file names, relative to the corpus directory
    #[serde(default)]
    pub tar_files: Vec<String>,
}

impl Config for TarredDatasetMetadata {}
