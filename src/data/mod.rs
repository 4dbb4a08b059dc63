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

//! # Tarred translation datasets
//!
//! Pre-tokenized corpora are stored as tar files of JSON batches, each batch holding a `src`
//! id matrix (and a `tgt` matrix for parallel corpora). A JSON metadata file records the total
//! number of batches and, optionally, the tar file names.
//!
//! The tar files are split across ranks according to a `ShardStrategy`. With the default
//! `Scatter` strategy, every rank reads a disjoint slice of the files, so that no sentence is
//! translated twice. Batches are drawn from a shuffling buffer of `shuffle_n` entries.
//!
//! ```no_run
//! # fn main() -> Result<(), translate_ddp::BatchTranslationError> {
//! use translate_ddp::data::{ShardStrategy, TarredDatasetConfig, TarredOneSideTranslationDataset};
//!
//! let config = TarredDatasetConfig {
//!     text_tar_filepaths: "corpus/batches.tokens.{0..7}.tar".to_string(),
//!     metadata_path: "corpus/metadata.json".into(),
//!     shuffle_n: 100,
//!     shard_strategy: ShardStrategy::Scatter,
//!     world_size: 4,
//!     global_rank: 1,
//!     seed: 42,
//! };
//! let dataset = TarredOneSideTranslationDataset::new(&config, 58100)?;
//! for batch in dataset.iter() {
//!     let tensors = batch?.into_tensors();
//!     assert_eq!(tensors.len(), 2);
//! }
//! # Ok(())
//! # }
//! ```

mod filepaths;
mod metadata;
mod tarred;

pub use filepaths::expand_filepaths;
pub use metadata::TarredDatasetMetadata;
pub use tarred::{
    shard_files, SerializedBatch, ShardStrategy, TarredDatasetConfig,
    TarredOneSideTranslationDataset, TarredTranslationDataset, TranslationBatch,
};
