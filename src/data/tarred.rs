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
use crate::common::Config;
use crate::data::filepaths::expand_filepaths;
use crate::data::metadata::TarredDatasetMetadata;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tch::{Kind, Tensor};

/// # Assignment of tar files to ranks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardStrategy {
    /// Each rank receives a disjoint, contiguous slice of `num_files / world_size` files.
    /// Trailing files that do not divide evenly are not read.
    Scatter,
    /// Every rank reads every file.
    Replicate,
}

impl FromStr for ShardStrategy {
    type Err = BatchTranslationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scatter" => Ok(ShardStrategy::Scatter),
            "replicate" => Ok(ShardStrategy::Replicate),
            _ => Err(BatchTranslationError::InvalidConfigurationError(format!(
                "unknown shard strategy {}, expected `scatter` or `replicate`",
                value
            ))),
        }
    }
}

/// Selects the tar files read by `rank`.
pub fn shard_files<T: Clone>(
    files: &[T],
    strategy: ShardStrategy,
    world_size: usize,
    rank: usize,
) -> Result<Vec<T>, BatchTranslationError> {
    if rank >= world_size {
        return Err(BatchTranslationError::InvalidConfigurationError(format!(
            "rank {} out of range for world size {}",
            rank, world_size
        )));
    }
    match strategy {
        ShardStrategy::Replicate => Ok(files.to_vec()),
        ShardStrategy::Scatter => {
            if files.len() < world_size {
                return Err(BatchTranslationError::DatasetError(format!(
                    "cannot scatter {} tar files over {} ranks",
                    files.len(),
                    world_size
                )));
            }
            if files.len() % world_size != 0 {
                tracing::warn!(
                    num_files = files.len(),
                    world_size,
                    "number of tar files is not divisible by the world size, trailing files are skipped"
                );
            }
            let per_rank = files.len() / world_size;
            let begin = per_rank * rank;
            Ok(files[begin..begin + per_rank].to_vec())
        }
    }
}

/// # Batch as serialized in the tar files
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SerializedBatch {
    /// Source token ids, one row per sentence
    pub src: Vec<Vec<i64>>,
    /// Target token ids, present in parallel corpora only
    #[serde(default)]
    pub tgt: Option<Vec<Vec<i64>>>,
}

/// # Tensor batch produced by the datasets
pub enum TranslationBatch {
    OneSide {
        src_ids: Tensor,
        src_mask: Tensor,
    },
    TwoSide {
        src_ids: Tensor,
        src_mask: Tensor,
        tgt_ids: Tensor,
        tgt_mask: Tensor,
        labels: Tensor,
    },
}

impl TranslationBatch {
    /// Flattens the batch in dataset order: `(src_ids, src_mask)` for one-sided batches,
    /// `(src_ids, src_mask, tgt_ids, tgt_mask, labels)` for two-sided batches.
    pub fn into_tensors(self) -> Vec<Tensor> {
        match self {
            TranslationBatch::OneSide { src_ids, src_mask } => vec![src_ids, src_mask],
            TranslationBatch::TwoSide {
                src_ids,
                src_mask,
                tgt_ids,
                tgt_mask,
                labels,
            } => vec![src_ids, src_mask, tgt_ids, tgt_mask, labels],
        }
    }
}

fn ids_to_tensor(rows: &[Vec<i64>], pad_id: i64) -> Result<Tensor, BatchTranslationError> {
    let max_len = rows.iter().map(|row| row.len()).max().unwrap_or(0);
    if rows.is_empty() || max_len == 0 {
        return Err(BatchTranslationError::DatasetError(
            "empty batch in tarred dataset".into(),
        ));
    }
    let mut flat = Vec::with_capacity(rows.len() * max_len);
    for row in rows {
        flat.extend_from_slice(row);
        flat.extend(std::iter::repeat(pad_id).take(max_len - row.len()));
    }
    Ok(Tensor::of_slice(&flat).view((rows.len() as i64, max_len as i64)))
}

fn padding_mask(ids: &Tensor, pad_id: i64) -> Tensor {
    ids.ne(pad_id).to_kind(Kind::Int64)
}

fn resolve_tar_files(
    text_tar_filepaths: &str,
    metadata: &TarredDatasetMetadata,
) -> Result<Vec<PathBuf>, BatchTranslationError> {
    let corpus_path = Path::new(text_tar_filepaths);
    if corpus_path.is_dir() {
        if metadata.tar_files.is_empty() {
            return Err(BatchTranslationError::DatasetError(format!(
                "{} is a directory but the metadata does not list any tar file",
                corpus_path.display()
            )));
        }
        return Ok(metadata
            .tar_files
            .iter()
            .map(|file| corpus_path.join(file))
            .collect());
    }
    Ok(expand_filepaths(text_tar_filepaths)?
        .into_iter()
        .map(PathBuf::from)
        .collect())
}

/// # Options shared by the tarred datasets
#[derive(Clone, Debug)]
pub struct TarredDatasetConfig {
    /// Tar file pattern (brace expansion supported) or corpus directory
    pub text_tar_filepaths: String,
    /// Path to the JSON metadata of the corpus
    pub metadata_path: PathBuf,
    /// Size of the shuffling buffer, `0` or `1` preserve file order
    pub shuffle_n: usize,
    pub shard_strategy: ShardStrategy,
    pub world_size: usize,
    pub global_rank: usize,
    /// Seed of the shuffling buffer
    pub seed: u64,
}

struct ShardReader {
    files: VecDeque<PathBuf>,
    pending: VecDeque<SerializedBatch>,
    buffer: Vec<SerializedBatch>,
    shuffle_n: usize,
    rng: StdRng,
}

impl ShardReader {
    fn new(files: Vec<PathBuf>, shuffle_n: usize, seed: u64) -> ShardReader {
        ShardReader {
            files: files.into(),
            pending: VecDeque::new(),
            buffer: Vec::new(),
            shuffle_n: shuffle_n.max(1),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn read_tar_file(path: &Path) -> Result<Vec<SerializedBatch>, BatchTranslationError> {
        let file = File::open(path).map_err(|e| {
            BatchTranslationError::DatasetError(format!(
                "could not open tar file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut archive = tar::Archive::new(file);
        let mut batches = Vec::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let mut contents = String::new();
            entry.read_to_string(&mut contents)?;
            let batch: SerializedBatch = serde_json::from_str(&contents).map_err(|e| {
                BatchTranslationError::DatasetError(format!(
                    "malformed batch in {}: {}",
                    path.display(),
                    e
                ))
            })?;
            batches.push(batch);
        }
        Ok(batches)
    }

    fn fill_buffer(&mut self) -> Result<(), BatchTranslationError> {
        while self.buffer.len() < self.shuffle_n {
            match self.pending.pop_front() {
                Some(batch) => self.buffer.push(batch),
                None => match self.files.pop_front() {
                    Some(path) => self.pending.extend(Self::read_tar_file(&path)?),
                    None => break,
                },
            }
        }
        Ok(())
    }
}

impl Iterator for ShardReader {
    type Item = Result<SerializedBatch, BatchTranslationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(error) = self.fill_buffer() {
            self.files.clear();
            self.pending.clear();
            self.buffer.clear();
            return Some(Err(error));
        }
        if self.buffer.is_empty() {
            return None;
        }
        let index = if self.shuffle_n > 1 {
            self.rng.gen_range(0..self.buffer.len())
        } else {
            0
        };
        Some(Ok(self.buffer.swap_remove(index)))
    }
}

fn load_shard(
    config: &TarredDatasetConfig,
) -> Result<(Vec<PathBuf>, usize), BatchTranslationError> {
    let metadata = TarredDatasetMetadata::from_file(&config.metadata_path)?;
    let files = resolve_tar_files(&config.text_tar_filepaths, &metadata)?;
    let shard = shard_files(
        &files,
        config.shard_strategy,
        config.world_size,
        config.global_rank,
    )?;
    let length = match config.shard_strategy {
        ShardStrategy::Scatter => metadata.num_batches / config.world_size,
        ShardStrategy::Replicate => metadata.num_batches,
    };
    tracing::info!(
        rank = config.global_rank,
        num_files = shard.len(),
        num_batches = length,
        "tarred dataset shard assigned"
    );
    Ok((shard, length))
}

/// # Tarred parallel corpus
/// Yields `TranslationBatch::TwoSide` batches built from the `src` and `tgt` id matrices.
pub struct TarredTranslationDataset {
    files: Vec<PathBuf>,
    length: usize,
    pad_id: i64,
    reverse_lang_direction: bool,
    shuffle_n: usize,
    seed: u64,
}

impl TarredTranslationDataset {
    pub fn new(
        config: &TarredDatasetConfig,
        pad_id: i64,
        reverse_lang_direction: bool,
    ) -> Result<TarredTranslationDataset, BatchTranslationError> {
        let (files, length) = load_shard(config)?;
        Ok(TarredTranslationDataset {
            files,
            length,
            pad_id,
            reverse_lang_direction,
            shuffle_n: config.shuffle_n,
            seed: config.seed,
        })
    }

    /// Tar files assigned to this rank
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Expected number of batches for this rank, as reported by the metadata
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn build_batch(
        &self,
        batch: SerializedBatch,
    ) -> Result<TranslationBatch, BatchTranslationError> {
        let tgt = batch.tgt.ok_or_else(|| {
            BatchTranslationError::DatasetError(
                "batch without `tgt` ids in a parallel corpus".into(),
            )
        })?;
        let (src, tgt) = if self.reverse_lang_direction {
            (tgt, batch.src)
        } else {
            (batch.src, tgt)
        };
        let src_ids = ids_to_tensor(&src, self.pad_id)?;
        let src_mask = padding_mask(&src_ids, self.pad_id);
        let tgt = ids_to_tensor(&tgt, self.pad_id)?;
        let tgt_len = tgt.size()[1];
        if tgt_len < 2 {
            return Err(BatchTranslationError::DatasetError(
                "target sequences need at least two tokens".into(),
            ));
        }
        let tgt_ids = tgt.narrow(1, 0, tgt_len - 1);
        let labels = tgt.narrow(1, 1, tgt_len - 1);
        let tgt_mask = padding_mask(&tgt_ids, self.pad_id);
        Ok(TranslationBatch::TwoSide {
            src_ids,
            src_mask,
            tgt_ids,
            tgt_mask,
            labels,
        })
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = Result<TranslationBatch, BatchTranslationError>> + '_ {
        ShardReader::new(self.files.clone(), self.shuffle_n, self.seed)
            .map(move |batch| batch.and_then(|batch| self.build_batch(batch)))
    }
}

/// # Tarred monolingual corpus
/// Yields `TranslationBatch::OneSide` batches built from the `src` id matrices.
pub struct TarredOneSideTranslationDataset {
    files: Vec<PathBuf>,
    length: usize,
    pad_id: i64,
    shuffle_n: usize,
    seed: u64,
}

impl TarredOneSideTranslationDataset {
    pub fn new(
        config: &TarredDatasetConfig,
        pad_id: i64,
    ) -> Result<TarredOneSideTranslationDataset, BatchTranslationError> {
        let (files, length) = load_shard(config)?;
        Ok(TarredOneSideTranslationDataset {
            files,
            length,
            pad_id,
            shuffle_n: config.shuffle_n,
            seed: config.seed,
        })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn build_batch(
        &self,
        batch: SerializedBatch,
    ) -> Result<TranslationBatch, BatchTranslationError> {
        let src_ids = ids_to_tensor(&batch.src, self.pad_id)?;
        let src_mask = padding_mask(&src_ids, self.pad_id);
        Ok(TranslationBatch::OneSide { src_ids, src_mask })
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = Result<TranslationBatch, BatchTranslationError>> + '_ {
        ShardReader::new(self.files.clone(), self.shuffle_n, self.seed)
            .map(move |batch| batch.and_then(|batch| self.build_batch(batch)))
    }
}
