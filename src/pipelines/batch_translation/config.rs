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

use crate::data::{ShardStrategy, TarredDatasetConfig};
use clap::Parser;
use std::path::PathBuf;

/// Batch translation of sentences from a pre-trained model on multiple GPUs
#[derive(Parser, Debug, Clone)]
#[command(name = "translate-ddp", version)]
pub struct TranslateArgs {
    /// Path to the translation model checkpoint (.tar.gz/.tgz archive or .ot weights)
    #[arg(long)]
    pub model: PathBuf,

    /// Path to the pre-processed tarfiles for translation (brace patterns supported)
    #[arg(long)]
    pub text2translate: String,

    /// Folder to write translation results
    #[arg(long = "result_dir")]
    pub result_dir: PathBuf,

    /// Set flag when translating the source side of a parallel dataset
    #[arg(long)]
    pub twoside: bool,

    /// Path to the JSON file that contains dataset info
    #[arg(long = "metadata_path")]
    pub metadata_path: PathBuf,

    /// Value of k for topk sampling
    #[arg(long, default_value_t = 500)]
    pub topk: i64,

    /// Source lang ID for detokenization
    #[arg(long = "source_lang")]
    pub source_lang: String,

    /// Target lang ID for detokenization
    #[arg(long = "target_lang")]
    pub target_lang: String,

    /// Reverse source and target language direction for parallel dataset
    #[arg(long = "reverse_lang_direction")]
    pub reverse_lang_direction: bool,

    /// Number of worker processes (defaults to the number of visible CUDA devices)
    #[arg(long = "world_size")]
    pub world_size: Option<usize>,

    /// Size of the batch shuffling buffer
    #[arg(long = "shuffle_n", default_value_t = 100)]
    pub shuffle_n: usize,

    /// Assignment of tar files to ranks: scatter or replicate
    #[arg(long = "shard_strategy", default_value = "scatter")]
    pub shard_strategy: ShardStrategy,

    /// Maximum length of the generated translations
    #[arg(long = "max_length", default_value_t = 512)]
    pub max_length: i64,

    /// Seed of the batch shuffling buffer, offset by the rank
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl TranslateArgs {
    pub fn into_config(self) -> TranslationJobConfig {
        TranslationJobConfig {
            model: self.model,
            text2translate: self.text2translate,
            result_dir: self.result_dir,
            twoside: self.twoside,
            metadata_path: self.metadata_path,
            topk: self.topk,
            source_lang: self.source_lang,
            target_lang: self.target_lang,
            reverse_lang_direction: self.reverse_lang_direction,
            world_size: self.world_size,
            shuffle_n: self.shuffle_n,
            shard_strategy: self.shard_strategy,
            max_length: self.max_length,
            seed: self.seed,
        }
    }
}

/// # Configuration of a batch translation job
/// Shared by the launcher and every worker; fixed for the lifetime of the job.
#[derive(Debug, Clone)]
pub struct TranslationJobConfig {
    pub model: PathBuf,
    pub text2translate: String,
    pub result_dir: PathBuf,
    pub twoside: bool,
    pub metadata_path: PathBuf,
    pub topk: i64,
    pub source_lang: String,
    pub target_lang: String,
    pub reverse_lang_direction: bool,
    pub world_size: Option<usize>,
    pub shuffle_n: usize,
    pub shard_strategy: ShardStrategy,
    pub max_length: i64,
    pub seed: u64,
}

impl TranslationJobConfig {
    /// Dataset options of the shard read by `rank`
    pub fn dataset_config(&self, rank: usize, world_size: usize) -> TarredDatasetConfig {
        TarredDatasetConfig {
            text_tar_filepaths: self.text2translate.clone(),
            metadata_path: self.metadata_path.clone(),
            shuffle_n: self.shuffle_n,
            shard_strategy: self.shard_strategy,
            world_size,
            global_rank: rank,
            seed: self.seed.wrapping_add(rank as u64),
        }
    }
}
