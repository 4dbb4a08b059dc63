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

//! # Data-parallel batch translation
//!
//! Translates a tarred, pre-tokenized corpus with one worker process per GPU. Each worker:
//! 1. joins the process group (rendezvous on `MASTER_ADDR:MASTER_PORT`, default
//! `localhost:12355`),
//! 2. restores the Marian model from its checkpoint and replaces beam search with top-k sampling,
//! 3. reads the tar files assigned to its rank (parallel or monolingual corpus),
//! 4. translates every batch, detokenizes sources and translations, and writes them to
//! `<result_dir>/rank<N>/originals.txt` and `<result_dir>/rank<N>/translations.txt`,
//! 5. waits for the other ranks and releases the group.
//!
//! The `translate-ddp` binary wraps this module:
//!
//! ```bash
//! translate-ddp --model opus-mt-en-de.tar.gz \
//!     --text2translate "corpus/batches.tokens.{0..7}.tar" \
//!     --metadata_path corpus/metadata.json \
//!     --result_dir results \
//!     --source_lang en --target_lang de --topk 500
//! ```
//!
//! The worker loop is independent of the model and dataset implementations:
//!
//! ```no_run
//! # fn main() -> Result<(), translate_ddp::BatchTranslationError> {
//! # use std::path::Path;
//! # use tch::Device;
//! use translate_ddp::data::{ShardStrategy, TarredDatasetConfig, TarredOneSideTranslationDataset};
//! use translate_ddp::detokenize::LanguagePairDetokenizers;
//! use translate_ddp::model::{DecodingStrategy, MarianTranslator, ModelFiles, Seq2SeqTranslator};
//! use translate_ddp::pipelines::batch_translation::{translate_shard, RankOutputs};
//!
//! # let files = ModelFiles::resolve(Path::new("opus-mt-en-de.tar.gz"))?;
//! let model = MarianTranslator::new(&files, Device::Cpu, DecodingStrategy::default(), 512)?;
//! # let config = TarredDatasetConfig {
//! #     text_tar_filepaths: "corpus/batches.{0..1}.tar".to_string(),
//! #     metadata_path: "corpus/metadata.json".into(),
//! #     shuffle_n: 1,
//! #     shard_strategy: ShardStrategy::Scatter,
//! #     world_size: 1,
//! #     global_rank: 0,
//! #     seed: 0,
//! # };
//! let dataset = TarredOneSideTranslationDataset::new(&config, model.pad_token_id())?;
//! let detokenizers = LanguagePairDetokenizers::new("en", "de");
//! let mut outputs = RankOutputs::create(Path::new("results"), 0)?;
//! let report = translate_shard(0, &model, dataset.iter(), false, &detokenizers, &mut outputs)?;
//! # Ok(())
//! # }
//! ```

mod config;
mod outputs;
mod worker;

pub use config::{TranslateArgs, TranslationJobConfig};
pub use outputs::{rank_result_dir, RankOutputs, ORIGINALS_FILE_NAME, TRANSLATIONS_FILE_NAME};
pub use worker::{
    launch, resolve_world_size, run_worker, strip_leading_dimension, translate_shard,
    unpack_source, worker_device, ShardReport, PROGRESS_LOG_INTERVAL,
};
