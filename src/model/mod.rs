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

//! # Translation model restoration and generation
//!
//! Checkpoints come in two containers, selected by file extension (see `CheckpointFormat`):
//! - `.tar.gz` / `.tgz` archives bundling the weights, `config.json`, `vocab.json` and the
//! SentencePiece models (`source.spm`, optionally `target.spm`, or a shared `spiece.model`)
//! - bare `.ot` weights converted with the `rust-bert` utility scripts, with the other files in
//! the same directory.
//!
//! Any other extension is rejected with `BatchTranslationError::UnsupportedCheckpointFormat`.
//!
//! ```no_run
//! # fn main() -> Result<(), translate_ddp::BatchTranslationError> {
//! use std::path::Path;
//! use tch::Device;
//! use translate_ddp::model::{DecodingStrategy, MarianTranslator, ModelFiles};
//!
//! let files = ModelFiles::resolve(Path::new("models/opus-mt-en-de.tar.gz"))?;
//! let mut strategy = DecodingStrategy::default();
//! strategy.replace_beam_with_sampling(500);
//! let model = MarianTranslator::new(&files, Device::Cuda(0), strategy, 512)?;
//! # Ok(())
//! # }
//! ```

mod checkpoint;
mod marian;

pub use checkpoint::{CheckpointFormat, ModelFiles};
pub use marian::MarianTranslator;

use crate::common::error::BatchTranslationError;
use tch::{Device, Tensor};

/// # Search strategy used by the decoder
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DecodingStrategy {
    BeamSearch { num_beams: i64 },
    /// Samples the next token among the `top_k` most likely ones
    TopKSampling { top_k: i64 },
}

impl Default for DecodingStrategy {
    fn default() -> Self {
        DecodingStrategy::BeamSearch { num_beams: 4 }
    }
}

impl DecodingStrategy {
    /// Switches the decoder from beam search to top-k sampling.
    pub fn replace_beam_with_sampling(&mut self, top_k: i64) {
        *self = DecodingStrategy::TopKSampling { top_k };
    }
}

/// # Encoder-decoder model used by the translation workers
pub trait Seq2SeqTranslator {
    /// Device holding the model parameters
    fn device(&self) -> Device;

    /// Padding token id used by the encoder inputs
    fn pad_token_id(&self) -> i64;

    /// Converts encoder (source language) token ids to text, skipping special tokens.
    fn encoder_ids_to_text(&self, ids: &[i64]) -> String;

    /// Converts decoder (target language) token ids to text, skipping special tokens.
    fn decoder_ids_to_text(&self, ids: &[i64]) -> String;

    /// Generates one translation per source row, without target inputs.
    ///
    /// # Arguments
    ///
    /// * `src_ids` - `Tensor` of shape (*batch size*, *sequence length*) holding source ids
    /// * `src_mask` - `Tensor` of the same shape, 1 for tokens and 0 for padding
    fn translate_ids(
        &self,
        src_ids: &Tensor,
        src_mask: &Tensor,
    ) -> Result<Vec<Vec<i64>>, BatchTranslationError>;
}
