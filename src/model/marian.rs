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
use crate::model::{DecodingStrategy, ModelFiles, Seq2SeqTranslator};
use rust_bert::marian::MarianGenerator;
use rust_bert::pipelines::generation_utils::{GenerateConfig, LanguageGenerator};
use rust_bert::resources::{LocalResource, Resource};
use rust_tokenizers::tokenizer::{MarianTokenizer, Tokenizer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tch::{Device, Kind, Tensor};

/// Subset of the Marian `config.json` needed outside of the generator
#[derive(Debug, Serialize, Deserialize, Clone)]
struct MarianTokenConfig {
    pad_token_id: Option<i64>,
}

impl Config for MarianTokenConfig {}

fn local_resource(path: &Path) -> Resource {
    Resource::Local(LocalResource {
        local_path: path.to_path_buf(),
    })
}

fn path_str(path: &Path) -> Result<&str, BatchTranslationError> {
    path.to_str().ok_or_else(|| {
        BatchTranslationError::InvalidConfigurationError(format!(
            "non UTF-8 path: {}",
            path.display()
        ))
    })
}

/// # Marian encoder-decoder translator
/// Wraps a `rust-bert` `MarianGenerator` together with the encoder and decoder tokenizers.
pub struct MarianTranslator {
    generator: MarianGenerator,
    encoder_tokenizer: MarianTokenizer,
    decoder_tokenizer: MarianTokenizer,
    pad_token_id: i64,
    device: Device,
}

impl MarianTranslator {
    /// Restores a translator on `device`.
    ///
    /// # Arguments
    ///
    /// * `files` - `ModelFiles` resolved from a checkpoint
    /// * `device` - Device to run the model on, e.g. `Device::Cpu` or `Device::Cuda(0)`
    /// * `strategy` - `DecodingStrategy`, beam search or top-k sampling
    /// * `max_length` - maximum length of the generated sequences
    pub fn new(
        files: &ModelFiles,
        device: Device,
        strategy: DecodingStrategy,
        max_length: i64,
    ) -> Result<MarianTranslator, BatchTranslationError> {
        let pad_token_id = MarianTokenConfig::from_file(&files.config)?
            .pad_token_id
            .ok_or_else(|| {
                BatchTranslationError::InvalidConfigurationError(format!(
                    "pad_token_id missing from {}",
                    files.config.display()
                ))
            })?;

        let (do_sample, num_beams, top_k) = match strategy {
            DecodingStrategy::BeamSearch { num_beams } => (false, num_beams, 0),
            DecodingStrategy::TopKSampling { top_k } => (true, 1, top_k),
        };
        let generate_config = GenerateConfig {
            model_resource: local_resource(&files.weights),
            config_resource: local_resource(&files.config),
            vocab_resource: local_resource(&files.vocab),
            merges_resource: local_resource(&files.source_spm),
            max_length,
            do_sample,
            num_beams,
            top_k,
            top_p: 1.0,
            temperature: 1.0,
            early_stopping: true,
            no_repeat_ngram_size: 0,
            num_return_sequences: 1,
            device,
            ..Default::default()
        };
        let generator = MarianGenerator::new(generate_config)?;

        let vocab = path_str(&files.vocab)?;
        let encoder_tokenizer = MarianTokenizer::from_files(vocab, path_str(&files.source_spm)?, false)?;
        let decoder_tokenizer = MarianTokenizer::from_files(vocab, path_str(&files.target_spm)?, false)?;

        Ok(MarianTranslator {
            generator,
            encoder_tokenizer,
            decoder_tokenizer,
            pad_token_id,
            device,
        })
    }
}

impl Seq2SeqTranslator for MarianTranslator {
    fn device(&self) -> Device {
        self.device
    }

    fn pad_token_id(&self) -> i64 {
        self.pad_token_id
    }

    fn encoder_ids_to_text(&self, ids: &[i64]) -> String {
        self.encoder_tokenizer.decode(ids.to_vec(), true, true)
    }

    fn decoder_ids_to_text(&self, ids: &[i64]) -> String {
        self.decoder_tokenizer.decode(ids.to_vec(), true, true)
    }

    fn translate_ids(
        &self,
        src_ids: &Tensor,
        src_mask: &Tensor,
    ) -> Result<Vec<Vec<i64>>, BatchTranslationError> {
        Ok(self.generator.generate_from_ids_and_past(
            src_ids.shallow_clone(),
            Some(src_mask.to_kind(Kind::Int64)),
            None::<i64>,
            None::<i64>,
            None::<i64>,
        ))
    }
}
