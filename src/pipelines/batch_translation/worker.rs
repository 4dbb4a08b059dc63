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
use crate::data::{TarredOneSideTranslationDataset, TarredTranslationDataset, TranslationBatch};
use crate::detokenize::LanguagePairDetokenizers;
use crate::distributed::{
    spawn_workers, wait_for_workers, ProcessGroup, RendezvousConfig, WorkerEnvironment,
};
use crate::model::{DecodingStrategy, MarianTranslator, ModelFiles, Seq2SeqTranslator};
use crate::pipelines::batch_translation::config::TranslationJobConfig;
use crate::pipelines::batch_translation::outputs::RankOutputs;
use tch::{Cuda, Device, Tensor};

/// Number of batches between two progress logs of a rank
pub const PROGRESS_LOG_INTERVAL: usize = 100;

/// # Summary of the shard processed by a rank
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShardReport {
    pub batches: usize,
    pub sentences: usize,
    /// Number of progress lines logged
    pub progress_logs: usize,
}

/// Device used by the worker with the given local rank
pub fn worker_device(local_rank: usize) -> Device {
    if Cuda::is_available() {
        Device::Cuda(local_rank)
    } else {
        Device::Cpu
    }
}

/// Drops the leading unit dimension of 3-D batch tensors.
pub fn strip_leading_dimension(tensor: Tensor) -> Tensor {
    if tensor.dim() == 3 && tensor.size()[0] == 1 {
        tensor.get(0)
    } else {
        tensor
    }
}

/// Unpacks the source ids and mask of a batch and moves them to `device`.
///
/// Two-sided batches carry five tensors `(src_ids, src_mask, tgt_ids, tgt_mask, labels)` and
/// one-sided batches two `(src_ids, src_mask)`; only the source tensors are used for generation.
pub fn unpack_source(
    tensors: Vec<Tensor>,
    two_side: bool,
    device: Device,
) -> Result<(Tensor, Tensor), BatchTranslationError> {
    let expected = if two_side { 5 } else { 2 };
    if tensors.len() != expected {
        return Err(BatchTranslationError::DatasetError(format!(
            "expected {} tensors per batch, found {}",
            expected,
            tensors.len()
        )));
    }
    let mut tensors = tensors
        .into_iter()
        .map(|tensor| strip_leading_dimension(tensor).to_device(device));
    match (tensors.next(), tensors.next()) {
        (Some(src_ids), Some(src_mask)) => Ok((src_ids, src_mask)),
        _ => Err(BatchTranslationError::DatasetError(
            "batch without source tensors".into(),
        )),
    }
}

fn tensor_rows(ids: &Tensor) -> Vec<Vec<i64>> {
    let ids = ids.to_device(Device::Cpu);
    (0..ids.size()[0])
        .map(|row| Vec::<i64>::from(&ids.get(row)))
        .collect()
}

/// Translates every batch of a shard and writes the detokenized sources and translations.
///
/// # Arguments
///
/// * `rank` - rank of the worker, used in progress logs
/// * `model` - translation model
/// * `batches` - batches of the shard, in dataset order
/// * `two_side` - whether the batches come from a parallel corpus
/// * `detokenizers` - source and target detokenizers
/// * `outputs` - result files of the rank
pub fn translate_shard<M, I>(
    rank: usize,
    model: &M,
    batches: I,
    two_side: bool,
    detokenizers: &LanguagePairDetokenizers,
    outputs: &mut RankOutputs,
) -> Result<ShardReport, BatchTranslationError>
where
    M: Seq2SeqTranslator + ?Sized,
    I: IntoIterator<Item = Result<TranslationBatch, BatchTranslationError>>,
{
    let mut report = ShardReport::default();
    for (batch_idx, batch) in batches.into_iter().enumerate() {
        let (src_ids, src_mask) = unpack_source(batch?.into_tensors(), two_side, model.device())?;
        if batch_idx % PROGRESS_LOG_INTERVAL == 0 {
            tracing::info!(
                "{} batches ({} sentences) were translated by process with rank {}",
                batch_idx,
                report.sentences,
                rank
            );
            report.progress_logs += 1;
        }
        let sources = tensor_rows(&src_ids);
        report.sentences += sources.len();

        let translations = model.translate_ids(&src_ids, &src_mask)?;
        if translations.len() != sources.len() {
            return Err(BatchTranslationError::ModelError(format!(
                "{} translations generated for {} source sentences",
                translations.len(),
                sources.len()
            )));
        }
        for (source, translation) in sources.iter().zip(translations.iter()) {
            let translation =
                detokenizers.target.detokenize_text(&model.decoder_ids_to_text(translation));
            let original = detokenizers.source.detokenize_text(&model.encoder_ids_to_text(source));
            outputs.write_pair(&original, &translation)?;
        }
        report.batches += 1;
    }
    Ok(report)
}

/// Runs the translation procedure of one rank: joins the process group, restores the model,
/// translates the rank's shard and releases the group.
pub fn run_worker(
    environment: WorkerEnvironment,
    config: &TranslationJobConfig,
    rendezvous: &RendezvousConfig,
) -> Result<ShardReport, BatchTranslationError> {
    let WorkerEnvironment {
        rank,
        world_size,
        local_rank,
    } = environment;
    let group = ProcessGroup::init(rank, world_size, rendezvous)?;
    let _no_grad = tch::no_grad_guard();

    let device = worker_device(local_rank);
    let files = ModelFiles::resolve(&config.model)?;
    let mut strategy = DecodingStrategy::default();
    strategy.replace_beam_with_sampling(config.topk);
    let model = MarianTranslator::new(&files, device, strategy, config.max_length)?;
    tracing::info!(rank, ?device, top_k = config.topk, "translation model restored");

    let dataset_config = config.dataset_config(rank, world_size);
    let mut outputs = RankOutputs::create(&config.result_dir, rank)?;
    let detokenizers = LanguagePairDetokenizers::new(&config.source_lang, &config.target_lang);

    let report = if config.twoside {
        let dataset = TarredTranslationDataset::new(
            &dataset_config,
            model.pad_token_id(),
            config.reverse_lang_direction,
        )?;
        translate_shard(rank, &model, dataset.iter(), true, &detokenizers, &mut outputs)?
    } else {
        let dataset = TarredOneSideTranslationDataset::new(&dataset_config, model.pad_token_id())?;
        translate_shard(rank, &model, dataset.iter(), false, &detokenizers, &mut outputs)?
    };
    let lines = outputs.finish()?;
    tracing::info!(
        rank,
        batches = report.batches,
        sentences = lines,
        "shard translated"
    );

    group.destroy()?;
    Ok(report)
}

/// Number of workers to spawn: the requested world size, or one per visible CUDA device (a
/// single CPU worker on hosts without CUDA).
pub fn resolve_world_size(requested: Option<usize>) -> Result<usize, BatchTranslationError> {
    let device_count = Cuda::device_count().max(0) as usize;
    match requested {
        Some(0) => Err(BatchTranslationError::InvalidConfigurationError(
            "world size must be at least 1".into(),
        )),
        Some(world_size) if device_count > 0 && world_size > device_count => {
            Err(BatchTranslationError::InvalidConfigurationError(format!(
                "world size {} exceeds the {} available CUDA devices",
                world_size, device_count
            )))
        }
        Some(world_size) => Ok(world_size),
        None if device_count == 0 => {
            tracing::warn!("no CUDA device available, running a single CPU worker");
            Ok(1)
        }
        None => Ok(device_count),
    }
}

/// Fans out one worker process per device and waits for all of them to complete.
pub fn launch(config: &TranslationJobConfig) -> Result<(), BatchTranslationError> {
    let world_size = resolve_world_size(config.world_size)?;
    let rendezvous = RendezvousConfig::from_env()?;
    tracing::info!(
        world_size,
        master_addr = %rendezvous.master_addr,
        master_port = rendezvous.master_port,
        "launching batch translation"
    );
    let workers = spawn_workers(world_size, &rendezvous)?;
    wait_for_workers(workers)?;
    tracing::info!(
        result_dir = %config.result_dir.display(),
        "all ranks completed"
    );
    Ok(())
}
