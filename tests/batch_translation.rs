use clap::Parser;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tch::{Device, Tensor};
use tempfile::TempDir;
use translate_ddp::data::{
    SerializedBatch, ShardStrategy, TarredOneSideTranslationDataset, TranslationBatch,
};
use translate_ddp::detokenize::LanguagePairDetokenizers;
use translate_ddp::model::Seq2SeqTranslator;
use translate_ddp::pipelines::batch_translation::{
    rank_result_dir, resolve_world_size, strip_leading_dimension, translate_shard, unpack_source,
    RankOutputs, ShardReport, TranslateArgs,
};
use translate_ddp::BatchTranslationError;

const PAD_ID: i64 = 0;
const TARGET_OFFSET: i64 = 100;

/// Word-level translator: every source id `i` is translated to `i + TARGET_OFFSET`.
struct DictionaryTranslator;

fn word(id: i64) -> String {
    match id {
        10 => "Hello".to_string(),
        11 => ",".to_string(),
        12 => "world".to_string(),
        13 => "!".to_string(),
        110 => "Bonjour".to_string(),
        111 => ",".to_string(),
        112 => "le monde".to_string(),
        113 => "!".to_string(),
        id => format!("w{}", id),
    }
}

fn ids_to_text(ids: &[i64]) -> String {
    ids.iter()
        .filter(|id| **id != PAD_ID)
        .map(|id| word(*id))
        .collect::<Vec<String>>()
        .join(" ")
}

impl Seq2SeqTranslator for DictionaryTranslator {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn pad_token_id(&self) -> i64 {
        PAD_ID
    }

    fn encoder_ids_to_text(&self, ids: &[i64]) -> String {
        ids_to_text(ids)
    }

    fn decoder_ids_to_text(&self, ids: &[i64]) -> String {
        ids_to_text(ids)
    }

    fn translate_ids(
        &self,
        src_ids: &Tensor,
        src_mask: &Tensor,
    ) -> Result<Vec<Vec<i64>>, BatchTranslationError> {
        assert_eq!(src_ids.size(), src_mask.size());
        Ok((0..src_ids.size()[0])
            .map(|row| {
                Vec::<i64>::from(&src_ids.get(row))
                    .into_iter()
                    .filter(|id| *id != PAD_ID)
                    .map(|id| id + TARGET_OFFSET)
                    .collect()
            })
            .collect())
    }
}

/// Drops the last translation of every batch.
struct TruncatingTranslator;

impl Seq2SeqTranslator for TruncatingTranslator {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn pad_token_id(&self) -> i64 {
        PAD_ID
    }

    fn encoder_ids_to_text(&self, ids: &[i64]) -> String {
        ids_to_text(ids)
    }

    fn decoder_ids_to_text(&self, ids: &[i64]) -> String {
        ids_to_text(ids)
    }

    fn translate_ids(
        &self,
        src_ids: &Tensor,
        src_mask: &Tensor,
    ) -> Result<Vec<Vec<i64>>, BatchTranslationError> {
        let mut translations = DictionaryTranslator.translate_ids(src_ids, src_mask)?;
        translations.pop();
        Ok(translations)
    }
}

/// Records the source rows handed to the model, then translates them like `DictionaryTranslator`.
#[derive(Default)]
struct RecordingTranslator {
    seen: RefCell<Vec<Vec<i64>>>,
}

impl Seq2SeqTranslator for RecordingTranslator {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn pad_token_id(&self) -> i64 {
        PAD_ID
    }

    fn encoder_ids_to_text(&self, ids: &[i64]) -> String {
        ids_to_text(ids)
    }

    fn decoder_ids_to_text(&self, ids: &[i64]) -> String {
        ids_to_text(ids)
    }

    fn translate_ids(
        &self,
        src_ids: &Tensor,
        src_mask: &Tensor,
    ) -> Result<Vec<Vec<i64>>, BatchTranslationError> {
        assert_eq!(src_ids.dim(), 2);
        for row in 0..src_ids.size()[0] {
            self.seen
                .borrow_mut()
                .push(Vec::<i64>::from(&src_ids.get(row)));
        }
        DictionaryTranslator.translate_ids(src_ids, src_mask)
    }
}

/// Parallel batch with a leading unit dimension, as yielded by a batch-size-1 loader.
fn two_side_batch(src: &[i64], tgt: &[i64]) -> TranslationBatch {
    let src_ids = Tensor::of_slice(src).view((1, 1, src.len() as i64));
    let tgt_len = tgt.len() as i64 - 1;
    let tgt_all = Tensor::of_slice(tgt).view((1, 1, tgt.len() as i64));
    let tgt_ids = tgt_all.narrow(2, 0, tgt_len);
    let labels = tgt_all.narrow(2, 1, tgt_len);
    TranslationBatch::TwoSide {
        src_mask: src_ids.ne(PAD_ID),
        tgt_mask: tgt_ids.ne(PAD_ID),
        src_ids,
        tgt_ids,
        labels,
    }
}

fn one_side_batch(rows: &[&[i64]]) -> TranslationBatch {
    let width = rows.iter().map(|row| row.len()).max().unwrap_or(0);
    let mut flat = Vec::new();
    for row in rows {
        flat.extend_from_slice(row);
        flat.extend(std::iter::repeat(PAD_ID).take(width - row.len()));
    }
    let src_ids = Tensor::of_slice(&flat).view((rows.len() as i64, width as i64));
    let src_mask = src_ids.ne(PAD_ID);
    TranslationBatch::OneSide { src_ids, src_mask }
}

fn read_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(|line| line.to_string())
        .collect())
}

#[test]
fn rank_directories() {
    assert_eq!(
        rank_result_dir(Path::new("/data/results"), 3),
        PathBuf::from("/data/results/rank3")
    );
}

#[test]
fn command_line_defaults() -> anyhow::Result<()> {
    let args = TranslateArgs::try_parse_from(&[
        "translate-ddp",
        "--model",
        "opus-mt-en-de.tar.gz",
        "--text2translate",
        "/corpus/batches._OP_0..7_CL_.tar",
        "--result_dir",
        "/results",
        "--metadata_path",
        "/corpus/metadata.json",
        "--source_lang",
        "en",
        "--target_lang",
        "de",
    ])?;
    let config = args.into_config();

    assert_eq!(config.model, PathBuf::from("opus-mt-en-de.tar.gz"));
    assert_eq!(config.topk, 500);
    assert!(!config.twoside);
    assert!(!config.reverse_lang_direction);
    assert_eq!(config.world_size, None);
    assert_eq!(config.shuffle_n, 100);
    assert_eq!(config.shard_strategy, ShardStrategy::Scatter);

    let dataset_config = config.dataset_config(1, 4);
    assert_eq!(dataset_config.global_rank, 1);
    assert_eq!(dataset_config.world_size, 4);
    assert_eq!(dataset_config.seed, config.seed + 1);
    assert_eq!(
        dataset_config.text_tar_filepaths,
        "/corpus/batches._OP_0..7_CL_.tar"
    );
    Ok(())
}

#[test]
fn command_line_options() -> anyhow::Result<()> {
    let args = TranslateArgs::try_parse_from(&[
        "translate-ddp",
        "--model=model.ot",
        "--text2translate=corpus",
        "--result_dir=out",
        "--metadata_path=metadata.json",
        "--source_lang=de",
        "--target_lang=en",
        "--twoside",
        "--reverse_lang_direction",
        "--topk=50",
        "--world_size=2",
        "--shard_strategy=replicate",
    ])?;

    assert!(args.twoside);
    assert!(args.reverse_lang_direction);
    assert_eq!(args.topk, 50);
    assert_eq!(args.world_size, Some(2));
    assert_eq!(args.shard_strategy, ShardStrategy::Replicate);

    assert!(TranslateArgs::try_parse_from(&["translate-ddp", "--model=model.ot"]).is_err());
    assert!(TranslateArgs::try_parse_from(&[
        "translate-ddp",
        "--model=model.ot",
        "--text2translate=corpus",
        "--result_dir=out",
        "--metadata_path=metadata.json",
        "--source_lang=de",
        "--target_lang=en",
        "--shard_strategy=round_robin",
    ])
    .is_err());
    Ok(())
}

#[test]
fn world_size_resolution() -> anyhow::Result<()> {
    assert!(resolve_world_size(Some(0)).is_err());
    assert_eq!(resolve_world_size(Some(1))?, 1);
    assert!(resolve_world_size(None)? >= 1);
    Ok(())
}

#[test]
fn leading_unit_dimension_is_stripped() {
    let batched = Tensor::of_slice(&[1i64, 2, 3, 4, 5, 6]).view((1, 2, 3));
    assert_eq!(strip_leading_dimension(batched).size(), vec![2, 3]);

    let plain = Tensor::of_slice(&[1i64, 2, 3, 4, 5, 6]).view((2, 3));
    assert_eq!(strip_leading_dimension(plain).size(), vec![2, 3]);
}

#[test]
fn batch_arity_is_checked() -> anyhow::Result<()> {
    let ids = || Tensor::of_slice(&[5i64, 6, 2]).view((1, 1, 3));

    let (src_ids, src_mask) = unpack_source(
        vec![ids(), ids(), ids(), ids(), ids()],
        true,
        Device::Cpu,
    )?;
    assert_eq!(src_ids.size(), vec![1, 3]);
    assert_eq!(src_mask.size(), vec![1, 3]);

    assert!(unpack_source(vec![ids(), ids()], true, Device::Cpu).is_err());
    assert!(unpack_source(vec![ids(), ids(), ids(), ids(), ids()], false, Device::Cpu).is_err());
    assert!(unpack_source(vec![ids(), ids()], false, Device::Cpu).is_ok());
    Ok(())
}

#[test]
fn shard_translation_writes_aligned_files() -> anyhow::Result<()> {
    let result_dir = TempDir::new()?;
    let mut outputs = RankOutputs::create(result_dir.path(), 1)?;
    assert_eq!(outputs.directory(), rank_result_dir(result_dir.path(), 1));
    let detokenizers = LanguagePairDetokenizers::new("en", "fr");

    let batches = vec![
        Ok(one_side_batch(&[&[10, 11, 12, 13], &[12, 13]])),
        Ok(one_side_batch(&[&[10]])),
    ];
    let report = translate_shard(
        1,
        &DictionaryTranslator,
        batches,
        false,
        &detokenizers,
        &mut outputs,
    )?;
    assert_eq!(
        report,
        ShardReport {
            batches: 2,
            sentences: 3,
            progress_logs: 1,
        }
    );

    let originals_path = outputs.originals_path();
    let translations_path = outputs.translations_path();
    assert_eq!(outputs.finish()?, 3);

    assert_eq!(
        read_lines(&originals_path)?,
        vec!["Hello, world!", "world!", "Hello"]
    );
    assert_eq!(
        read_lines(&translations_path)?,
        vec!["Bonjour, le monde !", "le monde !", "Bonjour"]
    );
    Ok(())
}

#[test]
fn progress_is_logged_every_hundred_batches() -> anyhow::Result<()> {
    let result_dir = TempDir::new()?;
    let mut outputs = RankOutputs::create(result_dir.path(), 0)?;
    let detokenizers = LanguagePairDetokenizers::new("en", "de");

    let batches = (0..250).map(|_| Ok(one_side_batch(&[&[10, 12]])));
    let report = translate_shard(
        0,
        &DictionaryTranslator,
        batches,
        false,
        &detokenizers,
        &mut outputs,
    )?;

    assert_eq!(report.batches, 250);
    assert_eq!(report.sentences, 250);
    assert_eq!(report.progress_logs, 3);
    let translations_path = outputs.translations_path();
    assert_eq!(outputs.finish()?, 250);
    assert_eq!(read_lines(&translations_path)?.len(), 250);
    Ok(())
}

#[test]
fn missing_translations_are_an_error() -> anyhow::Result<()> {
    let result_dir = TempDir::new()?;
    let mut outputs = RankOutputs::create(result_dir.path(), 0)?;
    let detokenizers = LanguagePairDetokenizers::new("en", "de");

    let result = translate_shard(
        0,
        &TruncatingTranslator,
        vec![Ok(one_side_batch(&[&[10], &[12]]))],
        false,
        &detokenizers,
        &mut outputs,
    );
    assert!(result.is_err());
    Ok(())
}

#[test]
fn dataset_errors_stop_the_shard() -> anyhow::Result<()> {
    let result_dir = TempDir::new()?;
    let mut outputs = RankOutputs::create(result_dir.path(), 0)?;
    let detokenizers = LanguagePairDetokenizers::new("en", "de");

    let batches = vec![
        Ok(one_side_batch(&[&[10]])),
        Err(BatchTranslationError::DatasetError("corrupted tar file".into())),
        Ok(one_side_batch(&[&[12]])),
    ];
    let result = translate_shard(
        0,
        &DictionaryTranslator,
        batches,
        false,
        &detokenizers,
        &mut outputs,
    );
    assert!(matches!(result, Err(BatchTranslationError::DatasetError(_))));
    assert_eq!(outputs.lines(), 1);
    Ok(())
}

#[test]
fn result_files_are_truncated_and_single_line() -> anyhow::Result<()> {
    let result_dir = TempDir::new()?;
    let mut outputs = RankOutputs::create(result_dir.path(), 0)?;
    outputs.write_pair("stale", "stale")?;
    outputs.finish()?;

    let mut outputs = RankOutputs::create(result_dir.path(), 0)?;
    outputs.write_pair("first\nline", "erste\r\nZeile")?;
    let originals_path = outputs.originals_path();
    let translations_path = outputs.translations_path();
    outputs.finish()?;

    assert_eq!(read_lines(&originals_path)?, vec!["first line"]);
    assert_eq!(read_lines(&translations_path)?, vec!["erste  Zeile"]);
    Ok(())
}

#[test]
fn tarred_corpus_end_to_end() -> anyhow::Result<()> {
    let corpus_dir = TempDir::new()?;
    for file_index in 0..2 {
        let batch = SerializedBatch {
            src: vec![vec![10, 11, 12, 13], vec![12 + file_index]],
            tgt: None,
        };
        let mut builder = tar::Builder::new(fs::File::create(
            corpus_dir.path().join(format!("batches.{}.tar", file_index)),
        )?);
        let data = serde_json::to_vec(&batch)?;
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, "batch_0.json", data.as_slice())?;
        builder.finish()?;
    }
    let metadata_path = corpus_dir.path().join("metadata.json");
    fs::write(&metadata_path, r#"{"num_batches": 2}"#)?;

    let args = TranslateArgs::try_parse_from(&[
        "translate-ddp".to_string(),
        "--model=model.ot".to_string(),
        format!(
            "--text2translate={}/batches._OP_0..1_CL_.tar",
            corpus_dir.path().display()
        ),
        "--result_dir=unused".to_string(),
        format!("--metadata_path={}", metadata_path.display()),
        "--source_lang=en".to_string(),
        "--target_lang=fr".to_string(),
        "--shuffle_n=0".to_string(),
    ])?;
    let config = args.into_config();

    let result_dir = TempDir::new()?;
    let mut total_lines = 0;
    for rank in 0..2 {
        let dataset =
            TarredOneSideTranslationDataset::new(&config.dataset_config(rank, 2), PAD_ID)?;
        assert_eq!(dataset.len(), 1);
        let mut outputs = RankOutputs::create(result_dir.path(), rank)?;
        let detokenizers = LanguagePairDetokenizers::new(&config.source_lang, &config.target_lang);
        translate_shard(
            rank,
            &DictionaryTranslator,
            dataset.iter(),
            false,
            &detokenizers,
            &mut outputs,
        )?;
        total_lines += outputs.finish()?;

        let rank_dir = rank_result_dir(result_dir.path(), rank);
        let originals = read_lines(&rank_dir.join("originals.txt"))?;
        let translations = read_lines(&rank_dir.join("translations.txt"))?;
        assert_eq!(originals.len(), translations.len());
        assert_eq!(originals[0], "Hello, world!");
        assert_eq!(translations[0], "Bonjour, le monde !");
    }
    assert_eq!(total_lines, 4);
    Ok(())
}

#[test]
fn parallel_batches_translate_the_source_side_only() -> anyhow::Result<()> {
    let result_dir = TempDir::new()?;
    let mut outputs = RankOutputs::create(result_dir.path(), 0)?;
    let detokenizers = LanguagePairDetokenizers::new("en", "fr");
    let model = RecordingTranslator::default();

    let batches = vec![
        Ok(two_side_batch(&[10, 11, 12, 13], &[900, 901, 902])),
        Ok(two_side_batch(&[12, 13], &[903, 904])),
    ];
    let report = translate_shard(0, &model, batches, true, &detokenizers, &mut outputs)?;
    assert_eq!(report.batches, 2);
    assert_eq!(report.sentences, 2);

    assert_eq!(
        *model.seen.borrow(),
        vec![vec![10, 11, 12, 13], vec![12, 13]]
    );

    let originals_path = outputs.originals_path();
    let translations_path = outputs.translations_path();
    assert_eq!(outputs.finish()?, 2);
    assert_eq!(
        read_lines(&originals_path)?,
        vec!["Hello, world!", "world!"]
    );
    assert_eq!(
        read_lines(&translations_path)?,
        vec!["Bonjour, le monde !", "le monde !"]
    );
    Ok(())
}
