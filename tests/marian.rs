use rust_bert::marian::{
    MarianConfigResources, MarianModelResources, MarianSpmResources, MarianVocabResources,
};
use rust_bert::resources::{RemoteResource, Resource};
use rust_tokenizers::tokenizer::{MarianTokenizer, Tokenizer, TruncationStrategy};
use std::path::PathBuf;
use tch::{Device, Tensor};
use translate_ddp::model::{DecodingStrategy, MarianTranslator, ModelFiles, Seq2SeqTranslator};

fn download(resource: (&str, &str)) -> anyhow::Result<PathBuf> {
    Ok(Resource::Remote(RemoteResource::from_pretrained(resource)).get_local_path()?)
}

fn english_to_romance_files() -> anyhow::Result<ModelFiles> {
    let spm = download(MarianSpmResources::ENGLISH2ROMANCE)?;
    Ok(ModelFiles {
        config: download(MarianConfigResources::ENGLISH2ROMANCE)?,
        vocab: download(MarianVocabResources::ENGLISH2ROMANCE)?,
        weights: download(MarianModelResources::ENGLISH2ROMANCE)?,
        source_spm: spm.clone(),
        target_spm: spm,
    })
}

#[test]
#[cfg_attr(not(feature = "all-tests"), ignore)]
fn marian_translates_token_ids() -> anyhow::Result<()> {
    let files = english_to_romance_files()?;
    let model = MarianTranslator::new(
        &files,
        Device::cuda_if_available(),
        DecodingStrategy::default(),
        128,
    )?;
    let tokenizer = MarianTokenizer::from_files(
        files.vocab.to_str().unwrap(),
        files.source_spm.to_str().unwrap(),
        false,
    )?;

    let input = tokenizer.encode(
        ">>fr<< The dog did not wake up",
        None,
        128,
        &TruncationStrategy::LongestFirst,
        0,
    );
    let length = input.token_ids.len() as i64;
    let src_ids = Tensor::of_slice(&input.token_ids)
        .view((1, length))
        .to_device(model.device());
    let src_mask = src_ids.ones_like();

    let translations = model.translate_ids(&src_ids, &src_mask)?;
    assert_eq!(translations.len(), 1);

    let text = model.decoder_ids_to_text(&translations[0]);
    assert!(text.contains("chien"), "unexpected translation: {}", text);
    assert!(model
        .encoder_ids_to_text(&input.token_ids)
        .contains("The dog did not wake up"));
    Ok(())
}

#[test]
#[cfg_attr(not(feature = "all-tests"), ignore)]
fn marian_top_k_sampling_returns_one_sequence_per_row() -> anyhow::Result<()> {
    let files = english_to_romance_files()?;
    let mut strategy = DecodingStrategy::default();
    strategy.replace_beam_with_sampling(500);
    let model = MarianTranslator::new(&files, Device::cuda_if_available(), strategy, 64)?;

    let pad = model.pad_token_id();
    let src_ids = Tensor::of_slice(&[1i64, 2, 3, 4, 5, 6, pad, pad])
        .view((2, 4))
        .to_device(model.device());
    let src_mask = src_ids.ne(pad);

    let translations = model.translate_ids(&src_ids, &src_mask)?;
    assert_eq!(translations.len(), 2);
    Ok(())
}
