//! # Data-parallel batch translation with Marian models
//!
//! This crate translates large, pre-tokenized corpora with a pre-trained Marian encoder-decoder
//! model, replicating the model on every available GPU. A launcher process spawns one worker per
//! device; each worker reads a disjoint shard of a tarred corpus, generates translations with
//! top-k sampling, detokenizes them and writes aligned result files under
//! `<result_dir>/rank<N>/`.
//!
//! Model architecture, generation and sub-word tokenization are provided by
//! [rust-bert](https://github.com/guillaume-be/rust-bert) and
//! [rust_tokenizers](https://github.com/guillaume-be/rust-tokenizers) on top of the
//! [tch-rs](https://github.com/LaurentMazare/tch-rs) bindings to libtorch.
//!
//! The crate is organized as follows:
//! - `pipelines::batch_translation`: job configuration, per-rank worker loop and launcher
//! - `model`: checkpoint resolution and the `Seq2SeqTranslator` abstraction over the model
//! - `data`: tarred parallel and monolingual datasets, shard assignment
//! - `detokenize`: Moses, Chinese and SentencePiece detokenizers
//! - `distributed`: worker process spawning and the TCP process group
//!
//! ```no_run
//! # fn main() -> Result<(), translate_ddp::BatchTranslationError> {
//! use clap::Parser;
//! use translate_ddp::pipelines::batch_translation::{launch, TranslateArgs};
//!
//! let config = TranslateArgs::parse_from(&[
//!     "translate-ddp",
//!     "--model",
//!     "opus-mt-en-de.tar.gz",
//!     "--text2translate",
//!     "corpus/batches.tokens.{0..7}.tar",
//!     "--metadata_path",
//!     "corpus/metadata.json",
//!     "--result_dir",
//!     "results",
//!     "--source_lang",
//!     "en",
//!     "--target_lang",
//!     "de",
//! ])
//! .into_config();
//! launch(&config)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Loading pre-trained models
//!
//! Checkpoints are either `.tar.gz` archives bundling `config.json`, `vocab.json`, the
//! SentencePiece models and the weights, or bare `.ot` weights with those files in the same
//! directory. Weights must be converted from the Pytorch `.bin` format to the `.ot` format with
//! the conversion utilities shipped with `rust-bert`. Archives are extracted once into the cache
//! directory (`TRANSLATE_DDP_CACHE`, defaulting to `~/.cache/.translate-ddp`).

pub mod common;
pub mod data;
pub mod detokenize;
pub mod distributed;
pub mod model;
pub mod pipelines;

pub use common::error::BatchTranslationError;
pub use common::Config;
