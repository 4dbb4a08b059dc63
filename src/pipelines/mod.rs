//! # Ready-to-use pipelines
//!
//! #### Batch translation
//! Data-parallel translation of tarred corpora, one worker process per GPU. The pipeline is
//! exposed through the `translate-ddp` binary and through `batch_translation::launch` /
//! `batch_translation::run_worker` for embedding in other tools.

pub mod batch_translation;
