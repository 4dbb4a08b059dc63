#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use std::time::{Duration, Instant};
use translate_ddp::detokenize::{LanguagePairDetokenizers, SideDetokenizer};

fn detokenization_pass(iters: u64, detokenizer: &SideDetokenizer, data: &[&str]) -> Duration {
    let mut duration = Duration::new(0, 0);
    for _i in 0..iters {
        let start = Instant::now();
        for sentence in data {
            let _ = detokenizer.detokenize_text(sentence);
        }
        duration = duration.checked_add(start.elapsed()).unwrap();
    }
    duration
}

fn bench_moses(c: &mut Criterion) {
    let detokenizers = LanguagePairDetokenizers::new("en", "fr");

    //    Define input
    let english = [
        "The quick brown fox jumps over the lazy dog .",
        "He said \" it 's fine \" , and left ( without a word ) .",
        "Tom &amp; Jerry cost $ 5 at the well @-@ known store !",
    ];
    let french = [
        "Le rapide renard brun saute par @-@ dessus le chien paresseux .",
        "Bonjour , l' homme ! Comment allez @-@ vous ?",
    ];
    c.bench_function("Moses English", |b| {
        b.iter_custom(|iters| black_box(detokenization_pass(iters, &detokenizers.source, &english)))
    });
    c.bench_function("Moses French", |b| {
        b.iter_custom(|iters| black_box(detokenization_pass(iters, &detokenizers.target, &french)))
    });
}

fn bench_cjk(c: &mut Criterion) {
    let chinese = SideDetokenizer::for_language("zh");
    let japanese = SideDetokenizer::for_language("ja");

    //    Define input
    let chinese_input = ["我 爱 自然 语言 处理 。", "我们 用 Rust 写 了 100 行 代码 。"];
    let japanese_input = ["▁日本 語 ▁を ▁勉強 し て い ます 。", "▁Rust ▁で ▁書 く"];
    c.bench_function("Pangu Chinese", |b| {
        b.iter_custom(|iters| black_box(detokenization_pass(iters, &chinese, &chinese_input)))
    });
    c.bench_function("SentencePiece Japanese", |b| {
        b.iter_custom(|iters| black_box(detokenization_pass(iters, &japanese, &japanese_input)))
    });
}

criterion_group! {
name = benches;
config = Criterion::default().sample_size(50);
targets = bench_moses, bench_cjk
}

criterion_main!(benches);
