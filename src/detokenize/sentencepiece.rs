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

use crate::detokenize::Detokenizer;

const WORD_BOUNDARY: char = '▁';

/// # SentencePiece detokenizer
/// Concatenates sub-word pieces and turns the `▁` word-boundary marker back into spaces.
#[derive(Default)]
pub struct SentencePieceDetokenizer {}

impl SentencePieceDetokenizer {
    pub fn new() -> SentencePieceDetokenizer {
        SentencePieceDetokenizer {}
    }
}

impl Detokenizer for SentencePieceDetokenizer {
    fn detokenize(&self, tokens: &[&str]) -> String {
        tokens
            .concat()
            .replace(WORD_BOUNDARY, " ")
            .trim()
            .to_string()
    }
}
