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

//! # Detokenizers
//!
//! Convert whitespace-separated tokens produced by the model's tokenizers back into
//! natural-language text. The detokenizer is selected by language code:
//! - `zh`: `PanguJiebaDetokenizer`, joining Chinese words and spacing mixed scripts
//! - any other language: `MosesDetokenizer`, reverting the Moses tokenization rules
//! - `ja`: an additional `SentencePieceDetokenizer` pass runs before the Moses rules, merging the
//! sub-word pieces left by the decoder.
//!
//! ```no_run
//! use translate_ddp::detokenize::LanguagePairDetokenizers;
//!
//! let detokenizers = LanguagePairDetokenizers::new("en", "fr");
//! let translation = detokenizers.target.detokenize_text("Bonjour , le monde !");
//! assert_eq!(translation, "Bonjour, le monde !");
//! ```

mod moses;
mod pangu_jieba;
mod sentencepiece;

pub use moses::MosesDetokenizer;
pub use pangu_jieba::PanguJiebaDetokenizer;
pub use sentencepiece::SentencePieceDetokenizer;

/// # Common interface of detokenizers
pub trait Detokenizer {
    /// Joins a sequence of tokens into a single string.
    fn detokenize(&self, tokens: &[&str]) -> String;
}

/// # Language detokenizer flavour
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetokenizerKind {
    /// Moses rules, parametrized by language
    Moses,
    /// Chinese word joining with mixed-script spacing
    PanguJieba,
}

enum LanguageDetokenizer {
    Moses(MosesDetokenizer),
    PanguJieba(PanguJiebaDetokenizer),
}

impl Detokenizer for LanguageDetokenizer {
    fn detokenize(&self, tokens: &[&str]) -> String {
        match self {
            Self::Moses(detokenizer) => detokenizer.detokenize(tokens),
            Self::PanguJieba(detokenizer) => detokenizer.detokenize(tokens),
        }
    }
}

/// # Detokenization chain for one side (source or target) of the translation
pub struct SideDetokenizer {
    language: String,
    sentencepiece: Option<SentencePieceDetokenizer>,
    detokenizer: LanguageDetokenizer,
}

impl SideDetokenizer {
    /// Builds the detokenization chain for a language code (e.g. `en`, `zh`, `ja`).
    ///
    /// The `ja` sub-word pass is keyed to this side's own language, not to the target language of
    /// the pair: the English source of an `en` to `ja` job is not merged, a Japanese source is.
    pub fn for_language(language: &str) -> SideDetokenizer {
        let detokenizer = match language {
            "zh" => LanguageDetokenizer::PanguJieba(PanguJiebaDetokenizer::new()),
            _ => LanguageDetokenizer::Moses(MosesDetokenizer::new(language)),
        };
        let sentencepiece = match language {
            "ja" => Some(SentencePieceDetokenizer::new()),
            _ => None,
        };
        SideDetokenizer {
            language: language.to_string(),
            sentencepiece,
            detokenizer,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn kind(&self) -> DetokenizerKind {
        match self.detokenizer {
            LanguageDetokenizer::Moses(_) => DetokenizerKind::Moses,
            LanguageDetokenizer::PanguJieba(_) => DetokenizerKind::PanguJieba,
        }
    }

    /// Whether a sub-word merging pass runs before the language detokenizer
    pub fn has_sentencepiece_pass(&self) -> bool {
        self.sentencepiece.is_some()
    }

    /// Detokenizes a decoded sentence, splitting it on whitespace first.
    pub fn detokenize_text(&self, text: &str) -> String {
        let merged;
        let text = match &self.sentencepiece {
            Some(sentencepiece) => {
                let pieces: Vec<&str> = text.split_whitespace().collect();
                merged = sentencepiece.detokenize(&pieces);
                merged.as_str()
            }
            None => text,
        };
        let tokens: Vec<&str> = text.split_whitespace().collect();
        self.detokenizer.detokenize(&tokens)
    }
}

/// # Source and target detokenizers of a worker
pub struct LanguagePairDetokenizers {
    pub source: SideDetokenizer,
    pub target: SideDetokenizer,
}

impl LanguagePairDetokenizers {
    pub fn new(source_language: &str, target_language: &str) -> LanguagePairDetokenizers {
        LanguagePairDetokenizers {
            source: SideDetokenizer::for_language(source_language),
            target: SideDetokenizer::for_language(target_language),
        }
    }
}
