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
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref AGGRESSIVE_HYPHEN_SPLIT: Regex = Regex::new(r" @-@ ").unwrap();
    static ref MULTIPLE_SPACES: Regex = Regex::new(r" {2,}").unwrap();
    static ref CURRENCY_OR_OPENING: Regex = Regex::new(r"^[\p{Sc}(\[{¿¡]+$").unwrap();
    static ref CLOSING_PUNCTUATION: Regex = Regex::new(r"^[,.?!:;\\%}\])]+$").unwrap();
    static ref FRENCH_SPACED_PUNCTUATION: Regex = Regex::new(r"^[?!:;\\%]$").unwrap();
    static ref ENGLISH_CONTRACTION: Regex = Regex::new(r"^'\p{Alphabetic}").unwrap();
    static ref ENDS_WITH_ELISION: Regex = Regex::new(r"\p{Alphabetic}'$").unwrap();
    static ref STARTS_WITH_ALPHA: Regex = Regex::new(r"^\p{Alphabetic}").unwrap();
    static ref NUMBER: Regex = Regex::new(r"^[0-9]+$").unwrap();
    static ref DECIMAL_SEPARATOR: Regex = Regex::new(r"^[.,]$").unwrap();
    static ref QUOTES: Regex = Regex::new(r#"^['"„“”`]+$"#).unwrap();
    static ref DOUBLE_QUOTES: Regex = Regex::new(r"^[„“”]+$").unwrap();
}

const XML_ESCAPES: [(&str, &str); 11] = [
    ("&bar;", "|"),
    ("&#124;", "|"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&bra;", "["),
    ("&ket;", "]"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&#91;", "["),
    ("&#93;", "]"),
    ("&amp;", "&"),
];

fn is_cjk(character: char) -> bool {
    matches!(character as u32,
        0x1100..=0x11FF
        | 0x2E80..=0xA4CF
        | 0xA840..=0xA87F
        | 0xAC00..=0xD7AF
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF65..=0xFFDC
        | 0x20000..=0x2FFFF)
}

/// # Moses detokenizer
/// Reverts the tokenization rules of the Moses tokenizer for a given language: attaches
/// punctuation, pairs quotes, left-shifts English contractions, right-shifts French and Italian
/// elisions, joins consecutive CJK words and unescapes XML entities.
pub struct MosesDetokenizer {
    language: String,
}

impl MosesDetokenizer {
    pub fn new(language: &str) -> MosesDetokenizer {
        MosesDetokenizer {
            language: language.to_string(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    fn unescape_xml(text: &str) -> String {
        XML_ESCAPES
            .iter()
            .fold(text.to_string(), |text, (escaped, unescaped)| {
                text.replace(escaped, unescaped)
            })
    }
}

impl Detokenizer for MosesDetokenizer {
    fn detokenize(&self, tokens: &[&str]) -> String {
        let text = format!(" {} ", tokens.join(" "));
        let text = AGGRESSIVE_HYPHEN_SPLIT.replace_all(&text, "-");
        let text = Self::unescape_xml(&text);
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let language = self.language.as_str();

        let mut quote_counts: HashMap<&str, usize> = HashMap::new();
        let mut prepend_space = " ";
        let mut output = String::with_capacity(text.len());

        for (i, token) in tokens.iter().copied().enumerate() {
            let first_char = token.chars().next().unwrap_or(' ');
            if is_cjk(first_char) && language != "ko" {
                let follows_cjk = i > 0
                    && tokens[i - 1]
                        .chars()
                        .last()
                        .map(is_cjk)
                        .unwrap_or(false);
                if !follows_cjk {
                    output.push_str(prepend_space);
                }
                output.push_str(token);
                prepend_space = " ";
            } else if CURRENCY_OR_OPENING.is_match(token) {
                output.push_str(prepend_space);
                output.push_str(token);
                prepend_space = "";
            } else if CLOSING_PUNCTUATION.is_match(token) {
                if language == "fr" && FRENCH_SPACED_PUNCTUATION.is_match(token) {
                    output.push(' ');
                }
                output.push_str(token);
                prepend_space = " ";
            } else if language == "en" && i > 0 && ENGLISH_CONTRACTION.is_match(token) {
                output.push_str(token);
                prepend_space = " ";
            } else if language == "cs"
                && i > 1
                && NUMBER.is_match(tokens[i - 2])
                && DECIMAL_SEPARATOR.is_match(tokens[i - 1])
                && NUMBER.is_match(token)
            {
                output.push_str(token);
                prepend_space = " ";
            } else if matches!(language, "fr" | "it" | "ga")
                && i + 1 < tokens.len()
                && ENDS_WITH_ELISION.is_match(token)
                && STARTS_WITH_ALPHA.is_match(tokens[i + 1])
            {
                output.push_str(prepend_space);
                output.push_str(token);
                prepend_space = "";
            } else if QUOTES.is_match(token) {
                let normalized_quote = if DOUBLE_QUOTES.is_match(token) {
                    "\""
                } else {
                    token
                };
                let count = quote_counts.entry(normalized_quote).or_insert(0);
                if language == "cs" && token == "„" {
                    *count = 0;
                }
                if language == "cs" && token == "“" {
                    *count = 1;
                }
                if *count % 2 == 0 {
                    if language == "en" && token == "'" && i > 0 && tokens[i - 1].ends_with('s')
                    {
                        // possessive of a plural ("the Jones' house")
                        output.push_str(token);
                        prepend_space = " ";
                    } else {
                        output.push_str(prepend_space);
                        output.push_str(token);
                        prepend_space = "";
                        *count += 1;
                    }
                } else {
                    output.push_str(token);
                    prepend_space = " ";
                    *count += 1;
                }
            } else {
                output.push_str(prepend_space);
                output.push_str(token);
                prepend_space = " ";
            }
        }

        MULTIPLE_SPACES
            .replace_all(&output, " ")
            .trim()
            .to_string()
    }
}
