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

fn is_cjk_ideograph(character: char) -> bool {
    matches!(character as u32,
        0x2E80..=0x2FDF
        | 0x3040..=0x30FA
        | 0x30FC..=0x312F
        | 0x3200..=0x32FF
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xF900..=0xFAFF)
}

fn is_cjk_punctuation(character: char) -> bool {
    matches!(character as u32, 0x3000..=0x303F | 0xFF00..=0xFFEF)
}

fn is_cjk(character: char) -> bool {
    is_cjk_ideograph(character) || is_cjk_punctuation(character)
}

/// # Chinese detokenizer
/// Joins segmented Chinese words (spaces next to a CJK character or CJK punctuation are dropped)
/// and re-inserts a single space between CJK ideographs and Latin letters or digits.
#[derive(Default)]
pub struct PanguJiebaDetokenizer {}

impl PanguJiebaDetokenizer {
    pub fn new() -> PanguJiebaDetokenizer {
        PanguJiebaDetokenizer {}
    }

    fn join_words(tokens: &[&str]) -> String {
        let text = tokens.join(" ");
        let characters: Vec<char> = text.chars().collect();
        let mut output = String::with_capacity(text.len());
        for (position, character) in characters.iter().enumerate() {
            if *character == ' ' {
                let previous = position.checked_sub(1).map(|p| characters[p]);
                let next = characters.get(position + 1).copied();
                if previous.map(is_cjk).unwrap_or(false) || next.map(is_cjk).unwrap_or(false) {
                    continue;
                }
            }
            output.push(*character);
        }
        output
    }

    fn spacing(text: &str) -> String {
        let mut output = String::with_capacity(text.len());
        let mut previous: Option<char> = None;
        for character in text.chars() {
            if let Some(previous) = previous {
                if (is_cjk_ideograph(previous) && character.is_ascii_alphanumeric())
                    || (previous.is_ascii_alphanumeric() && is_cjk_ideograph(character))
                {
                    output.push(' ');
                }
            }
            output.push(character);
            previous = Some(character);
        }
        output
    }
}

impl Detokenizer for PanguJiebaDetokenizer {
    fn detokenize(&self, tokens: &[&str]) -> String {
        Self::spacing(&Self::join_words(tokens)).trim().to_string()
    }
}
