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
use std::fs::{self, File};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

pub const ORIGINALS_FILE_NAME: &str = "originals.txt";
pub const TRANSLATIONS_FILE_NAME: &str = "translations.txt";

/// Output directory of `rank`: `result_dir/rank<rank>`
pub fn rank_result_dir(result_dir: &Path, rank: usize) -> PathBuf {
    result_dir.join(format!("rank{}", rank))
}

/// # Per-rank result files
/// Source sentences and their translations are written line by line, as they are generated, to
/// two aligned files.
pub struct RankOutputs {
    directory: PathBuf,
    originals: LineWriter<File>,
    translations: LineWriter<File>,
    lines: usize,
}

impl RankOutputs {
    /// Creates `result_dir/rank<rank>` (if missing) and truncates both result files.
    pub fn create(result_dir: &Path, rank: usize) -> Result<RankOutputs, BatchTranslationError> {
        let directory = rank_result_dir(result_dir, rank);
        fs::create_dir_all(&directory)?;
        let originals = LineWriter::new(File::create(directory.join(ORIGINALS_FILE_NAME))?);
        let translations = LineWriter::new(File::create(directory.join(TRANSLATIONS_FILE_NAME))?);
        Ok(RankOutputs {
            directory,
            originals,
            translations,
            lines: 0,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn originals_path(&self) -> PathBuf {
        self.directory.join(ORIGINALS_FILE_NAME)
    }

    pub fn translations_path(&self) -> PathBuf {
        self.directory.join(TRANSLATIONS_FILE_NAME)
    }

    /// Number of sentence pairs written so far
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Appends a source sentence and its translation. Embedded newlines are replaced by spaces
    /// to keep both files aligned.
    pub fn write_pair(
        &mut self,
        original: &str,
        translation: &str,
    ) -> Result<(), BatchTranslationError> {
        writeln!(self.originals, "{}", single_line(original))?;
        writeln!(self.translations, "{}", single_line(translation))?;
        self.lines += 1;
        Ok(())
    }

    /// Flushes and closes both files, returning the number of lines written.
    pub fn finish(mut self) -> Result<usize, BatchTranslationError> {
        self.originals.flush()?;
        self.translations.flush()?;
        Ok(self.lines)
    }
}

fn single_line(text: &str) -> String {
    text.replace(|c: char| c == '\n' || c == '\r', " ")
}
