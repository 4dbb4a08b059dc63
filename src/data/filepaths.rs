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

/// Expands brace patterns in a corpus file path.
///
/// Supports numeric ranges (`batches.{0..3}.tar`, zero padding of the lower bound is kept)
/// and alternatives (`{train,test}.tar`). The `_OP_` and `_CL_` tokens are accepted as
/// aliases of `{` and `}` for shells that would otherwise expand the braces themselves.
///
/// # Example
///
/// ```
/// use translate_ddp::data::expand_filepaths;
/// let paths = expand_filepaths("batches._OP_0..2_CL_.tar").unwrap();
/// assert_eq!(paths, vec!["batches.0.tar", "batches.1.tar", "batches.2.tar"]);
/// ```
pub fn expand_filepaths(pattern: &str) -> Result<Vec<String>, BatchTranslationError> {
    let pattern = pattern.replace("_OP_", "{").replace("_CL_", "}");
    expand(&pattern)
}

fn expand(pattern: &str) -> Result<Vec<String>, BatchTranslationError> {
    let open = match pattern.find('{') {
        Some(position) => position,
        None => {
            if pattern.contains('}') {
                return Err(unbalanced(pattern));
            }
            return Ok(vec![pattern.to_string()]);
        }
    };
    let close = pattern[open..]
        .find('}')
        .map(|position| open + position)
        .ok_or_else(|| unbalanced(pattern))?;
    let prefix = &pattern[..open];
    let group = &pattern[open + 1..close];
    let suffix = &pattern[close + 1..];

    let mut expanded = Vec::new();
    for alternative in expand_group(group)? {
        let candidate = format!("{}{}{}", prefix, alternative, suffix);
        expanded.extend(expand(&candidate)?);
    }
    Ok(expanded)
}

fn expand_group(group: &str) -> Result<Vec<String>, BatchTranslationError> {
    if let Some((start, end)) = split_range(group) {
        let width = if start.len() > 1 && start.starts_with('0') {
            start.len()
        } else {
            0
        };
        let start: u64 = start.parse().map_err(|_| invalid_range(group))?;
        let end: u64 = end.parse().map_err(|_| invalid_range(group))?;
        if end < start {
            return Err(invalid_range(group));
        }
        return Ok((start..=end)
            .map(|value| format!("{:0width$}", value, width = width))
            .collect());
    }
    Ok(group.split(',').map(|part| part.to_string()).collect())
}

fn split_range(group: &str) -> Option<(&str, &str)> {
    let mut parts = group.splitn(2, "..");
    let start = parts.next()?;
    let end = parts.next()?;
    if !start.is_empty()
        && !end.is_empty()
        && start.chars().all(|c| c.is_ascii_digit())
        && end.chars().all(|c| c.is_ascii_digit())
    {
        Some((start, end))
    } else {
        None
    }
}

fn unbalanced(pattern: &str) -> BatchTranslationError {
    BatchTranslationError::InvalidConfigurationError(format!(
        "unbalanced braces in corpus path pattern {}",
        pattern
    ))
}

fn invalid_range(group: &str) -> BatchTranslationError {
    BatchTranslationError::InvalidConfigurationError(format!(
        "invalid numeric range {{{}}} in corpus path pattern",
        group
    ))
}
