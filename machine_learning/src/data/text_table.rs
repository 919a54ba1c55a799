use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{MlErr, Result};

/// One line of a text table: a sample id followed by its transcription tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTableEntry {
    pub id: String,
    pub tokens: Vec<String>,
    pub line: usize,
}

/// Reads a text table, skipping blank lines and `#` comments.
pub fn read_text_table<P: AsRef<Path>>(path: P) -> Result<Vec<TextTableEntry>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    parse_text_table(path, &content)
}

pub(crate) fn parse_text_table(path: &Path, content: &str) -> Result<Vec<TextTableEntry>> {
    let mut entries = Vec::new();

    for (n, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut fields = trimmed.split_whitespace();
        let Some(id) = fields.next() else {
            return Err(MlErr::Parse {
                path: PathBuf::from(path),
                line: n + 1,
                msg: "missing sample id".to_string(),
            });
        };

        entries.push(TextTableEntry {
            id: id.to_string(),
            tokens: fields.map(str::to_string).collect(),
            line: n + 1,
        });
    }

    Ok(entries)
}
