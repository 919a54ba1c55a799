use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{MlErr, Result};

/// A bidirectional mapping between symbols and the integer indices of the model outputs.
///
/// The file format is one `symbol index` pair per line, blank lines are ignored. By convention
/// index 0 is the CTC blank.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    to_index: HashMap<String, usize>,
    to_symbol: HashMap<usize, String>,
}

impl SymbolTable {
    /// Reads a symbol table from `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::parse(path, &content)
    }

    /// Parses the contents of a symbol table, `path` is only used for error messages.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let mut table = Self::default();
        let err = |line: usize, msg: String| MlErr::Parse {
            path: PathBuf::from(path),
            line,
            msg,
        };

        for (n, line) in content.lines().enumerate() {
            let line_no = n + 1;
            let fields: Vec<_> = line.split_whitespace().collect();
            let (symbol, index) = match fields.as_slice() {
                [] => continue,
                [symbol, index] => (*symbol, *index),
                _ => {
                    return Err(err(
                        line_no,
                        format!("expected `symbol index`, got {} fields", fields.len()),
                    ));
                }
            };

            let index: usize = index
                .parse()
                .map_err(|e| err(line_no, format!("bad index {index:?}: {e}")))?;

            if table.to_index.contains_key(symbol) {
                return Err(err(line_no, format!("duplicated symbol {symbol:?}")));
            }
            if table.to_symbol.contains_key(&index) {
                return Err(err(line_no, format!("duplicated index {index}")));
            }

            table.to_index.insert(symbol.to_string(), index);
            table.to_symbol.insert(index, symbol.to_string());
        }

        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.to_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_index.is_empty()
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.to_index.get(symbol).copied()
    }

    pub fn symbol_of(&self, index: usize) -> Option<&str> {
        self.to_symbol.get(&index).map(String::as_str)
    }

    /// Number of outputs a model needs to score every symbol of the table.
    pub fn num_outputs(&self) -> usize {
        self.to_symbol.keys().max().map_or(0, |max| max + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<SymbolTable> {
        SymbolTable::parse(Path::new("syms.txt"), content)
    }

    #[test]
    fn maps_both_ways() {
        let syms = parse("<ctc> 0\na 1\n\nb 2\n").unwrap();
        assert_eq!(syms.len(), 3);
        assert_eq!(syms.index_of("a"), Some(1));
        assert_eq!(syms.symbol_of(2), Some("b"));
        assert_eq!(syms.index_of("z"), None);
        assert_eq!(syms.num_outputs(), 3);
    }

    #[test]
    fn duplicates_are_rejected() {
        assert!(parse("a 1\na 2\n").is_err());
        assert!(parse("a 1\nb 1\n").is_err());
    }

    #[test]
    fn malformed_lines_report_their_number() {
        let err = parse("a 1\nb\n").unwrap_err();
        match err {
            MlErr::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other}"),
        }
        assert!(parse("a x\n").is_err());
    }
}
