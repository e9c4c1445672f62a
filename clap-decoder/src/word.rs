/// Clap symbols and command words

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WordError {
    #[error("Invalid clap symbol: {0:?} (expected 'S' or 'D')")]
    InvalidSymbol(char),
}

/// Classification of one clap gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    /// One clap with no follow-up inside the double-clap gap ('S')
    Single,

    /// Two distinct claps inside the gap ('D')
    Double,
}

impl Symbol {
    pub fn as_char(self) -> char {
        match self {
            Symbol::Single => 'S',
            Symbol::Double => 'D',
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl TryFrom<char> for Symbol {
    type Error = WordError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            'S' => Ok(Symbol::Single),
            'D' => Ok(Symbol::Double),
            other => Err(WordError::InvalidSymbol(other)),
        }
    }
}

/// A completed command word, e.g. `SSDD`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Word(String);

impl Word {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        // Every constructor goes through Symbol, so only 'S' and 'D' occur
        self.0.chars().map(|c| match c {
            'D' => Symbol::Double,
            _ => Symbol::Single,
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[Symbol]> for Word {
    fn from(symbols: &[Symbol]) -> Self {
        Word(symbols.iter().map(|s| s.as_char()).collect())
    }
}

impl FromStr for Word {
    type Err = WordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let symbols = s
            .chars()
            .map(Symbol::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Word::from(symbols.as_slice()))
    }
}

impl TryFrom<String> for Word {
    type Error = WordError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Word> for String {
    fn from(word: Word) -> Self {
        word.0
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for Word {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Builds words one symbol at a time
#[derive(Debug, Clone)]
pub struct WordAccumulator {
    symbols: Vec<Symbol>,
    word_length: usize,
}

impl WordAccumulator {
    pub fn new(word_length: usize) -> Self {
        Self {
            symbols: Vec::with_capacity(word_length),
            word_length,
        }
    }

    /// Append a symbol; returns the finished word once `word_length` is
    /// reached, leaving the accumulator empty
    pub fn append_symbol(&mut self, symbol: Symbol) -> Option<Word> {
        self.symbols.push(symbol);
        debug!(
            "Word progress: {}/{} ({})",
            self.symbols.len(),
            self.word_length,
            Word::from(self.symbols.as_slice())
        );

        if self.symbols.len() < self.word_length {
            return None;
        }

        let word = Word::from(self.symbols.as_slice());
        self.symbols.clear();
        Some(word)
    }

    /// Symbols of the word in progress
    pub fn pending(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn word_length(&self) -> usize {
        self.word_length
    }

    pub fn reset(&mut self) {
        self.symbols.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_chars() {
        assert_eq!(Symbol::Single.as_char(), 'S');
        assert_eq!(Symbol::Double.to_string(), "D");
        assert_eq!(Symbol::try_from('D'), Ok(Symbol::Double));
        assert_eq!(Symbol::try_from('x'), Err(WordError::InvalidSymbol('x')));
    }

    #[test]
    fn test_word_completes_after_word_length_symbols() {
        let mut acc = WordAccumulator::new(4);

        assert!(acc.append_symbol(Symbol::Single).is_none());
        assert!(acc.append_symbol(Symbol::Single).is_none());
        assert!(acc.append_symbol(Symbol::Double).is_none());
        assert_eq!(acc.pending(), &[Symbol::Single, Symbol::Single, Symbol::Double]);

        let word = acc.append_symbol(Symbol::Double).unwrap();
        assert_eq!(word, "SSDD");
        assert_eq!(word.len(), 4);
        assert!(acc.pending().is_empty());
    }

    #[test]
    fn test_next_word_starts_empty() {
        let mut acc = WordAccumulator::new(2);

        assert_eq!(acc.append_symbol(Symbol::Double), None);
        assert_eq!(acc.append_symbol(Symbol::Single).unwrap(), "DS");
        assert_eq!(acc.append_symbol(Symbol::Single), None);
        assert_eq!(acc.pending(), &[Symbol::Single]);
    }

    #[test]
    fn test_single_symbol_words() {
        let mut acc = WordAccumulator::new(1);
        assert_eq!(acc.append_symbol(Symbol::Double).unwrap(), "D");
        assert!(acc.pending().is_empty());
    }

    #[test]
    fn test_reset_discards_progress() {
        let mut acc = WordAccumulator::new(4);
        acc.append_symbol(Symbol::Double);
        acc.reset();
        assert!(acc.pending().is_empty());
        assert_eq!(acc.word_length(), 4);
    }

    #[test]
    fn test_word_parse_and_symbols() {
        let word: Word = "DSSD".parse().unwrap();
        let symbols: Vec<Symbol> = word.symbols().collect();

        assert_eq!(
            symbols,
            vec![Symbol::Double, Symbol::Single, Symbol::Single, Symbol::Double]
        );
        assert_eq!(word.to_string(), "DSSD");
        assert!("SXD".parse::<Word>().is_err());
    }

    #[test]
    fn test_word_json_checks_alphabet() {
        let word: Word = serde_json::from_str("\"SDDS\"").unwrap();
        assert_eq!(word, "SDDS");
        assert_eq!(serde_json::to_string(&word).unwrap(), "\"SDDS\"");

        assert!(serde_json::from_str::<Word>("\"XYZ!\"").is_err());
        assert!(serde_json::from_str::<Word>("\"SDs\"").is_err());
    }
}
