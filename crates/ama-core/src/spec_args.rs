//! Tokenizer for validator parameter strings such as `min=3|max=6`.
//!
//! Tokens are separated by `|` (or a newline) and may be double-quoted to carry
//! the delimiter. A token holding an unescaped `=` is a keyword argument; `\=`
//! keeps a literal equals sign.

use std::str::FromStr;

use thiserror::Error;

const DELIMITER: u8 = b'|';

/// Errors raised while reading a parameter string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("malformed parameter string: {0}")]
    Malformed(String),
    #[error("parameter '{name}' has invalid value '{value}': {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
    #[error("unsupported parameter: {0}")]
    Unsupported(String),
}

/// Positional and keyword arguments parsed from a parameter string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecArgs {
    positional: Vec<String>,
    keywords: Vec<(String, String)>,
}

impl SpecArgs {
    /// Parses `spec`; `None` and the empty string yield no arguments.
    pub fn parse(spec: Option<&str>) -> Result<Self, SpecError> {
        let mut args = SpecArgs::default();
        let Some(spec) = spec.filter(|spec| !spec.is_empty()) else {
            return Ok(args);
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .flexible(true)
            .from_reader(spec.as_bytes());

        for record in reader.records() {
            let record = record.map_err(|err| SpecError::Malformed(err.to_string()))?;
            for token in record.iter().filter(|token| !token.is_empty()) {
                args.push_token(token);
            }
        }
        Ok(args)
    }

    fn push_token(&mut self, token: &str) {
        match split_keyword(token) {
            Some((key, value)) => {
                let key = unescape(key);
                let value = value.to_string();
                if let Some(slot) = self.keywords.iter_mut().find(|(name, _)| *name == key) {
                    slot.1 = value;
                } else {
                    self.keywords.push((key, value));
                }
            }
            None => self.positional.push(unescape(token)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn first(&self) -> Option<&str> {
        self.positional.first().map(String::as_str)
    }

    /// Keyword arguments in order of first appearance.
    pub fn keywords(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keywords
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn keyword(&self, name: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// True when `name` appears as a bare token or as a keyword.
    pub fn has_flag(&self, name: &str) -> bool {
        self.positional.iter().any(|token| token == name) || self.keyword(name).is_some()
    }

    /// Reads a keyword and parses it, reporting unparsable values.
    pub fn parsed<T>(&self, name: &str) -> Result<Option<T>, SpecError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.keyword(name) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| SpecError::InvalidValue {
                name: name.to_string(),
                value: raw.to_string(),
                reason: err.to_string(),
            })
    }
}

fn split_keyword(token: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (idx, ch) in token.char_indices() {
        match ch {
            '\\' => escaped = !escaped,
            '=' if !escaped => return Some((&token[..idx], &token[idx + 1..])),
            _ => escaped = false,
        }
    }
    None
}

fn unescape(token: &str) -> String {
    token.replace("\\=", "=")
}
