// SPDX-License-Identifier: Apache-2.0

//! Client character sets accepted in the runner configuration.
//!
//! Query text is checked against the configured character set before it is
//! sent, so text the server session cannot represent fails loudly instead of
//! being silently replaced.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::engine::error::{EngineError, EngineResult};

/// Characters occupying 0x80..=0x9F in windows-1252.
const CP1252_HIGH: [char; 27] = [
    '€', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', 'Ž', '‘', '’', '“', '”', '•',
    '–', '—', '˜', '™', 'š', '›', 'œ', 'ž', 'Ÿ',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Charset {
    #[default]
    Latin1,
    Windows1252,
    Ascii,
    Utf8,
}

impl Charset {
    pub fn label(&self) -> &'static str {
        match self {
            Charset::Latin1 => "ISO-8859-1",
            Charset::Windows1252 => "windows-1252",
            Charset::Ascii => "US-ASCII",
            Charset::Utf8 => "UTF-8",
        }
    }

    pub fn can_encode(&self, c: char) -> bool {
        match self {
            Charset::Utf8 => true,
            Charset::Ascii => c.is_ascii(),
            Charset::Latin1 => (c as u32) <= 0xFF,
            Charset::Windows1252 => {
                let code = c as u32;
                code < 0x80 || (0xA0..=0xFF).contains(&code) || CP1252_HIGH.contains(&c)
            }
        }
    }

    /// Encodes `query` for the wire.
    ///
    /// The driver transmits text itself, so encoding amounts to proving every
    /// character is representable and handing the text back unchanged.
    pub fn encode<'a>(&self, query: &'a str) -> EngineResult<&'a str> {
        match query.char_indices().find(|(_, c)| !self.can_encode(*c)) {
            Some((offset, c)) => Err(EngineError::encoding(
                self.label(),
                format!("character {:?} at byte {} is not representable", c, offset),
            )),
            None => Ok(query),
        }
    }
}

impl FromStr for Charset {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok(Charset::Latin1),
            "windows-1252" | "cp1252" => Ok(Charset::Windows1252),
            "us-ascii" | "ascii" => Ok(Charset::Ascii),
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            _ => Err(EngineError::validation(format!("Unsupported charset: {s}"))),
        }
    }
}

impl TryFrom<String> for Charset {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
