// SPDX-License-Identifier: GPL-3.0-only

//! Vehicle identifier validation
//!
//! An identifier is exactly `DD-DD-DDD`: two ASCII digits, hyphen, two
//! digits, hyphen, three digits. Nothing is trimmed or normalized, so any
//! whitespace or letter is a rejection.

use serde::Serialize;

/// Length of a valid identifier in bytes
pub const IDENTIFIER_LEN: usize = 9;

/// Byte positions of the hyphens
const HYPHEN_POSITIONS: [usize; 2] = [2, 5];

/// A validated vehicle identifier
///
/// Only [`validate`] creates one, so holding an `Identifier` proves the
/// text matched the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Accept `text` if it is exactly `DD-DD-DDD`
pub fn validate(text: &str) -> Option<Identifier> {
    is_identifier(text).then(|| Identifier(text.to_string()))
}

fn is_identifier(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == IDENTIFIER_LEN
        && bytes.iter().enumerate().all(|(i, b)| {
            if HYPHEN_POSITIONS.contains(&i) {
                *b == b'-'
            } else {
                b.is_ascii_digit()
            }
        })
}
