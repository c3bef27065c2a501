//! International Morse tables
//!
//! A character is stored as `(length, code)`: one bit per sign, dash = 1,
//! first sign in the most significant position of the used bits. This is the
//! same layout the decoder accumulates, so both directions share one table.

use crate::types::Element;

/// Longest pattern carried by the lookup table
pub const MAX_TABLE_LEN: u8 = 6;
/// Length of the error/erase symbol (eight dits)
pub const ERASE_LEN: u8 = 8;
/// Character shown and keyed for the error/erase symbol
pub const ERASE_CHAR: char = '#';
/// Marker appended for a code that is not in the table
pub const UNKNOWN_CHAR: char = '*';
/// Character keyed in place of one without a Morse mapping
pub const PLACEHOLDER_CHAR: char = '?';

/// A Morse pattern in accumulator layout
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MorseCode {
    /// Sign bits, dash = 1, first sign highest
    pub code: u8,
    /// Number of signs
    pub len: u8,
}

impl MorseCode {
    /// The error/erase symbol
    pub const ERASE: MorseCode = MorseCode {
        code: 0,
        len: ERASE_LEN,
    };

    /// Parse a `.`/`-` pattern at compile time
    pub const fn from_pattern(pattern: &str) -> Self {
        let bytes = pattern.as_bytes();
        let mut code = 0u8;
        let mut i = 0;
        while i < bytes.len() {
            code <<= 1;
            if bytes[i] == b'-' {
                code |= 1;
            }
            i += 1;
        }
        Self {
            code,
            len: bytes.len() as u8,
        }
    }

    /// Sign at position `index` (0 = first sent)
    pub const fn element(&self, index: u8) -> Option<Element> {
        if index >= self.len {
            return None;
        }
        let shift = self.len - 1 - index;
        if (self.code >> shift) & 1 == 1 {
            Some(Element::Dash)
        } else {
            Some(Element::Dit)
        }
    }
}

/// Result of looking up an accumulated code
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Symbol {
    /// Nothing accumulated
    Empty,
    /// Table hit
    Char(char),
    /// Eight dits
    Erase,
    /// Length/code combination not in the table
    Unknown,
}

impl Symbol {
    /// Character appended to the decoded text, if any
    pub const fn as_char(&self) -> Option<char> {
        match self {
            Symbol::Empty => None,
            Symbol::Char(c) => Some(*c),
            Symbol::Erase => Some(ERASE_CHAR),
            Symbol::Unknown => Some(UNKNOWN_CHAR),
        }
    }
}

macro_rules! morse_table {
    ($(($c:expr, $p:expr)),* $(,)?) => {
        [$(($c, MorseCode::from_pattern($p))),*]
    };
}

static TABLE: [(char, MorseCode); 54] = morse_table![
    ('A', ".-"),
    ('B', "-..."),
    ('C', "-.-."),
    ('D', "-.."),
    ('E', "."),
    ('F', "..-."),
    ('G', "--."),
    ('H', "...."),
    ('I', ".."),
    ('J', ".---"),
    ('K', "-.-"),
    ('L', ".-.."),
    ('M', "--"),
    ('N', "-."),
    ('O', "---"),
    ('P', ".--."),
    ('Q', "--.-"),
    ('R', ".-."),
    ('S', "..."),
    ('T', "-"),
    ('U', "..-"),
    ('V', "...-"),
    ('W', ".--"),
    ('X', "-..-"),
    ('Y', "-.--"),
    ('Z', "--.."),
    ('0', "-----"),
    ('1', ".----"),
    ('2', "..---"),
    ('3', "...--"),
    ('4', "....-"),
    ('5', "....."),
    ('6', "-...."),
    ('7', "--..."),
    ('8', "---.."),
    ('9', "----."),
    ('.', ".-.-.-"),
    (',', "--..--"),
    ('?', "..--.."),
    ('\'', ".----."),
    ('!', "-.-.--"),
    ('/', "-..-."),
    ('(', "-.--."),
    (')', "-.--.-"),
    ('&', ".-..."),
    (':', "---..."),
    (';', "-.-.-."),
    ('=', "-...-"),
    ('+', ".-.-."),
    ('-', "-....-"),
    ('_', "..--.-"),
    ('"', ".-..-."),
    ('@', ".--.-."),
    // Keyed as the error/erase symbol
    (ERASE_CHAR, "........"),
];

/// Pattern for a character, case-insensitive
pub fn encode(c: char) -> Option<MorseCode> {
    let upper = c.to_ascii_uppercase();
    TABLE
        .iter()
        .find(|(ch, _)| *ch == upper)
        .map(|(_, code)| *code)
}

/// Character for an accumulated `(length, code)`
pub fn decode(len: u8, code: u8) -> Symbol {
    match len {
        0 => Symbol::Empty,
        1..=MAX_TABLE_LEN => TABLE
            .iter()
            .find(|(_, m)| m.len == len && m.code == code)
            .map_or(Symbol::Unknown, |(ch, _)| Symbol::Char(*ch)),
        ERASE_LEN if code == 0 => Symbol::Erase,
        _ => Symbol::Unknown,
    }
}
