//! Wheel-notation musical keys (`8A`, `12B`, ...).
//!
//! Every key accepted by the index is normalized to a `WheelKey` at build time.
//! Open Key codes (`1m`, `6d`) and musical names (`Am`, `F#min`, `Db major`)
//! are converted; anything else is treated as a missing key by the caller.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Minor keys sit on the inner `A` ring, major keys on the outer `B` ring.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    A,
    B,
}

impl Mode {
    fn opposite(self) -> Self {
        match self {
            Mode::A => Mode::B,
            Mode::B => Mode::A,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WheelKey {
    number: u8,
    mode: Mode,
}

impl WheelKey {
    /// `number` must be in `1..=12`.
    pub fn new(number: u8, mode: Mode) -> Option<Self> {
        (1..=12).contains(&number).then_some(Self { number, mode })
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Same ring one step around the wheel (12 wraps to 1), or the same number
    /// on the other ring. A key is not adjacent to itself.
    pub fn is_adjacent(&self, other: &WheelKey) -> bool {
        if self.mode == other.mode {
            let diff = (i16::from(self.number) - i16::from(other.number)).rem_euclid(12);
            diff == 1 || diff == 11
        } else {
            self.number == other.number
        }
    }

    /// The relative major/minor of this key.
    pub fn relative(&self) -> WheelKey {
        WheelKey {
            number: self.number,
            mode: self.mode.opposite(),
        }
    }

    /// Parse any supported notation.
    pub fn parse(text: &str) -> Option<Self> {
        let t = text.trim();
        if t.is_empty() {
            return None;
        }
        parse_wheel(t)
            .or_else(|| parse_open_key(t))
            .or_else(|| parse_musical(t))
    }
}

impl fmt::Display for WheelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = match self.mode {
            Mode::A => 'A',
            Mode::B => 'B',
        };
        write!(f, "{}{}", self.number, ring)
    }
}

impl FromStr for WheelKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WheelKey::parse(s).ok_or_else(|| format!("unrecognized key {s:?}"))
    }
}

impl TryFrom<String> for WheelKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WheelKey> for String {
    fn from(k: WheelKey) -> Self {
        k.to_string()
    }
}

fn split_number(t: &str) -> Option<(u8, &str)> {
    let digits = t.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 2 {
        return None;
    }
    let n: u8 = t[..digits].parse().ok()?;
    Some((n, t[digits..].trim()))
}

fn parse_wheel(t: &str) -> Option<WheelKey> {
    let (n, rest) = split_number(t)?;
    let mode = match rest {
        "A" | "a" => Mode::A,
        "B" | "b" => Mode::B,
        _ => return None,
    };
    WheelKey::new(n, mode)
}

fn parse_open_key(t: &str) -> Option<WheelKey> {
    let (n, rest) = split_number(t)?;
    let mode = match rest {
        "m" | "M" => Mode::A,
        "d" | "D" => Mode::B,
        _ => return None,
    };
    if !(1..=12).contains(&n) {
        return None;
    }
    // 1m (A minor) is 8A; both wheels advance by fifths.
    WheelKey::new((n + 6) % 12 + 1, mode)
}

fn parse_musical(t: &str) -> Option<WheelKey> {
    let mut chars = t.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let mut pc: i16 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest: &str = chars.as_str();
    let rest = if let Some(r) = rest.strip_prefix(['#', '♯']) {
        pc += 1;
        r
    } else if let Some(r) = rest.strip_prefix(['b', '♭']) {
        // "Bb", "Ebm": a lowercase b right after the letter is a flat.
        pc -= 1;
        r
    } else {
        rest
    };

    let suffix = rest.trim().to_ascii_lowercase();
    let mode = match suffix.as_str() {
        "" | "maj" | "major" | "dur" => Mode::B,
        "m" | "min" | "minor" | "moll" => Mode::A,
        _ => return None,
    };

    let pc = pc.rem_euclid(12);
    // Steps of a fifth move one position around the wheel; C major is 8B and A minor 8A.
    let offset = match mode {
        Mode::A => 4,
        Mode::B => 7,
    };
    let number = ((pc * 7 + offset) % 12) + 1;
    WheelKey::new(number as u8, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: &str) -> WheelKey {
        WheelKey::parse(s).unwrap()
    }

    #[test]
    fn parses_wheel_codes_case_insensitively() {
        assert_eq!(k("8A"), WheelKey::new(8, Mode::A).unwrap());
        assert_eq!(k("12b"), WheelKey::new(12, Mode::B).unwrap());
        assert_eq!(k(" 01A "), WheelKey::new(1, Mode::A).unwrap());
        assert!(WheelKey::parse("13A").is_none());
        assert!(WheelKey::parse("0B").is_none());
        assert!(WheelKey::parse("8C").is_none());
        assert!(WheelKey::parse("").is_none());
    }

    #[test]
    fn converts_open_key_codes() {
        assert_eq!(k("1m").to_string(), "8A");
        assert_eq!(k("1d").to_string(), "8B");
        assert_eq!(k("6m").to_string(), "1A");
        assert_eq!(k("12d").to_string(), "7B");
    }

    #[test]
    fn converts_musical_names() {
        assert_eq!(k("Am").to_string(), "8A");
        assert_eq!(k("C").to_string(), "8B");
        assert_eq!(k("Em").to_string(), "9A");
        assert_eq!(k("G major").to_string(), "9B");
        assert_eq!(k("F#m").to_string(), "11A");
        assert_eq!(k("Bb").to_string(), "6B");
        assert_eq!(k("Ebm").to_string(), "2A");
        assert_eq!(k("B").to_string(), "1B");
        assert_eq!(k("Db major").to_string(), "3B");
        assert_eq!(k("C# minor").to_string(), "12A");
        assert!(WheelKey::parse("H").is_none());
        assert!(WheelKey::parse("Am7").is_none());
    }

    #[test]
    fn adjacency_wraps_and_crosses_rings() {
        assert!(k("8A").is_adjacent(&k("9A")));
        assert!(k("8A").is_adjacent(&k("7A")));
        assert!(k("12A").is_adjacent(&k("1A")));
        assert!(k("8A").is_adjacent(&k("8B")));
        assert!(!k("8A").is_adjacent(&k("8A")));
        assert!(!k("8A").is_adjacent(&k("9B")));
        assert!(!k("8A").is_adjacent(&k("10A")));
        assert_eq!(k("3B").relative(), k("3A"));
    }

    #[test]
    fn serializes_as_wheel_code_string() {
        let json = serde_json::to_string(&k("Am")).unwrap();
        assert_eq!(json, "\"8A\"");
        let back: WheelKey = serde_json::from_str("\"1m\"").unwrap();
        assert_eq!(back, k("8A"));
    }
}
