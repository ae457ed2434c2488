//! # Key Table Module
//!
//! The instrument has 15 keys spanning C4 to D#5 in equal temperament
//! (A4 = 440 Hz). White keys are numbered 1 to 8 from C4 upwards, black keys
//! 9 to 15 from C#4 upwards. The table is computed once and never changes.
//!
//! ## Features
//! - Key number to frequency and note name
//! - Note name to key lookups
//! - Cent deviation calculations

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Number of keys on the instrument.
pub const KEY_COUNT: u8 = 15;

/// Number of white keys; they take the numbers `1..=WHITE_KEY_COUNT`.
pub const WHITE_KEY_COUNT: u8 = 8;

/// One entry of the static key table.
#[derive(Debug, Clone)]
pub struct KeySpec {
    /// Note name (e.g. "C4", "F#4")
    pub name: &'static str,
    /// Frequency in Hz
    pub frequency: f32,
}

/// Note names and semitone distances from A4, in key order.
const LAYOUT: [(&str, i32); KEY_COUNT as usize] = [
    ("C4", -9),
    ("D4", -7),
    ("E4", -5),
    ("F4", -4),
    ("G4", -2),
    ("A4", 0),
    ("B4", 2),
    ("C5", 3),
    ("C#4", -8),
    ("D#4", -6),
    ("F#4", -3),
    ("G#4", -1),
    ("A#4", 1),
    ("C#5", 4),
    ("D#5", 6),
];

/// Statically computed table for all 15 keys, indexed by `key - 1`.
static KEYS: Lazy<Vec<KeySpec>> = Lazy::new(|| {
    LAYOUT
        .iter()
        .map(|&(name, semitones)| KeySpec {
            name,
            // f = f0 * 2^(n/12) with f0 = A4
            frequency: 440.0 * 2.0_f32.powf(semitones as f32 / 12.0),
        })
        .collect()
});

/// Key frequencies in the same order, for the nearest-key search.
static FREQUENCIES: Lazy<Vec<f32>> = Lazy::new(|| KEYS.iter().map(|spec| spec.frequency).collect());

/// Note name to key number.
static KEY_MAP: Lazy<BTreeMap<&'static str, u8>> = Lazy::new(|| {
    LAYOUT
        .iter()
        .enumerate()
        .map(|(i, &(name, _))| (name, i as u8 + 1))
        .collect()
});

/// A key of the instrument, always within `1..=15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(u8);

impl Key {
    /// Returns `None` outside `1..=15`.
    pub fn new(number: u8) -> Option<Self> {
        (1..=KEY_COUNT).contains(&number).then_some(Self(number))
    }

    /// Looks a key up by note name, accepting flats for the black keys.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Some(&number) = KEY_MAP.get(name) {
            return Some(Self(number));
        }
        enharmonic_sharp(name).and_then(|sharp| KEY_MAP.get(sharp.as_str()).map(|&n| Self(n)))
    }

    /// All keys in ascending key-number order.
    pub fn all() -> impl Iterator<Item = Key> {
        (1..=KEY_COUNT).map(Key)
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn frequency(self) -> f32 {
        KEYS[self.index()].frequency
    }

    pub fn name(self) -> &'static str {
        KEYS[self.index()].name
    }

    pub fn is_black(self) -> bool {
        self.0 > WHITE_KEY_COUNT
    }

    fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

/// Keys are written either as their number or as a note name.
impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => u8::try_from(n)
                .ok()
                .and_then(Key::new)
                .ok_or_else(|| serde::de::Error::custom(format!("key {n} is outside 1-{KEY_COUNT}"))),
            Repr::Name(name) => Key::from_name(&name)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown key name `{name}`"))),
        }
    }
}

/// "Db4" -> "C#4". Only flats that land on one of our black keys matter.
fn enharmonic_sharp(name: &str) -> Option<String> {
    let mut chars = name.chars();
    let letter = chars.next()?;
    if chars.next()? != 'b' {
        return None;
    }
    let octave = chars.as_str();
    let sharp = match letter {
        'D' => "C#",
        'E' => "D#",
        'G' => "F#",
        'A' => "G#",
        'B' => "A#",
        _ => return None,
    };
    Some(format!("{sharp}{octave}"))
}

/// Finds the key whose frequency is closest to `freq`, ties going to the
/// lower key number.
///
/// # Returns
/// * `(key, distance_hz)` - Closest key and the absolute distance to it
pub fn find_nearest_key(freq: f32) -> (Key, f32) {
    let (index, distance) = find_nearest_in(&FREQUENCIES, freq);
    (Key(index as u8 + 1), distance)
}

/// Index of the entry of `frequencies` closest to `freq` and the distance to
/// it. Equal distances keep the lower index. `frequencies` must not be empty.
pub fn find_nearest_in(frequencies: &[f32], freq: f32) -> (usize, f32) {
    let mut best = (0, (frequencies[0] - freq).abs());
    for (index, &candidate) in frequencies.iter().enumerate().skip(1) {
        let distance = (candidate - freq).abs();
        if distance < best.1 {
            best = (index, distance);
        }
    }
    best
}

/// Calculates the deviation from a target frequency in cents.
///
/// # Returns
/// * Cent deviation (positive = sharp, negative = flat)
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
