//! Pitch reference: A4 = 440 Hz, twelve-tone equal temperament

use serde::{Deserialize, Serialize};

pub const KEYS_PER_OCTAVE: i32 = 12;

/// Reference frequency in Hz
pub const BASE_FREQ: f64 = 440.0;

pub const BASE_KEY: Key = Key::A;

pub const BASE_OCTAVE: Octave = Octave::Octave4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    C,
    Cis,
    D,
    Dis,
    E,
    F,
    Fis,
    G,
    Gis,
    A,
    Ais,
    B,
}

impl Key {
    #[inline]
    pub fn index(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Octave {
    Octave0,
    Octave1,
    Octave2,
    Octave3,
    Octave4,
    Octave5,
    Octave6,
    Octave7,
    Octave8,
}

impl Default for Octave {
    fn default() -> Self {
        BASE_OCTAVE
    }
}

impl Octave {
    #[inline]
    pub fn index(self) -> i32 {
        self as i32
    }
}

/// Semitone distance of `key`/`octave` from the reference pitch
#[inline]
pub fn semitones_from_base(key: Key, octave: Octave) -> i32 {
    (octave.index() - BASE_OCTAVE.index()) * KEYS_PER_OCTAVE + key.index() - BASE_KEY.index()
}

/// Equal-tempered frequency of a note
pub fn frequency_for(key: Key, octave: Octave) -> f64 {
    BASE_FREQ * 2.0_f64.powf(semitones_from_base(key, octave) as f64 / KEYS_PER_OCTAVE as f64)
}
