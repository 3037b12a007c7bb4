//! Note names on the command line: `A4`, `C#5`, `Fis3`

use anyhow::{Context, Result, bail};
use sonant_core::{Key, Octave, frequency_for};

const OCTAVES: [Octave; 9] = [
    Octave::Octave0,
    Octave::Octave1,
    Octave::Octave2,
    Octave::Octave3,
    Octave::Octave4,
    Octave::Octave5,
    Octave::Octave6,
    Octave::Octave7,
    Octave::Octave8,
];

fn parse_key(name: &str) -> Option<Key> {
    let key = match name.to_ascii_lowercase().as_str() {
        "c" => Key::C,
        "c#" | "cis" => Key::Cis,
        "d" => Key::D,
        "d#" | "dis" => Key::Dis,
        "e" => Key::E,
        "f" => Key::F,
        "f#" | "fis" => Key::Fis,
        "g" => Key::G,
        "g#" | "gis" => Key::Gis,
        "a" => Key::A,
        "a#" | "ais" => Key::Ais,
        "b" => Key::B,
        _ => return None,
    };
    Some(key)
}

/// Parse a note name into its frequency
pub fn parse_note(text: &str) -> Result<f64> {
    let split = text
        .find(|c: char| c.is_ascii_digit())
        .with_context(|| format!("note '{}' has no octave", text))?;
    let (name, octave) = text.split_at(split);

    let Some(key) = parse_key(name) else {
        bail!("unknown key '{}' in note '{}'", name, text);
    };
    let octave: usize = octave
        .parse()
        .with_context(|| format!("bad octave in note '{}'", text))?;
    let Some(&octave) = OCTAVES.get(octave) else {
        bail!("octave {} out of range 0-8", octave);
    };

    Ok(frequency_for(key, octave))
}
