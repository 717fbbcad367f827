use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single note block placed at one (tick, layer) cell of a song.
///
/// `key` is a piano-key index (nominally 0–87), `pitch` a cents-like detune
/// offset where only `pitch % 100 != 0` means a microtonal note. Tempo-changer
/// notes repurpose `pitch` to encode a tempo value instead of a detune.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub key: i16,
    pub instrument: u16,
    /// Loudness 0–100
    pub velocity: u8,
    /// Stereo bias -100..100
    pub panning: i16,
    /// Detune offset in cents, intended range -1200..1200
    pub pitch: i16,
}

/// One horizontal row of the song grid with a sparse tick → note mapping.
///
/// `BTreeMap` keeps note iteration in ascending tick order, which the
/// analysis passes rely on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    /// Layer-level gain 0–100
    pub volume: u8,
    /// Stereo bias -100..100
    pub panning: i16,
    pub locked: bool,
    pub notes: BTreeMap<u32, Note>,
}

impl Layer {
    pub fn new() -> Self {
        Self {
            volume: 100,
            ..Self::default()
        }
    }
}

/// An entry in the song's instrument catalog.
///
/// The catalog is split into a contiguous vanilla range
/// `[0, first_custom_index)` and a custom range above it. Instruments named
/// `"Tempo Changer"` are control instruments by metadata convention; their
/// notes are inaudible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    /// Base pitch the instrument's sample is tuned to; F#4 = 45
    pub key: i16,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstrumentBank {
    /// Index-aligned catalog of every loaded instrument
    pub loaded: Vec<Instrument>,
    /// First index of the custom range; everything below is vanilla
    pub first_custom_index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Loop {
    pub enabled: bool,
    pub start_tick: u32,
}

/// A fully decoded, immutable song snapshot.
///
/// Produced by an external NBS codec; the analysis code in this workspace
/// treats it as trusted, already-validated input and never mutates it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Song {
    /// Declared tempo in ticks per second
    pub tempo: f64,
    pub time_signature: u8,
    /// Declared total tick count; may exceed the last tick that holds a note
    pub length: u32,
    pub loop_settings: Loop,
    pub instruments: InstrumentBank,
    pub layers: Vec<Layer>,
    /// Cumulative editing time recorded by the song format
    pub minutes_spent: u32,
    /// Source filename when the song was imported from MIDI
    pub import_name: Option<String>,
}

impl Song {
    /// Total layer count, including layers that hold no notes.
    pub fn total_layers(&self) -> u32 {
        self.layers.len() as u32
    }
}
