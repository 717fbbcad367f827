//! Tempo curve reconstruction from tempo-changer notes.
//!
//! NBS has no native tempo-change event; editors encode one as a note on a
//! control instrument named "Tempo Changer", with the note's pitch field
//! repurposed to carry the tempo. The curve is piecewise constant: each
//! segment runs from its tick to the next change.

use std::collections::BTreeMap;

use nbs_song::Song;

/// Instrument name marking a tempo-control instrument. This is a metadata
/// convention of the song format, not a type tag on the instrument itself.
pub const TEMPO_CHANGER_NAME: &str = "Tempo Changer";

/// A tempo changer's pitch stores BPM, and BPM = ticks-per-second * 15.
const PITCH_TO_TEMPO_DIVISOR: f64 = 15.0;

/// Sparse tick → tempo (ticks per second) map; keys iterate ascending.
pub type TempoSegments = BTreeMap<u32, f64>;

/// Catalog indices of every instrument named [`TEMPO_CHANGER_NAME`].
///
/// Must be resolved before any counting pass: tempo-changer notes are
/// exempt from compatibility checks but still carry data in `pitch`.
pub fn tempo_changer_instrument_ids(song: &Song) -> Vec<u16> {
    song.instruments
        .loaded
        .iter()
        .enumerate()
        .filter(|(_, instrument)| instrument.name == TEMPO_CHANGER_NAME)
        .map(|(id, _)| id as u16)
        .collect()
}

/// Reconstruct the tempo curve from the song's tempo-changer notes.
///
/// Layers are scanned bottom to top with first-write-wins per tick, so when
/// several tempo changers share a tick the bottom-most layer's value is the
/// effective one. Tick 0 falls back to the song's declared tempo when no
/// changer sets it, so the map always has at least one entry.
pub fn tempo_segments(song: &Song, tempo_changers: &[u16]) -> TempoSegments {
    let mut segments = TempoSegments::new();

    if !tempo_changers.is_empty() {
        for layer in song.layers.iter().rev() {
            for (&tick, note) in &layer.notes {
                if !tempo_changers.contains(&note.instrument) {
                    continue;
                }

                segments
                    .entry(tick)
                    .or_insert_with(|| f64::from(note.pitch).abs() / PITCH_TO_TEMPO_DIVISOR);
            }
        }
    }

    segments.entry(0).or_insert(song.tempo);

    segments
}

/// `None` when the curve has a single segment (no tempo changes), otherwise
/// `[min, max]` over every segment's tempo.
pub fn tempo_range(segments: &TempoSegments) -> Option<[f64; 2]> {
    if segments.len() == 1 {
        return None;
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &tempo in segments.values() {
        min = min.min(tempo);
        max = max.max(tempo);
    }

    Some([min, max])
}

/// Integrate seconds-per-tick over the tempo curve.
///
/// Each segment contributes its tick span divided by its tempo.
/// `song_length + 1` closes the final segment unless a change already sits
/// on that tick.
pub fn duration_seconds(segments: &TempoSegments, song_length: u32) -> f64 {
    let mut ticks: Vec<u32> = segments.keys().copied().collect();

    let last_tick = song_length + 1;
    if !segments.contains_key(&last_tick) {
        ticks.push(last_tick);
        ticks.sort_unstable();
    }

    let mut duration = 0.0;
    for pair in ticks.windows(2) {
        let (curr, next) = (pair[0], pair[1]);
        if let Some(&tempo) = segments.get(&curr) {
            duration += f64::from(next - curr) / tempo;
        }
    }

    duration
}
