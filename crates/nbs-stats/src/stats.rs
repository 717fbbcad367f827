use serde::{Deserialize, Serialize};
use tracing::debug;

use nbs_song::Song;

use crate::tempo::{duration_seconds, tempo_changer_instrument_ids, tempo_range, tempo_segments};
use crate::{Error, Result};

/// Reference base key all vanilla note block samples are tuned to: F#4.
const BASE_INSTRUMENT_KEY: f64 = 45.0;
/// Semitone radius of Minecraft's playable window (two octaves total).
const PLAYABLE_RADIUS_SEMITONES: f64 = 12.0;

/// Derived statistics for one song, computed in a single pass over its notes
/// (plus a secondary pass for tempo-changer resolution).
///
/// This record is persisted alongside the song's metadata and surfaced
/// through the public API; the serialized camelCase field names are a
/// downstream contract and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongStats {
    /// Source filename when imported from MIDI, empty otherwise
    pub midi_file_name: String,
    pub note_count: u32,
    /// One past the last tick holding a note; 0 for a song with no notes
    pub tick_count: u32,
    /// One past the last layer holding a note; trailing note-less layers
    /// do not count even when they carry other metadata
    pub layer_count: u32,
    /// Declared tempo, always the static metadata field even when the song
    /// has tempo changers
    pub tempo: f64,
    /// `[min, max]` over the tempo curve, `None` without tempo changes
    pub tempo_range: Option<[f64; 2]>,
    pub time_signature: u8,
    /// Playback length in seconds, integrated over the tempo curve
    pub duration: f64,
    #[serde(rename = "loop")]
    pub loop_enabled: bool,
    pub loop_start_tick: u32,
    pub minutes_spent: u32,
    /// Vanilla instruments that sound at least one note
    pub vanilla_instrument_count: u32,
    /// Custom instruments (tempo changers excluded) that sound at least
    /// one note
    pub custom_instrument_count: u32,
    pub first_custom_instrument_index: u16,
    /// Per-instrument note totals, index-aligned with the loaded catalog
    pub instrument_note_counts: Vec<u32>,
    pub custom_instrument_note_count: u32,
    pub out_of_range_note_count: u32,
    pub detuned_note_count: u32,
    /// Notes failing any of out-of-range / detuned / custom-instrument;
    /// a note failing several checks still counts once
    pub incompatible_note_count: u32,
    /// Whether vanilla note blocks can play the whole song
    pub compatible: bool,
}

/// Accumulator for the single counting pass.
#[derive(Debug, Default)]
struct NoteCounts {
    note_count: u32,
    max_tick: Option<u32>,
    max_layer: Option<u32>,
    out_of_range: u32,
    detuned: u32,
    custom_instrument: u32,
    incompatible: u32,
    per_instrument: Vec<u32>,
}

/// Compute the full statistics record for a decoded song.
///
/// Pure and idempotent; the only failure is a note whose instrument index
/// has no catalog entry.
pub fn song_stats(song: &Song) -> Result<SongStats> {
    let tempo_changers = tempo_changer_instrument_ids(song);
    let counts = count_notes(song, &tempo_changers)?;
    let segments = tempo_segments(song, &tempo_changers);

    // End-exclusive-to-inclusive conversion only applies when a maximum was
    // actually observed, so a note-less song reports 0, not 1.
    let tick_count = counts.max_tick.map_or(0, |t| t + 1);
    let layer_count = counts.max_layer.map_or(0, |l| l + 1);

    // A song with no notes has nothing to play.
    let duration = if counts.note_count == 0 {
        0.0
    } else {
        duration_seconds(&segments, song.length)
    };

    let (vanilla_instrument_count, custom_instrument_count) = used_instrument_counts(
        &counts.per_instrument,
        song.instruments.first_custom_index,
        &tempo_changers,
    );

    debug!(
        notes = counts.note_count,
        ticks = tick_count,
        layers = layer_count,
        tempo_segments = segments.len(),
        incompatible = counts.incompatible,
        "computed song stats"
    );

    Ok(SongStats {
        midi_file_name: song.import_name.clone().unwrap_or_default(),
        note_count: counts.note_count,
        tick_count,
        layer_count,
        tempo: song.tempo,
        tempo_range: tempo_range(&segments),
        time_signature: song.time_signature,
        duration,
        loop_enabled: song.loop_settings.enabled,
        loop_start_tick: song.loop_settings.start_tick,
        minutes_spent: song.minutes_spent,
        vanilla_instrument_count,
        custom_instrument_count,
        first_custom_instrument_index: song.instruments.first_custom_index,
        instrument_note_counts: counts.per_instrument,
        custom_instrument_note_count: counts.custom_instrument,
        out_of_range_note_count: counts.out_of_range,
        detuned_note_count: counts.detuned,
        incompatible_note_count: counts.incompatible,
        compatible: counts.incompatible == 0,
    })
}

fn count_notes(song: &Song, tempo_changers: &[u16]) -> Result<NoteCounts> {
    let mut counts = NoteCounts {
        per_instrument: vec![0; song.instruments.loaded.len()],
        ..NoteCounts::default()
    };
    let first_custom = song.instruments.first_custom_index;

    for (layer_id, layer) in song.layers.iter().enumerate() {
        for (&tick, note) in &layer.notes {
            let instrument = song
                .instruments
                .loaded
                .get(note.instrument as usize)
                .ok_or(Error::UnknownInstrument {
                    instrument: note.instrument,
                    loaded: song.instruments.loaded.len(),
                })?;

            counts.max_tick = Some(counts.max_tick.map_or(tick, |t| t.max(tick)));
            counts.max_layer = Some(
                counts
                    .max_layer
                    .map_or(layer_id as u32, |l| l.max(layer_id as u32)),
            );

            // True sounding pitch including the microtonal offset.
            let effective_pitch = f64::from(note.key) + f64::from(note.pitch) / 100.0;

            // An instrument tuned away from F#4 shifts the playable window
            // the opposite direction: the window is always one octave above
            // and below wherever the sample lands.
            let tuning_offset = f64::from(instrument.key) - BASE_INSTRUMENT_KEY;
            let min_playable = BASE_INSTRUMENT_KEY - tuning_offset - PLAYABLE_RADIUS_SEMITONES;
            let max_playable = BASE_INSTRUMENT_KEY - tuning_offset + PLAYABLE_RADIUS_SEMITONES;

            let out_of_range = effective_pitch < min_playable || effective_pitch > max_playable;
            let detuned = note.pitch % 100 != 0;
            let custom = note.instrument >= first_custom;

            // Tempo changers are control notes, not audible ones; they never
            // count against compatibility.
            if !tempo_changers.contains(&note.instrument) {
                if out_of_range {
                    counts.out_of_range += 1;
                }
                if detuned {
                    counts.detuned += 1;
                }
                if custom {
                    counts.custom_instrument += 1;
                }
                if out_of_range || detuned || custom {
                    counts.incompatible += 1;
                }
            }

            counts.per_instrument[note.instrument as usize] += 1;
            counts.note_count += 1;
        }
    }

    Ok(counts)
}

/// How many instruments on each side of the vanilla/custom boundary sound at
/// least one note. Tempo-changer indices never count as used custom
/// instruments.
fn used_instrument_counts(
    per_instrument: &[u32],
    first_custom_index: u16,
    tempo_changers: &[u16],
) -> (u32, u32) {
    let first_custom = first_custom_index as usize;

    let vanilla = per_instrument
        .iter()
        .take(first_custom)
        .filter(|&&n| n > 0)
        .count() as u32;

    let custom = per_instrument
        .iter()
        .enumerate()
        .skip(first_custom)
        .filter(|&(id, &n)| n > 0 && !tempo_changers.contains(&(id as u16)))
        .count() as u32;

    (vanilla, custom)
}

/// Per-instrument note totals, index-aligned with the loaded catalog.
///
/// Standalone variant of the counting pass for callers that only need the
/// instrument breakdown.
pub fn instrument_note_counts(song: &Song) -> Result<Vec<u32>> {
    let mut counts = vec![0u32; song.instruments.loaded.len()];

    for layer in &song.layers {
        for note in layer.notes.values() {
            let slot =
                counts
                    .get_mut(note.instrument as usize)
                    .ok_or(Error::UnknownInstrument {
                        instrument: note.instrument,
                        loaded: song.instruments.loaded.len(),
                    })?;
            *slot += 1;
        }
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tempo::TEMPO_CHANGER_NAME;
    use nbs_song::{Instrument, InstrumentBank, Layer, Loop, Note, Song};

    /// Catalog: harp and bass (vanilla), one custom sample, one tempo
    /// changer. Custom range starts at index 2.
    fn catalog() -> InstrumentBank {
        InstrumentBank {
            loaded: vec![
                Instrument {
                    name: "Harp".into(),
                    key: 45,
                },
                Instrument {
                    name: "Double Bass".into(),
                    key: 45,
                },
                Instrument {
                    name: "custom.ogg".into(),
                    key: 45,
                },
                Instrument {
                    name: TEMPO_CHANGER_NAME.into(),
                    key: 45,
                },
            ],
            first_custom_index: 2,
        }
    }

    fn base_song(layers: usize) -> Song {
        Song {
            tempo: 10.0,
            time_signature: 4,
            length: 16,
            instruments: catalog(),
            layers: (0..layers).map(|_| Layer::new()).collect(),
            ..Song::default()
        }
    }

    fn note(key: i16, instrument: u16, pitch: i16) -> Note {
        Note {
            key,
            instrument,
            velocity: 100,
            panning: 0,
            pitch,
        }
    }

    #[test]
    fn empty_song_yields_all_zero_record() {
        let stats = song_stats(&base_song(0)).unwrap();

        assert_eq!(stats.note_count, 0);
        assert_eq!(stats.tick_count, 0);
        assert_eq!(stats.layer_count, 0);
        assert_eq!(stats.duration, 0.0);
        assert_eq!(stats.tempo_range, None);
        assert_eq!(stats.out_of_range_note_count, 0);
        assert_eq!(stats.detuned_note_count, 0);
        assert_eq!(stats.custom_instrument_note_count, 0);
        assert_eq!(stats.incompatible_note_count, 0);
        assert_eq!(stats.vanilla_instrument_count, 0);
        assert_eq!(stats.custom_instrument_count, 0);
        assert_eq!(stats.instrument_note_counts, vec![0, 0, 0, 0]);
        assert!(stats.compatible);
    }

    #[test]
    fn stats_are_idempotent() {
        let mut song = base_song(2);
        song.layers[0].notes.insert(0, note(45, 0, 0));
        song.layers[1].notes.insert(3, note(80, 0, 50));

        assert_eq!(song_stats(&song).unwrap(), song_stats(&song).unwrap());
    }

    #[test]
    fn in_range_vanilla_note_is_compatible() {
        let mut song = base_song(1);
        song.layers[0].notes.insert(0, note(45, 0, 0));

        let stats = song_stats(&song).unwrap();
        assert_eq!(stats.note_count, 1);
        assert_eq!(stats.out_of_range_note_count, 0);
        assert_eq!(stats.detuned_note_count, 0);
        assert_eq!(stats.custom_instrument_note_count, 0);
        assert_eq!(stats.incompatible_note_count, 0);
        assert!(stats.compatible);
    }

    #[test]
    fn detuned_note_breaks_compatibility() {
        let mut song = base_song(1);
        song.layers[0].notes.insert(0, note(45, 0, 50));

        let stats = song_stats(&song).unwrap();
        assert_eq!(stats.detuned_note_count, 1);
        assert_eq!(stats.incompatible_note_count, 1);
        assert!(!stats.compatible);
    }

    #[test]
    fn full_semitone_pitch_offset_is_not_detune() {
        // pitch -100 is a whole semitone: it shifts the effective pitch but
        // is not microtonal.
        let mut song = base_song(1);
        song.layers[0].notes.insert(0, note(45, 0, -100));

        let stats = song_stats(&song).unwrap();
        assert_eq!(stats.detuned_note_count, 0);
        assert!(stats.compatible);
    }

    #[test]
    fn note_outside_two_octave_window_is_out_of_range() {
        // Base key 45 → playable window [33, 57].
        let mut song = base_song(1);
        song.layers[0].notes.insert(0, note(80, 0, 0));

        let stats = song_stats(&song).unwrap();
        assert_eq!(stats.out_of_range_note_count, 1);
        assert_eq!(stats.incompatible_note_count, 1);
        assert!(!stats.compatible);
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        let mut song = base_song(1);
        song.layers[0].notes.insert(0, note(33, 0, 0));
        song.layers[0].notes.insert(1, note(57, 0, 0));

        let stats = song_stats(&song).unwrap();
        assert_eq!(stats.out_of_range_note_count, 0);
        assert!(stats.compatible);
    }

    #[test]
    fn instrument_tuning_shifts_the_window_the_opposite_way() {
        // Sample tuned a semitone up (key 46) moves the window down to
        // [32, 56]: key 57 is now out, key 32 is now in.
        let mut song = base_song(1);
        song.instruments.loaded[0].key = 46;
        song.layers[0].notes.insert(0, note(57, 0, 0));
        song.layers[0].notes.insert(1, note(32, 0, 0));

        let stats = song_stats(&song).unwrap();
        assert_eq!(stats.out_of_range_note_count, 1);
    }

    #[test]
    fn detune_pushes_effective_pitch_out_of_range() {
        // Key 57 is the inclusive ceiling; +50 cents crosses it.
        let mut song = base_song(1);
        song.layers[0].notes.insert(0, note(57, 0, 50));

        let stats = song_stats(&song).unwrap();
        assert_eq!(stats.out_of_range_note_count, 1);
        assert_eq!(stats.detuned_note_count, 1);
        // Two conditions, one incompatible note.
        assert_eq!(stats.incompatible_note_count, 1);
    }

    #[test]
    fn custom_instrument_note_breaks_compatibility() {
        let mut song = base_song(1);
        song.layers[0].notes.insert(0, note(45, 2, 0));

        let stats = song_stats(&song).unwrap();
        assert_eq!(stats.custom_instrument_note_count, 1);
        assert_eq!(stats.custom_instrument_count, 1);
        assert_eq!(stats.incompatible_note_count, 1);
        assert!(!stats.compatible);
    }

    #[test]
    fn tempo_changer_notes_are_exempt_from_compatibility() {
        // Wildly out of range, detuned, and on a custom index, but a tempo
        // changer: exempt from every incompatibility count.
        let mut song = base_song(1);
        song.layers[0].notes.insert(0, note(90, 3, 155));

        let stats = song_stats(&song).unwrap();
        assert_eq!(stats.note_count, 1);
        assert_eq!(stats.instrument_note_counts, vec![0, 0, 0, 1]);
        assert_eq!(stats.out_of_range_note_count, 0);
        assert_eq!(stats.detuned_note_count, 0);
        assert_eq!(stats.custom_instrument_note_count, 0);
        assert_eq!(stats.incompatible_note_count, 0);
        assert_eq!(stats.custom_instrument_count, 0);
        assert!(stats.compatible);
    }

    #[test]
    fn tick_and_layer_counts_are_end_exclusive_maxima() {
        // Layer 2 is empty; the last note sits at tick 9 on layer 1.
        let mut song = base_song(3);
        song.layers[0].notes.insert(2, note(45, 0, 0));
        song.layers[1].notes.insert(9, note(45, 1, 0));

        let stats = song_stats(&song).unwrap();
        assert_eq!(stats.tick_count, 10);
        assert_eq!(stats.layer_count, 2);
    }

    #[test]
    fn used_instrument_counts_measure_sounded_not_loaded() {
        let mut song = base_song(1);
        song.layers[0].notes.insert(0, note(45, 0, 0));
        song.layers[0].notes.insert(1, note(45, 0, 0));

        let stats = song_stats(&song).unwrap();
        // Bass and the custom sample are loaded but never sound.
        assert_eq!(stats.vanilla_instrument_count, 1);
        assert_eq!(stats.custom_instrument_count, 0);
        assert_eq!(stats.instrument_note_counts, vec![2, 0, 0, 0]);
    }

    #[test]
    fn duration_follows_the_tempo_curve() {
        // Tempo changers at ticks 0/4/8 encode 10/12/14 t/s; length 12 puts
        // the closing boundary at tick 13.
        let mut song = base_song(2);
        song.length = 12;
        song.layers[1].notes.insert(0, note(0, 3, 150));
        song.layers[1].notes.insert(4, note(0, 3, 180));
        song.layers[1].notes.insert(8, note(0, 3, 210));
        song.layers[0].notes.insert(0, note(45, 0, 0));

        let stats = song_stats(&song).unwrap();
        assert_eq!(stats.tempo_range, Some([10.0, 14.0]));
        assert_eq!((stats.duration * 100.0).round() / 100.0, 1.09);
        // The declared tempo field is untouched by the curve.
        assert_eq!(stats.tempo, 10.0);
    }

    #[test]
    fn passthrough_fields_mirror_the_song() {
        let mut song = base_song(1);
        song.import_name = Some("megalovania.mid".into());
        song.loop_settings = Loop {
            enabled: true,
            start_tick: 8,
        };
        song.minutes_spent = 127;
        song.layers[0].notes.insert(0, note(45, 0, 0));

        let stats = song_stats(&song).unwrap();
        assert_eq!(stats.midi_file_name, "megalovania.mid");
        assert!(stats.loop_enabled);
        assert_eq!(stats.loop_start_tick, 8);
        assert_eq!(stats.minutes_spent, 127);
        assert_eq!(stats.time_signature, 4);
        assert_eq!(stats.first_custom_instrument_index, 2);
    }

    #[test]
    fn dangling_instrument_index_fails_fast() {
        let mut song = base_song(1);
        song.layers[0].notes.insert(0, note(45, 99, 0));

        let err = song_stats(&song).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownInstrument {
                instrument: 99,
                loaded: 4
            }
        ));
    }

    #[test]
    fn standalone_instrument_counts_match_the_stats_record() {
        let mut song = base_song(2);
        song.layers[0].notes.insert(0, note(45, 0, 0));
        song.layers[0].notes.insert(4, note(45, 2, 0));
        song.layers[1].notes.insert(0, note(45, 0, 0));

        let counts = instrument_note_counts(&song).unwrap();
        let stats = song_stats(&song).unwrap();
        assert_eq!(counts, vec![2, 0, 1, 0]);
        assert_eq!(counts, stats.instrument_note_counts);
    }

    #[test]
    fn serialized_shape_matches_the_persisted_contract() {
        let mut song = base_song(1);
        song.layers[0].notes.insert(0, note(45, 0, 0));

        let stats = song_stats(&song).unwrap();
        let value = serde_json::to_value(&stats).unwrap();
        let object = value.as_object().unwrap();

        for field in [
            "midiFileName",
            "noteCount",
            "tickCount",
            "layerCount",
            "tempo",
            "tempoRange",
            "timeSignature",
            "duration",
            "loop",
            "loopStartTick",
            "minutesSpent",
            "vanillaInstrumentCount",
            "customInstrumentCount",
            "firstCustomInstrumentIndex",
            "instrumentNoteCounts",
            "customInstrumentNoteCount",
            "outOfRangeNoteCount",
            "detunedNoteCount",
            "incompatibleNoteCount",
            "compatible",
        ] {
            assert!(object.contains_key(field), "missing field {field}");
        }

        // No tempo changes serializes as an explicit null.
        assert!(object["tempoRange"].is_null());

        let back: SongStats = serde_json::from_value(value).unwrap();
        assert_eq!(back, stats);
    }
}
