pub mod stats;
pub mod tempo;

pub use stats::{instrument_note_counts, song_stats, SongStats};
pub use tempo::{
    duration_seconds, tempo_changer_instrument_ids, tempo_range, tempo_segments, TempoSegments,
    TEMPO_CHANGER_NAME,
};

/// Errors from statistics generation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("note references instrument {instrument} but only {loaded} are loaded")]
    UnknownInstrument { instrument: u16, loaded: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
