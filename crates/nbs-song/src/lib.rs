pub mod quadtree;
pub mod song;

pub use quadtree::{NoteQuadTree, PlacedNote, QuadTree, Rect};
pub use song::{Instrument, InstrumentBank, Layer, Loop, Note, Song};
