use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::song::Song;

/// Items per node before it subdivides.
const NODE_CAPACITY: usize = 10;
/// Maximum subdivision depth; deeper nodes fall back to linear scans.
const MAX_DEPTH: usize = 4;

/// Axis-aligned rectangle in (tick, layer) space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn right(&self) -> f32 {
        self.x + self.width
    }

    fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Closed-edge overlap test: touching edges count as contact, so a
    /// zero-width query still reaches the cells sitting on it.
    fn touches(&self, other: &Rect) -> bool {
        self.x <= other.right()
            && self.right() >= other.x
            && self.y <= other.bottom()
            && self.bottom() >= other.y
    }

    /// Whether `other` lies fully inside this rectangle (edges inclusive).
    fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.right() <= self.right()
            && other.y >= self.y
            && other.bottom() <= self.bottom()
    }

    /// The four equal quadrants of this rectangle: NW, NE, SW, SE.
    fn quarters(&self) -> [Rect; 4] {
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        [
            Rect::new(self.x, self.y, hw, hh),
            Rect::new(self.x + hw, self.y, hw, hh),
            Rect::new(self.x, self.y + hh, hw, hh),
            Rect::new(self.x + hw, self.y + hh, hw, hh),
        ]
    }
}

/// Point-region quadtree over rectangle-keyed items.
///
/// Items live on the deepest node whose bounds fully contain them; items
/// that fit no child (seam-spanning or outside the declared bounds) stay on
/// the node they reached, so nothing is ever dropped or duplicated.
/// `retrieve` over-approximates by quadrant — callers apply their own exact
/// filter.
#[derive(Debug, Clone)]
pub struct QuadTree<T> {
    bounds: Rect,
    level: usize,
    items: Vec<(Rect, T)>,
    children: Option<Box<[QuadTree<T>; 4]>>,
}

impl<T> QuadTree<T> {
    pub fn new(width: f32, height: f32) -> Self {
        Self::node(Rect::new(0.0, 0.0, width, height), 0)
    }

    fn node(bounds: Rect, level: usize) -> Self {
        Self {
            bounds,
            level,
            items: Vec::new(),
            children: None,
        }
    }

    pub fn bounds(&self) -> &Rect {
        &self.bounds
    }

    /// Total number of items in this node and all descendants.
    pub fn len(&self) -> usize {
        let below: usize = self
            .children
            .iter()
            .flat_map(|c| c.iter())
            .map(QuadTree::len)
            .sum();
        self.items.len() + below
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&mut self, rect: Rect, item: T) {
        if let Some(children) = &mut self.children {
            match children.iter_mut().find(|c| c.bounds.contains(&rect)) {
                Some(child) => child.insert(rect, item),
                None => self.items.push((rect, item)),
            }
            return;
        }

        self.items.push((rect, item));

        if self.items.len() > NODE_CAPACITY && self.level < MAX_DEPTH {
            self.subdivide();
        }
    }

    /// Split into four children and push down every item a child fully
    /// contains; the rest stay here.
    fn subdivide(&mut self) {
        let next = self.level + 1;
        let mut children = Box::new(self.bounds.quarters().map(|q| Self::node(q, next)));

        let mut kept = Vec::new();
        for (rect, item) in self.items.drain(..) {
            match children.iter_mut().find(|c| c.bounds.contains(&rect)) {
                Some(child) => child.insert(rect, item),
                None => kept.push((rect, item)),
            }
        }

        self.items = kept;
        self.children = Some(children);
    }

    /// Candidate items for `range`: every stored item whose rectangle touches
    /// it, walking only the quadrants the range reaches. May include items
    /// adjacent to the range; never misses one that overlaps it.
    pub fn retrieve(&self, range: &Rect) -> Vec<&T> {
        let mut out = Vec::new();
        self.retrieve_into(range, &mut out);
        out
    }

    fn retrieve_into<'a>(&'a self, range: &Rect, out: &mut Vec<&'a T>) {
        for (rect, item) in &self.items {
            if rect.touches(range) {
                out.push(item);
            }
        }

        if let Some(children) = &self.children {
            for child in children.iter() {
                if child.bounds.touches(range) {
                    child.retrieve_into(range, out);
                }
            }
        }
    }
}

/// A note denormalized with its grid position, so query results are
/// self-describing for rendering consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacedNote {
    pub tick: u32,
    pub layer: u32,
    pub key: i16,
    pub instrument: u16,
    pub velocity: u8,
    pub panning: i16,
    pub pitch: i16,
}

/// Spatial index over a song's full note set, keyed by (tick, layer).
///
/// Built once from an immutable song snapshot and queried by a rendering
/// viewport that only ever sees a small window of the grid. Construction
/// never fails; a song with zero notes yields an empty, queryable tree.
pub struct NoteQuadTree {
    tree: QuadTree<PlacedNote>,
    /// Highest tick holding a note; 0 when the song has none. Can be smaller
    /// than the song's declared length.
    pub width: u32,
    /// Highest layer index holding a note; 0 when the song has none.
    pub height: u32,
}

impl NoteQuadTree {
    pub fn new(song: &Song) -> Self {
        let mut tree = QuadTree::new(song.length as f32, song.total_layers() as f32);
        let mut width = 0;
        let mut height = 0;

        for (layer_id, layer) in song.layers.iter().enumerate() {
            for (&tick, note) in &layer.notes {
                let placed = PlacedNote {
                    tick,
                    layer: layer_id as u32,
                    key: note.key,
                    instrument: note.instrument,
                    velocity: note.velocity,
                    panning: note.panning,
                    pitch: note.pitch,
                };

                tree.insert(Rect::new(tick as f32, layer_id as f32, 1.0, 1.0), placed);

                width = width.max(tick);
                height = height.max(layer_id as u32);
            }
        }

        debug!(notes = tree.len(), width, height, "built note quadtree");

        Self {
            tree,
            width,
            height,
        }
    }

    /// All notes with `x1 <= tick <= x2` and `y1 <= layer <= y2`.
    ///
    /// The spatial lookup runs against the min/max-normalized rectangle, but
    /// the exact filter uses the raw inputs as inclusive bounds. Callers are
    /// expected to pass `x1 <= x2` and `y1 <= y2`; reversed corners make the
    /// raw filter reject everything and yield an empty result rather than a
    /// silently corrected range. No ordering is guaranteed on the result.
    pub fn notes_in_rect(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<PlacedNote> {
        let query = Rect::new(x1.min(x2), y1.min(y2), (x2 - x1).abs(), (y2 - y1).abs());

        self.tree
            .retrieve(&query)
            .into_iter()
            .filter(|n| {
                let tick = n.tick as f32;
                let layer = n.layer as f32;
                tick >= x1 && tick <= x2 && layer >= y1 && layer <= y2
            })
            .copied()
            .collect()
    }

    /// Number of notes in the index.
    pub fn note_count(&self) -> usize {
        self.tree.len()
    }
}
