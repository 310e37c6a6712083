//! Neighborhoods and offset tables for raster analysis

use std::collections::HashMap;
use std::f64::consts::{PI, SQRT_2};

/// Cell adjacency used by region growing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Rook adjacency: N, E, S, W
    Four,
    /// Queen adjacency: all eight surrounding cells
    #[default]
    Eight,
}

const FOUR: [(isize, isize, f64); 4] = [(-1, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0), (0, -1, 1.0)];

const EIGHT: [(isize, isize, f64); 8] = [
    (-1, 1, SQRT_2),
    (0, 1, 1.0),
    (1, 1, SQRT_2),
    (1, 0, 1.0),
    (1, -1, SQRT_2),
    (0, -1, 1.0),
    (-1, -1, SQRT_2),
    (-1, 0, 1.0),
];

impl Connectivity {
    /// `(d_row, d_col, step_weight)` for every neighbour. Axis steps weigh
    /// 1, diagonal steps √2.
    pub fn neighbors(self) -> &'static [(isize, isize, f64)] {
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }

    pub fn from_diagonal(diagonal: bool) -> Self {
        if diagonal {
            Connectivity::Eight
        } else {
            Connectivity::Four
        }
    }
}

/// Square or circular window around a cell, for focal filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighborhood {
    /// Square window of the given radius
    Square(usize),
    /// Circular window of the given radius (in cells)
    Circle(usize),
}

impl Neighborhood {
    pub fn radius(&self) -> usize {
        match self {
            Neighborhood::Square(r) | Neighborhood::Circle(r) => *r,
        }
    }

    /// Width and height of the window
    pub fn size(&self) -> usize {
        self.radius() * 2 + 1
    }

    /// Check if a relative position is within this neighborhood
    pub fn contains(&self, dr: isize, dc: isize) -> bool {
        match self {
            Neighborhood::Square(r) => {
                let r = *r as isize;
                dr.abs() <= r && dc.abs() <= r
            }
            Neighborhood::Circle(r) => {
                let r = *r as f64;
                ((dr * dr + dc * dc) as f64).sqrt() <= r
            }
        }
    }

    /// Relative positions in this neighborhood, centre included
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius() as isize;
        let mut offsets = Vec::new();
        for dr in -r..=r {
            for dc in -r..=r {
                if self.contains(dr, dc) {
                    offsets.push((dr, dc));
                }
            }
        }
        offsets
    }
}

/// Backlink direction codes.
///
/// A backlink cell stores the direction to its predecessor on a least-cost
/// path as a power of two, clockwise from north-east. `0` marks a source.
pub mod backlink {
    /// `(d_row, d_col)` for code `1 << i`
    pub const OFFSETS: [(isize, isize); 8] = [
        (-1, 1),  // 1: NE
        (0, 1),   // 2: E
        (1, 1),   // 4: SE
        (1, 0),   // 8: S
        (1, -1),  // 16: SW
        (0, -1),  // 32: W
        (-1, -1), // 64: NW
        (-1, 0),  // 128: N
    ];

    /// Code for the step with index `i` into [`OFFSETS`]
    pub fn code(i: usize) -> f64 {
        (1u32 << i) as f64
    }

    /// Offset encoded by `value`, or `None` for sources and invalid codes
    pub fn decode(value: f64) -> Option<(isize, isize)> {
        if value <= 0.0 || value.fract() != 0.0 || value > 128.0 {
            return None;
        }
        let v = value as u32;
        if !v.is_power_of_two() {
            return None;
        }
        Some(OFFSETS[v.trailing_zeros() as usize])
    }
}

/// Offsets of the cells on a ring of radius `r` around a centre cell.
///
/// A cell belongs to the ring when its Euclidean distance rounds to `r`.
/// Offsets are sorted by bearing, clockwise from north, so that walks
/// around the ring are reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct RingOffsets {
    radius: usize,
    offsets: Vec<(isize, isize)>,
}

impl RingOffsets {
    pub fn new(radius: usize) -> Self {
        let r = radius as isize;
        let mut keyed: Vec<(f64, (isize, isize))> = Vec::new();
        for dr in -r - 1..=r + 1 {
            for dc in -r - 1..=r + 1 {
                let dist = ((dr * dr + dc * dc) as f64).sqrt();
                if dist.round() as usize == radius {
                    keyed.push((bearing(dr, dc), (dr, dc)));
                }
            }
        }
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Self {
            radius,
            offsets: keyed.into_iter().map(|(_, o)| o).collect(),
        }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn offsets(&self) -> &[(isize, isize)] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Clockwise angle from north in `[0, 2π)`
fn bearing(dr: isize, dc: isize) -> f64 {
    let a = (dc as f64).atan2(-(dr as f64));
    if a < 0.0 {
        a + 2.0 * PI
    } else {
        a
    }
}

/// Ring offset tables computed once per radius
#[derive(Debug, Default)]
pub struct OffsetCache {
    rings: HashMap<usize, RingOffsets>,
}

impl OffsetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ring(&mut self, radius: usize) -> &RingOffsets {
        self.rings
            .entry(radius)
            .or_insert_with(|| RingOffsets::new(radius))
    }

    /// Number of radii computed so far
    pub fn len(&self) -> usize {
        self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }
}
