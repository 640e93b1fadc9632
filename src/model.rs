//! Domain records shared by every layer of the repacker.
//!
//! - `Box2D`: a box with its placement on a pallet
//! - `Pallet`: an ordered list of placed boxes
//! - `Truck`: an id and the pallets it carries
//!
//! Trucks arrive from an upstream reader and leave on the output channel;
//! the repacker only ever moves boxes between pallets, it never invents them.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Footprint, Grid, ID_LAST_TRUCK, PALLET_LENGTH, PALLET_WIDTH};

/// Reasons a box received from upstream cannot be repacked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("box has the reserved id 0")]
    ZeroId,
    #[error("box {id} has invalid dimensions {w}x{l}")]
    InvalidDimension { id: u32, w: u8, l: u8 },
    #[error("box {id} at ({x},{y}) sticks out of the pallet")]
    OffPallet { id: u32, x: u8, y: u8 },
}

/// Packing defects found when painting a pallet onto its grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PalletError {
    #[error("box {0} overlaps others")]
    Overlap(usize),
    #[error("box {0} goes off the edge")]
    Edge(usize),
}

/// A box on a pallet.
///
/// The box covers cells `x..x + l` along `x` and `y..y + w` along `y`.
/// Its `id` is unique within one input stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Box2D {
    pub x: u8,
    pub y: u8,
    pub w: u8,
    pub l: u8,
    pub id: u32,
}

impl Box2D {
    /// Creates a box at the pallet origin.
    ///
    /// # Examples
    /// ```
    /// use truck_repacker::model::Box2D;
    ///
    /// assert!(Box2D::new(7, 2, 3).is_ok());
    /// assert!(Box2D::new(7, 5, 1).is_err());
    /// assert!(Box2D::new(0, 1, 1).is_err());
    /// ```
    pub fn new(id: u32, w: u8, l: u8) -> Result<Self, ValidationError> {
        Self::placed(id, w, l, 0, 0)
    }

    /// Creates a box at position `(x, y)`, validating that it lies on the pallet.
    pub fn placed(id: u32, w: u8, l: u8, x: u8, y: u8) -> Result<Self, ValidationError> {
        let b = Self { x, y, w, l, id };
        b.validate()?;
        Ok(b)
    }

    /// Checks id and dimensions; the position is not looked at.
    pub fn validate_shape(&self) -> Result<(), ValidationError> {
        if self.id == 0 {
            return Err(ValidationError::ZeroId);
        }
        if !self.fits_pallet() {
            return Err(ValidationError::InvalidDimension {
                id: self.id,
                w: self.w,
                l: self.l,
            });
        }
        Ok(())
    }

    /// Checks id, dimensions and position against the pallet grid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_shape()?;
        if self.mask().is_none() {
            return Err(ValidationError::OffPallet {
                id: self.id,
                x: self.x,
                y: self.y,
            });
        }
        Ok(())
    }

    /// Canonical form: position zeroed, oriented so that `w <= l`.
    ///
    /// Two boxes are the same box iff their canonical forms are equal.
    pub fn canon(&self) -> Box2D {
        let (w, l) = if self.w > self.l {
            (self.l, self.w)
        } else {
            (self.w, self.l)
        };
        Box2D {
            x: 0,
            y: 0,
            w,
            l,
            id: self.id,
        }
    }

    /// Occupancy mask at the current position, `None` if off the pallet.
    pub fn mask(&self) -> Option<Grid> {
        Grid::rect(self.x, self.y, self.w, self.l)
    }

    /// Whether the box fully lies inside the pallet grid.
    pub fn in_bounds(&self) -> bool {
        self.x as u16 + self.l as u16 <= PALLET_WIDTH as u16
            && self.y as u16 + self.w as u16 <= PALLET_LENGTH as u16
    }
}

impl Footprint for Box2D {
    fn width(&self) -> u8 {
        self.w
    }

    fn length(&self) -> u8 {
        self.l
    }
}

impl fmt::Display for Box2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {} {}", self.x, self.y, self.w, self.l, self.id)
    }
}

/// A pallet holds a collection of boxes, each in a certain place on the grid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pallet {
    pub boxes: Vec<Box2D>,
}

const SYMBOLS: &[u8] = b"!@#$%^&*-=+:<>?x";

impl Pallet {
    pub fn new(boxes: Vec<Box2D>) -> Self {
        Self { boxes }
    }

    pub fn items(&self) -> usize {
        self.boxes.len()
    }

    /// Paints every box onto a grid.
    ///
    /// Painting continues past a defect; the last defect found is returned.
    pub fn paint(&self) -> (Grid, Option<PalletError>) {
        let mut grid = Grid::EMPTY;
        let mut err = None;
        for (bn, b) in self.boxes.iter().enumerate() {
            for i in b.x..b.x.saturating_add(b.l) {
                for j in b.y..b.y.saturating_add(b.w) {
                    let Some(cell) = Grid::cell(i, j) else {
                        err = Some(PalletError::Edge(bn));
                        continue;
                    };
                    if !grid.is_disjoint(cell) {
                        err = Some(PalletError::Overlap(bn));
                        continue;
                    }
                    grid = grid | cell;
                }
            }
        }
        (grid, err)
    }

    /// `Ok` if the pallet is correctly packed.
    pub fn validate(&self) -> Result<(), PalletError> {
        match self.paint() {
            (_, Some(err)) => Err(err),
            (_, None) => Ok(()),
        }
    }

    pub fn occupancy(&self) -> Grid {
        self.paint().0
    }

    pub fn is_full(&self) -> bool {
        self.occupancy().is_full()
    }

    /// One-line form, boxes separated by commas.
    pub fn one_line(&self) -> String {
        self.boxes
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Pallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cells = [None::<u8>; (PALLET_WIDTH * PALLET_LENGTH) as usize];
        for (bn, b) in self.boxes.iter().enumerate() {
            let symbol = SYMBOLS[bn % SYMBOLS.len()];
            for i in b.x..b.x.saturating_add(b.l).min(PALLET_WIDTH) {
                for j in b.y..b.y.saturating_add(b.w).min(PALLET_LENGTH) {
                    cells[(i * PALLET_LENGTH + j) as usize].get_or_insert(symbol);
                }
            }
        }
        for i in 0..PALLET_WIDTH {
            f.write_str("|")?;
            for j in 0..PALLET_LENGTH {
                match cells[(i * PALLET_LENGTH + j) as usize] {
                    Some(symbol) => write!(f, " {}", symbol as char)?,
                    None => f.write_str("  ")?,
                }
            }
            f.write_str(" |\n")?;
        }
        Ok(())
    }
}

/// A truck with its pallets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truck {
    pub id: i64,
    pub pallets: Vec<Pallet>,
}

impl Truck {
    pub fn new(id: i64, pallets: Vec<Pallet>) -> Self {
        Self { id, pallets }
    }

    /// The end-of-stream marker.
    pub fn sentinel() -> Self {
        Self {
            id: ID_LAST_TRUCK,
            pallets: Vec::new(),
        }
    }

    /// The reserved id without pallets ends the stream. Any other truck
    /// may arrive empty.
    pub fn is_sentinel(&self) -> bool {
        self.id == ID_LAST_TRUCK && self.pallets.is_empty()
    }

    /// Total number of boxes across all pallets.
    pub fn box_count(&self) -> usize {
        self.pallets.iter().map(Pallet::items).sum()
    }

    pub fn boxes(&self) -> impl Iterator<Item = &Box2D> {
        self.pallets.iter().flat_map(|p| p.boxes.iter())
    }

    /// Validates every box on the truck, returning the first problem.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.boxes().try_for_each(Box2D::validate)
    }

    /// Like `validate`, but ignores where the boxes currently sit.
    pub fn validate_shapes(&self) -> Result<(), ValidationError> {
        self.boxes().try_for_each(Box2D::validate_shape)
    }
}
