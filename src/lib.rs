//! Streaming truck repacker.
//!
//! Trucks arrive on a channel carrying loosely packed 4×4 pallets. A pool of
//! pack lines collects their boxes in batches, packs them first-fit onto as
//! few pallets as possible and sends the rebuilt trucks out again.

pub mod audit;
pub mod batch;
pub mod config;
pub mod error;
pub mod generator;
pub mod geometry;
pub mod model;
pub mod pack_line;
pub mod packer;
pub mod repacker;
pub mod types;

pub use config::{AppConfig, RepackConfig};
pub use error::RepackError;
pub use model::{Box2D, Pallet, Truck};
pub use packer::PackStrategy;
pub use repacker::{RepackSummary, Repacker};
