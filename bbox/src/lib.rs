//! Safe bounding box types and functions.
//!
//! Boxes follow the image convention of the detectors in this workspace:
//! the first coordinate is the row (y) and the second one is the column (x).

mod common;

pub use transform::*;
mod transform;

pub use rect::*;
pub mod rect;

pub use tlbr::*;
pub mod tlbr;

pub use cycxhw::*;
pub mod cycxhw;

pub use hw::*;
pub mod hw;

pub mod prelude {
    pub use crate::rect::{Rect, RectFloat, RectNum};
}
