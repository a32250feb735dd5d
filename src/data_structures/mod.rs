//! Engine data structures.
//!
//! - `entity` holds game objects and their components
//! - `geometry` holds the interleaved vertex layout and index lists
//! - `texture` wraps a GPU texture loaded from an image file

pub mod entity;
pub mod geometry;
pub mod texture;
