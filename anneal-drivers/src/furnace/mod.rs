//! Furnace controller links

mod up150;

pub use up150::{FurnaceLink, FurnaceLinkConfig};
