//! Mass-flow controller links

mod mks647b;

pub use mks647b::{FlowLink, FlowLinkConfig};
