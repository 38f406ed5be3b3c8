//! Instrument links
//!
//! Concrete implementations of the anneal-core instrument traits over the
//! serial traits from anneal-hal:
//!
//! - [`FurnaceLink`] - Yokogawa UP150 program controller (PC-Link)
//! - [`FlowLink`] - MKS 647B mass-flow controller
//!
//! Every operation is one or more request/reply exchanges, each bounded by
//! the link's configured timeout. Nothing here retries.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod flow;
pub mod furnace;
mod line;

#[cfg(test)]
mod test_port;

pub use flow::{FlowLink, FlowLinkConfig};
pub use furnace::{FurnaceLink, FurnaceLinkConfig};
