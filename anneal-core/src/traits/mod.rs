//! Instrument abstraction traits
//!
//! The sequencer and sampler only talk to instruments through these
//! traits, so the same logic runs against the serial links on target and
//! against mocks on the host.

mod flow;
mod furnace;
mod link;
mod store;

pub use flow::{FlowController, ValveState};
pub use furnace::{Furnace, FurnaceMode, FurnaceStatus};
pub use link::{LinkError, ProtocolFault};
pub use store::{load_validated, RecipeStore, StoreError};
