pub mod messages;
pub mod neighbor_channel;

pub use messages::{Advisory, PhaseOverride};
pub use neighbor_channel::{link, ChannelRead, Delivery, NeighborEndpoint};
