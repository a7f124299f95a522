pub mod cleanup;
pub mod connection;
pub mod protocol;
pub mod registry;
pub mod sequencer;

pub use protocol::{Gateway, JoinError, Session};
pub use registry::{Binding, ConnId, Registry};
pub use sequencer::Sequencer;
