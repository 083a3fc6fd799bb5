pub mod envelope;
pub mod error;
pub mod modes;
pub mod topics;

pub use envelope::*;
pub use error::{ProtocolError, ProtocolResult};
pub use modes::FanMode;
