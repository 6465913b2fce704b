pub mod messages;
pub mod registry;
pub mod session;
pub mod state;

pub use messages::{CompletePayload, ServerMessage};
pub use registry::{SessionRegistry, SessionTicket};
pub use session::{Inbound, SessionSummary, StreamSession, TransportError};
pub use state::{FrameStage, StageKind};
