pub mod call;
pub mod events;
pub mod lookup;
pub mod session;

pub use call::{CallRequest, CallResponse};
pub use events::Envelope;
pub use lookup::{BotRecord, BotStatus};
pub use session::{CallMode, Phase, Sender, TranscriptEntry};
