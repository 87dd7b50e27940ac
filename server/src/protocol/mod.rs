pub mod messages;

pub use messages::{ChangeEvent, ChangeKind, ChangePayload, SocketEnvelope, TodoItem};
