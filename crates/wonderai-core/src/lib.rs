pub mod api;
pub mod assembler;
pub mod client;
pub mod config;
pub mod decoder;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod message;
pub mod retry;
pub mod session;
pub mod store;

// Re-export main types for convenience
pub use assembler::{Assembler, AssemblerState, StreamEvent};
pub use client::{ChatClient, ResponseStream};
pub use config::Config;
pub use decoder::LineDecoder;
pub use envelope::{parse_line, StreamEnvelope};
pub use error::{Result, WonderError};
pub use identity::UserIdentity;
pub use message::{now_millis, ChatMessage, ChatRole, Coordinates, MapMarker, MapWidget, PendingId};
pub use retry::RetryPolicy;
pub use session::{ChatSession, SessionState};
pub use store::ChatStore;
pub use tokio_util::sync::CancellationToken;
