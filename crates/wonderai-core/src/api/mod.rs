//! Request/response wrappers for the non-streaming backend endpoints.

pub mod chat;
pub mod health;
pub mod images;
pub mod maps;

pub use chat::{AiResponse, Conversation, NewConversation, SendMessage, ServerMessage};
pub use health::HealthStatus;
pub use images::{ImageAnalysis, ImageAnalysisRequest, ImageRequest, ImageResult};
pub use maps::{
    LocationQuery, LocationResults, MapRequest, MapResult, MapStyle, Route, RouteRequest,
    RouteResult, TravelMode,
};
