#![warn(missing_docs)]

//! ModelGate HTTP gateway
//!
//! Serves an OpenAI-style chat-completions endpoint. Each request resolves a
//! model, makes sure it is downloaded, borrows its loaded instance from the
//! pool for one generation and returns it.

pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult, ServerError};
pub use gateway::{CompletionGateway, RequestState};
pub use server::ApiServer;
pub use state::{AppState, Readiness};
