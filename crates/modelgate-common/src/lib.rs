//! Shared building blocks for modelgate crates
//!
//! Holds the [`ModelId`] key type used by every component and the
//! [`SingleFlight`] primitive that both the model store and the instance pool
//! use to collapse concurrent work on the same key.

pub mod error;
pub mod flight;
pub mod model_id;

pub use error::{FlightAbandoned, InvalidModelId};
pub use flight::SingleFlight;
pub use model_id::ModelId;
