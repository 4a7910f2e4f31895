mod admin;
pub mod dto;
mod objects;
pub mod response;
mod router;
mod user;
pub mod validation;

pub use router::{AppState, MAX_BODY_BYTES, create_router};
