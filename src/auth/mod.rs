mod helpers;
mod middleware;
mod token;

pub use helpers::{issue_token, validate_token};
pub use middleware::{MaybeUser, RequireAdmin, RequireUser};
pub use token::{TokenGenerator, parse_token};
