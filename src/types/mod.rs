mod models;
mod role;
mod shape;

pub use models::*;
pub use role::Role;
pub use shape::Tool;
