mod resolver;

pub use resolver::{aggregate_roles, authorize, can_purchase, default_role, public_default, resolve};
