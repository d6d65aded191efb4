//! Shared newtypes for the storefront domain.

pub mod email;
pub mod id;
pub mod money;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{format_price, line_total};
