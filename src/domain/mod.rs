//! Domain types and DTOs
//!
//! Request, response and row types for Zomatify entities, plus the pure
//! rules (pricing, queue maths, fee splits) that operate on them.

pub mod auth;
pub mod cart;
pub mod menu;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod profiles;
pub mod queue;
pub mod vendors;

pub use orders::{OrderStatus, PaymentStatus};
