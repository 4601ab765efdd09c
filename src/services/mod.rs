//! Service layer: infrastructure clients and the order / payment workflows
//! that span several tables.

pub mod cache;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod razorpay;
pub mod signature;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::RedisCache;
pub use razorpay::RazorpayClient;
