//! Shared API response types and pagination

pub mod pagination;
pub mod response;

pub use pagination::{Paginated, PaginationParams};
pub use response::{Created, DataResponse, MessageResponse};
