//! JSON API over the query service.

pub mod error;
pub mod middleware;
pub mod options;
pub mod query;
pub mod routes;
pub mod status;

pub use routes::*;
