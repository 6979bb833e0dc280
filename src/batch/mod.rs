//! The batch data model: requests, responses, and write statistics.

pub mod request;
pub mod response;
pub mod stats;
