pub mod runners;
pub mod service;
pub mod sse;
