// Library root: configuration and the batch pipeline, exposed so the binary
// and integration tests share one implementation.

pub mod config;
pub mod pipeline;
