pub mod config;
pub mod errors;
pub mod naming;
pub mod pipeline;
pub mod policy;
pub mod routes;
pub mod storage;

pub use routes::create_app;
