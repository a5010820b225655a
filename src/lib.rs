mod instructions;
mod model_service;
mod ort_service;
mod preprocess;
mod routes;
mod server;
mod state;
mod telemetry;

pub mod app;
pub mod config;

pub use app::start_app;
