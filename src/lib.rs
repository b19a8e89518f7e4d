pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod sql;
pub mod validation;

pub use config::FrameConfig;
pub use error::FrameError;
pub use models::*;
pub use services::*;
pub use validation::*;
