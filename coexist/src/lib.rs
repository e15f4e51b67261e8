pub mod config;
pub mod dims;
pub mod engine;
pub mod error;
pub mod io;
pub mod math;
pub mod model;
pub mod policy;
pub mod rates;
pub mod scenario;
pub mod state;
pub mod sweep;
pub mod trajectory;

pub use config::ModelParams;
pub use dims::{Axis, Cell, Dims};
pub use engine::Simulation;
pub use error::{ConfigError, EngineError};
pub use rates::{RateComposer, RateTensor};
pub use scenario::Scenario;
pub use state::StateTensor;
pub use trajectory::{ArrivalsMode, Checkpoint, Trajectory};
