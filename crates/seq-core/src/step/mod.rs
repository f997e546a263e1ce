//! Modelo de datos de la secuencia: registros de step y su estado.

pub mod record;
pub mod status;

pub use record::{ControlKind, ControlStep, FunctionStep, StepRecord};
pub use status::StepStatus;
