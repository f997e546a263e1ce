//! seq-core: motor determinista de secuencias de test.
//!
//! Ejecuta listas planas de steps (funciones de catálogo + marcadores de
//! control `if`/`for`/`end`/`break`) de forma síncrona y reproducible:
//! misma secuencia + mismo catálogo => mismos outputs y mismos estados.
//!
//! Piezas principales:
//! - [`step`]: el modelo de datos (`StepRecord`, `StepStatus`).
//! - [`mapper`]: tabla de saltos opener -> end, validada por scan único.
//! - [`resolver`]: tokens `${#N:clave}` y `${@nombre}` en parámetros.
//! - [`catalog`]: contrato de funciones invocables (`FunctionCatalog`).
//! - [`engine`]: la máquina de estados (`SequenceEngine`).
//! - [`observer`]: slots de callbacks para UI u otros frontends.

pub mod catalog;
pub mod engine;
pub mod errors;
pub mod mapper;
pub mod observer;
pub mod resolver;
pub mod step;

pub use catalog::{CallableFunction, FunctionCatalog, InMemoryCatalog, NativeFunction};
pub use engine::{DispatchOutcome, EngineBuilder, EngineBuilderInit, EngineState, FailurePolicy,
                 LoopFrame, SequenceEngine};
pub use errors::EngineError;
pub use mapper::{map_blocks, BlockMap};
pub use observer::ObserverBus;
pub use step::{ControlKind, ControlStep, FunctionStep, StepRecord, StepStatus};
