//! seq-adapters: funciones invocables de referencia para el motor.
//!
//! Este crate provee:
//! - Módulos de funciones nativas (`math`, `strings`) implementadas como
//!   `NativeFunction` sobre argumentos JSON nombrados.
//! - Un registro por defecto (`build_default_catalog`) listo para montar en
//!   un `SequenceEngine`.
//!
//! Nota: el core sólo conoce el contrato `FunctionCatalog`; todo lo que hay
//! aquí es reemplazable por cualquier otro loader que lo satisfaga.

pub mod modules;
pub mod registry;

pub use registry::build_default_catalog;
