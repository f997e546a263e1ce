//! Contrato de catálogo de funciones y registro en memoria.
//!
//! El engine no sabe cómo están implementadas las funciones: sólo exige un
//! handle invocable con metadatos declarados (nombres de parámetros y de
//! retorno). Cualquier loader concreto (scan de directorio, registro manual)
//! sólo necesita satisfacer `FunctionCatalog`.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::errors::EngineError;

/// Handle invocable con metadatos declarados.
///
/// Implementaciones deben ser puras respecto a sus argumentos nombrados; los
/// efectos observables van por el valor de retorno (o el error).
pub trait CallableFunction {
    fn module(&self) -> &str;
    fn name(&self) -> &str;

    /// Nombres ordenados de los parámetros declarados.
    fn parameter_names(&self) -> &[String];

    /// Nombres ordenados de retorno declarados (posiblemente vacío). Un
    /// retorno escalar se almacena bajo `return` y bajo cada uno de estos.
    fn return_names(&self) -> &[String] {
        &[]
    }

    /// Invocación con argumentos nombrados ya resueltos.
    fn invoke(&self, args: &Map<String, Value>) -> Result<Value, EngineError>;
}

/// Contrato consumido por el engine: resolver módulo+función a un handle.
/// El engine no cachea resultados del catálogo entre corridas.
pub trait FunctionCatalog {
    fn lookup(&self, module: &str, function: &str) -> Option<&dyn CallableFunction>;
}

type HandlerFn = Box<dyn Fn(&Map<String, Value>) -> Result<Value, EngineError>>;

/// Implementación por closure, con metadatos declarados a mano.
pub struct NativeFunction {
    module: String,
    name: String,
    parameter_names: Vec<String>,
    return_names: Vec<String>,
    handler: HandlerFn,
}

impl NativeFunction {
    pub fn new(module: impl Into<String>,
               name: impl Into<String>,
               parameter_names: &[&str],
               return_names: &[&str],
               handler: impl Fn(&Map<String, Value>) -> Result<Value, EngineError> + 'static)
               -> Self {
        Self { module:          module.into(),
               name:            name.into(),
               parameter_names: parameter_names.iter().map(|s| s.to_string()).collect(),
               return_names:    return_names.iter().map(|s| s.to_string()).collect(),
               handler:         Box::new(handler) }
    }
}

impl CallableFunction for NativeFunction {
    fn module(&self) -> &str {
        &self.module
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    fn return_names(&self) -> &[String] {
        &self.return_names
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<Value, EngineError> {
        (self.handler)(args)
    }
}

/// Registro en memoria, inspeccionable en runtime.
/// Estructura: {módulo: {función: handle}}.
#[derive(Default)]
pub struct InMemoryCatalog {
    modules: HashMap<String, HashMap<String, Box<dyn CallableFunction>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un handle bajo su módulo+nombre declarados.
    pub fn register(&mut self, function: impl CallableFunction + 'static) {
        self.modules
            .entry(function.module().to_string())
            .or_default()
            .insert(function.name().to_string(), Box::new(function));
    }

    /// Módulos registrados, ordenados (superficie para colaboradores de
    /// edición que enumeran lo invocable).
    pub fn module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.keys().cloned().collect();
        names.sort();
        names
    }

    /// Funciones de un módulo, ordenadas.
    pub fn function_names(&self, module: &str) -> Vec<String> {
        let mut names: Vec<String> = self.modules
                                         .get(module)
                                         .map(|m| m.keys().cloned().collect())
                                         .unwrap_or_default();
        names.sort();
        names
    }
}

impl FunctionCatalog for InMemoryCatalog {
    fn lookup(&self, module: &str, function: &str) -> Option<&dyn CallableFunction> {
        self.modules
            .get(module)
            .and_then(|m| m.get(function))
            .map(|b| b.as_ref())
    }
}
