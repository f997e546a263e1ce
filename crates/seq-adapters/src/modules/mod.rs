//! Módulos de funciones nativas.
//!
//! Cada submódulo expone un `register(&mut InMemoryCatalog)` que da de alta
//! sus funciones bajo su nombre de módulo.

use serde_json::{Map, Value};

use seq_core::EngineError;

pub mod math;
pub mod strings;

/// Extrae un argumento numérico, aceptando también strings numéricos (los
/// parámetros crudos sin token llegan como string cuando no parsean a JSON).
pub(crate) fn number_arg(args: &Map<String, Value>, name: &str) -> Result<f64, EngineError> {
    let value = args.get(name)
                    .ok_or_else(|| EngineError::invocation(format!("missing argument '{name}'")))?;
    match value {
        Value::Number(n) => n.as_f64()
                             .ok_or_else(|| EngineError::invocation(format!("argument '{name}' is not a finite number"))),
        Value::String(s) => s.trim()
                             .parse::<f64>()
                             .map_err(|_| EngineError::invocation(format!("argument '{name}' is not numeric: '{s}'"))),
        other => Err(EngineError::invocation(format!("argument '{name}' has non-numeric type: {other}"))),
    }
}

/// Renderiza un argumento como texto (strings sin comillas, el resto JSON).
pub(crate) fn text_arg(args: &Map<String, Value>, name: &str) -> String {
    match args.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
