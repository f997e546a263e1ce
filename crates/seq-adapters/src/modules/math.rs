//! Módulo `math`: aritmética básica sobre argumentos numéricos.
//!
//! Valores de retorno escalares: el engine los espeja bajo `return` y bajo
//! el nombre de retorno declarado (`sum`, `sub`, `mul`, `div`).

use serde_json::json;

use seq_core::{EngineError, InMemoryCatalog, NativeFunction};

use super::number_arg;

pub fn register(catalog: &mut InMemoryCatalog) {
    catalog.register(NativeFunction::new("math", "add", &["a", "b"], &["sum"], |args| {
        Ok(json!(number_arg(args, "a")? + number_arg(args, "b")?))
    }));
    catalog.register(NativeFunction::new("math", "subtract", &["a", "b"], &["sub"], |args| {
        Ok(json!(number_arg(args, "a")? - number_arg(args, "b")?))
    }));
    catalog.register(NativeFunction::new("math", "multiply", &["a", "b"], &["mul"], |args| {
        Ok(json!(number_arg(args, "a")? * number_arg(args, "b")?))
    }));
    catalog.register(NativeFunction::new("math", "divide", &["a", "b"], &["div"], |args| {
        let divisor = number_arg(args, "b")?;
        if divisor == 0.0 {
            return Err(EngineError::invocation("division by zero"));
        }
        Ok(json!(number_arg(args, "a")? / divisor))
    }));
}
