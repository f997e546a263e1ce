//! Módulo `strings`: utilidades de texto.

use serde_json::{json, Value};

use seq_core::{InMemoryCatalog, NativeFunction};

use super::text_arg;

pub fn register(catalog: &mut InMemoryCatalog) {
    catalog.register(NativeFunction::new("strings", "echo", &["text"], &["text"], |args| {
        Ok(args.get("text").cloned().unwrap_or(Value::Null))
    }));
    catalog.register(NativeFunction::new("strings", "concat", &["left", "right"], &["text"], |args| {
        Ok(json!(format!("{}{}", text_arg(args, "left"), text_arg(args, "right"))))
    }));
    catalog.register(NativeFunction::new("strings", "length", &["text"], &["length"], |args| {
        Ok(json!(text_arg(args, "text").chars().count()))
    }));
}
