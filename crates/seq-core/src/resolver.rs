//! Resolución de tokens de referencia dentro de strings de parámetro.
//!
//! Gramática reconocida:
//! - `${#N:key}` -> valor bajo `key` en los outputs del step en la posición
//!   N de la lista original (0-based). Resoluble sólo si ese step ya ejecutó
//!   en la corrida actual.
//! - `${@name}`  -> valor corriente de `name` en el entorno de corrida (gana
//!   el binding más interno si un loop anidado re-liga el nombre).
//!
//! Reglas de tipado:
//! - String que es exactamente un token: devuelve el valor referenciado con
//!   su tipo original.
//! - String con texto circundante o múltiples tokens: sustitución textual,
//!   resultado siempre `String`.
//! - String sin tokens: se intenta parsear como literal JSON (`"5"` -> 5,
//!   `"[0,1,2]"` -> lista); si no parsea, queda como string.
//!
//! Cualquier token irresoluble falla nombrando al token ofensor. La
//! resolución ocurre en cada visita al step, de modo que un cuerpo de loop
//! refleja la iteración corriente.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::errors::EngineError;
use crate::step::StepRecord;

static STEP_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{#(\d+):([^}]+)\}").expect("step token pattern"));
static VAR_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{@([^}]+)\}").expect("var token pattern"));

/// Resuelve un string de parámetro crudo contra outputs previos y el entorno.
/// `at` es la posición del step que está resolviendo (sólo para reportes).
pub fn resolve(raw: &str,
               at: usize,
               steps: &[StepRecord],
               env: &Map<String, Value>)
               -> Result<Value, EngineError> {
    // Token único que abarca todo el string: preserva el tipo original.
    if let Some(caps) = STEP_TOKEN.captures(raw) {
        if whole_match(&caps, raw) {
            return step_output(&caps[1], &caps[2], at, steps);
        }
    }
    if let Some(caps) = VAR_TOKEN.captures(raw) {
        if whole_match(&caps, raw) {
            return env_value(&caps[1], at, env);
        }
    }

    let mut had_token = false;
    let pass1 = substitute_step_tokens(raw, at, steps, &mut had_token)?;
    let pass2 = substitute_var_tokens(&pass1, at, env, &mut had_token)?;

    if had_token {
        Ok(Value::String(pass2))
    } else {
        Ok(parse_literal(&pass2))
    }
}

/// Resuelve cada parámetro declarado; un nombre sin valor crudo resuelve
/// como string vacío.
pub fn resolve_args(names: &[String],
                    raw_params: &std::collections::BTreeMap<String, String>,
                    at: usize,
                    steps: &[StepRecord],
                    env: &Map<String, Value>)
                    -> Result<Map<String, Value>, EngineError> {
    let mut args = Map::new();
    for name in names {
        let raw = raw_params.get(name).map(String::as_str).unwrap_or("");
        args.insert(name.clone(), resolve(raw, at, steps, env)?);
    }
    Ok(args)
}

/// Representación textual para sustituciones embebidas: los strings van sin
/// comillas; todo lo demás usa su forma JSON.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn whole_match(caps: &regex::Captures, raw: &str) -> bool {
    caps.get(0).map_or(false, |m| m.start() == 0 && m.end() == raw.len())
}

fn unresolved(at: usize, token: &str) -> EngineError {
    EngineError::UnresolvedReference { step:  at,
                                       token: token.to_string() }
}

fn step_output(n_str: &str,
               key: &str,
               at: usize,
               steps: &[StepRecord])
               -> Result<Value, EngineError> {
    let token = format!("${{#{n_str}:{key}}}");
    let n: usize = n_str.parse().map_err(|_| unresolved(at, &token))?;
    let function = steps.get(n)
                        .and_then(|s| s.as_function())
                        .ok_or_else(|| unresolved(at, &token))?;
    if !function.status.has_executed() {
        return Err(unresolved(at, &token));
    }
    function.outputs
            .get(key)
            .cloned()
            .ok_or_else(|| unresolved(at, &token))
}

fn env_value(name: &str, at: usize, env: &Map<String, Value>) -> Result<Value, EngineError> {
    env.get(name)
       .cloned()
       .ok_or_else(|| unresolved(at, &format!("${{@{name}}}")))
}

fn substitute_step_tokens(text: &str,
                          at: usize,
                          steps: &[StepRecord],
                          had_token: &mut bool)
                          -> Result<String, EngineError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in STEP_TOKEN.captures_iter(text) {
        let m = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        *had_token = true;
        out.push_str(&text[last..m.start()]);
        let value = step_output(&caps[1], &caps[2], at, steps)?;
        out.push_str(&text_of(&value));
        last = m.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

fn substitute_var_tokens(text: &str,
                         at: usize,
                         env: &Map<String, Value>,
                         had_token: &mut bool)
                         -> Result<String, EngineError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in VAR_TOKEN.captures_iter(text) {
        let m = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        *had_token = true;
        out.push_str(&text[last..m.start()]);
        let value = env_value(&caps[1], at, env)?;
        out.push_str(&text_of(&value));
        last = m.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

fn parse_literal(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }
    serde_json::from_str::<Value>(trimmed).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{StepRecord, StepStatus};
    use serde_json::json;

    fn executed_step(outputs: &[(&str, Value)]) -> StepRecord {
        let mut step = StepRecord::function("math", "add");
        if let StepRecord::Function(f) = &mut step {
            f.status = StepStatus::Success;
            for (k, v) in outputs {
                f.outputs.insert((*k).to_string(), v.clone());
            }
        }
        step
    }

    #[test]
    fn single_step_token_preserves_type() {
        let steps = vec![executed_step(&[("sum", json!(7))])];
        let v = resolve("${#0:sum}", 1, &steps, &Map::new()).expect("resolves");
        assert_eq!(v, json!(7));
    }

    #[test]
    fn single_var_token_preserves_type() {
        let mut env = Map::new();
        env.insert("i".to_string(), json!([1, 2]));
        let v = resolve("${@i}", 0, &[], &env).expect("resolves");
        assert_eq!(v, json!([1, 2]));
    }

    #[test]
    fn mixed_text_substitutes_into_a_string() {
        let steps = vec![executed_step(&[("sum", json!(7))])];
        let mut env = Map::new();
        env.insert("i".to_string(), json!(2));
        let v = resolve("sum=${#0:sum}, i=${@i}", 1, &steps, &env).expect("resolves");
        assert_eq!(v, json!("sum=7, i=2"));
    }

    #[test]
    fn token_free_text_parses_as_json_literal() {
        assert_eq!(resolve("5", 0, &[], &Map::new()).expect("ok"), json!(5));
        assert_eq!(resolve("[0,1,2]", 0, &[], &Map::new()).expect("ok"), json!([0, 1, 2]));
        assert_eq!(resolve("hello", 0, &[], &Map::new()).expect("ok"), json!("hello"));
        assert_eq!(resolve("", 0, &[], &Map::new()).expect("ok"), json!(""));
    }

    #[test]
    fn unexecuted_step_reference_fails_naming_the_token() {
        let steps = vec![StepRecord::function("math", "add")];
        let err = resolve("${#0:return}", 1, &steps, &Map::new()).expect_err("must fail");
        assert_eq!(err,
                   EngineError::UnresolvedReference { step:  1,
                                                      token: "${#0:return}".to_string() });
    }

    #[test]
    fn unknown_key_and_unknown_var_fail() {
        let steps = vec![executed_step(&[("sum", json!(7))])];
        assert!(resolve("${#0:missing}", 1, &steps, &Map::new()).is_err());
        assert!(resolve("${@ghost}", 0, &[], &Map::new()).is_err());
    }

    #[test]
    fn out_of_range_position_fails() {
        let err = resolve("${#9:return}", 0, &[], &Map::new()).expect_err("must fail");
        assert!(matches!(err, EngineError::UnresolvedReference { .. }));
    }

    #[test]
    fn failed_step_outputs_are_referenceable() {
        // Un step fallido ejecutó: su `error` registrado es legible.
        let mut step = StepRecord::function("math", "divide");
        if let StepRecord::Function(f) = &mut step {
            f.status = StepStatus::Failed;
            f.outputs.insert("error".to_string(), json!("division by zero"));
        }
        let v = resolve("${#0:error}", 1, &[step], &Map::new()).expect("resolves");
        assert_eq!(v, json!("division by zero"));
    }
}
