//! Registros de step: la unidad de una secuencia.
//!
//! Un `StepRecord` es neutral respecto a la presentación: el engine sólo
//! muta `outputs`, `status` y los timestamps de los steps de función; nunca
//! crea ni borra registros. Los identificadores son únicos y estables
//! durante toda la vida de la secuencia.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::StepStatus;

/// Clase de marcador de control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    If,
    For,
    End,
    Break,
}

/// Step que invoca una función del catálogo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionStep {
    pub id: Uuid,
    pub module: String,
    pub function: String,
    /// Parámetros crudos (nombre -> string, posiblemente con tokens `${...}`).
    /// La resolución es perezosa: se evalúan recién al despachar el step.
    pub params: BTreeMap<String, String>,
    /// Outputs de la corrida actual. Claves reservadas: `return`, `error`.
    /// Vacío hasta que el step haya ejecutado al menos una vez.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub outputs: Map<String, Value>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Marcador que altera el puntero de instrucción en vez de invocar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlStep {
    pub id: Uuid,
    pub kind: ControlKind,
    /// Expresión cruda: condición (`if`) o iterable/rango (`for`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expr: String,
    /// Nombre de la variable de loop (`for`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub var: String,
}

/// Una entrada de la secuencia: invocación de función o marcador de control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepRecord {
    Function(FunctionStep),
    Control(ControlStep),
}

impl StepRecord {
    /// Crea un step de función sin parámetros.
    pub fn function(module: impl Into<String>, function: impl Into<String>) -> Self {
        StepRecord::Function(FunctionStep { id:          Uuid::new_v4(),
                                            module:      module.into(),
                                            function:    function.into(),
                                            params:      BTreeMap::new(),
                                            outputs:     Map::new(),
                                            status:      StepStatus::Pending,
                                            started_at:  None,
                                            finished_at: None })
    }

    /// Añade un parámetro crudo (builder de conveniencia para tests y demos).
    pub fn with_param(mut self, name: impl Into<String>, raw: impl Into<String>) -> Self {
        if let StepRecord::Function(f) = &mut self {
            f.params.insert(name.into(), raw.into());
        }
        self
    }

    pub fn control_if(condition: impl Into<String>) -> Self {
        Self::control(ControlKind::If, condition.into(), String::new())
    }

    pub fn control_for(var: impl Into<String>, iterable: impl Into<String>) -> Self {
        Self::control(ControlKind::For, iterable.into(), var.into())
    }

    pub fn control_end() -> Self {
        Self::control(ControlKind::End, String::new(), String::new())
    }

    pub fn control_break() -> Self {
        Self::control(ControlKind::Break, String::new(), String::new())
    }

    fn control(kind: ControlKind, expr: String, var: String) -> Self {
        StepRecord::Control(ControlStep { id: Uuid::new_v4(),
                                          kind,
                                          expr,
                                          var })
    }

    pub fn id(&self) -> Uuid {
        match self {
            StepRecord::Function(f) => f.id,
            StepRecord::Control(c) => c.id,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionStep> {
        match self {
            StepRecord::Function(f) => Some(f),
            StepRecord::Control(_) => None,
        }
    }

    pub(crate) fn as_function_mut(&mut self) -> Option<&mut FunctionStep> {
        match self {
            StepRecord::Function(f) => Some(f),
            StepRecord::Control(_) => None,
        }
    }

    pub fn as_control(&self) -> Option<&ControlStep> {
        match self {
            StepRecord::Control(c) => Some(c),
            StepRecord::Function(_) => None,
        }
    }

    pub fn control_kind(&self) -> Option<ControlKind> {
        self.as_control().map(|c| c.kind)
    }

    /// Estado corriente (los marcadores de control no acumulan estado).
    pub fn status(&self) -> Option<StepStatus> {
        self.as_function().map(|f| f.status)
    }

    /// Vuelve el step a su estado previo a cualquier corrida.
    pub(crate) fn reset(&mut self) {
        if let StepRecord::Function(f) = self {
            f.outputs = Map::new();
            f.status = StepStatus::Pending;
            f.started_at = None;
            f.finished_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_step_starts_pending_and_empty() {
        let step = StepRecord::function("math", "add").with_param("a", "1");
        let f = step.as_function().expect("function step");
        assert_eq!(f.status, StepStatus::Pending);
        assert!(f.outputs.is_empty());
        assert_eq!(f.params.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn ids_are_unique_per_record() {
        let a = StepRecord::control_end();
        let b = StepRecord::control_end();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn serde_roundtrip_keeps_kind_tags() {
        let step = StepRecord::control_for("i", "3");
        let json = serde_json::to_value(&step).expect("serialize");
        assert_eq!(json["type"], "control");
        assert_eq!(json["kind"], "for");
        let back: StepRecord = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.control_kind(), Some(ControlKind::For));
    }
}
