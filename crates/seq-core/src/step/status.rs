use serde::{Deserialize, Serialize};

/// Estado de un step en tiempo de ejecución.
///
/// Las transiciones válidas son:
/// - `Pending` -> `Running`
/// - `Running` -> `Success`
/// - `Running` -> `Failed`
/// - `Pending` -> `Skipped` (el engine saltó el bloque que lo contiene)
///
/// Cualquier estado vuelve a `Pending` únicamente vía `reset_execution`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepStatus {
    /// El step está pendiente de ejecución.
    #[default]
    Pending,
    /// El step está en ejecución.
    Running,
    /// El step finalizó correctamente.
    Success,
    /// El step falló (referencia, lookup o invocación).
    Failed,
    /// El step fue saltado por el flujo de control.
    Skipped,
}

impl StepStatus {
    /// El step corrió al menos una vez en esta corrida (con o sin éxito).
    /// Sólo entonces sus outputs son referenciables vía `${#N:key}`.
    pub fn has_executed(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Failed | StepStatus::Skipped)
    }
}
