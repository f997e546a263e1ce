//! Errores específicos del motor de secuencias.
//!
//! La taxonomía separa dos familias:
//! - Errores estructurales (`UnmatchedEnd`, `UnmatchedOpener`,
//!   `BreakOutsideLoop`): siempre fatales, terminan la corrida en `Aborted`
//!   y se devuelven al caller de `run_all`/`step_run`.
//! - Errores locales al step (`UnresolvedReference`, `UnknownFunction`,
//!   `Invocation`): se registran en `outputs["error"]` del step afectado y
//!   se resuelven según la `FailurePolicy` configurada.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum EngineError {
    /// `end` que cierra sin `if`/`for` abierto (detectado al mapear bloques).
    #[error("unmatched end at step {0}")]
    UnmatchedEnd(usize),
    /// `if`/`for` sin `end` de cierre (detectado al mapear bloques).
    #[error("unmatched if/for at step {0}")]
    UnmatchedOpener(usize),
    /// `break` sin frame de loop activo (detectado en plena corrida).
    #[error("break outside any active loop at step {0}")]
    BreakOutsideLoop(usize),
    /// Token de referencia irresoluble en un parámetro o expresión.
    #[error("unresolved reference {token} at step {step}")]
    UnresolvedReference { step: usize, token: String },
    /// Módulo/función ausentes del catálogo.
    #[error("function {module}.{function} not found in catalog")]
    UnknownFunction { module: String, function: String },
    /// La función invocada reportó un fallo propio.
    #[error("invocation failed: {message}")]
    Invocation { message: String },
    /// Índice de step fuera de rango.
    #[error("invalid step index {0}")]
    InvalidStepIndex(usize),
    /// Sentinela: la secuencia ya terminó, no quedan steps por despachar.
    #[error("sequence already completed")]
    SequenceCompleted,
    /// Mutación estructural rechazada mientras hay una corrida en curso.
    #[error("sequence is running or paused; reset before replacing steps")]
    RunInProgress,
    #[error("internal: {0}")]
    Internal(String),
}

impl EngineError {
    /// Construye un error de invocación a partir de cualquier mensaje.
    pub fn invocation(message: impl Into<String>) -> Self {
        EngineError::Invocation { message: message.into() }
    }

    /// Errores estructurales: nunca recuperables por política de fallo.
    pub fn is_structural(&self) -> bool {
        matches!(self,
                 EngineError::UnmatchedEnd(_)
                 | EngineError::UnmatchedOpener(_)
                 | EngineError::BreakOutsideLoop(_))
    }
}
