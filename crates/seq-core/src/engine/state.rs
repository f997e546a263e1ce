//! Estado de corrida: máquina de estados, frames de loop y entorno.

use serde_json::{Map, Value};

use crate::errors::EngineError;
use crate::mapper::BlockMap;

/// Estados observables del engine.
///
/// Transiciones:
/// - `Idle` -> `Running` (primer despacho de una corrida)
/// - `Running` -> `Paused` (`step_run` entre despachos)
/// - `Running`/`Paused` -> `Completed` (el ip pasó el final de la lista)
/// - `Running`/`Paused` -> `Aborted` (error estructural o política de aborto)
/// - terminal -> `Idle` sólo vía `reset_execution`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Aborted,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Completed | EngineState::Aborted)
    }
}

/// Política ante fallos locales de step (referencia, lookup, invocación).
/// Los errores estructurales abortan siempre, sin importar la política.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Registrar el fallo y seguir con el siguiente ip.
    #[default]
    ContinueOnFailure,
    /// Transicionar la corrida completa a `Aborted`.
    AbortOnFailure,
}

/// Resultado explícito de despachar una posición: el loop principal del
/// engine interpreta esto como dato, sin depender de unwinding para salir
/// de loops.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Avanzar el ip en uno.
    Continue,
    /// Redirigir el ip a una posición concreta.
    JumpTo(usize),
    /// Fallo local de step ya registrado; `resume` es el ip a usar si la
    /// política permite continuar.
    Fail { error: EngineError, resume: usize },
}

/// Frame efímero de un `for` activo, propiedad del engine.
#[derive(Debug, Clone)]
pub struct LoopFrame {
    /// Posición del marcador `for`.
    pub start: usize,
    /// Posición de su `end` emparejado.
    pub end: usize,
    /// Nombre de la variable ligada.
    pub var: String,
    /// Elementos materializados del iterable.
    pub items: Vec<Value>,
    /// Cursor sobre `items`.
    pub pos: usize,
    /// Valor que `var` tenía antes de entrar (se restaura al salir, de modo
    /// que el binding más interno gana mientras el frame está vivo).
    pub shadowed: Option<Value>,
}

impl LoopFrame {
    pub fn exhausted(&self) -> bool {
        self.pos >= self.items.len()
    }
}

/// Estado persistente de una corrida: ip + frames + entorno + tabla de
/// bloques. Se limpia por completo en `reset_execution`.
#[derive(Debug, Default)]
pub struct RunState {
    pub ip: usize,
    pub frames: Vec<LoopFrame>,
    /// Entorno de corrida: nombre de variable -> valor, poblado por los
    /// frames activos. Nunca persiste fuera de una corrida.
    pub env: Map<String, Value>,
    /// Tabla de saltos, calculada una vez al iniciar la corrida.
    pub blocks: Option<BlockMap>,
    pub state: EngineState,
}
