//! Mapeo de bloques de control: cada `if`/`for` con su `end`.
//!
//! Rol en el flujo:
//! - Se calcula una única vez por corrida (la lista se asume estructuralmente
//!   congelada mientras dure la corrida).
//! - El engine usa la tabla para saltar bloques y ubicar límites de loop en
//!   O(1), al estilo de los bytecode interpreters que codifican control
//!   estructurado como saltos sobre una secuencia plana.

use std::collections::HashMap;

use crate::errors::EngineError;
use crate::step::{ControlKind, StepRecord};

/// Tabla de saltos: posición del marcador de apertura -> posición de su `end`.
pub type BlockMap = HashMap<usize, usize>;

/// Un único escaneo lineal con pila explícita. Apila en `if`/`for`, desapila
/// y registra el par en `end`. Falla rápido ante estructura malformada,
/// antes de que cualquier step ejecute.
pub fn map_blocks(steps: &[StepRecord]) -> Result<BlockMap, EngineError> {
    let mut blocks = BlockMap::new();
    let mut stack: Vec<usize> = Vec::new();

    for (i, step) in steps.iter().enumerate() {
        match step.control_kind() {
            Some(ControlKind::If) | Some(ControlKind::For) => stack.push(i),
            Some(ControlKind::End) => {
                let opener = stack.pop().ok_or(EngineError::UnmatchedEnd(i))?;
                blocks.insert(opener, i);
            }
            _ => {}
        }
    }

    if let Some(&opener) = stack.last() {
        return Err(EngineError::UnmatchedOpener(opener));
    }
    Ok(blocks)
}
