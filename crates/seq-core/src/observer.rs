//! Slots de observación del engine (output / watcher / status).
//!
//! Tres callbacks independientes, opcionales y reemplazables en cualquier
//! momento. El engine los invoca de forma síncrona, de a uno por vez. No hay
//! guardas de reentrancia: un callback no debe manejar el engine desde
//! adentro; esa responsabilidad es del caller.

use serde_json::{Map, Value};

use crate::step::StepStatus;

pub type OutputFn = Box<dyn FnMut(&str)>;
pub type WatcherFn = Box<dyn FnMut(usize, &Map<String, Value>)>;
pub type StatusFn = Box<dyn FnMut(usize, StepStatus)>;

/// Bus de observadores de slot único por clase de evento.
#[derive(Default)]
pub struct ObserverBus {
    output: Option<OutputFn>,
    watcher: Option<WatcherFn>,
    status: Option<StatusFn>,
}

impl ObserverBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Línea textual libre emitida durante la ejecución.
    pub fn set_output(&mut self, cb: impl FnMut(&str) + 'static) {
        self.output = Some(Box::new(cb));
    }

    pub fn clear_output(&mut self) {
        self.output = None;
    }

    /// Snapshot de variables relevante a un step, emitido cuando cambia el
    /// entorno de corrida o los outputs de un step.
    pub fn set_watcher(&mut self, cb: impl FnMut(usize, &Map<String, Value>) + 'static) {
        self.watcher = Some(Box::new(cb));
    }

    pub fn clear_watcher(&mut self) {
        self.watcher = None;
    }

    /// Resultado de cada despacho de step.
    pub fn set_status(&mut self, cb: impl FnMut(usize, StepStatus) + 'static) {
        self.status = Some(Box::new(cb));
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    pub(crate) fn emit_output(&mut self, text: &str) {
        if let Some(cb) = self.output.as_mut() {
            cb(text);
        }
    }

    pub(crate) fn emit_watch(&mut self, step_index: usize, snapshot: &Map<String, Value>) {
        if let Some(cb) = self.watcher.as_mut() {
            cb(step_index, snapshot);
        }
    }

    pub(crate) fn emit_status(&mut self, step_index: usize, status: StepStatus) {
        if let Some(cb) = self.status.as_mut() {
            cb(step_index, status);
        }
    }
}
