//! Implementación central de `SequenceEngine`.
//!
//! Motor de ejecución secuencial y síncrono: un puntero de instrucción
//! avanza sobre la lista plana de steps; los bloques anidados se recorren
//! mediante la tabla de saltos precalculada (`mapper`). Sin suspensión
//! interna ni paralelismo: el único punto de pausa observable es el estado
//! `Paused` entre llamadas a `step_run`.

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::catalog::FunctionCatalog;
use crate::engine::builder::EngineBuilderInit;
use crate::engine::state::{DispatchOutcome, EngineState, FailurePolicy, LoopFrame, RunState};
use crate::errors::EngineError;
use crate::mapper;
use crate::observer::ObserverBus;
use crate::resolver;
use crate::step::{ControlKind, ControlStep, StepRecord, StepStatus};

/// Motor de ejecución de secuencias de test.
///
/// Genérico sobre el catálogo de funciones (su único colaborador de
/// invocación), como el resto de los seams: los observadores se inyectan
/// por slot y la lista de steps se asume congelada durante la corrida.
pub struct SequenceEngine<C: FunctionCatalog> {
    catalog: C,
    steps: Vec<StepRecord>,
    observers: ObserverBus,
    policy: FailurePolicy,
    run: RunState,
    run_id: Option<Uuid>,
}

impl<C: FunctionCatalog> SequenceEngine<C> {
    /// Crea un builder para configurar el engine.
    #[inline]
    pub fn builder(catalog: C) -> EngineBuilderInit<C> {
        EngineBuilderInit { catalog }
    }

    /// Crea un engine vacío sobre un catálogo.
    pub fn new(catalog: C) -> Self {
        Self::from_parts(catalog, Vec::new(), FailurePolicy::default())
    }

    pub(crate) fn from_parts(catalog: C, steps: Vec<StepRecord>, policy: FailurePolicy) -> Self {
        Self { catalog,
               steps,
               observers: ObserverBus::new(),
               policy,
               run: RunState::default(),
               run_id: None }
    }

    /// Reemplaza la lista de steps. Rechazado mientras una corrida está en
    /// curso (la lista es input inmutable de la corrida).
    pub fn set_steps(&mut self, steps: Vec<StepRecord>) -> Result<(), EngineError> {
        if matches!(self.run.state, EngineState::Running | EngineState::Paused) {
            return Err(EngineError::RunInProgress);
        }
        self.steps = steps;
        self.run = RunState::default();
        self.run_id = None;
        Ok(())
    }

    /// Muta el parámetro crudo de un step aún no ejecutado. Tolerado en
    /// cualquier estado: la resolución es perezosa (se evalúa al despachar).
    pub fn set_param(&mut self,
                     index: usize,
                     name: impl Into<String>,
                     raw: impl Into<String>)
                     -> Result<(), EngineError> {
        let step = self.steps
                       .get_mut(index)
                       .ok_or(EngineError::InvalidStepIndex(index))?;
        match step.as_function_mut() {
            Some(f) => {
                f.params.insert(name.into(), raw.into());
                Ok(())
            }
            None => Err(EngineError::InvalidStepIndex(index)),
        }
    }

    pub fn set_failure_policy(&mut self, policy: FailurePolicy) {
        self.policy = policy;
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&StepRecord> {
        self.steps.get(index)
    }

    pub fn state(&self) -> EngineState {
        self.run.state
    }

    /// Puntero de instrucción corriente (próxima posición a despachar).
    pub fn current_index(&self) -> usize {
        self.run.ip
    }

    /// Entorno de corrida corriente (variables de loop activas).
    pub fn environment(&self) -> &Map<String, Value> {
        &self.run.env
    }

    /// Identificador de la corrida en curso, si ya arrancó.
    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Acceso directo al bus para registrar/reemplazar slots.
    pub fn observers_mut(&mut self) -> &mut ObserverBus {
        &mut self.observers
    }

    pub fn on_output(&mut self, cb: impl FnMut(&str) + 'static) {
        self.observers.set_output(cb);
    }

    pub fn on_watch(&mut self, cb: impl FnMut(usize, &Map<String, Value>) + 'static) {
        self.observers.set_watcher(cb);
    }

    pub fn on_status(&mut self, cb: impl FnMut(usize, StepStatus) + 'static) {
        self.observers.set_status(cb);
    }

    /// Corre desde el ip corriente hasta que la secuencia complete o aborte.
    /// Errores estructurales se devuelven; un aborto por política de fallo
    /// termina en `Ok(Aborted)` (el error quedó capturado en el step).
    pub fn run_all(&mut self) -> Result<EngineState, EngineError> {
        loop {
            match self.dispatch_one() {
                Ok(()) => {
                    if self.run.state.is_terminal() {
                        return Ok(self.run.state);
                    }
                }
                Err(EngineError::SequenceCompleted) => return Ok(self.run.state),
                Err(e) => return Err(e),
            }
        }
    }

    /// Despacha exactamente una posición (step de función o marcador) y
    /// queda en `Paused`, preservando ip, frames y entorno. Encadenar
    /// `step_run` es observacionalmente equivalente a un único `run_all`.
    pub fn step_run(&mut self) -> Result<EngineState, EngineError> {
        self.dispatch_one()?;
        if !self.run.state.is_terminal() {
            self.run.state = EngineState::Paused;
        }
        Ok(self.run.state)
    }

    /// Limpia ip, frames y entorno; devuelve cada step a `Pending` con
    /// outputs vacíos y el engine a `Idle`.
    pub fn reset_execution(&mut self) {
        self.run = RunState::default();
        self.run_id = None;
        for step in &mut self.steps {
            step.reset();
        }
        let empty = Map::new();
        self.observers.emit_watch(0, &empty);
        self.observers
            .emit_output("execution reset; cleared runtime variables and step outputs");
    }

    // ------------------------------------------------------------------
    // Loop principal
    // ------------------------------------------------------------------

    /// Despacha la posición corriente y aplica el resultado al ip/estado.
    fn dispatch_one(&mut self) -> Result<(), EngineError> {
        if self.run.state.is_terminal() {
            return Err(EngineError::SequenceCompleted);
        }

        // La tabla de bloques se construye una única vez por corrida; una
        // secuencia malformada aborta antes de ejecutar step alguno.
        if self.run.blocks.is_none() {
            match mapper::map_blocks(&self.steps) {
                Ok(blocks) => self.run.blocks = Some(blocks),
                Err(e) => {
                    self.run.state = EngineState::Aborted;
                    self.observers.emit_output(&format!("malformed sequence: {e}"));
                    return Err(e);
                }
            }
            self.run_id = Some(Uuid::new_v4());
            self.observers.emit_output("sequence run started");
        }

        if self.run.ip >= self.steps.len() {
            self.run.state = EngineState::Completed;
            self.observers.emit_output("sequence complete");
            return Err(EngineError::SequenceCompleted);
        }

        self.run.state = EngineState::Running;
        let ip = self.run.ip;

        match self.dispatch_at(ip) {
            Ok(DispatchOutcome::Continue) => self.run.ip = ip + 1,
            Ok(DispatchOutcome::JumpTo(target)) => self.run.ip = target,
            Ok(DispatchOutcome::Fail { error, resume }) => match self.policy {
                FailurePolicy::ContinueOnFailure => self.run.ip = resume,
                FailurePolicy::AbortOnFailure => {
                    self.run.state = EngineState::Aborted;
                    self.observers.emit_output(&format!("aborting run: {error}"));
                    return Ok(());
                }
            },
            Err(e) => {
                // Error estructural en plena corrida (break sin loop).
                self.run.state = EngineState::Aborted;
                self.observers.emit_output(&format!("aborting run: {e}"));
                return Err(e);
            }
        }

        if self.run.ip >= self.steps.len() && self.run.state == EngineState::Running {
            self.run.state = EngineState::Completed;
            self.observers.emit_output("sequence complete");
        }
        Ok(())
    }

    fn dispatch_at(&mut self, ip: usize) -> Result<DispatchOutcome, EngineError> {
        match &self.steps[ip] {
            StepRecord::Control(ctl) => {
                let ctl = ctl.clone();
                self.dispatch_control(ip, &ctl)
            }
            StepRecord::Function(_) => self.dispatch_function(ip),
        }
    }

    // ------------------------------------------------------------------
    // Marcadores de control
    // ------------------------------------------------------------------

    fn dispatch_control(&mut self, ip: usize, ctl: &ControlStep) -> Result<DispatchOutcome, EngineError> {
        match ctl.kind {
            ControlKind::If => self.dispatch_if(ip, ctl),
            ControlKind::For => self.dispatch_for(ip, ctl),
            ControlKind::End => self.dispatch_end(ip),
            ControlKind::Break => self.dispatch_break(ip),
        }
    }

    fn dispatch_if(&mut self, ip: usize, ctl: &ControlStep) -> Result<DispatchOutcome, EngineError> {
        let end = self.block_end(ip)?;
        match resolver::resolve(&ctl.expr, ip, &self.steps, &self.run.env) {
            Ok(value) => {
                let truth = truthy(&value);
                self.observers
                    .emit_output(&format!("IF ({}) -> {}", ctl.expr, truth));
                self.observers.emit_status(ip, StepStatus::Success);
                if truth {
                    Ok(DispatchOutcome::Continue)
                } else {
                    Ok(DispatchOutcome::JumpTo(self.skip_block(ip, end)))
                }
            }
            Err(error) => {
                self.observers
                    .emit_output(&format!("IF ({}) failed: {error}", ctl.expr));
                self.observers.emit_status(ip, StepStatus::Failed);
                // Con política de continuar, el bloque entero queda sin
                // entrar y su cuerpo pendiente pasa a Skipped; el aborto lo
                // decide el loop principal (y deja todo Pending).
                if self.policy == FailurePolicy::ContinueOnFailure {
                    self.mark_skipped(ip + 1, end);
                }
                Ok(DispatchOutcome::Fail { error, resume: end + 1 })
            }
        }
    }

    fn dispatch_for(&mut self, ip: usize, ctl: &ControlStep) -> Result<DispatchOutcome, EngineError> {
        let end = self.block_end(ip)?;

        // Re-visita: el `end` emparejado saltó de vuelta a este `for`.
        let revisit = self.run.frames.last().map_or(false, |f| f.start == ip);
        if revisit {
            let advanced = match self.run.frames.last_mut() {
                Some(frame) => {
                    frame.pos += 1;
                    if frame.exhausted() {
                        None
                    } else {
                        Some((frame.var.clone(), frame.items[frame.pos].clone()))
                    }
                }
                None => return Err(EngineError::Internal(format!("missing loop frame at step {ip}"))),
            };
            return match advanced {
                Some((var, value)) => {
                    self.run.env.insert(var.clone(), value.clone());
                    self.observers
                        .emit_output(&format!("FOR next: {var} = {}", resolver::text_of(&value)));
                    self.observers.emit_watch(ip, &self.run.env);
                    self.observers.emit_status(ip, StepStatus::Success);
                    Ok(DispatchOutcome::Continue)
                }
                None => {
                    if let Some(frame) = self.run.frames.pop() {
                        self.unbind(frame);
                    }
                    self.observers.emit_output("FOR exhausted");
                    self.observers.emit_watch(ip, &self.run.env);
                    self.observers.emit_status(ip, StepStatus::Success);
                    // El cuerpo ya corrió todas sus iteraciones: no hay
                    // steps que marcar como saltados.
                    Ok(DispatchOutcome::JumpTo(end + 1))
                }
            };
        }

        // Primera visita en esta posición: materializar el iterable.
        match resolver::resolve(&ctl.expr, ip, &self.steps, &self.run.env) {
            Ok(value) => {
                let items = iterable_items(&value);
                self.observers
                    .emit_output(&format!("FOR over ({}) -> {} item(s)", ctl.expr, items.len()));
                if items.is_empty() {
                    self.observers.emit_status(ip, StepStatus::Success);
                    return Ok(DispatchOutcome::JumpTo(self.skip_block(ip, end)));
                }
                let first = items[0].clone();
                let shadowed = self.run.env.insert(ctl.var.clone(), first.clone());
                self.run.frames.push(LoopFrame { start: ip,
                                                 end,
                                                 var: ctl.var.clone(),
                                                 items,
                                                 pos: 0,
                                                 shadowed });
                self.observers
                    .emit_output(&format!("FOR enter: {} = {}", ctl.var, resolver::text_of(&first)));
                self.observers.emit_watch(ip, &self.run.env);
                self.observers.emit_status(ip, StepStatus::Success);
                Ok(DispatchOutcome::Continue)
            }
            Err(error) => {
                self.observers
                    .emit_output(&format!("FOR ({}) failed: {error}", ctl.expr));
                self.observers.emit_status(ip, StepStatus::Failed);
                if self.policy == FailurePolicy::ContinueOnFailure {
                    self.mark_skipped(ip + 1, end);
                }
                Ok(DispatchOutcome::Fail { error, resume: end + 1 })
            }
        }
    }

    fn dispatch_end(&mut self, ip: usize) -> Result<DispatchOutcome, EngineError> {
        self.observers.emit_status(ip, StepStatus::Success);
        // Cierra un `for` activo y no agotado: volver al opener para que la
        // rama de re-visita decida avance o salida. Cierra un `if` (o un
        // `for` ya desapilado): seguir de largo.
        if let Some(frame) = self.run.frames.last() {
            if frame.end == ip {
                return Ok(DispatchOutcome::JumpTo(frame.start));
            }
        }
        Ok(DispatchOutcome::Continue)
    }

    fn dispatch_break(&mut self, ip: usize) -> Result<DispatchOutcome, EngineError> {
        match self.run.frames.pop() {
            Some(frame) => {
                let target = frame.end + 1;
                self.unbind(frame);
                self.observers.emit_output("BREAK");
                self.observers.emit_watch(ip, &self.run.env);
                self.observers.emit_status(ip, StepStatus::Success);
                self.mark_skipped(ip + 1, target - 1);
                Ok(DispatchOutcome::JumpTo(target))
            }
            // Estructural: un break sin frame activo nunca es recuperable.
            None => Err(EngineError::BreakOutsideLoop(ip)),
        }
    }

    // ------------------------------------------------------------------
    // Steps de función
    // ------------------------------------------------------------------

    fn dispatch_function(&mut self, ip: usize) -> Result<DispatchOutcome, EngineError> {
        let (module, function, raw_params) = {
            let f = match self.steps[ip].as_function_mut() {
                Some(f) => f,
                None => return Err(EngineError::Internal(format!("step {ip} is not a function step"))),
            };
            f.status = StepStatus::Running;
            f.started_at = Some(Utc::now());
            f.finished_at = None;
            f.outputs = Map::new();
            (f.module.clone(), f.function.clone(), f.params.clone())
        };

        self.observers.emit_output(&format!("run {module}.{function} ..."));

        // Todo el trabajo inmutable junto: lookup, resolución, invocación.
        let invoked: Result<(Value, Vec<String>), EngineError> = (|| {
            let handle = self.catalog
                             .lookup(&module, &function)
                             .ok_or_else(|| EngineError::UnknownFunction { module:   module.clone(),
                                                                           function: function.clone() })?;
            let args = resolver::resolve_args(handle.parameter_names(),
                                              &raw_params,
                                              ip,
                                              &self.steps,
                                              &self.run.env)?;
            let returned = handle.invoke(&args)?;
            Ok((returned, handle.return_names().to_vec()))
        })();

        match invoked {
            Ok((returned, return_names)) => {
                if let Some(f) = self.steps[ip].as_function_mut() {
                    match returned {
                        // Un objeto se fusiona tal cual en los outputs.
                        Value::Object(map) => {
                            for (k, v) in map {
                                f.outputs.insert(k, v);
                            }
                        }
                        // Un retorno escalar va bajo `return` y bajo cada
                        // nombre de retorno declarado por el catálogo.
                        other => {
                            f.outputs.insert("return".to_string(), other.clone());
                            for name in &return_names {
                                f.outputs.insert(name.clone(), other.clone());
                            }
                        }
                    }
                    f.status = StepStatus::Success;
                    f.finished_at = Some(Utc::now());
                }
                self.observers.emit_output("ok");
                let snapshot = self.watch_snapshot(ip);
                self.observers.emit_watch(ip, &snapshot);
                self.observers.emit_status(ip, StepStatus::Success);
                Ok(DispatchOutcome::Continue)
            }
            Err(error) => Ok(self.fail_function(ip, error)),
        }
    }

    /// Captura un fallo local de step: lo registra en `outputs["error"]`,
    /// marca `Failed` y delega la política al loop principal. El error
    /// jamás desborda el límite del despacho.
    fn fail_function(&mut self, ip: usize, error: EngineError) -> DispatchOutcome {
        if let Some(f) = self.steps[ip].as_function_mut() {
            f.outputs
             .insert("error".to_string(), Value::String(error.to_string()));
            f.status = StepStatus::Failed;
            f.finished_at = Some(Utc::now());
        }
        self.observers.emit_output(&format!("error: {error}"));
        let snapshot = self.watch_snapshot(ip);
        self.observers.emit_watch(ip, &snapshot);
        self.observers.emit_status(ip, StepStatus::Failed);
        DispatchOutcome::Fail { error, resume: ip + 1 }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn block_end(&self, ip: usize) -> Result<usize, EngineError> {
        self.run
            .blocks
            .as_ref()
            .and_then(|m| m.get(&ip).copied())
            .ok_or_else(|| EngineError::Internal(format!("no matching end recorded for step {ip}")))
    }

    /// Marca como saltado el cuerpo de un bloque no entrado y devuelve el
    /// ip siguiente al `end`.
    fn skip_block(&mut self, opener: usize, end: usize) -> usize {
        self.mark_skipped(opener + 1, end);
        end + 1
    }

    /// Steps de función aún pendientes dentro de `[from, to)` pasan a
    /// `Skipped`, con su evento de status correspondiente.
    fn mark_skipped(&mut self, from: usize, to: usize) {
        for i in from..to.min(self.steps.len()) {
            let mut skipped = false;
            if let Some(f) = self.steps.get_mut(i).and_then(|s| s.as_function_mut()) {
                if f.status == StepStatus::Pending {
                    f.status = StepStatus::Skipped;
                    skipped = true;
                }
            }
            if skipped {
                self.observers.emit_status(i, StepStatus::Skipped);
            }
        }
    }

    /// Restaura el binding sombreado (o quita la variable) al salir de un
    /// frame de loop.
    fn unbind(&mut self, frame: LoopFrame) {
        match frame.shadowed {
            Some(previous) => {
                self.run.env.insert(frame.var, previous);
            }
            None => {
                self.run.env.remove(&frame.var);
            }
        }
    }

    /// Snapshot para el watcher: entorno corriente más los outputs del step
    /// (los outputs pisan en caso de colisión de nombres).
    fn watch_snapshot(&self, ip: usize) -> Map<String, Value> {
        let mut snapshot = self.run.env.clone();
        if let Some(f) = self.steps.get(ip).and_then(|s| s.as_function()) {
            for (k, v) in &f.outputs {
                snapshot.insert(k.clone(), v.clone());
            }
        }
        snapshot
    }
}

/// Regla de veracidad fija para condiciones de `if`: string vacío, `"0"` y
/// `"false"` son falsos; números son su comparación con cero; colecciones,
/// su no-vacuidad.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() || t == "0" || t.eq_ignore_ascii_case("false") {
                false
            } else if let Ok(parsed) = t.parse::<f64>() {
                parsed != 0.0
            } else {
                true
            }
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Materializa el iterable de un `for`: un entero no negativo itera
/// `0..n`; una lista itera sus elementos; un string intenta parsear como
/// lista JSON; cualquier otra cosa itera vacío (el bloque se salta).
pub(crate) fn iterable_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Number(n) => match n.as_u64() {
            Some(count) => (0..count).map(Value::from).collect(),
            None => Vec::new(),
        },
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|parsed| parsed.as_array().cloned())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
