//! Engine module: la máquina de estados de ejecución.
//!
//! Provee el motor central, el patrón builder y el estado de corrida
//! (frames de loop + entorno) para la ejecución determinista de secuencias.

pub mod builder;
pub mod core;
pub mod state;

pub use builder::{EngineBuilder, EngineBuilderInit};
pub use core::SequenceEngine;
pub use state::{DispatchOutcome, EngineState, FailurePolicy, LoopFrame, RunState};

pub use crate::catalog::{CallableFunction, FunctionCatalog, InMemoryCatalog, NativeFunction};
pub use crate::observer::ObserverBus;
pub use crate::step::{StepRecord, StepStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use serde_json::{json, Map, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn demo_catalog() -> InMemoryCatalog {
        let mut catalog = InMemoryCatalog::new();
        catalog.register(NativeFunction::new("math", "add", &["a", "b"], &["sum"], |args| {
            let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
            let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(json!(a + b))
        }));
        catalog.register(NativeFunction::new("math", "fail", &[], &[], |_| {
            Err(EngineError::invocation("intentional failure"))
        }));
        catalog.register(NativeFunction::new("strings", "echo", &["text"], &["text"], |args| {
            Ok(args.get("text").cloned().unwrap_or(Value::Null))
        }));
        catalog
    }

    fn outputs_of(engine: &SequenceEngine<InMemoryCatalog>, index: usize) -> Map<String, Value> {
        engine.step(index)
              .and_then(|s| s.as_function())
              .map(|f| f.outputs.clone())
              .unwrap_or_default()
    }

    #[test]
    fn linear_sequence_runs_every_step_once_in_order() {
        let order: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
        let mut engine = SequenceEngine::builder(demo_catalog())
            .steps(vec![StepRecord::function("math", "add").with_param("a", "1").with_param("b", "2"),
                        StepRecord::function("math", "add").with_param("a", "${#0:sum}").with_param("b", "10"),
                        StepRecord::function("strings", "echo").with_param("text", "done")])
            .build();
        let seen = order.clone();
        engine.on_status(move |i, st| {
            if st == StepStatus::Success {
                seen.borrow_mut().push(i);
            }
        });

        let state = engine.run_all().expect("no structural error");
        assert_eq!(state, EngineState::Completed);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert_eq!(outputs_of(&engine, 0).get("sum"), Some(&json!(3.0)));
        assert_eq!(outputs_of(&engine, 1).get("sum"), Some(&json!(13.0)));
    }

    #[test]
    fn false_condition_skips_block_and_marks_skipped() {
        let mut engine = SequenceEngine::builder(demo_catalog())
            .steps(vec![StepRecord::control_if("0"),
                        StepRecord::function("strings", "echo").with_param("text", "hidden"),
                        StepRecord::control_end(),
                        StepRecord::function("strings", "echo").with_param("text", "visible")])
            .build();

        assert_eq!(engine.run_all().expect("runs"), EngineState::Completed);
        assert_eq!(engine.step(1).and_then(StepRecord::status), Some(StepStatus::Skipped));
        assert_eq!(engine.step(3).and_then(StepRecord::status), Some(StepStatus::Success));
        assert!(outputs_of(&engine, 1).is_empty());
    }

    #[test]
    fn for_loop_binds_variable_per_iteration() {
        let mut engine = SequenceEngine::builder(demo_catalog())
            .steps(vec![StepRecord::control_for("i", "3"),
                        StepRecord::function("strings", "echo").with_param("text", "${@i}"),
                        StepRecord::control_end()])
            .build();
        let values: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = values.clone();
        engine.on_watch(move |i, snapshot| {
            if i == 1 {
                if let Some(v) = snapshot.get("text") {
                    sink.borrow_mut().push(v.clone());
                }
            }
        });

        assert_eq!(engine.run_all().expect("runs"), EngineState::Completed);
        assert_eq!(*values.borrow(), vec![json!(0), json!(1), json!(2)]);
        // Última iteración queda registrada en los outputs del cuerpo.
        assert_eq!(outputs_of(&engine, 1).get("return"), Some(&json!(2)));
        // El entorno de corrida no conserva la variable tras salir del loop.
        assert!(engine.environment().is_empty());
    }

    #[test]
    fn continue_policy_records_failure_and_proceeds() {
        let mut engine = SequenceEngine::builder(demo_catalog())
            .steps(vec![StepRecord::function("math", "fail"),
                        StepRecord::function("strings", "echo").with_param("text", "still here")])
            .failure_policy(FailurePolicy::ContinueOnFailure)
            .build();

        assert_eq!(engine.run_all().expect("runs"), EngineState::Completed);
        assert_eq!(engine.step(0).and_then(StepRecord::status), Some(StepStatus::Failed));
        assert!(outputs_of(&engine, 0).contains_key("error"));
        assert_eq!(engine.step(1).and_then(StepRecord::status), Some(StepStatus::Success));
    }

    #[test]
    fn abort_policy_stops_the_run_without_unwinding() {
        let mut engine = SequenceEngine::builder(demo_catalog())
            .steps(vec![StepRecord::function("math", "fail"),
                        StepRecord::function("strings", "echo").with_param("text", "unreached")])
            .failure_policy(FailurePolicy::AbortOnFailure)
            .build();

        // Fallo local: capturado, la corrida termina en Aborted sin Err.
        assert_eq!(engine.run_all().expect("captured"), EngineState::Aborted);
        assert_eq!(engine.step(1).and_then(StepRecord::status), Some(StepStatus::Pending));
    }

    #[test]
    fn unknown_function_is_a_step_local_failure() {
        let mut engine = SequenceEngine::builder(demo_catalog())
            .steps(vec![StepRecord::function("ghost", "nothing")])
            .build();
        assert_eq!(engine.run_all().expect("runs"), EngineState::Completed);
        let outputs = outputs_of(&engine, 0);
        let recorded = outputs.get("error").and_then(Value::as_str).unwrap_or("");
        assert!(recorded.contains("ghost.nothing"), "got: {recorded}");
    }

    #[test]
    fn break_outside_loop_is_structural_and_aborts() {
        let mut engine = SequenceEngine::builder(demo_catalog())
            .steps(vec![StepRecord::function("strings", "echo").with_param("text", "x"),
                        StepRecord::control_break()])
            .build();
        assert_eq!(engine.run_all(), Err(EngineError::BreakOutsideLoop(1)));
        assert_eq!(engine.state(), EngineState::Aborted);
    }

    #[test]
    fn step_run_pauses_between_dispatches() {
        let mut engine = SequenceEngine::builder(demo_catalog())
            .steps(vec![StepRecord::function("strings", "echo").with_param("text", "a"),
                        StepRecord::function("strings", "echo").with_param("text", "b")])
            .build();

        assert_eq!(engine.step_run().expect("first"), EngineState::Paused);
        assert_eq!(engine.current_index(), 1);
        assert_eq!(engine.step(0).and_then(StepRecord::status), Some(StepStatus::Success));
        assert_eq!(engine.step(1).and_then(StepRecord::status), Some(StepStatus::Pending));

        assert_eq!(engine.step_run().expect("second"), EngineState::Completed);
        assert_eq!(engine.step_run(), Err(EngineError::SequenceCompleted));
    }

    #[test]
    fn set_steps_is_rejected_while_paused() {
        let mut engine = SequenceEngine::builder(demo_catalog())
            .steps(vec![StepRecord::function("strings", "echo").with_param("text", "a"),
                        StepRecord::function("strings", "echo").with_param("text", "b")])
            .build();
        engine.step_run().expect("pauses");
        assert_eq!(engine.set_steps(Vec::new()), Err(EngineError::RunInProgress));
        engine.reset_execution();
        assert!(engine.set_steps(Vec::new()).is_ok());
    }

    #[test]
    fn lazy_params_may_change_before_their_step_runs() {
        let mut engine = SequenceEngine::builder(demo_catalog())
            .steps(vec![StepRecord::function("strings", "echo").with_param("text", "old"),
                        StepRecord::function("strings", "echo").with_param("text", "old")])
            .build();
        engine.step_run().expect("first step");
        engine.set_param(1, "text", "new").expect("param edit is lazy");
        engine.run_all().expect("finishes");
        assert_eq!(outputs_of(&engine, 1).get("return"), Some(&json!("new")));
    }

    #[test]
    fn reset_restores_pending_and_reruns_identically() {
        let mut engine = SequenceEngine::builder(demo_catalog())
            .steps(vec![StepRecord::function("math", "add").with_param("a", "2").with_param("b", "3"),
                        StepRecord::function("math", "add").with_param("a", "${#0:sum}").with_param("b", "1")])
            .build();

        engine.run_all().expect("first run");
        let first = (outputs_of(&engine, 0), outputs_of(&engine, 1));
        let first_run_id = engine.run_id();

        engine.reset_execution();
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.current_index(), 0);
        assert_eq!(engine.step(0).and_then(StepRecord::status), Some(StepStatus::Pending));
        assert!(outputs_of(&engine, 0).is_empty());

        engine.run_all().expect("second run");
        let second = (outputs_of(&engine, 0), outputs_of(&engine, 1));
        assert_eq!(first, second);
        assert_ne!(first_run_id, engine.run_id(), "cada corrida tiene su id");
    }

    #[test]
    fn empty_sequence_completes_immediately() {
        let mut engine = SequenceEngine::builder(demo_catalog()).steps(Vec::new()).build();
        assert_eq!(engine.run_all().expect("empty"), EngineState::Completed);
    }
}
