//! seqflow: runner de consola sobre el motor de secuencias.
//!
//! Uso:
//!   seqflow [archivo.json] [--policy continue|abort] [--step]
//!
//! Sin archivo corre una secuencia demo embebida. `--step` despacha de a una
//! posición (imprimiendo el estado tras cada pausa) en vez de correr de un
//! tirón. La secuencia JSON es la serialización serde de `Vec<StepRecord>`.

use std::fs;
use std::process::ExitCode;

use seq_adapters::build_default_catalog;
use seq_core::{EngineState, FailurePolicy, SequenceEngine, StepRecord};

struct CliOptions {
    sequence_file: Option<String>,
    policy: FailurePolicy,
    stepwise: bool,
}

fn parse_args(args: &[String]) -> Result<CliOptions, String> {
    let mut options = CliOptions { sequence_file: None,
                                   policy: FailurePolicy::ContinueOnFailure,
                                   stepwise: false };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--policy" => {
                let value = args.get(i + 1)
                                .ok_or_else(|| "--policy requires a value (continue|abort)".to_string())?;
                options.policy = match value.as_str() {
                    "continue" => FailurePolicy::ContinueOnFailure,
                    "abort" => FailurePolicy::AbortOnFailure,
                    other => return Err(format!("unknown policy '{other}' (expected continue|abort)")),
                };
                i += 2;
            }
            "--step" => {
                options.stepwise = true;
                i += 1;
            }
            flag if flag.starts_with("--") => return Err(format!("unknown flag '{flag}'")),
            path => {
                if options.sequence_file.is_some() {
                    return Err("only one sequence file is accepted".to_string());
                }
                options.sequence_file = Some(path.to_string());
                i += 1;
            }
        }
    }
    Ok(options)
}

fn load_sequence(options: &CliOptions) -> Result<Vec<StepRecord>, String> {
    match &options.sequence_file {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?;
            serde_json::from_str(&raw).map_err(|e| format!("invalid sequence in {path}: {e}"))
        }
        None => Ok(demo_sequence()),
    }
}

/// Secuencia demo: un loop con aritmética encadenada y una condición.
fn demo_sequence() -> Vec<StepRecord> {
    vec![StepRecord::function("math", "add").with_param("a", "1").with_param("b", "2"),
         StepRecord::control_for("i", "3"),
         StepRecord::function("math", "multiply")
             .with_param("a", "${#0:sum}")
             .with_param("b", "${@i}"),
         StepRecord::control_end(),
         StepRecord::control_if("${#2:mul}"),
         StepRecord::function("strings", "concat")
             .with_param("left", "final=")
             .with_param("right", "${#2:mul}"),
         StepRecord::control_end()]
}

fn print_summary(engine: &SequenceEngine<seq_core::InMemoryCatalog>) {
    println!("--- resumen ---");
    for (i, step) in engine.steps().iter().enumerate() {
        match step.as_function() {
            Some(f) => {
                let outputs = serde_json::to_string(&f.outputs).unwrap_or_else(|_| "{}".to_string());
                println!("  [{i}] {}.{} {:?} outputs={outputs}", f.module, f.function, f.status);
            }
            None => {
                let ctl = step.as_control().map(|c| c.kind);
                println!("  [{i}] control {ctl:?}");
            }
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("seqflow: {e}");
            return ExitCode::FAILURE;
        }
    };
    let steps = match load_sequence(&options) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("seqflow: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut engine = SequenceEngine::builder(build_default_catalog()).steps(steps)
                                                                     .failure_policy(options.policy)
                                                                     .build();
    engine.on_output(|line| println!("{line}"));
    engine.on_status(|i, status| println!("  step {i} -> {status:?}"));

    let result = if options.stepwise {
        loop {
            match engine.step_run() {
                Ok(EngineState::Paused) => println!("  (paused at {})", engine.current_index()),
                Ok(terminal) => break Ok(terminal),
                Err(e) => break Err(e),
            }
        }
    } else {
        engine.run_all()
    };

    match result {
        Ok(EngineState::Completed) => {
            print_summary(&engine);
            ExitCode::SUCCESS
        }
        Ok(state) => {
            print_summary(&engine);
            eprintln!("seqflow: run finished in state {state:?}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("seqflow: {e}");
            ExitCode::FAILURE
        }
    }
}
