//! Builder para `SequenceEngine`.
//!
//! Estado inicial con sólo el catálogo; el builder completo acumula steps y
//! política de fallo y construye el engine listo para correr.

use crate::catalog::FunctionCatalog;
use crate::engine::core::SequenceEngine;
use crate::engine::state::FailurePolicy;
use crate::step::StepRecord;

/// Estado inicial del builder: el catálogo debe estar presente.
pub struct EngineBuilderInit<C: FunctionCatalog> {
    pub catalog: C,
}

impl<C: FunctionCatalog> EngineBuilderInit<C> {
    /// Fija la lista completa de steps y transiciona al builder completo.
    #[inline]
    pub fn steps(self, steps: Vec<StepRecord>) -> EngineBuilder<C> {
        EngineBuilder { catalog: self.catalog,
                        steps,
                        policy: FailurePolicy::default() }
    }

    /// Builder completo sin steps (para poblarlo con `add_step`).
    #[inline]
    pub fn empty(self) -> EngineBuilder<C> {
        self.steps(Vec::new())
    }
}

/// Builder principal: acumula steps en orden y la política de fallo.
pub struct EngineBuilder<C: FunctionCatalog> {
    catalog: C,
    steps: Vec<StepRecord>,
    policy: FailurePolicy,
}

impl<C: FunctionCatalog> EngineBuilder<C> {
    /// Añade un step al final de la secuencia.
    #[inline]
    pub fn add_step(mut self, step: StepRecord) -> Self {
        self.steps.push(step);
        self
    }

    #[inline]
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Construye el engine final. Consume el builder.
    #[inline]
    pub fn build(self) -> SequenceEngine<C> {
        SequenceEngine::from_parts(self.catalog, self.steps, self.policy)
    }
}
