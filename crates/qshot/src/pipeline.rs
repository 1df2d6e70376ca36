//! The compile-then-simulate pipeline.

use std::sync::Arc;

use qshot_adapter_sim::StatevectorSimulator;
use qshot_compile::compile;
use qshot_exec::{
    CancellationToken, Executor, LabeledFormatter, LabeledShot, ResultAggregator, ResultSet,
    ShotSpec, Simulator,
};
use qshot_ir::Module;
use qshot_profile::{AttributeExtractor, EntryPointAttributes, validate};
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::PipelineConfig;
use crate::error::PipelineResult;

/// Artifacts of the synchronous stages.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Attributes extracted before compilation. Compilation keeps them valid.
    pub attributes: EntryPointAttributes,
    /// The compiled QIS module.
    pub qis: Module,
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub attributes: EntryPointAttributes,
    #[serde(skip)]
    pub bitcode: Vec<u8>,
    pub results: ResultSet,
    /// Present when `output.labeled` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labeled: Option<Vec<LabeledShot>>,
}

impl PipelineReport {
    /// JSON with the attributes, the result set and, if present, the
    /// labeled records. Bitcode is left out.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Runs QIR text through load, validate, extract, compile, execute,
/// aggregate and (optionally) format.
///
/// Every stage consumes the previous stage's output and returns a new
/// value, so a failing stage leaves nothing half-modified behind.
pub struct Pipeline {
    config: PipelineConfig,
    simulator: Arc<dyn Simulator>,
}

impl Pipeline {
    /// Pipeline backed by the local statevector simulator.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_simulator(config, Arc::new(StatevectorSimulator::new()))
    }

    /// Pipeline backed by any [`Simulator`].
    pub fn with_simulator(config: PipelineConfig, simulator: Arc<dyn Simulator>) -> Self {
        Self { config, simulator }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load, validate, extract and compile.
    ///
    /// Stops at the first failing stage; later stages never see a module
    /// that an earlier stage rejected.
    #[instrument(skip_all, fields(target = %self.config.compile.target, level = self.config.compile.opt_level))]
    pub fn prepare(&self, source: &str) -> PipelineResult<Prepared> {
        self.config.validate()?;

        let module = qshot_ir::load(source)?;
        validate(&module)?;
        let attributes = AttributeExtractor::new(self.config.extraction_policy()).extract(&module)?;
        let qis = compile(module, &self.config.compilation_target())?;

        info!(
            entry_point = attributes.entry_point(),
            num_qubits = attributes.num_qubits(),
            num_results = attributes.num_results(),
            bitcode_bytes = qis.bitcode().len(),
            "Prepared QIS module"
        );
        Ok(Prepared { attributes, qis })
    }

    /// Execute, aggregate and, when configured, label the records.
    pub async fn run(&self, prepared: Prepared) -> PipelineResult<PipelineReport> {
        self.run_cancellable(prepared, &CancellationToken::new()).await
    }

    /// [`run`](Self::run) with a caller-owned token. The token only affects
    /// this batch; later runs start with a fresh one.
    #[instrument(skip_all, fields(shots = self.config.execution.shots, seed = self.config.execution.seed))]
    pub async fn run_cancellable(
        &self,
        prepared: Prepared,
        cancel: &CancellationToken,
    ) -> PipelineResult<PipelineReport> {
        let Prepared { attributes, qis } = prepared;
        let spec = ShotSpec {
            simulator: Arc::clone(&self.simulator),
            num_qubits: attributes.num_qubits(),
            num_results: attributes.num_results(),
            shots: self.config.execution.shots,
            seed: self.config.execution.seed,
        };

        let bitcode = qis.bitcode().to_vec();
        let executor = Executor::new(self.config.executor_config());
        let batch = executor.run(Arc::new(qis), &spec, cancel).await?;

        let results =
            ResultAggregator::new(self.config.aggregation_policy()).aggregate(&batch, &attributes);
        let labeled = if self.config.output.labeled {
            Some(LabeledFormatter::new().format(&results, &attributes)?)
        } else {
            None
        };

        info!(
            shots = results.len(),
            failed = results.failed(),
            batch_error = results.batch_error.is_some(),
            "Pipeline run complete"
        );
        Ok(PipelineReport {
            attributes,
            bitcode,
            results,
            labeled,
        })
    }

    /// [`prepare`](Self::prepare) then [`run`](Self::run).
    pub async fn run_source(&self, source: &str) -> PipelineResult<PipelineReport> {
        let prepared = self.prepare(source)?;
        self.run(prepared).await
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("simulator", &self.simulator.name())
            .finish()
    }
}
