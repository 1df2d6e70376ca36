//! Parallel, order-preserving shot execution.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use qshot_ir::Module;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::error::{ExecResult, ExecutionError, ShotFault};
use crate::simulator::{
    RawShotPayload, ShotContext, ShotSizing, Simulator, SimulatorAccess, derive_seed,
};

/// A batch of shots to run.
#[derive(Clone)]
pub struct ShotSpec {
    pub simulator: Arc<dyn Simulator>,
    pub num_qubits: u32,
    pub num_results: u32,
    pub shots: u64,
    pub seed: u64,
}

impl ShotSpec {
    pub fn sizing(&self) -> ShotSizing {
        ShotSizing {
            num_qubits: self.num_qubits,
            num_results: self.num_results,
        }
    }
}

impl std::fmt::Debug for ShotSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShotSpec")
            .field("simulator", &self.simulator.name())
            .field("num_qubits", &self.num_qubits)
            .field("num_results", &self.num_results)
            .field("shots", &self.shots)
            .field("seed", &self.seed)
            .finish()
    }
}

/// Executor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound on concurrently running shots.
    pub workers: usize,
    /// How long in-flight shots may keep running after cancellation.
    pub cancel_grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            cancel_grace: Duration::from_millis(1000),
        }
    }
}

/// What became of one shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShotOutput {
    Completed(RawShotPayload),
    Faulted(ShotFault),
    /// Never started, or still running when the cancellation grace ran out.
    Abandoned,
}

impl ShotOutput {
    pub fn payload(&self) -> Option<&RawShotPayload> {
        match self {
            Self::Completed(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Per-shot outputs in shot-index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionBatch {
    pub batch_id: Uuid,
    pub outputs: Vec<ShotOutput>,
    pub cancelled: bool,
}

impl ExecutionBatch {
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Runs shots of a QIS module on a pool of blocking worker lanes.
///
/// Each lane pulls the next shot index from a shared counter, so no shot
/// waits on another. Outputs are written into the slot of their index.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every shot of `spec` against `module`.
    ///
    /// Fails only if the simulator cannot load the module; shot faults,
    /// simulator panics and cancellation are reported per shot.
    #[instrument(skip_all, fields(simulator = spec.simulator.name(), shots = spec.shots, batch_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        module: Arc<Module>,
        spec: &ShotSpec,
        cancel: &CancellationToken,
    ) -> ExecResult<ExecutionBatch> {
        let batch_id = Uuid::new_v4();
        tracing::Span::current().record("batch_id", tracing::field::display(batch_id));

        if self.config.workers == 0 {
            return Err(ExecutionError::InvalidSpec(
                "worker count must be at least 1".into(),
            ));
        }
        let total = usize::try_from(spec.shots).map_err(|_| {
            ExecutionError::InvalidSpec(format!("{} shots do not fit in memory", spec.shots))
        })?;

        let sizing = spec.sizing();
        let lanes = self.lanes(spec, total);
        for simulator in &lanes {
            simulator.load(&module, &sizing)?;
        }
        info!(lanes = lanes.len(), "Starting batch");

        let mut outputs: Vec<Option<ShotOutput>> = vec![None; total];
        let next = Arc::new(AtomicU64::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel::<(u64, ShotOutput)>();

        for simulator in lanes {
            let lane = Lane {
                simulator,
                module: Arc::clone(&module),
                next: Arc::clone(&next),
                shots: spec.shots,
                seed: spec.seed,
                sizing,
                cancel: cancel.clone(),
                tx: tx.clone(),
            };
            tokio::task::spawn_blocking(move || lane.drain());
        }
        drop(tx);

        let mut deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some((index, output)) => {
                        if let Some(slot) = usize::try_from(index).ok().and_then(|i| outputs.get_mut(i)) {
                            *slot = Some(output);
                        }
                    }
                    None => break,
                },
                () = cancel.cancelled(), if deadline.is_none() => {
                    debug!("Cancellation requested, waiting for in-flight shots");
                    deadline = Some(Instant::now() + self.config.cancel_grace);
                }
                () = sleep_until(deadline), if deadline.is_some() => {
                    warn!("Cancellation grace expired, abandoning in-flight shots");
                    break;
                }
            }
        }

        let cancelled = deadline.is_some() || cancel.is_cancelled();
        let outputs: Vec<ShotOutput> = outputs
            .into_iter()
            .map(|o| o.unwrap_or(ShotOutput::Abandoned))
            .collect();
        let faulted = outputs
            .iter()
            .filter(|o| matches!(o, ShotOutput::Faulted(_)))
            .count();
        let abandoned = outputs
            .iter()
            .filter(|o| matches!(o, ShotOutput::Abandoned))
            .count();
        info!(faulted, abandoned, cancelled, "Batch finished");

        Ok(ExecutionBatch {
            batch_id,
            outputs,
            cancelled,
        })
    }

    /// One simulator per lane. Exclusive simulators only get more than one
    /// lane when they can be replicated.
    fn lanes(&self, spec: &ShotSpec, total: usize) -> Vec<Arc<dyn Simulator>> {
        let wanted = self.config.workers.min(total).max(1);
        let mut lanes = vec![Arc::clone(&spec.simulator)];
        match spec.simulator.access() {
            SimulatorAccess::Concurrent => {
                lanes.resize_with(wanted, || Arc::clone(&spec.simulator));
            }
            SimulatorAccess::Exclusive => {
                while lanes.len() < wanted {
                    match spec.simulator.replicate() {
                        Some(replica) => lanes.push(replica),
                        None => {
                            debug!("Simulator is exclusive and not replicable, running sequentially");
                            break;
                        }
                    }
                }
            }
        }
        lanes
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct Lane {
    simulator: Arc<dyn Simulator>,
    module: Arc<Module>,
    next: Arc<AtomicU64>,
    shots: u64,
    seed: u64,
    sizing: ShotSizing,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<(u64, ShotOutput)>,
}

impl Lane {
    fn drain(self) {
        while !self.cancel.is_cancelled() {
            let index = self.next.fetch_add(1, Ordering::Relaxed);
            if index >= self.shots {
                break;
            }
            let context = ShotContext {
                shot_index: index,
                seed: derive_seed(self.seed, index),
                num_qubits: self.sizing.num_qubits,
                num_results: self.sizing.num_results,
            };
            let output = match catch_unwind(AssertUnwindSafe(|| {
                self.simulator.run_shot(&self.module, &context)
            })) {
                Ok(Ok(payload)) => ShotOutput::Completed(payload),
                Ok(Err(fault)) => ShotOutput::Faulted(fault),
                Err(panic) => ShotOutput::Faulted(ShotFault::new(format!(
                    "simulator panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };
            if self.tx.send((index, output)).is_err() {
                // The batch stopped listening.
                break;
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::RawValue;
    use std::sync::Mutex;

    struct Echo;

    impl Simulator for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn load(&self, _module: &Module, _sizing: &ShotSizing) -> ExecResult<()> {
            Ok(())
        }

        fn run_shot(
            &self,
            _module: &Module,
            context: &ShotContext,
        ) -> Result<RawShotPayload, ShotFault> {
            let mut payload = RawShotPayload::new();
            #[allow(clippy::cast_possible_wrap)]
            payload.push("USER:INT:i", RawValue::Int(context.shot_index as i64));
            Ok(payload)
        }
    }

    /// Exclusive and not replicable; counts concurrent callers.
    struct Single {
        active: Mutex<usize>,
        peak: Mutex<usize>,
    }

    impl Simulator for Single {
        fn name(&self) -> &str {
            "single"
        }

        fn load(&self, _module: &Module, _sizing: &ShotSizing) -> ExecResult<()> {
            Ok(())
        }

        fn run_shot(
            &self,
            _module: &Module,
            _context: &ShotContext,
        ) -> Result<RawShotPayload, ShotFault> {
            {
                let mut active = self.active.lock().unwrap();
                *active += 1;
                let mut peak = self.peak.lock().unwrap();
                *peak = (*peak).max(*active);
            }
            std::thread::sleep(Duration::from_millis(2));
            *self.active.lock().unwrap() -= 1;
            Ok(RawShotPayload::new())
        }

        fn access(&self) -> SimulatorAccess {
            SimulatorAccess::Exclusive
        }
    }

    fn module() -> Arc<Module> {
        Arc::new(qshot_ir::load("define void @main() {\nentry:\n  ret void\n}\n").unwrap())
    }

    fn spec(simulator: Arc<dyn Simulator>, shots: u64) -> ShotSpec {
        ShotSpec {
            simulator,
            num_qubits: 1,
            num_results: 0,
            shots,
            seed: 7,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_outputs_in_index_order() {
        let executor = Executor::new(ExecutorConfig {
            workers: 3,
            ..Default::default()
        });
        let batch = executor
            .run(module(), &spec(Arc::new(Echo), 10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(batch.len(), 10);
        assert!(!batch.cancelled);
        for (i, output) in batch.outputs.iter().enumerate() {
            let payload = output.payload().unwrap();
            assert_eq!(payload.entries[0].value, RawValue::Int(i as i64));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_exclusive_simulator_runs_sequentially() {
        let simulator = Arc::new(Single {
            active: Mutex::new(0),
            peak: Mutex::new(0),
        });
        let executor = Executor::new(ExecutorConfig {
            workers: 4,
            ..Default::default()
        });
        let batch = executor
            .run(module(), &spec(simulator.clone(), 8), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(batch.len(), 8);
        assert_eq!(*simulator.peak.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let executor = Executor::new(ExecutorConfig {
            workers: 0,
            ..Default::default()
        });
        let err = executor
            .run(module(), &spec(Arc::new(Echo), 1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidSpec(_)));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let batch = Executor::default()
            .run(module(), &spec(Arc::new(Echo), 0), &CancellationToken::new())
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_panic_message() {
        let panic: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(panic.as_ref()), "boom");
        let panic: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(panic.as_ref()), "bang");
    }
}
