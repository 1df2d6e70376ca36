//! Executor and aggregation behaviour under faults, delays and cancellation.
//!
//! The simulators here are scripted: they derive their output from the
//! shot context alone so that any scheduling effect would show up as a
//! change in the result set.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use qshot_exec::{
    BatchError, CancellationToken, ExecResult, ExecutionError, Executor, ExecutorConfig,
    LabeledFormatter, RawShotPayload, RawValue, ResultAggregator, ShotContext, ShotErrorKind,
    ShotFault, ShotRecord, ShotSizing, ShotSpec, ShotValue, Simulator, SimulatorAccess,
};
use qshot_ir::Module;
use qshot_profile::EntryPointAttributes;

const PROGRAM: &str = r#"
define void @main() #0 {
entry:
  call void @__quantum__rt__result_record_output(ptr null, ptr @0)
  call void @__quantum__rt__int_record_output(i64 0, ptr @1)
  ret void
}
declare void @__quantum__rt__result_record_output(ptr, ptr)
declare void @__quantum__rt__int_record_output(i64, ptr)
@0 = internal constant [4 x i8] c"bit\00"
@1 = internal constant [5 x i8] c"seed\00"
attributes #0 = { "entry_point" "qir_profiles"="adaptive_profile" "required_num_qubits"="1" "required_num_results"="1" }
"#;

fn setup() -> (Arc<Module>, EntryPointAttributes) {
    let module = qshot_ir::load(PROGRAM).unwrap();
    let attributes = qshot_profile::extract(&module).unwrap();
    (Arc::new(module), attributes)
}

/// Prints the low seed bit and the seed; optionally faults, sleeps or panics.
#[derive(Default)]
struct Scripted {
    fault_on: Option<u64>,
    panic_on: Option<u64>,
    /// Later shots finish first.
    reverse_delay: bool,
    slow: Option<Duration>,
    started: AtomicUsize,
}

impl Simulator for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn load(&self, _module: &Module, sizing: &ShotSizing) -> ExecResult<()> {
        if sizing.num_qubits == 0 {
            return Err(ExecutionError::Load {
                simulator: self.name().into(),
                message: "no qubits".into(),
            });
        }
        Ok(())
    }

    fn run_shot(&self, _module: &Module, context: &ShotContext) -> Result<RawShotPayload, ShotFault> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if self.reverse_delay {
            std::thread::sleep(Duration::from_millis(5 * (10 - context.shot_index.min(10))));
        }
        if let Some(slow) = self.slow {
            std::thread::sleep(slow);
        }
        if self.fault_on == Some(context.shot_index) {
            return Err(ShotFault::new("physical constraint violated"));
        }
        if self.panic_on == Some(context.shot_index) {
            panic!("simulator bug");
        }
        let mut payload = RawShotPayload::new();
        payload.push("USER:RESULT:bit", RawValue::Bool(context.seed & 1 == 1));
        #[allow(clippy::cast_possible_wrap)]
        payload.push("USER:INT:seed", RawValue::Int(context.seed as i64));
        Ok(payload)
    }
}

fn spec(simulator: Arc<dyn Simulator>, shots: u64, seed: u64) -> ShotSpec {
    ShotSpec {
        simulator,
        num_qubits: 1,
        num_results: 1,
        shots,
        seed,
    }
}

fn executor(workers: usize) -> Executor {
    Executor::new(ExecutorConfig {
        workers,
        cancel_grace: Duration::from_millis(200),
    })
}

// ============================================================================
// Ordering and determinism
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delay_injection_keeps_index_order() {
    let (module, attributes) = setup();
    let aggregator = ResultAggregator::default();

    let delayed = Arc::new(Scripted {
        reverse_delay: true,
        ..Default::default()
    });
    let batch = executor(4)
        .run(module.clone(), &spec(delayed, 10, 3), &CancellationToken::new())
        .await
        .unwrap();
    let shuffled = aggregator.aggregate(&batch, &attributes);

    let batch = executor(1)
        .run(module, &spec(Arc::new(Scripted::default()), 10, 3), &CancellationToken::new())
        .await
        .unwrap();
    let sequential = aggregator.aggregate(&batch, &attributes);

    assert_eq!(shuffled, sequential);
    for (i, record) in shuffled.records.iter().enumerate() {
        let values = record.values().unwrap();
        #[allow(clippy::cast_possible_wrap)]
        let expected = qshot_exec::derive_seed(3, i as u64) as i64;
        assert_eq!(values[1], ShotValue::Int(expected));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_count_does_not_change_results() {
    let (module, attributes) = setup();
    let aggregator = ResultAggregator::default();
    let mut sets = Vec::new();
    for workers in [1, 2, 8] {
        let batch = executor(workers)
            .run(module.clone(), &spec(Arc::new(Scripted::default()), 25, 42), &CancellationToken::new())
            .await
            .unwrap();
        sets.push(serde_json::to_string(&aggregator.aggregate(&batch, &attributes)).unwrap());
    }
    assert_eq!(sets[0], sets[1]);
    assert_eq!(sets[1], sets[2]);
}

// ============================================================================
// Partial failure
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fault_in_shot_three_of_five() {
    let (module, attributes) = setup();
    let simulator = Arc::new(Scripted {
        fault_on: Some(3),
        ..Default::default()
    });
    let batch = executor(2)
        .run(module, &spec(simulator, 5, 0), &CancellationToken::new())
        .await
        .unwrap();
    let results = ResultAggregator::default().aggregate(&batch, &attributes);

    assert_eq!(results.len(), 5);
    for i in [0, 1, 2, 4] {
        assert!(results.records[i].is_ok(), "shot {i}");
    }
    let error = results.records[3].error().unwrap();
    assert_eq!(error.kind, ShotErrorKind::Fault);
    assert_eq!(error.message, "physical constraint violated");
    assert_eq!(results.batch_error, None);

    let labeled = LabeledFormatter::new().format(&results, &attributes).unwrap();
    assert_eq!(labeled.len(), 5);
    assert!(labeled[3].fields().is_none());
    assert_eq!(labeled[0].fields().unwrap().len(), 2);
}

#[tokio::test]
async fn test_panic_becomes_fault() {
    let (module, attributes) = setup();
    let simulator = Arc::new(Scripted {
        panic_on: Some(1),
        ..Default::default()
    });
    let batch = executor(1)
        .run(module, &spec(simulator, 3, 0), &CancellationToken::new())
        .await
        .unwrap();
    let results = ResultAggregator::default().aggregate(&batch, &attributes);
    let error = results.records[1].error().unwrap();
    assert!(error.message.contains("simulator bug"), "{}", error.message);
    assert!(results.records[2].is_ok());
}

#[tokio::test]
async fn test_every_shot_failing_sets_batch_error() {
    let (module, attributes) = setup();
    let simulator = Arc::new(Scripted {
        fault_on: Some(0),
        ..Default::default()
    });
    let batch = executor(1)
        .run(module, &spec(simulator, 1, 0), &CancellationToken::new())
        .await
        .unwrap();
    let results = ResultAggregator::default().aggregate(&batch, &attributes);
    assert_eq!(results.batch_error, Some(BatchError::AllFailed { total: 1 }));
}

#[tokio::test]
async fn test_load_failure_is_fatal() {
    let (module, _) = setup();
    let mut spec = spec(Arc::new(Scripted::default()), 5, 0);
    spec.num_qubits = 0;
    let err = executor(2)
        .run(module, &spec, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::Load { .. }));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_keeps_completed_shots() {
    let (module, attributes) = setup();
    let simulator = Arc::new(Scripted {
        slow: Some(Duration::from_millis(20)),
        ..Default::default()
    });
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(70)).await;
        canceller.cancel();
    });

    let batch = executor(1)
        .run(module, &spec(simulator.clone(), 1000, 0), &token)
        .await
        .unwrap();
    assert!(batch.cancelled);
    assert_eq!(batch.len(), 1000);

    let results = ResultAggregator::default().aggregate(&batch, &attributes);
    let completed = results.records.iter().filter(|r| r.is_ok()).count();
    assert!(completed >= 1, "no shot completed");
    assert!(completed < 1000);
    assert!(results.records[..completed].iter().all(ShotRecord::is_ok));
    assert!(matches!(
        results.batch_error,
        Some(BatchError::Cancelled { .. })
    ));
    assert!(simulator.started.load(Ordering::SeqCst) < 1000);
}

#[tokio::test]
async fn test_exclusive_simulator_is_replicated() {
    struct Replicable {
        replicas: Arc<AtomicUsize>,
    }

    impl Simulator for Replicable {
        fn name(&self) -> &str {
            "replicable"
        }

        fn load(&self, _module: &Module, _sizing: &ShotSizing) -> ExecResult<()> {
            Ok(())
        }

        fn run_shot(&self, _module: &Module, _context: &ShotContext) -> Result<RawShotPayload, ShotFault> {
            Ok(RawShotPayload::new())
        }

        fn access(&self) -> SimulatorAccess {
            SimulatorAccess::Exclusive
        }

        fn replicate(&self) -> Option<Arc<dyn Simulator>> {
            self.replicas.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(Self {
                replicas: Arc::clone(&self.replicas),
            }))
        }
    }

    let (module, _) = setup();
    let replicas = Arc::new(AtomicUsize::new(0));
    let simulator = Arc::new(Replicable {
        replicas: Arc::clone(&replicas),
    });
    let batch = executor(3)
        .run(module, &spec(simulator, 6, 0), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(batch.len(), 6);
    assert_eq!(replicas.load(Ordering::SeqCst), 2);
}
