//! End-to-end pipeline tests.
//!
//! Each test feeds a QIR fixture from `tests/data/` through the full
//! load → validate → extract → compile → execute → aggregate → format chain
//! and checks the observable artifacts.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use qshot::qshot_adapter_sim::StatevectorSimulator;
use qshot::qshot_compile::{CompilationError, CompilationTarget, compile};
use qshot::qshot_exec::{
    BatchError, CancellationToken, ExecResult, RawShotPayload, ShotContext, ShotFault, ShotSizing,
    ShotValue, Simulator,
};
use qshot::qshot_ir::Module;
use qshot::qshot_profile::{AttributeValue, CountSource, RuleClass, extract};
use qshot::{Pipeline, PipelineConfig, PipelineError, Prepared};

const BELL: &str = include_str!("data/bell.ll");
const NO_ENTRY_POINT: &str = include_str!("data/no_entry_point.ll");
const NO_QUBIT_COUNT: &str = include_str!("data/no_qubit_count.ll");
const ROTATIONS: &str = include_str!("data/rotations.ll");
const FEEDBACK: &str = include_str!("data/feedback.ll");
const HELPER_OUTPUT: &str = include_str!("data/helper_output.ll");
const HELPER_MEASURE: &str = include_str!("data/helper_measure.ll");
const SHOT_RUNTIME: &str = include_str!("data/shot_runtime.ll");

fn config(target: &str, opt_level: u8, shots: u64, seed: u64) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.compile.target = target.to_string();
    config.compile.opt_level = opt_level;
    config.execution.shots = shots;
    config.execution.seed = seed;
    config
}

/// Statevector simulator that counts how often it is touched.
#[derive(Default)]
struct Counting {
    inner: StatevectorSimulator,
    loads: AtomicUsize,
    shots: AtomicUsize,
}

impl Simulator for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn load(&self, module: &Module, sizing: &ShotSizing) -> ExecResult<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(module, sizing)
    }

    fn run_shot(&self, module: &Module, context: &ShotContext) -> Result<RawShotPayload, ShotFault> {
        self.shots.fetch_add(1, Ordering::SeqCst);
        self.inner.run_shot(module, context)
    }
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_bell_end_to_end() {
    let mut config = config("helios", 2, 5, 0);
    config.output.labeled = true;
    let pipeline = Pipeline::new(config);

    let report = pipeline.run_source(BELL).await.unwrap();
    assert_eq!(report.attributes.num_qubits(), 2);
    assert_eq!(report.attributes.num_results(), 2);
    assert_eq!(report.results.len(), 5);
    assert!(report.results.batch_error.is_none());
    assert!(!report.bitcode.is_empty());

    let labeled = report.labeled.as_ref().unwrap();
    assert_eq!(labeled.len(), 5);
    for shot in labeled {
        let fields = shot.fields().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "alice");
        assert_eq!(fields[1].0, "bob");
        // Bell pair: both qubits always agree.
        assert_eq!(shot.get("alice"), shot.get("bob"));
    }

    let again = pipeline.run_source(BELL).await.unwrap();
    assert_eq!(again.results, report.results);
    assert_eq!(again.labeled, report.labeled);
    assert_eq!(again.bitcode, report.bitcode);
}

#[tokio::test]
async fn test_labeled_toggle_keeps_results() {
    let plain = Pipeline::new(config("helios", 2, 16, 3));
    let mut labeled_config = config("helios", 2, 16, 3);
    labeled_config.output.labeled = true;
    let labeled = Pipeline::new(labeled_config);

    let a = plain.run_source(BELL).await.unwrap();
    let b = labeled.run_source(BELL).await.unwrap();
    assert!(a.labeled.is_none());
    assert!(b.labeled.is_some());
    assert_eq!(a.results, b.results);
}

#[tokio::test]
async fn test_report_serializes() {
    let mut config = config("helios", 1, 2, 9);
    config.output.labeled = true;
    let report = Pipeline::new(config).run_source(BELL).await.unwrap();

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["results"]["records"].as_array().unwrap().len(), 2);
    let first = &json["labeled"][0];
    assert!(first["alice"] == 0 || first["alice"] == 1);
    assert!(json.get("bitcode").is_none());
}

// ============================================================================
// Structural failures
// ============================================================================

#[tokio::test]
async fn test_missing_entry_point_stops_pipeline() {
    let simulator = Arc::new(Counting::default());
    let pipeline = Pipeline::with_simulator(config("helios", 2, 5, 0), simulator.clone());

    let err = pipeline.run_source(NO_ENTRY_POINT).await.unwrap_err();
    assert_eq!(err.stage(), "validate");
    let validation = match err {
        PipelineError::Validation(validation) => validation,
        other => panic!("expected validation error, got {other}"),
    };
    assert_eq!(validation.of_rule(RuleClass::EntryPoint).count(), 1);
    assert!(validation.to_string().contains("entry point"));

    assert_eq!(simulator.loads.load(Ordering::SeqCst), 0);
    assert_eq!(simulator.shots.load(Ordering::SeqCst), 0);
}

#[test]
fn test_parse_error_stage() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let err = pipeline.prepare("define void @main( {").unwrap_err();
    assert_eq!(err.stage(), "load");
}

#[test]
fn test_invalid_config_rejected_before_loading() {
    let mut config = PipelineConfig::default();
    config.execution.workers = 0;
    let err = Pipeline::new(config).prepare(BELL).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn test_feedback_rejected_by_iqm() {
    let err = Pipeline::new(config("iqm", 2, 5, 0))
        .prepare(FEEDBACK)
        .unwrap_err();
    assert_eq!(err.stage(), "compile");
    let (target, construct) = match err {
        PipelineError::Compilation(CompilationError::Unsupported { target, construct }) => {
            (target, construct)
        }
        other => panic!("expected unsupported construct, got {other}"),
    };
    assert_eq!(target, "iqm");
    assert!(construct.contains("feedback"));
}

// ============================================================================
// Compiler properties
// ============================================================================

#[tokio::test]
async fn test_opt_levels_simulate_identically() {
    for target in ["helios", "iqm"] {
        let level0 = Pipeline::new(config(target, 0, 32, 11));
        let level3 = Pipeline::new(config(target, 3, 32, 11));

        let a = level0.run_source(ROTATIONS).await.unwrap();
        let b = level3.run_source(ROTATIONS).await.unwrap();
        assert_ne!(a.bitcode, b.bitcode);
        assert_eq!(a.results, b.results, "target {target}");
    }
}

#[tokio::test]
async fn test_recompiling_is_a_noop() {
    let pipeline = Pipeline::new(config("helios", 2, 8, 5));
    let prepared = pipeline.prepare(BELL).unwrap();

    let target = CompilationTarget::new("helios", 2).unwrap();
    let recompiled = compile(prepared.qis.clone(), &target).unwrap();
    assert_eq!(recompiled, prepared.qis);

    let first = pipeline.run(prepared.clone()).await.unwrap();
    let second = pipeline
        .run(Prepared {
            attributes: prepared.attributes,
            qis: recompiled,
        })
        .await
        .unwrap();
    assert_eq!(first.results, second.results);
}

#[test]
fn test_compilation_preserves_attributes() {
    let prepared = Pipeline::new(config("iqm", 3, 1, 0)).prepare(BELL).unwrap();
    let after = extract(&prepared.qis).unwrap();
    assert_eq!(after, prepared.attributes);
    assert_eq!(
        after.get("vendor_hint"),
        Some(&AttributeValue::Text("keep-me".to_string()))
    );
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_results_independent_of_worker_count() {
    let mut outputs = Vec::new();
    for workers in [1, 3, 8] {
        let mut config = config("helios", 2, 64, 42);
        config.execution.workers = workers;
        let report = Pipeline::new(config).run_source(ROTATIONS).await.unwrap();
        outputs.push(serde_json::to_string(&report.results).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

#[tokio::test]
async fn test_seed_changes_outcomes() {
    let a = Pipeline::new(config("helios", 2, 64, 1))
        .run_source(BELL)
        .await
        .unwrap();
    let b = Pipeline::new(config("helios", 2, 64, 2))
        .run_source(BELL)
        .await
        .unwrap();
    assert_ne!(a.results, b.results);
}

#[tokio::test]
async fn test_missing_qubit_count_uses_default() {
    let report = Pipeline::new(config("helios", 2, 3, 0))
        .run_source(NO_QUBIT_COUNT)
        .await
        .unwrap();

    let attributes = &report.attributes;
    assert_eq!(attributes.num_qubits(), 6);
    assert_eq!(attributes.qubits_source(), CountSource::Defaulted);
    assert_eq!(attributes.num_results(), 1);
    assert_eq!(attributes.results_source(), CountSource::Inferred);

    for record in &report.results.records {
        assert_eq!(record.values().unwrap(), &[ShotValue::Result(true)]);
    }
}

#[tokio::test]
async fn test_measurement_feedback() {
    let mut config = config("helios", 2, 32, 7);
    config.output.labeled = true;
    let report = Pipeline::new(config).run_source(FEEDBACK).await.unwrap();

    let mut flips = 0;
    for shot in report.labeled.unwrap() {
        let ctrl = shot.get("ctrl").unwrap();
        assert_eq!(shot.get("target").unwrap(), ctrl);
        let expected = if ctrl == ShotValue::Result(true) { 1 } else { 0 };
        assert_eq!(shot.get("flips").unwrap(), ShotValue::Int(expected));
        flips += expected;
    }
    assert!(flips > 0 && flips < 32);
}

#[tokio::test]
async fn test_output_recorded_by_helper() {
    let report = Pipeline::new(config("helios", 2, 8, 0))
        .run_source(HELPER_OUTPUT)
        .await
        .unwrap();

    assert_eq!(report.attributes.output_schema().slot_count(), 1);
    assert!(report.results.batch_error.is_none());
    for record in &report.results.records {
        assert_eq!(record.values().unwrap(), &[ShotValue::Result(true)]);
    }
}

#[tokio::test]
async fn test_result_count_includes_helper_measurements() {
    let report = Pipeline::new(config("helios", 2, 4, 0))
        .run_source(HELPER_MEASURE)
        .await
        .unwrap();

    assert_eq!(report.attributes.num_results(), 2);
    assert_eq!(report.attributes.results_source(), CountSource::Inferred);
    assert!(report.results.batch_error.is_none());
    for record in &report.results.records {
        assert_eq!(record.values().unwrap(), &[ShotValue::Result(false)]);
    }
}

#[tokio::test]
async fn test_shot_index_and_program_randomness() {
    let mut labeled = config("helios", 2, 6, 13);
    labeled.output.labeled = true;
    let pipeline = Pipeline::new(labeled);

    let first = pipeline.run_source(SHOT_RUNTIME).await.unwrap();
    let labeled = first.labeled.as_ref().unwrap();
    for (index, shot) in labeled.iter().enumerate() {
        assert_eq!(shot.get("shot").unwrap(), ShotValue::Int(index as i64));
        match shot.get("draw").unwrap() {
            ShotValue::Double(draw) => assert!((0.0..1.0).contains(&draw)),
            other => panic!("expected a double, got {other:?}"),
        }
    }

    let again = pipeline.run_source(SHOT_RUNTIME).await.unwrap();
    assert_eq!(again.results, first.results);

    let reseeded = Pipeline::new(config("helios", 2, 6, 14))
        .run_source(SHOT_RUNTIME)
        .await
        .unwrap();
    assert_ne!(reseeded.results, first.results);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancellation_is_per_run() {
    let pipeline = Pipeline::new(config("helios", 2, 8, 0));
    let prepared = pipeline.prepare(BELL).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let cancelled = pipeline
        .run_cancellable(prepared.clone(), &cancel)
        .await
        .unwrap();
    assert!(matches!(
        cancelled.results.batch_error,
        Some(BatchError::Cancelled { .. })
    ));

    let report = pipeline.run(prepared).await.unwrap();
    assert!(report.results.batch_error.is_none());
    assert_eq!(report.results.len(), 8);
    assert_eq!(report.results.failed(), 0);
}
