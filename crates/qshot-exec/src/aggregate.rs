//! Parsing raw shot payloads into positional records.

use std::fmt;

use qshot_ir::qis::{OutputTag, TagKind};
use qshot_profile::{EntryPointAttributes, OutputKind, OutputSlot};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::executor::{ExecutionBatch, ShotOutput};
use crate::simulator::{RawShotPayload, RawValue};

/// One recorded value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ShotValue {
    /// Measurement result, serialized as `0` or `1`.
    Result(#[serde(serialize_with = "as_bit")] bool),
    Bool(bool),
    Int(i64),
    Double(f64),
}

fn as_bit<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

impl fmt::Display for ShotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Result(v) => write!(f, "{}", u8::from(*v)),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
        }
    }
}

/// Why a shot has no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotErrorKind {
    /// The simulator reported a fault.
    Fault,
    /// The shot did not finish before cancellation.
    Abandoned,
    /// The payload does not match the output schema.
    Malformed,
}

/// Error marker in place of a shot record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotError {
    pub kind: ShotErrorKind,
    pub message: String,
}

impl ShotError {
    fn new(kind: ShotErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ShotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Parsed form of one shot: values by slot index, or an error marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotRecord {
    Ok(Vec<ShotValue>),
    Error(ShotError),
}

impl ShotRecord {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn values(&self) -> Option<&[ShotValue]> {
        match self {
            Self::Ok(values) => Some(values),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ShotError> {
        match self {
            Self::Ok(_) => None,
            Self::Error(error) => Some(error),
        }
    }
}

/// Batch-level failure. Records are still available alongside it.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchError {
    #[error("{failed} of {total} shots failed, above the allowed ratio {max_ratio}")]
    TooManyFailures {
        failed: usize,
        total: usize,
        max_ratio: f64,
    },

    #[error("All {total} shots failed")]
    AllFailed { total: usize },

    #[error("Batch cancelled after {completed} of {total} shots")]
    Cancelled { completed: usize, total: usize },
}

/// Records in shot-index order plus an optional batch error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    pub records: Vec<ShotRecord>,
    pub batch_error: Option<BatchError>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of error markers.
    pub fn failed(&self) -> usize {
        self.records.iter().filter(|r| !r.is_ok()).count()
    }
}

/// When failed shots turn into a batch error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregationPolicy {
    /// Largest tolerated share of failed shots, in `[0, 1]`.
    pub max_failure_ratio: f64,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        Self {
            max_failure_ratio: 0.5,
        }
    }
}

/// Turns raw payloads into a [`ResultSet`] using the entry point's output
/// schema. A shot that cannot be parsed becomes an error marker; it never
/// aborts the batch.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    policy: AggregationPolicy,
}

impl ResultAggregator {
    pub fn new(policy: AggregationPolicy) -> Self {
        Self { policy }
    }

    #[instrument(skip_all, fields(shots = batch.len(), batch_id = %batch.batch_id))]
    pub fn aggregate(&self, batch: &ExecutionBatch, attributes: &EntryPointAttributes) -> ResultSet {
        let slots = attributes.output_schema().slots();
        let records: Vec<ShotRecord> = batch
            .outputs
            .iter()
            .map(|output| match output {
                ShotOutput::Completed(payload) => parse_payload(payload, &slots),
                ShotOutput::Faulted(fault) => {
                    ShotRecord::Error(ShotError::new(ShotErrorKind::Fault, fault.message.clone()))
                }
                ShotOutput::Abandoned => ShotRecord::Error(ShotError::new(
                    ShotErrorKind::Abandoned,
                    "shot did not complete before cancellation",
                )),
            })
            .collect();

        let total = records.len();
        let failed = records.iter().filter(|r| !r.is_ok()).count();
        let batch_error = self.batch_error(batch.cancelled, failed, total);
        match &batch_error {
            Some(error) => warn!(failed, %error, "Batch error"),
            None => info!(failed, "Aggregated shot records"),
        }

        ResultSet {
            records,
            batch_error,
        }
    }

    fn batch_error(&self, cancelled: bool, failed: usize, total: usize) -> Option<BatchError> {
        if cancelled {
            return Some(BatchError::Cancelled {
                completed: total - failed,
                total,
            });
        }
        if total == 0 || failed == 0 {
            return None;
        }
        if failed == total {
            return Some(BatchError::AllFailed { total });
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = failed as f64 / total as f64;
        (ratio > self.policy.max_failure_ratio).then_some(BatchError::TooManyFailures {
            failed,
            total,
            max_ratio: self.policy.max_failure_ratio,
        })
    }
}

/// Match the payload's value entries against the schema slots.
fn parse_payload(payload: &RawShotPayload, slots: &[OutputSlot]) -> ShotRecord {
    let malformed = |message: String| ShotRecord::Error(ShotError::new(ShotErrorKind::Malformed, message));

    let mut entries = Vec::with_capacity(slots.len());
    for entry in &payload.entries {
        let Some(tag) = OutputTag::parse(&entry.tag) else {
            continue;
        };
        if tag.kind.is_container() {
            continue;
        }
        entries.push((tag, entry.value));
    }
    if entries.len() != slots.len() {
        return malformed(format!(
            "expected {} values, found {}",
            slots.len(),
            entries.len()
        ));
    }

    let mut values = Vec::with_capacity(slots.len());
    for (slot, (tag, raw)) in slots.iter().zip(entries) {
        if !tag.label.is_empty() && tag.label != slot.label {
            return malformed(format!(
                "value {} is labelled '{}', expected '{}'",
                slot.index, tag.label, slot.label
            ));
        }
        let value = match (slot.kind, tag.kind, raw) {
            (OutputKind::Result { .. }, TagKind::Result, RawValue::Bool(v)) => ShotValue::Result(v),
            (OutputKind::Bool, TagKind::Bool, RawValue::Bool(v)) => ShotValue::Bool(v),
            (OutputKind::Int, TagKind::Int, RawValue::Int(v)) => ShotValue::Int(v),
            (OutputKind::Double, TagKind::Float, RawValue::Float(v)) => ShotValue::Double(v),
            (kind, tag_kind, raw) => {
                return malformed(format!(
                    "value {} ('{}') should be {kind}, found {} {raw}",
                    slot.index,
                    slot.label,
                    tag_kind.as_str()
                ));
            }
        };
        values.push(value);
    }
    ShotRecord::Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShotFault;
    use qshot_profile::{OutputEntry, OutputSchema};
    use uuid::Uuid;

    fn slots() -> Vec<OutputSlot> {
        OutputSchema::new(vec![
            OutputEntry {
                kind: OutputKind::Tuple { length: Some(2) },
                label: None,
            },
            OutputEntry {
                kind: OutputKind::Result { register: Some(0) },
                label: Some("a".into()),
            },
            OutputEntry {
                kind: OutputKind::Int,
                label: None,
            },
        ])
        .slots()
    }

    fn payload(entries: &[(&str, RawValue)]) -> RawShotPayload {
        let mut payload = RawShotPayload::new();
        for (tag, value) in entries {
            payload.push(*tag, *value);
        }
        payload
    }

    #[test]
    fn test_parse_positional_values() {
        let record = parse_payload(
            &payload(&[
                ("USER:QIRTUPLE:", RawValue::Int(2)),
                ("USER:RESULT:a", RawValue::Bool(true)),
                ("USER:INT:", RawValue::Int(-4)),
                ("DEBUG:trace", RawValue::Int(9)),
            ]),
            &slots(),
        );
        assert_eq!(
            record,
            ShotRecord::Ok(vec![ShotValue::Result(true), ShotValue::Int(-4)])
        );
    }

    #[test]
    fn test_parse_count_mismatch() {
        let record = parse_payload(&payload(&[("USER:RESULT:a", RawValue::Bool(true))]), &slots());
        assert_eq!(record.error().unwrap().kind, ShotErrorKind::Malformed);
    }

    #[test]
    fn test_parse_kind_mismatch() {
        let record = parse_payload(
            &payload(&[
                ("USER:RESULT:a", RawValue::Bool(true)),
                ("USER:FLOAT:", RawValue::Float(1.5)),
            ]),
            &slots(),
        );
        let error = record.error().unwrap();
        assert_eq!(error.kind, ShotErrorKind::Malformed);
        assert!(error.message.contains("should be INT"), "{}", error.message);
    }

    #[test]
    fn test_parse_label_mismatch() {
        let record = parse_payload(
            &payload(&[
                ("USER:RESULT:b", RawValue::Bool(false)),
                ("USER:INT:", RawValue::Int(0)),
            ]),
            &slots(),
        );
        assert!(record.error().unwrap().message.contains("expected 'a'"));
    }

    fn batch(outputs: Vec<ShotOutput>, cancelled: bool) -> ExecutionBatch {
        ExecutionBatch {
            batch_id: Uuid::nil(),
            outputs,
            cancelled,
        }
    }

    #[test]
    fn test_batch_error_thresholds() {
        let aggregator = ResultAggregator::default();
        assert_eq!(aggregator.batch_error(false, 0, 5), None);
        assert_eq!(aggregator.batch_error(false, 1, 5), None);
        assert_eq!(
            aggregator.batch_error(false, 3, 5),
            Some(BatchError::TooManyFailures {
                failed: 3,
                total: 5,
                max_ratio: 0.5
            })
        );
        assert_eq!(
            aggregator.batch_error(false, 5, 5),
            Some(BatchError::AllFailed { total: 5 })
        );
        assert_eq!(
            aggregator.batch_error(true, 2, 5),
            Some(BatchError::Cancelled {
                completed: 3,
                total: 5
            })
        );
        assert_eq!(aggregator.batch_error(false, 0, 0), None);
    }

    #[test]
    fn test_aggregate_keeps_order_and_faults() {
        let module = qshot_ir::load(
            r#"
define void @main() #0 {
entry:
  ret void
}
attributes #0 = { "entry_point" "qir_profiles"="base_profile" }
"#,
        )
        .unwrap();
        let attributes = qshot_profile::extract(&module).unwrap();
        let result = ResultAggregator::default().aggregate(
            &batch(
                vec![
                    ShotOutput::Completed(RawShotPayload::new()),
                    ShotOutput::Faulted(ShotFault::new("qubit 9 out of range")),
                    ShotOutput::Abandoned,
                ],
                false,
            ),
            &attributes,
        );

        assert_eq!(result.len(), 3);
        assert_eq!(result.records[0], ShotRecord::Ok(Vec::new()));
        assert_eq!(result.records[1].error().unwrap().kind, ShotErrorKind::Fault);
        assert_eq!(
            result.records[2].error().unwrap().kind,
            ShotErrorKind::Abandoned
        );
        assert_eq!(result.failed(), 2);
        assert!(matches!(
            result.batch_error,
            Some(BatchError::TooManyFailures { .. })
        ));
    }

    #[test]
    fn test_result_values_serialize_as_bits() {
        let json = serde_json::to_string(&ShotRecord::Ok(vec![
            ShotValue::Result(true),
            ShotValue::Bool(false),
            ShotValue::Double(0.5),
        ]))
        .unwrap();
        assert_eq!(json, r#"{"ok":[1,false,0.5]}"#);
    }
}
