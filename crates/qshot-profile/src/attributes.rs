//! Entry-point attribute extraction.

use std::fmt;

use qshot_ir::qis;
use qshot_ir::{Function, Module, Operand};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::callgraph::reachable_functions;
use crate::error::{AttributeError, AttributeResult};
use crate::profile::{
    NUM_QUBITS_ATTR, NUM_RESULTS_ATTR, OUTPUT_SCHEMA_ATTR, PROFILES_ATTR, PointerRole,
    pointer_arguments,
};
use crate::schema::{self, OutputKind, OutputSchema};

/// Fallback qubit count when a module does not declare one.
pub const DEFAULT_NUM_QUBITS: u32 = 6;

/// Typed value of an entry-point attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// Key without a value (`"entry_point"`).
    Flag,
    Text(String),
    Integer(u64),
    List(Vec<String>),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::List(items) => f.write_str(&items.join(",")),
        }
    }
}

/// Where a count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountSource {
    /// Present in the entry-point attributes.
    Declared,
    /// Filled in from [`ExtractionPolicy`].
    Defaulted,
    /// Derived from the indices the program uses.
    Inferred,
}

/// Typed entry-point metadata.
///
/// Built once by [`AttributeExtractor::extract`] and never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPointAttributes {
    entry_point: String,
    attributes: Vec<(String, AttributeValue)>,
    num_qubits: u32,
    qubits_source: CountSource,
    num_results: u32,
    results_source: CountSource,
    schema: OutputSchema,
}

impl EntryPointAttributes {
    /// Name of the entry-point function.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Every attribute in declaration order, unknown keys included.
    pub fn attributes(&self) -> &[(String, AttributeValue)] {
        &self.attributes
    }

    /// Look up one attribute.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Qubits to allocate.
    pub fn num_qubits(&self) -> u32 {
        self.num_qubits
    }

    pub fn qubits_source(&self) -> CountSource {
        self.qubits_source
    }

    /// Result registers to allocate.
    pub fn num_results(&self) -> u32 {
        self.num_results
    }

    pub fn results_source(&self) -> CountSource {
        self.results_source
    }

    /// Profiles named by `qir_profiles`.
    pub fn profiles(&self) -> &[String] {
        match self.get(PROFILES_ATTR) {
            Some(AttributeValue::List(items)) => items,
            _ => &[],
        }
    }

    /// Recorded outputs in program order.
    pub fn output_schema(&self) -> &OutputSchema {
        &self.schema
    }
}

/// Defaults applied during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionPolicy {
    pub default_num_qubits: u32,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self {
            default_num_qubits: DEFAULT_NUM_QUBITS,
        }
    }
}

/// Reads entry-point metadata from a validated module.
#[derive(Debug, Clone, Default)]
pub struct AttributeExtractor {
    policy: ExtractionPolicy,
}

impl AttributeExtractor {
    pub fn new(policy: ExtractionPolicy) -> Self {
        Self { policy }
    }

    /// Extract the attributes of the module's single entry point.
    ///
    /// Absent counts fall back to the policy; a count that is present but
    /// not a non-negative integer is an error.
    #[instrument(skip(self, module))]
    pub fn extract(&self, module: &Module) -> AttributeResult<EntryPointAttributes> {
        let ir = module.ir();
        let entries = ir.entry_points();
        let [entry] = entries.as_slice() else {
            return Err(AttributeError::EntryPointCount(entries.len()));
        };

        let attributes = ir
            .string_attributes(entry)
            .into_iter()
            .map(|(key, value)| Ok((key.to_string(), typed_value(key, value)?)))
            .collect::<AttributeResult<Vec<_>>>()?;

        let declared = |key: &str| {
            attributes.iter().find_map(|(k, v)| match v {
                AttributeValue::Integer(n) if k == key => Some(*n),
                _ => None,
            })
        };
        let schema = schema::collect(ir, entry)?;
        let used = UsedIndices::scan(&reachable_functions(ir, entry), &schema);

        let (num_qubits, qubits_source) = match declared(NUM_QUBITS_ATTR) {
            Some(n) => (to_count(NUM_QUBITS_ATTR, n)?, CountSource::Declared),
            None => {
                let needed = used.qubit.map_or(0, |q| q.saturating_add(1));
                let num_qubits = u32::try_from(needed)
                    .unwrap_or(u32::MAX)
                    .max(self.policy.default_num_qubits);
                warn!(
                    default = self.policy.default_num_qubits,
                    needed,
                    num_qubits,
                    "Entry point does not declare {NUM_QUBITS_ATTR}; using default"
                );
                (num_qubits, CountSource::Defaulted)
            }
        };
        let (num_results, results_source) = match declared(NUM_RESULTS_ATTR) {
            Some(n) => (to_count(NUM_RESULTS_ATTR, n)?, CountSource::Declared),
            None => {
                let inferred = used.result.map_or(0, |r| r.saturating_add(1));
                debug!(inferred, "Inferred result count");
                (
                    u32::try_from(inferred).unwrap_or(u32::MAX),
                    CountSource::Inferred,
                )
            }
        };

        debug!(
            entry_point = %entry.name,
            num_qubits,
            num_results,
            outputs = schema.entries().len(),
            "Extracted entry-point attributes"
        );

        Ok(EntryPointAttributes {
            entry_point: entry.name.clone(),
            attributes,
            num_qubits,
            qubits_source,
            num_results,
            results_source,
            schema,
        })
    }
}

/// Extract with the default policy.
pub fn extract(module: &Module) -> AttributeResult<EntryPointAttributes> {
    AttributeExtractor::default().extract(module)
}

/// Type an attribute value by key.
pub(crate) fn typed_value(key: &str, value: Option<&str>) -> AttributeResult<AttributeValue> {
    let malformed = |expected| AttributeError::Malformed {
        key: key.to_string(),
        value: value.unwrap_or_default().to_string(),
        expected,
    };
    match key {
        NUM_QUBITS_ATTR | NUM_RESULTS_ATTR => value
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(AttributeValue::Integer)
            .ok_or_else(|| malformed("a non-negative integer")),
        PROFILES_ATTR => value
            .map(|v| {
                AttributeValue::List(
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect(),
                )
            })
            .ok_or_else(|| malformed("a comma-separated profile list")),
        OUTPUT_SCHEMA_ATTR => value
            .map(|v| AttributeValue::Text(v.to_string()))
            .ok_or_else(|| malformed("a schema name")),
        _ => Ok(value.map_or(AttributeValue::Flag, |v| AttributeValue::Text(v.to_string()))),
    }
}

fn to_count(key: &str, n: u64) -> AttributeResult<u32> {
    u32::try_from(n).map_err(|_| AttributeError::Malformed {
        key: key.to_string(),
        value: n.to_string(),
        expected: "a count that fits in 32 bits",
    })
}

/// Highest static qubit and result indices a program touches.
#[derive(Debug, Default)]
struct UsedIndices {
    qubit: Option<u64>,
    result: Option<u64>,
}

impl UsedIndices {
    /// Scan every function the entry point can reach, plus the result
    /// registers the schema records.
    fn scan(functions: &[&Function], schema: &OutputSchema) -> Self {
        let mut used = Self::default();
        for (callee, args) in functions
            .iter()
            .flat_map(|f| f.instructions())
            .filter_map(|inst| inst.as_call())
        {
            for (role, index) in static_indices(callee, args) {
                let slot = match role {
                    PointerRole::Qubit => &mut used.qubit,
                    PointerRole::Result => &mut used.result,
                };
                *slot = (*slot).max(Some(index));
            }
        }
        let recorded = schema.entries().iter().filter_map(|e| match e.kind {
            OutputKind::Result { register } => register,
            _ => None,
        });
        used.result = used.result.max(recorded.max());
        used
    }
}

/// Static qubit and result indices of one call, in QIR or compiled form.
fn static_indices(callee: &str, args: &[Operand]) -> Vec<(PointerRole, u64)> {
    use PointerRole as Role;

    let positions: &[(PointerRole, usize)] = match callee {
        qis::RXY => &[(Role::Qubit, 2)],
        qis::RZ => &[(Role::Qubit, 1)],
        qis::RZZ => &[(Role::Qubit, 1), (Role::Qubit, 2)],
        qis::CZ => &[(Role::Qubit, 0), (Role::Qubit, 1)],
        qis::LAZY_MEASURE => &[(Role::Qubit, 0), (Role::Result, 1)],
        qis::RESET => &[(Role::Qubit, 0)],
        qis::READ_RESULT => &[(Role::Result, 0)],
        _ => {
            return pointer_arguments(callee, args)
                .into_iter()
                .filter_map(|(role, a)| a.value.static_index().map(|n| (role, n)))
                .collect();
        }
    };
    positions
        .iter()
        .filter_map(|&(role, i)| {
            args.get(i)
                .and_then(|a| a.value.static_index())
                .map(|n| (role, n))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use qshot_ir::load;

    use super::*;

    fn module(attrs: &str) -> Module {
        load(&format!(
            r#"
define void @main() #0 {{
entry:
  call void @__quantum__qis__mz__body(ptr inttoptr (i64 1 to ptr), ptr inttoptr (i64 2 to ptr))
  ret void
}}
declare void @__quantum__qis__mz__body(ptr, ptr)
attributes #0 = {{ {attrs} }}
"#
        ))
        .unwrap()
    }

    #[test]
    fn test_declared_counts() {
        let attrs = extract(&module(
            r#""entry_point" "qir_profiles"="base_profile" "required_num_qubits"="2" "required_num_results"="3" "vendor"="acme""#,
        ))
        .unwrap();
        assert_eq!(attrs.entry_point(), "main");
        assert_eq!(attrs.num_qubits(), 2);
        assert_eq!(attrs.qubits_source(), CountSource::Declared);
        assert_eq!(attrs.num_results(), 3);
        assert_eq!(attrs.profiles(), &["base_profile".to_string()]);
        assert_eq!(attrs.get("vendor"), Some(&AttributeValue::Text("acme".into())));
        assert_eq!(attrs.get("entry_point"), Some(&AttributeValue::Flag));
        assert_eq!(attrs.attributes()[0].0, "entry_point");
    }

    #[test]
    fn test_missing_counts_use_policy() {
        let attrs = extract(&module(r#""entry_point""#)).unwrap();
        assert_eq!(attrs.num_qubits(), DEFAULT_NUM_QUBITS);
        assert_eq!(attrs.qubits_source(), CountSource::Defaulted);
        assert_eq!(attrs.num_results(), 3);
        assert_eq!(attrs.results_source(), CountSource::Inferred);

        let custom = AttributeExtractor::new(ExtractionPolicy {
            default_num_qubits: 11,
        });
        assert_eq!(custom.extract(&module(r#""entry_point""#)).unwrap().num_qubits(), 11);
    }

    #[test]
    fn test_counts_cover_called_functions() {
        let module = load(
            r#"
define void @main() #0 {
entry:
  call void @helper()
  call void @__quantum__qis__mz__body(ptr null, ptr null)
  call void @__quantum__rt__result_record_output(ptr null, ptr null)
  ret void
}
define void @helper() {
entry:
  call void @__quantum__qis__mz__body(ptr inttoptr (i64 9 to ptr), ptr inttoptr (i64 1 to ptr))
  ret void
}
declare void @__quantum__qis__mz__body(ptr, ptr)
declare void @__quantum__rt__result_record_output(ptr, ptr)
attributes #0 = { "entry_point" }
"#,
        )
        .unwrap();
        let attrs = extract(&module).unwrap();
        assert_eq!(attrs.num_results(), 2);
        assert_eq!(attrs.results_source(), CountSource::Inferred);
        // Qubit 9 is in use, so the fallback of 6 is raised to 10.
        assert_eq!(attrs.num_qubits(), 10);
        assert_eq!(attrs.qubits_source(), CountSource::Defaulted);
    }

    #[test]
    fn test_malformed_count() {
        let err = extract(&module(r#""entry_point" "required_num_qubits"="two""#)).unwrap_err();
        assert!(matches!(
            err,
            AttributeError::Malformed { ref key, .. } if key == "required_num_qubits"
        ));

        let err = extract(&module(r#""entry_point" "required_num_results"="-1""#)).unwrap_err();
        assert!(matches!(err, AttributeError::Malformed { .. }));
    }

    #[test]
    fn test_no_entry_point() {
        let err = extract(&module(r#""vendor""#)).unwrap_err();
        assert!(matches!(err, AttributeError::EntryPointCount(0)));
    }

    #[test]
    fn test_serializes() {
        let attrs = extract(&module(r#""entry_point" "required_num_qubits"="2""#)).unwrap();
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json["num_qubits"], 2);
        assert_eq!(json["qubits_source"], "declared");
    }
}
