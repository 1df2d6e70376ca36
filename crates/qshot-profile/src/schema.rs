//! Output schema: the ordered list of values a program records per shot.

use std::fmt;

use qshot_ir::qis::{self, OutputTag, TagKind};
use qshot_ir::{Function, IrModule, Operand};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::callgraph::{reachable_functions, recording_functions};
use crate::error::{AttributeError, AttributeResult};
use crate::profile::runtime_function;

/// What one output record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputKind {
    /// A measurement result; `register` is the result index when static.
    Result { register: Option<u64> },
    Bool,
    Int,
    Double,
    /// Array header announcing `length` following records.
    Array { length: Option<u64> },
    /// Tuple header announcing `length` following records.
    Tuple { length: Option<u64> },
}

impl OutputKind {
    /// Whether the record is a container header rather than a value.
    pub fn is_container(self) -> bool {
        matches!(self, Self::Array { .. } | Self::Tuple { .. })
    }

    /// Kind written into compiled output tags.
    pub fn tag_kind(self) -> TagKind {
        match self {
            Self::Result { .. } => TagKind::Result,
            Self::Bool => TagKind::Bool,
            Self::Int => TagKind::Int,
            Self::Double => TagKind::Float,
            Self::Array { .. } => TagKind::Array,
            Self::Tuple { .. } => TagKind::Tuple,
        }
    }

    fn default_prefix(self) -> &'static str {
        match self {
            Self::Result { .. } => "r",
            Self::Bool => "b",
            Self::Int => "i",
            Self::Double => "d",
            Self::Array { .. } => "a",
            Self::Tuple { .. } => "t",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_kind().as_str())
    }
}

/// One record-output call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub kind: OutputKind,
    pub label: Option<String>,
}

/// A value position in a shot record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSlot {
    pub index: usize,
    pub kind: OutputKind,
    /// Declared label, or a positional default such as `r0`.
    pub label: String,
}

/// Output records of the entry point, in program order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSchema {
    entries: Vec<OutputEntry>,
}

impl OutputSchema {
    /// Build a schema from explicit entries.
    pub fn new(entries: Vec<OutputEntry>) -> Self {
        Self { entries }
    }

    /// All entries, containers included.
    pub fn entries(&self) -> &[OutputEntry] {
        &self.entries
    }

    /// Whether the program records nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value positions, skipping container headers.
    pub fn slots(&self) -> Vec<OutputSlot> {
        self.entries
            .iter()
            .filter(|e| !e.kind.is_container())
            .enumerate()
            .map(|(index, e)| OutputSlot {
                index,
                kind: e.kind,
                label: e
                    .label
                    .clone()
                    .unwrap_or_else(|| format!("{}{index}", e.kind.default_prefix())),
            })
            .collect()
    }

    /// Number of value positions.
    pub fn slot_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.kind.is_container()).count()
    }

    /// First resolved slot label that appears more than once.
    pub fn duplicate_label(&self) -> Option<String> {
        let mut seen = FxHashSet::default();
        self.slots()
            .into_iter()
            .find(|slot| !seen.insert(slot.label.clone()))
            .map(|slot| slot.label)
    }
}

/// Read the output schema of an entry point.
///
/// Both the QIR `__quantum__rt__*_record_output` calls and the compiled
/// `___print_*` calls are recognised, so a module and its compiled form
/// yield the same schema. Records made by a called function appear at the
/// position of its call.
pub fn collect(module: &IrModule, entry: &Function) -> AttributeResult<OutputSchema> {
    let tags: FxHashMap<&str, OutputTag> = module
        .globals
        .iter()
        .filter_map(|g| match &g.initializer {
            Some(qshot_ir::Initializer::Bytes(bytes)) => {
                OutputTag::decode(bytes).map(|t| (g.name.as_str(), t))
            }
            _ => None,
        })
        .collect();
    let collector = Collector {
        module,
        labels: module.string_globals(),
        tags,
        recording: recording_functions(&reachable_functions(module, entry)),
    };

    let mut entries = Vec::new();
    collector.walk(entry, &mut Vec::new(), &mut entries)?;
    Ok(OutputSchema { entries })
}

struct Collector<'m> {
    module: &'m IrModule,
    labels: FxHashMap<&'m str, &'m str>,
    tags: FxHashMap<&'m str, OutputTag>,
    /// Functions whose calls must be followed.
    recording: FxHashSet<&'m str>,
}

impl<'m> Collector<'m> {
    fn walk(
        &self,
        function: &'m Function,
        active: &mut Vec<&'m str>,
        entries: &mut Vec<OutputEntry>,
    ) -> AttributeResult<()> {
        let malformed = |message: String| AttributeError::MalformedOutput {
            function: function.name.clone(),
            message,
        };
        if active.contains(&function.name.as_str()) {
            return Err(malformed(format!(
                "@{} records output through a recursive call",
                function.name
            )));
        }
        active.push(function.name.as_str());

        // `%v = call i1 @___read_result(i64 r)` in compiled modules.
        let mut reads: FxHashMap<&str, Option<u64>> = FxHashMap::default();

        for inst in function.instructions() {
            let Some((callee, args)) = inst.as_call() else {
                continue;
            };
            if callee == qis::READ_RESULT {
                if let Some(result) = &inst.result {
                    reads.insert(result.as_str(), args.first().and_then(|a| a.value.static_index()));
                }
                continue;
            }

            if let Some(name) = runtime_function(callee) {
                let Some(kind) = qir_record_kind(name, args) else {
                    continue;
                };
                let label = match args.get(1) {
                    None => return Err(malformed(format!("@{callee} has no label argument"))),
                    Some(arg) => qir_label(arg, &self.labels)
                        .map_err(|found| malformed(format!("label of @{callee} is {found}")))?,
                };
                entries.push(OutputEntry { kind, label });
            } else if matches!(callee, qis::PRINT_BOOL | qis::PRINT_INT | qis::PRINT_FLOAT) {
                let tag = args
                    .first()
                    .and_then(|a| a.value.global_name())
                    .and_then(|name| self.tags.get(name))
                    .ok_or_else(|| malformed(format!("@{callee} does not reference an output tag")))?;
                let value = args.get(2).map(|a| &a.value);
                let kind = match tag.kind {
                    TagKind::Result => OutputKind::Result {
                        register: value
                            .and_then(|v| v.as_local())
                            .and_then(|local| reads.get(local).copied())
                            .flatten(),
                    },
                    TagKind::Bool => OutputKind::Bool,
                    TagKind::Int => OutputKind::Int,
                    TagKind::Float => OutputKind::Double,
                    TagKind::Array => OutputKind::Array {
                        length: value.and_then(|v| v.static_index()),
                    },
                    TagKind::Tuple => OutputKind::Tuple {
                        length: value.and_then(|v| v.static_index()),
                    },
                };
                let label = (!tag.label.is_empty()).then(|| tag.label.clone());
                entries.push(OutputEntry { kind, label });
            } else if self.recording.contains(callee) {
                if let Some(callee) = self.module.function(callee) {
                    self.walk(callee, active, entries)?;
                }
            }
        }

        active.pop();
        Ok(())
    }
}

/// Whether a call records output, in QIR or compiled form.
pub fn is_record_call(callee: &str, args: &[Operand]) -> bool {
    matches!(callee, qis::PRINT_BOOL | qis::PRINT_INT | qis::PRINT_FLOAT)
        || runtime_function(callee).is_some_and(|name| qir_record_kind(name, args).is_some())
}

/// Output kind of a QIR runtime call, if it records output.
pub fn qir_record_kind(name: &str, args: &[Operand]) -> Option<OutputKind> {
    let first = args.first().map(|a| &a.value);
    Some(match name {
        "result_record_output" => OutputKind::Result {
            register: first.and_then(|v| v.static_index()),
        },
        "bool_record_output" => OutputKind::Bool,
        "int_record_output" => OutputKind::Int,
        "double_record_output" => OutputKind::Double,
        "array_record_output" => OutputKind::Array {
            length: first.and_then(|v| v.static_index()),
        },
        "tuple_record_output" => OutputKind::Tuple {
            length: first.and_then(|v| v.static_index()),
        },
        _ => return None,
    })
}

/// Resolve a QIR label argument: a string global, or null for no label.
/// On failure returns a description of what was found instead.
pub fn qir_label(
    arg: &Operand,
    labels: &FxHashMap<&str, &str>,
) -> Result<Option<String>, String> {
    if arg.value == qshot_ir::Value::Const(qshot_ir::Constant::Null) {
        return Ok(None);
    }
    let Some(global) = arg.value.global_name() else {
        return Err(format!("'{}', not a string global", arg.value));
    };
    match labels.get(global) {
        Some(text) if text.is_empty() => Ok(None),
        Some(text) => Ok(Some((*text).to_string())),
        None => Err(format!("@{global}, which is not a byte string")),
    }
}

#[cfg(test)]
mod tests {
    use qshot_ir::parse_ir;

    use super::*;

    const RECORDS: &str = r#"
@0 = internal constant [3 x i8] c"t0\00"
@1 = internal constant [6 x i8] c"alpha\00"

define void @main() #0 {
entry:
  call void @__quantum__qis__mz__body(ptr null, ptr null)
  call void @__quantum__qis__mz__body(ptr inttoptr (i64 1 to ptr), ptr inttoptr (i64 1 to ptr))
  call void @__quantum__rt__tuple_record_output(i64 2, ptr @0)
  call void @__quantum__rt__result_record_output(ptr null, ptr @1)
  call void @__quantum__rt__result_record_output(ptr inttoptr (i64 1 to ptr), ptr null)
  ret void
}

declare void @__quantum__qis__mz__body(ptr, ptr)
declare void @__quantum__rt__tuple_record_output(i64, ptr)
declare void @__quantum__rt__result_record_output(ptr, ptr)

attributes #0 = { "entry_point" }
"#;

    #[test]
    fn test_collect_qir_records() {
        let module = parse_ir(RECORDS).unwrap();
        let schema = collect(&module, module.entry_point().unwrap()).unwrap();

        assert_eq!(schema.entries().len(), 3);
        assert_eq!(
            schema.entries()[0],
            OutputEntry {
                kind: OutputKind::Tuple { length: Some(2) },
                label: Some("t0".into())
            }
        );
        assert_eq!(schema.slot_count(), 2);

        let slots = schema.slots();
        assert_eq!(slots[0].label, "alpha");
        assert_eq!(slots[0].kind, OutputKind::Result { register: Some(0) });
        assert_eq!(slots[1].label, "r1");
        assert_eq!(slots[1].kind, OutputKind::Result { register: Some(1) });
        assert!(schema.duplicate_label().is_none());
    }

    #[test]
    fn test_collect_compiled_records() {
        let tag = OutputTag::new(TagKind::Result, "alpha").encode().unwrap();
        let len = tag.len();
        let source = format!(
            r#"
@res_1 = private constant [{len} x i8] c"{}"

define void @main() #0 {{
entry:
  call void @___lazy_measure(i64 0, i64 3)
  %0 = call i1 @___read_result(i64 3)
  call void @___print_bool(ptr @res_1, i64 {}, i1 %0)
  ret void
}}

declare void @___lazy_measure(i64, i64)
declare i1 @___read_result(i64)
declare void @___print_bool(ptr, i64, i1)

attributes #0 = {{ "entry_point" }}
"#,
            tag.iter().map(|b| format!("\\{b:02X}")).collect::<String>(),
            len - 1
        );
        let module = parse_ir(&source).unwrap();
        let schema = collect(&module, module.entry_point().unwrap()).unwrap();
        assert_eq!(
            schema.entries(),
            &[OutputEntry {
                kind: OutputKind::Result { register: Some(3) },
                label: Some("alpha".into())
            }]
        );
    }

    #[test]
    fn test_helper_records_inlined_at_call_site() {
        let source = r#"
@0 = internal constant [5 x i8] c"head\00"
@1 = internal constant [5 x i8] c"tail\00"

define void @main() #0 {
entry:
  call void @__quantum__rt__int_record_output(i64 1, ptr @0)
  call void @emit(ptr null)
  call void @__quantum__rt__int_record_output(i64 2, ptr @1)
  ret void
}

define void @emit(ptr %r) {
entry:
  call void @__quantum__rt__result_record_output(ptr %r, ptr null)
  call void @__quantum__rt__bool_record_output(i1 true, ptr null)
  ret void
}

declare void @__quantum__rt__int_record_output(i64, ptr)
declare void @__quantum__rt__result_record_output(ptr, ptr)
declare void @__quantum__rt__bool_record_output(i1, ptr)

attributes #0 = { "entry_point" }
"#;
        let module = parse_ir(source).unwrap();
        let schema = collect(&module, module.entry_point().unwrap()).unwrap();
        let kinds: Vec<OutputKind> = schema.entries().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [
                OutputKind::Int,
                OutputKind::Result { register: None },
                OutputKind::Bool,
                OutputKind::Int
            ]
        );
        let labels: Vec<String> = schema.slots().into_iter().map(|s| s.label).collect();
        assert_eq!(labels, ["head", "r1", "b2", "tail"]);
    }

    #[test]
    fn test_recursive_recording_rejected() {
        let source = r#"
define void @main() #0 {
entry:
  call void @again()
  ret void
}
define void @again() {
entry:
  call void @__quantum__rt__int_record_output(i64 1, ptr null)
  call void @again()
  ret void
}
declare void @__quantum__rt__int_record_output(i64, ptr)
attributes #0 = { "entry_point" }
"#;
        let module = parse_ir(source).unwrap();
        let err = collect(&module, module.entry_point().unwrap()).unwrap_err();
        assert!(err.to_string().contains("recursive"), "{err}");
    }

    #[test]
    fn test_duplicate_default_label() {
        let schema = OutputSchema::new(vec![
            OutputEntry {
                kind: OutputKind::Bool,
                label: Some("b1".into()),
            },
            OutputEntry {
                kind: OutputKind::Bool,
                label: None,
            },
        ]);
        assert_eq!(schema.duplicate_label().as_deref(), Some("b1"));
    }

    #[test]
    fn test_label_must_be_string() {
        let source = r#"
define void @main() #0 {
entry:
  call void @__quantum__rt__int_record_output(i64 4, ptr inttoptr (i64 9 to ptr))
  ret void
}
declare void @__quantum__rt__int_record_output(i64, ptr)
attributes #0 = { "entry_point" }
"#;
        let module = parse_ir(source).unwrap();
        let err = collect(&module, module.entry_point().unwrap()).unwrap_err();
        assert!(matches!(err, AttributeError::MalformedOutput { .. }));
    }
}
