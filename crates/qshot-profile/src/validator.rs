//! Profile conformance checking.
//!
//! [`validate`] scans a module once per rule class and reports every
//! violation it finds. Rule classes that depend on a single entry point are
//! skipped when the entry point itself is missing or ambiguous, so one root
//! cause does not fan out into dozens of follow-on messages.

use qshot_ir::qis;
use qshot_ir::{BasicBlock, Function, InstructionKind, IrModule, MetadataItem, Module, Type};
use rustc_hash::FxHashSet;
use tracing::{debug, instrument};

use crate::attributes::typed_value;
use crate::callgraph::{reachable_functions, recording_functions};
use crate::error::{RuleClass, ValidationError, Violation};
use crate::profile::{
    FlagValue, NUM_QUBITS_ATTR, NUM_RESULTS_ATTR, PROFILES_ATTR, PointerRole, Profile,
    REQUIRED_FLAGS, SUPPORTED_GATES, SUPPORTED_RUNTIME, pointer_arguments, qis_operation,
    runtime_function,
};
use crate::schema::{self, is_record_call, qir_record_kind};

/// Check a module against the QIR profile rules.
#[instrument(skip(module))]
pub fn validate(module: &Module) -> Result<(), ValidationError> {
    let mut validator = Validator::new(module.ir());
    validator.run();
    validator.finish()
}

struct Validator<'m> {
    module: &'m IrModule,
    violations: Vec<Violation>,
}

/// Declared counts of the entry point, when well formed.
#[derive(Default)]
struct Counts {
    qubits: Option<u64>,
    results: Option<u64>,
}

impl<'m> Validator<'m> {
    fn new(module: &'m IrModule) -> Self {
        Self {
            module,
            violations: Vec::new(),
        }
    }

    fn report(&mut self, rule: RuleClass, message: impl Into<String>, function: Option<&str>) {
        self.violations.push(Violation {
            rule,
            message: message.into(),
            function: function.map(String::from),
        });
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.violations.is_empty() {
            debug!("Module conforms to profile");
            Ok(())
        } else {
            debug!(violations = self.violations.len(), "Module failed validation");
            Err(ValidationError {
                violations: self.violations,
            })
        }
    }

    fn run(&mut self) {
        self.check_module_flags();
        self.check_functions();

        let Some(entry) = self.check_entry_point() else {
            return;
        };
        let (profile, counts) = self.check_attributes(entry);
        let reachable = reachable_functions(self.module, entry);
        if let Some(profile) = profile {
            self.check_instructions(profile, entry, &reachable);
        }
        self.check_consistency(&counts, &reachable);
        self.check_output(&reachable, entry);
    }

    fn check_entry_point(&mut self) -> Option<&'m Function> {
        let module = self.module;
        let entries = module.entry_points();
        let entry = match entries.as_slice() {
            [] => {
                self.report(
                    RuleClass::EntryPoint,
                    format!(
                        "no function is marked as an entry point (missing \"{}\" attribute)",
                        qshot_ir::ENTRY_POINT_ATTR
                    ),
                    None,
                );
                return None;
            }
            [only] => *only,
            many => {
                let names: Vec<String> = many.iter().map(|f| format!("@{}", f.name)).collect();
                self.report(
                    RuleClass::EntryPoint,
                    format!(
                        "{} functions are marked as entry points ({}); expected exactly one",
                        many.len(),
                        names.join(", ")
                    ),
                    None,
                );
                return None;
            }
        };

        let name = Some(entry.name.as_str());
        if entry.is_declaration() {
            self.report(RuleClass::EntryPoint, "entry point has no body", name);
            return None;
        }
        if !entry.params.is_empty() || entry.variadic {
            self.report(RuleClass::EntryPoint, "entry point must not take parameters", name);
        }
        if !matches!(entry.ret_ty, Type::Void | Type::Int(64)) {
            self.report(
                RuleClass::EntryPoint,
                format!("entry point must return void or i64, not {}", entry.ret_ty),
                name,
            );
        }
        Some(entry)
    }

    fn check_attributes(&mut self, entry: &Function) -> (Option<Profile>, Counts) {
        let name = Some(entry.name.as_str());
        let module = self.module;
        let attrs = module.string_attributes(entry);
        let lookup = |key: &str| attrs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);

        let profile = match lookup(PROFILES_ATTR) {
            None => {
                self.report(
                    RuleClass::Attributes,
                    format!("entry point is missing the \"{PROFILES_ATTR}\" attribute"),
                    name,
                );
                None
            }
            Some(value) => {
                let profile = value.and_then(Profile::from_attribute);
                if profile.is_none() {
                    self.report(
                        RuleClass::Attributes,
                        format!(
                            "\"{PROFILES_ATTR}\" names no supported profile: '{}'",
                            value.unwrap_or_default()
                        ),
                        name,
                    );
                }
                profile
            }
        };

        let mut counts = Counts::default();
        for (key, slot) in [
            (NUM_QUBITS_ATTR, &mut counts.qubits),
            (NUM_RESULTS_ATTR, &mut counts.results),
        ] {
            let Some(value) = lookup(key) else { continue };
            match typed_value(key, value) {
                Ok(crate::AttributeValue::Integer(n)) if u32::try_from(n).is_ok() => {
                    *slot = Some(n);
                }
                _ => self.report(
                    RuleClass::Attributes,
                    format!(
                        "\"{key}\" must be a non-negative 32-bit integer, found '{}'",
                        value.unwrap_or_default()
                    ),
                    name,
                ),
            }
        }
        (profile, counts)
    }

    fn check_module_flags(&mut self) {
        let module = self.module;
        for (key, expected) in REQUIRED_FLAGS {
            let Some(item) = module.module_flag(key) else {
                self.report(
                    RuleClass::ModuleFlags,
                    format!("missing module flag '{key}'"),
                    None,
                );
                continue;
            };
            let ok = match expected {
                FlagValue::Int(v) => item.as_int() == Some(*v),
                FlagValue::Bool(b) => item.as_bool() == Some(*b),
            };
            if !ok {
                let want = match expected {
                    FlagValue::Int(v) => v.to_string(),
                    FlagValue::Bool(b) => b.to_string(),
                };
                self.report(
                    RuleClass::ModuleFlags,
                    format!(
                        "module flag '{key}' must be {want}, found {}",
                        describe(item)
                    ),
                    None,
                );
            }
        }
    }

    fn check_functions(&mut self) {
        let module = self.module;
        let compiled = qis::compiled_for(module).is_some();
        let mut reported: FxHashSet<&str> = FxHashSet::default();

        for function in &module.functions {
            if function.is_declaration() {
                continue;
            }
            let name = Some(function.name.as_str());
            if function.name == "main" && !module.is_entry_point(function) {
                self.report(
                    RuleClass::Functions,
                    "IR-defined functions may not be named 'main'",
                    name,
                );
            }
            if function.ret_ty.is_pointer() {
                self.report(
                    RuleClass::Functions,
                    "IR-defined functions may not return a pointer",
                    name,
                );
            }

            for callee in function.callees() {
                if !reported.insert(callee) {
                    continue;
                }
                let message = match module.function(callee) {
                    None => Some(format!("call to undefined function @{callee}")),
                    Some(f) if !f.is_declaration() => None,
                    Some(_) => external_call_problem(callee, compiled),
                };
                if let Some(message) = message {
                    self.report(RuleClass::Functions, message, name);
                }
            }
        }
    }

    fn check_instructions(&mut self, profile: Profile, entry: &Function, reachable: &[&Function]) {
        for function in reachable {
            let name = Some(function.name.as_str());
            for inst in function.instructions() {
                if let Err(message) = profile.check(inst) {
                    self.report(RuleClass::Instructions, message, name);
                }
            }
        }

        for (callee, args) in entry.instructions().filter_map(|i| i.as_call()) {
            for (role, arg) in pointer_arguments(callee, args) {
                if arg.value.static_index().is_none() {
                    self.report(
                        RuleClass::Instructions,
                        format!(
                            "{} operand '{}' of @{callee} is not a static index",
                            role_name(role),
                            arg.value
                        ),
                        Some(entry.name.as_str()),
                    );
                }
            }
        }
    }

    fn check_consistency(&mut self, counts: &Counts, reachable: &[&Function]) {
        for function in reachable {
            let mut max_qubit: Option<u64> = None;
            let mut max_result: Option<u64> = None;
            for (callee, args) in function.instructions().filter_map(|i| i.as_call()) {
                for (role, arg) in pointer_arguments(callee, args) {
                    let Some(index) = arg.value.static_index() else {
                        continue;
                    };
                    let slot = match role {
                        PointerRole::Qubit => &mut max_qubit,
                        PointerRole::Result => &mut max_result,
                    };
                    *slot = (*slot).max(Some(index));
                }
            }

            for (role, used, declared) in [
                (PointerRole::Qubit, max_qubit, counts.qubits),
                (PointerRole::Result, max_result, counts.results),
            ] {
                if let (Some(used), Some(declared)) = (used, declared) {
                    if used >= declared {
                        let key = match role {
                            PointerRole::Qubit => NUM_QUBITS_ATTR,
                            PointerRole::Result => NUM_RESULTS_ATTR,
                        };
                        self.report(
                            RuleClass::Consistency,
                            format!(
                                "{} index {used} is out of range for \"{key}\"={declared}",
                                role_name(role)
                            ),
                            Some(function.name.as_str()),
                        );
                    }
                }
            }
        }
    }

    fn check_output(&mut self, reachable: &[&Function], entry: &Function) {
        let module = self.module;
        let labels = module.string_globals();
        let before = self.violations.len();

        for function in reachable {
            for (callee, args) in function.instructions().filter_map(|i| i.as_call()) {
                let Some(kind) = runtime_function(callee).and_then(|n| qir_record_kind(n, args))
                else {
                    continue;
                };
                let problem = match args.get(1) {
                    None => Some("has no label argument".to_string()),
                    Some(arg) => schema::qir_label(arg, &labels)
                        .err()
                        .map(|found| format!("has label {found}")),
                };
                if let Some(problem) = problem {
                    self.report(
                        RuleClass::Output,
                        format!("{kind} record @{callee} {problem}"),
                        Some(function.name.as_str()),
                    );
                }
            }
        }

        self.check_output_placement(reachable, entry);
        if self.violations.len() > before {
            return;
        }
        match schema::collect(module, entry) {
            Ok(schema) => {
                if let Some(label) = schema.duplicate_label() {
                    self.report(
                        RuleClass::Output,
                        format!("output label '{label}' is recorded more than once"),
                        Some(entry.name.as_str()),
                    );
                }
            }
            Err(err) => self.report(RuleClass::Output, err.to_string(), Some(entry.name.as_str())),
        }
    }

    /// Every completed shot must record the same sequence of values, so
    /// output is recorded only in the entry point's single returning block,
    /// directly or through single-block functions called from it.
    fn check_output_placement(&mut self, reachable: &[&Function], entry: &Function) {
        let recording = recording_functions(reachable);
        let records = |block: &BasicBlock| {
            block
                .instructions
                .iter()
                .filter_map(|i| i.as_call())
                .any(|(callee, args)| is_record_call(callee, args) || recording.contains(callee))
        };

        for function in reachable.iter().filter(|f| f.name != entry.name) {
            if recording.contains(function.name.as_str()) && function.blocks.len() > 1 {
                self.report(
                    RuleClass::Output,
                    format!(
                        "function records output but has {} blocks; output must not depend on control flow",
                        function.blocks.len()
                    ),
                    Some(function.name.as_str()),
                );
            }
        }

        let returning: Vec<&str> = entry
            .blocks
            .iter()
            .filter(|b| {
                matches!(
                    b.instructions.last().map(|i| &i.kind),
                    Some(InstructionKind::Ret(_))
                )
            })
            .map(|b| b.label.as_str())
            .collect();
        for block in entry.blocks.iter().filter(|&b| records(b)) {
            if returning != [block.label.as_str()] {
                self.report(
                    RuleClass::Output,
                    format!(
                        "output is recorded in block %{}, which is not the only returning block",
                        block.label
                    ),
                    Some(entry.name.as_str()),
                );
            }
        }
    }
}

fn external_call_problem(callee: &str, compiled: bool) -> Option<String> {
    if let Some(op) = qis_operation(callee) {
        return (!SUPPORTED_GATES.contains(&op))
            .then(|| format!("unsupported quantum operation @{callee}"));
    }
    if let Some(rt) = runtime_function(callee) {
        return (!SUPPORTED_RUNTIME.contains(&rt))
            .then(|| format!("unsupported runtime function @{callee}"));
    }
    let shot_runtime = qis::SHOT_RUNTIME.contains(&callee);
    if shot_runtime || (compiled && qis::ALL_FUNCTIONS.contains(&callee)) {
        return None;
    }
    Some(format!("call to external function @{callee}"))
}

fn role_name(role: PointerRole) -> &'static str {
    match role {
        PointerRole::Qubit => "qubit",
        PointerRole::Result => "result",
    }
}

fn describe(item: &MetadataItem) -> String {
    match item {
        MetadataItem::Value(ty, c) => format!("{ty} {c}"),
        MetadataItem::Str(s) => format!("!\"{s}\""),
        MetadataItem::Node(id) => format!("!{id}"),
        MetadataItem::Null => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use qshot_ir::load;

    use super::*;

    const FLAGS: &str = r#"
!llvm.module.flags = !{!0, !1, !2, !3}
!0 = !{i32 1, !"qir_major_version", i32 1}
!1 = !{i32 7, !"qir_minor_version", i32 0}
!2 = !{i32 1, !"dynamic_qubit_management", i1 false}
!3 = !{i32 1, !"dynamic_result_management", i1 false}
"#;

    fn module(body: &str, attrs: &str) -> Module {
        load(&format!(
            r#"
@0 = internal constant [3 x i8] c"r0\00"

define void @main() #0 {{
entry:
{body}
  ret void
}}

declare void @__quantum__qis__h__body(ptr)
declare void @__quantum__qis__mz__body(ptr, ptr)
declare void @__quantum__rt__result_record_output(ptr, ptr)
declare i1 @__quantum__rt__read_result(ptr)

attributes #0 = {{ "entry_point" {attrs} }}
{FLAGS}"#
        ))
        .unwrap()
    }

    const BASE: &str =
        r#""qir_profiles"="base_profile" "required_num_qubits"="1" "required_num_results"="1""#;

    #[test]
    fn test_valid_module() {
        let m = module(
            "  call void @__quantum__qis__h__body(ptr null)\n  call void @__quantum__qis__mz__body(ptr null, ptr null)\n  call void @__quantum__rt__result_record_output(ptr null, ptr @0)",
            BASE,
        );
        validate(&m).unwrap();
    }

    #[test]
    fn test_missing_entry_point() {
        let m = load(&format!("define void @f() {{\n  ret void\n}}\n{FLAGS}")).unwrap();
        let err = validate(&m).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].rule, RuleClass::EntryPoint);
        assert!(err.to_string().contains("entry point"));
    }

    #[test]
    fn test_collects_every_violation() {
        let m = load(
            r#"
define void @main() #0 {
entry:
  call void @__quantum__qis__swap__body(ptr null, ptr inttoptr (i64 1 to ptr))
  %x = alloca i64
  ret void
}
declare void @__quantum__qis__swap__body(ptr, ptr)
attributes #0 = { "entry_point" "qir_profiles"="base_profile" "required_num_qubits"="x" }
"#,
        )
        .unwrap();
        let err = validate(&m).unwrap_err();
        assert_eq!(err.of_rule(RuleClass::ModuleFlags).count(), 4);
        assert_eq!(err.of_rule(RuleClass::Functions).count(), 1);
        assert_eq!(err.of_rule(RuleClass::Attributes).count(), 1);
        assert_eq!(err.of_rule(RuleClass::Instructions).count(), 1);
        assert!(err.to_string().contains("; "));
    }

    #[test]
    fn test_base_profile_forbids_read_result() {
        let m = module(
            "  call void @__quantum__qis__mz__body(ptr null, ptr null)\n  %r = call i1 @__quantum__rt__read_result(ptr null)",
            BASE,
        );
        let err = validate(&m).unwrap_err();
        assert_eq!(err.of_rule(RuleClass::Instructions).count(), 1);

        let adaptive = module(
            "  call void @__quantum__qis__mz__body(ptr null, ptr null)\n  %r = call i1 @__quantum__rt__read_result(ptr null)",
            r#""qir_profiles"="adaptive_profile""#,
        );
        validate(&adaptive).unwrap();
    }

    #[test]
    fn test_index_beyond_declared_count() {
        let m = module(
            "  call void @__quantum__qis__h__body(ptr inttoptr (i64 3 to ptr))",
            BASE,
        );
        let err = validate(&m).unwrap_err();
        let v: Vec<_> = err.of_rule(RuleClass::Consistency).collect();
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("qubit index 3"));
    }

    #[test]
    fn test_duplicate_labels() {
        let m = module(
            "  call void @__quantum__qis__mz__body(ptr null, ptr null)\n  call void @__quantum__rt__result_record_output(ptr null, ptr @0)\n  call void @__quantum__rt__result_record_output(ptr null, ptr @0)",
            BASE,
        );
        let err = validate(&m).unwrap_err();
        assert_eq!(err.of_rule(RuleClass::Output).count(), 1);
    }

    #[test]
    fn test_helper_named_main_and_pointer_return() {
        let m = load(&format!(
            r#"
define void @entry() #0 {{
  ret void
}}
define ptr @main() {{
  ret ptr null
}}
attributes #0 = {{ "entry_point" "qir_profiles"="base_profile" }}
{FLAGS}"#
        ))
        .unwrap();
        let err = validate(&m).unwrap_err();
        assert_eq!(err.of_rule(RuleClass::Functions).count(), 2);
    }
}
