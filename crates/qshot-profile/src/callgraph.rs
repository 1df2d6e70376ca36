//! Direct-call graph of the IR-defined functions.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use qshot_ir::{Function, IrModule};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::schema::is_record_call;

/// Defined functions reachable from `entry` through direct calls, `entry`
/// first. Declarations are not part of the graph.
pub fn reachable_functions<'m>(module: &'m IrModule, entry: &'m Function) -> Vec<&'m Function> {
    let mut graph: DiGraph<&'m Function, ()> = DiGraph::new();
    let mut nodes: FxHashMap<&str, NodeIndex> = FxHashMap::default();
    for function in module.functions.iter().filter(|f| !f.is_declaration()) {
        nodes.insert(function.name.as_str(), graph.add_node(function));
    }
    for function in module.functions.iter().filter(|f| !f.is_declaration()) {
        let from = nodes[function.name.as_str()];
        for callee in function.callees() {
            if let Some(&to) = nodes.get(callee) {
                graph.update_edge(from, to, ());
            }
        }
    }

    let Some(&start) = nodes.get(entry.name.as_str()) else {
        return Vec::new();
    };
    let mut reachable = Vec::new();
    let mut dfs = Dfs::new(&graph, start);
    while let Some(node) = dfs.next(&graph) {
        reachable.push(graph[node]);
    }
    reachable
}

/// Names of the functions in `functions` that record output, either
/// directly or through a callee in `functions`.
pub fn recording_functions<'m>(functions: &[&'m Function]) -> FxHashSet<&'m str> {
    let mut recording: FxHashSet<&'m str> = functions
        .iter()
        .filter(|f| {
            f.instructions()
                .filter_map(|i| i.as_call())
                .any(|(callee, args)| is_record_call(callee, args))
        })
        .map(|f| f.name.as_str())
        .collect();

    loop {
        let before = recording.len();
        for function in functions {
            if !recording.contains(function.name.as_str())
                && function.callees().iter().any(|c| recording.contains(c))
            {
                recording.insert(function.name.as_str());
            }
        }
        if recording.len() == before {
            return recording;
        }
    }
}

#[cfg(test)]
mod tests {
    use qshot_ir::parse_ir;

    use super::*;

    const CHAIN: &str = r#"
define void @main() #0 {
entry:
  call void @outer()
  call void @quiet()
  ret void
}

define void @outer() {
entry:
  call void @inner()
  ret void
}

define void @inner() {
entry:
  call void @__quantum__rt__int_record_output(i64 1, ptr null)
  ret void
}

define void @quiet() {
entry:
  ret void
}

define void @dead() {
entry:
  call void @__quantum__rt__int_record_output(i64 2, ptr null)
  ret void
}

declare void @__quantum__rt__int_record_output(i64, ptr)

attributes #0 = { "entry_point" }
"#;

    #[test]
    fn test_reachable_skips_dead_functions() {
        let module = parse_ir(CHAIN).unwrap();
        let reachable = reachable_functions(&module, module.entry_point().unwrap());
        let mut names: Vec<&str> = reachable.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names[0], "main");
        names.sort_unstable();
        assert_eq!(names, ["inner", "main", "outer", "quiet"]);
    }

    #[test]
    fn test_recording_propagates_to_callers() {
        let module = parse_ir(CHAIN).unwrap();
        let reachable = reachable_functions(&module, module.entry_point().unwrap());
        let recording = recording_functions(&reachable);
        assert!(recording.contains("inner"));
        assert!(recording.contains("outer"));
        assert!(recording.contains("main"));
        assert!(!recording.contains("quiet"));
        assert!(!recording.contains("dead"));
    }
}
