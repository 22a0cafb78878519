//! AST-level queries used by the task-graph extractor (spec components C1
//! and C2): is this type one of the framework's wrapper types, and where in
//! a function body is the task-graph object and its invocations.
//!
//! Everything here is read-only over a `syn` tree; nothing writes source
//! text back out. That happens in `lib/targets` and `build/graphcc`, which
//! operate on byte ranges derived from these queries.

pub mod probes;
pub mod type_preds;

pub use probes::{
    find_invocations, find_taskgraph_object, loop_attrs, loop_body, loop_pragma, LoopPragma, TaskGraphObject,
};
pub use type_preds::{
    element_type, integral_arg, is_framework_type, is_task_graph_object, port_category,
    stream_decl, strip_refs, width_of, StreamDecl, FRAMEWORK_NAMESPACE,
};
