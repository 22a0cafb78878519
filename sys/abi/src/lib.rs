//! Shared data model for the task-graph extractor, the target backends and
//! the host-side cosimulation driver.
//!
//! Nothing in this crate touches the filesystem or an AST; it only describes
//! the shapes that flow between `ast-probes`, `task-graph`, `targets` and
//! `cosim-device`. Keeping the model in one crate means the JSON graph that
//! `graphcc` emits on stdout is generated from the same types that the
//! extractor built, so the two can never drift apart.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The category of a single task parameter, resolved from its declared type.
///
/// This is a closed set deliberately: every hook in `lib/targets` switches on
/// it exhaustively, and a new category would mean a new hook everywhere, not
/// just a new variant here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortCategory {
    Istream,
    Ostream,
    Istreams,
    Ostreams,
    Mmap,
    AsyncMmap,
    Mmaps,
    Hmap,
    Scalar,
    Seq,
}

impl PortCategory {
    /// Streams (single or array) that carry data *into* a task.
    pub fn is_input_stream(self) -> bool {
        matches!(self, PortCategory::Istream | PortCategory::Istreams)
    }

    /// Streams (single or array) that carry data *out of* a task.
    pub fn is_output_stream(self) -> bool {
        matches!(self, PortCategory::Ostream | PortCategory::Ostreams)
    }

    pub fn is_stream(self) -> bool {
        self.is_input_stream() || self.is_output_stream()
    }

    pub fn is_mmap(self) -> bool {
        matches!(
            self,
            PortCategory::Mmap
                | PortCategory::AsyncMmap
                | PortCategory::Mmaps
                | PortCategory::Hmap
        )
    }

    /// True for categories that expand into `N` named ports (`name[0..N]`)
    /// rather than a single port.
    pub fn is_array(self) -> bool {
        matches!(
            self,
            PortCategory::Istreams
                | PortCategory::Ostreams
                | PortCategory::Mmaps
                | PortCategory::Hmap
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PortCategory::Istream => "istream",
            PortCategory::Ostream => "ostream",
            PortCategory::Istreams => "istreams",
            PortCategory::Ostreams => "ostreams",
            PortCategory::Mmap => "mmap",
            PortCategory::AsyncMmap => "async_mmap",
            PortCategory::Mmaps => "mmaps",
            PortCategory::Hmap => "hmap",
            PortCategory::Scalar => "scalar",
            PortCategory::Seq => "seq",
        }
    }
}

impl fmt::Display for PortCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a task sits in the dataflow graph, once BFS from `top` has settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Body constructs a task-graph object and invokes children.
    Upper,
    /// Reachable from `top`, but contains no task-graph object.
    Lower,
}

/// The closed set of code-generation backends. Absence of an attribute on a
/// task defaults to `VendorHls`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetTag {
    #[default]
    VendorHls,
    VendorAie,
    Ignore,
}

impl TargetTag {
    pub fn vendor(self) -> &'static str {
        match self {
            TargetTag::VendorHls => "xilinx-hls",
            TargetTag::VendorAie => "xilinx-aie",
            TargetTag::Ignore => "ignore",
        }
    }

    pub fn parse_attr(name: &str) -> Option<TargetTag> {
        match name {
            "vendor_hls" | "xilinx_hls" | "hls" => Some(TargetTag::VendorHls),
            "vendor_aie" | "xilinx_aie" | "aie" => Some(TargetTag::VendorAie),
            "ignore" => Some(TargetTag::Ignore),
            _ => None,
        }
    }
}

/// One parameter of a task, after array categories (`mmaps`, `hmap`, ...)
/// have been expanded to their `name[0]..name[N-1]` entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub cat: PortCategory,
    /// Bit-width of the element type; 0 when not statically known (e.g. a
    /// generic parameter that could not be resolved).
    pub width: u32,
    #[serde(rename = "type")]
    pub ty: String,
}

/// The producer or consumer side of a channel binding: which task, and which
/// of its (possibly vectorized) invocations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub task: String,
    pub index: u32,
}

/// A `stream<T, D>` declared as a local inside an upper-level task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fifo {
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub produced_by: Option<Binding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_by: Option<Binding>,
}

impl Fifo {
    pub fn new(depth: u32) -> Self {
        Self {
            depth,
            produced_by: None,
            consumed_by: None,
        }
    }

    /// A fifo that was extracted but never bound on either end.
    pub fn is_unused(&self) -> bool {
        self.produced_by.is_none() && self.consumed_by.is_none()
    }

    /// Bound on exactly one end: an error, since the other end must be an
    /// external port rather than a dangling channel.
    pub fn is_half_connected(&self) -> bool {
        self.produced_by.is_some() != self.consumed_by.is_some()
    }
}

/// How one invocation argument is bound to a formal parameter of the callee.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArgBinding {
    pub cat: PortCategory,
    /// Rendered form of the binding: a variable name, `name[idx]`, a
    /// `64'd<value>` literal, or a `seq` token's resolved index.
    pub arg: String,
}

/// One call to a child task inside a task-graph object, after vector
/// expansion (an `invoke::<N>(...)` produces `N` of these).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Invocation {
    pub step: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub args: IndexMap<String, ArgBinding>,
}

/// Everything extracted and rewritten for one task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskMeta {
    pub level: Level,
    pub target: TargetTag,
    pub vendor: String,
    pub readable_name: String,
    pub ports: Vec<Port>,
    /// Children invoked, keyed by callee task name; each callee may appear
    /// several times (vectorized or repeated invocations).
    pub tasks: IndexMap<String, Vec<Invocation>>,
    pub fifos: IndexMap<String, Fifo>,
    pub code: String,
}

/// The JSON document emitted by `graphcc` on stdout: one entry per
/// transitively reachable task, rooted at `top`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Graph {
    pub top: String,
    pub tasks: IndexMap<String, TaskMeta>,
}

/// Host-side view of a kernel argument, parsed from bitstream metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgCat {
    Scalar,
    Mmap,
    Stream,
}

impl fmt::Display for ArgCat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArgCat::Scalar => "scalar",
            ArgCat::Mmap => "mmap",
            ArgCat::Stream => "stream",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgInfo {
    pub index: u32,
    pub name: String,
    pub ty: String,
    pub cat: ArgCat,
}

impl fmt::Display for ArgInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ArgInfo: {{index: {}, name: '{}', type: '{}', category: {}}}",
            self.index, self.name, self.ty, self.cat
        )
    }
}

/// Intent of a host buffer, which decides whether its bytes are transferred
/// before (`load`) or after (`store`) device execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferTag {
    Placeholder,
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl BufferTag {
    /// Tag names describe what the *host* does with the buffer, not the
    /// kernel: a `WriteOnly` buffer is one the host only ever writes (the
    /// kernel consumes it, so its bytes must reach the device before
    /// `exec`), while a `ReadOnly` buffer is one the host only ever reads
    /// (the kernel produces it, so its bytes must come back after `exec`).
    /// This reads backwards from the kernel's point of view on first
    /// glance; it is not a typo.
    ///
    /// Buffer must be transferred to the device before `exec` (the "load"
    /// set, consumed by `write_to_device`).
    pub fn is_load(self) -> bool {
        matches!(self, BufferTag::WriteOnly | BufferTag::ReadWrite)
    }

    /// Buffer must be read back from the device after `finish` (the
    /// "store" set, consumed by `read_from_device`).
    pub fn is_store(self) -> bool {
        matches!(self, BufferTag::ReadOnly | BufferTag::ReadWrite)
    }
}

/// A diagnostic severity, matching the error taxonomy in the design: a
/// configuration or graph error aborts code emission for the translation
/// unit; a remark or warning does not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Remark,
}

/// A byte-range diagnostic, printed the way `rustc`-adjacent tools print
/// them: `path:line:col: severity: message`.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            line,
            column,
        }
    }

    pub fn warning(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            line,
            column,
        }
    }

    pub fn remark(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            severity: Severity::Remark,
            message: message.into(),
            line,
            column,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Remark => "remark",
        };
        write!(f, "{}:{}: {}: {}", self.line, self.column, tag, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_category_round_trips_through_json() {
        let cat = PortCategory::AsyncMmap;
        let json = serde_json::to_string(&cat).unwrap();
        assert_eq!(json, "\"async_mmap\"");
        let back: PortCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cat);
    }

    #[test]
    fn fifo_connection_states() {
        let mut fifo = Fifo::new(8);
        assert!(fifo.is_unused());
        assert!(!fifo.is_half_connected());

        fifo.produced_by = Some(Binding {
            task: "producer".into(),
            index: 0,
        });
        assert!(!fifo.is_unused());
        assert!(fifo.is_half_connected());

        fifo.consumed_by = Some(Binding {
            task: "consumer".into(),
            index: 0,
        });
        assert!(!fifo.is_half_connected());
    }

    #[test]
    fn target_tag_defaults_to_vendor_hls() {
        assert_eq!(TargetTag::default(), TargetTag::VendorHls);
    }

    #[test]
    fn buffer_tag_load_store_sets() {
        assert!(!BufferTag::ReadOnly.is_load() && BufferTag::ReadOnly.is_store());
        assert!(BufferTag::WriteOnly.is_load() && !BufferTag::WriteOnly.is_store());
        assert!(BufferTag::ReadWrite.is_load() && BufferTag::ReadWrite.is_store());
        assert!(!BufferTag::Placeholder.is_load() && !BufferTag::Placeholder.is_store());
    }
}
