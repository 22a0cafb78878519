//! Task discovery and graph extraction (spec components C3 and C4): from a
//! parsed source file and a chosen top task, find every task transitively
//! reachable from it and build the port/FIFO/invocation metadata each one
//! contributes to the final graph.

pub mod discovery;
pub mod extractor;
pub mod invocation;

pub use discovery::{discover, DiscoveredTask};
pub use extractor::{extract, ExtractedTask};
pub use invocation::{parse_invocations, RawInvocation};
