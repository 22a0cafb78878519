//! Predicates and accessors over `syn::Type` for the handful of generic
//! types the task-graph embedding recognizes: streams, memory-mapped
//! buffers, and the task-graph object itself.
//!
//! Everything here is a pure query: no diagnostics, no mutation. Higher
//! layers (`probes`, and `task-graph`'s extractor) decide what an
//! unrecognized type *means*; this module only answers "is this one of
//! ours, and if so, what's in the brackets".

use graph_abi::PortCategory;
use syn::{GenericArgument, PathArguments, Type};

/// Module path under which the embedded task-graph API is conventionally
/// imported. Types are recognized whether referenced as `accel::IStream<T>`
/// or, after a `use accel::*;`, bare `IStream<T>` -- this tool does not run
/// name resolution, so it accepts either spelling.
pub const FRAMEWORK_NAMESPACE: &str = "accel";

/// Strips any number of `&` / `&mut` layers and returns the named type
/// underneath, e.g. `&mut accel::IStream<i32>` -> `accel::IStream<i32>`.
pub fn strip_refs(ty: &Type) -> &Type {
    match ty {
        Type::Reference(r) => strip_refs(&r.elem),
        _ => ty,
    }
}

/// Returns the last path segment of a (possibly reference, possibly
/// qualified) type, e.g. `&accel::Mmap<f32>` -> segment `Mmap` with its
/// generic arguments.
fn last_segment(ty: &Type) -> Option<&syn::PathSegment> {
    match strip_refs(ty) {
        Type::Path(p) => p.path.segments.last(),
        _ => None,
    }
}

/// `is_framework_type(ty, "Mmap")` is true for `Mmap<T>`, `accel::Mmap<T>`,
/// `&Mmap<T>` and `&mut accel::Mmap<T>`.
pub fn is_framework_type(ty: &Type, name: &str) -> bool {
    last_segment(ty).is_some_and(|seg| seg.ident == name)
}

pub fn is_task_graph_object(ty: &Type) -> bool {
    is_framework_type(ty, "TaskGraph")
}

/// Maps a parameter type to its port category, or `None` if it is not one
/// of the framework's stream/mmap wrapper types (i.e. it is a plain scalar
/// or an unrecognized type).
pub fn port_category(ty: &Type) -> Option<PortCategory> {
    let seg = last_segment(ty)?;
    let cat = match seg.ident.to_string().as_str() {
        "IStream" => PortCategory::Istream,
        "OStream" => PortCategory::Ostream,
        "IStreams" => PortCategory::Istreams,
        "OStreams" => PortCategory::Ostreams,
        "Mmap" => PortCategory::Mmap,
        "AsyncMmap" => PortCategory::AsyncMmap,
        "Mmaps" => PortCategory::Mmaps,
        "Hmap" => PortCategory::Hmap,
        "Seq" => PortCategory::Seq,
        _ => return None,
    };
    Some(cat)
}

/// A local variable declared with type `Stream<T, D>` or `Streams<T, N, D>`
/// becomes a FIFO (or an array of `N` FIFOs) inside an upper-level task.
pub enum StreamDecl {
    Single { depth: u64 },
    Array { length: u64, depth: u64 },
}

pub fn stream_decl(ty: &Type) -> Option<StreamDecl> {
    let seg = last_segment(ty)?;
    match seg.ident.to_string().as_str() {
        "Stream" => {
            let depth = integral_arg(ty, 1)?;
            Some(StreamDecl::Single { depth })
        }
        "Streams" => {
            let length = integral_arg(ty, 1)?;
            let depth = integral_arg(ty, 2)?;
            Some(StreamDecl::Array { length, depth })
        }
        _ => None,
    }
}

fn generic_args(ty: &Type) -> Option<&syn::punctuated::Punctuated<GenericArgument, syn::token::Comma>> {
    let seg = last_segment(ty)?;
    match &seg.arguments {
        PathArguments::AngleBracketed(a) => Some(&a.args),
        _ => None,
    }
}

/// The first `GenericArgument::Type` in the wrapper's angle brackets, i.e.
/// the `T` in `Mmap<T>`, `IStream<T>`, `Hmap<T, N, S>`.
pub fn element_type(ty: &Type) -> Option<Type> {
    let args = generic_args(ty)?;
    args.iter().find_map(|a| match a {
        GenericArgument::Type(t) => Some(t.clone()),
        _ => None,
    })
}

/// The `k`-th const generic argument that evaluates to a plain integer
/// literal, 0-indexed among *all* generic arguments (types included), so
/// `integral_arg(ty, 1)` is "the first const generic after the element
/// type" for the common `Wrapper<T, N>` shape.
///
/// Non-literal const generics (an identifier, a `const` item, an
/// expression) are not constant-evaluable by this tool and yield `None`;
/// callers turn that into a "non-constant-evaluable template argument"
/// diagnostic rather than guessing.
pub fn integral_arg(ty: &Type, k: usize) -> Option<u64> {
    let args = generic_args(ty)?;
    let arg = args.iter().nth(k)?;
    match arg {
        GenericArgument::Const(syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(i),
            ..
        })) => i.base10_parse().ok(),
        GenericArgument::Type(Type::Path(p)) => {
            // `Hmap<T, 4, 1024>` sometimes parses its const args as
            // bare-integer "types" depending on how `syn` disambiguates;
            // accept a single-segment numeric-looking path defensively.
            p.path.get_ident().and_then(|i| i.to_string().parse().ok())
        }
        _ => None,
    }
}

/// Bit-width of a primitive element type. Returns 0 (unknown) for anything
/// that isn't one of Rust's fixed-width numeric primitives or `bool`.
pub fn width_of(ty: &Type) -> u32 {
    let Type::Path(p) = ty else { return 0 };
    let Some(ident) = p.path.get_ident() else {
        return 0;
    };
    match ident.to_string().as_str() {
        "bool" => 1,
        "i8" | "u8" => 8,
        "i16" | "u16" => 16,
        "i32" | "u32" | "f32" => 32,
        "i64" | "u64" | "f64" => 64,
        "i128" | "u128" => 128,
        _ => 0,
    }
}
