//! Graph extraction (spec component C4): turns a [`DiscoveredTask`] into the
//! port list, FIFO table and per-child invocation bindings that make up its
//! [`graph_abi::TaskMeta`] (everything except `code`, which the target
//! backends in `lib/targets` fill in).

use std::collections::HashMap;

use ast_probes::{element_type, integral_arg, port_category, strip_refs, width_of, StreamDecl};
use graph_abi::{ArgBinding, Binding, Diagnostic, Fifo, Invocation, Port, PortCategory};
use indexmap::IndexMap;
use proc_macro2::Span;
use syn::spanned::Spanned;
use syn::{Expr, FnArg, ItemFn, Stmt};

use crate::discovery::DiscoveredTask;

/// Everything extraction produces for one task, short of the rewritten
/// source text that `lib/targets` attaches afterwards.
pub struct ExtractedTask {
    pub ports: Vec<Port>,
    pub fifos: IndexMap<String, Fifo>,
    pub tasks: IndexMap<String, Vec<Invocation>>,
}

struct ParamSpec {
    name: String,
    cat: PortCategory,
    len: u64,
    width: u32,
    ty_text: String,
}

fn span_line_col(span: Span) -> (usize, usize) {
    let start = span.start();
    (start.line, start.column + 1)
}

fn pat_ident(pat: &syn::Pat) -> Option<String> {
    match pat {
        syn::Pat::Ident(p) => Some(p.ident.to_string()),
        syn::Pat::Type(p) => pat_ident(&p.pat),
        _ => None,
    }
}

fn render_type(ty: &syn::Type) -> String {
    quote::quote!(#ty).to_string()
}

fn render_expr(expr: &Expr) -> String {
    quote::quote!(#expr).to_string()
}

/// Resolves one task's formal parameters to [`ParamSpec`]s: its category
/// (defaulting to `Scalar` for anything that isn't a recognized wrapper
/// type), the element width, and -- for array categories -- the declared
/// length.
fn raw_params(item: &ItemFn) -> Result<Vec<ParamSpec>, Vec<Diagnostic>> {
    let mut out = Vec::new();
    let mut diags = Vec::new();

    for input in &item.sig.inputs {
        let FnArg::Typed(pt) = input else { continue };
        let name = pat_ident(&pt.pat).unwrap_or_else(|| "_".to_string());
        let ty = &*pt.ty;

        match port_category(ty) {
            Some(cat) if cat.is_array() => match integral_arg(ty, 1) {
                Some(len) => {
                    let elem = element_type(ty).unwrap_or_else(|| ty.clone());
                    out.push(ParamSpec {
                        name,
                        cat,
                        len,
                        width: width_of(&elem),
                        ty_text: render_type(&elem),
                    });
                }
                None => {
                    let (line, column) = span_line_col(ty.span());
                    diags.push(Diagnostic::error(
                        format!(
                            "parameter '{name}' has a non-constant-evaluable array length"
                        ),
                        line,
                        column,
                    ));
                }
            },
            Some(cat) => {
                let elem = element_type(ty).unwrap_or_else(|| ty.clone());
                out.push(ParamSpec {
                    name,
                    cat,
                    len: 1,
                    width: width_of(&elem),
                    ty_text: render_type(&elem),
                });
            }
            None => {
                let stripped = strip_refs(ty).clone();
                out.push(ParamSpec {
                    name,
                    cat: PortCategory::Scalar,
                    len: 1,
                    width: width_of(&stripped),
                    ty_text: render_type(&stripped),
                });
            }
        }
    }

    if diags.is_empty() {
        Ok(out)
    } else {
        Err(diags)
    }
}

/// Expands array categories into their `name[0]..name[N-1]` port entries.
fn expand_ports(params: &[ParamSpec]) -> Vec<Port> {
    let mut ports = Vec::new();
    for p in params {
        if p.cat.is_array() {
            for i in 0..p.len {
                ports.push(Port {
                    name: format!("{}[{i}]", p.name),
                    cat: p.cat,
                    width: p.width,
                    ty: p.ty_text.clone(),
                });
            }
        } else {
            ports.push(Port {
                name: p.name.clone(),
                cat: p.cat,
                width: p.width,
                ty: p.ty_text.clone(),
            });
        }
    }
    ports
}

/// Extracts the local `Stream`/`Streams` declarations of an upper task into
/// its FIFO table, returning alongside a name -> declared-length map for
/// every array-shaped channel (consumed later to demultiplex bare-array
/// invocation arguments), and a name -> span map for diagnostics.
fn extract_fifos(
    item: &ItemFn,
) -> (
    IndexMap<String, Fifo>,
    HashMap<String, u64>,
    HashMap<String, (usize, usize)>,
) {
    let mut fifos = IndexMap::new();
    let mut lengths = HashMap::new();
    let mut spans = HashMap::new();

    for stmt in &item.block.stmts {
        let Stmt::Local(local) = stmt else { continue };
        let syn::Pat::Type(p) = &local.pat else { continue };
        let Some(name) = pat_ident(&p.pat) else { continue };
        let Some(decl) = ast_probes::stream_decl(&p.ty) else { continue };
        let loc = span_line_col(p.ty.span());
        match decl {
            StreamDecl::Single { depth } => {
                fifos.insert(name.clone(), Fifo::new(depth as u32));
                spans.insert(name, loc);
            }
            StreamDecl::Array { length, depth } => {
                lengths.insert(name.clone(), length);
                for i in 0..length {
                    let key = format!("{name}[{i}]");
                    fifos.insert(key.clone(), Fifo::new(depth as u32));
                    spans.insert(key, loc);
                }
            }
        }
    }

    (fifos, lengths, spans)
}

fn unwrap_ref(expr: &Expr) -> &Expr {
    match expr {
        Expr::Reference(r) => unwrap_ref(&r.expr),
        _ => expr,
    }
}

enum ArgKind {
    Var(String),
    ArrayElem(String, u64),
    IntLiteral(i64),
    Seq,
    Other(String),
}

/// Classifies one positional `invoke()` argument expression: a bare
/// variable (a whole channel or array, possibly demultiplexed below), a
/// statically-indexed array element, an integer literal (rendered as a
/// `64'd<value>` scalar the way the original bitstream metadata does),
/// a `seq(...)` per-invocation ordinal, or anything else this tool does not
/// attempt to interpret further.
fn classify_arg(expr: &Expr) -> ArgKind {
    match unwrap_ref(expr) {
        Expr::Path(p) if p.path.segments.len() == 1 => {
            ArgKind::Var(p.path.segments[0].ident.to_string())
        }
        Expr::Index(idx) => {
            if let Expr::Path(base) = unwrap_ref(&idx.expr) {
                if base.path.segments.len() == 1 {
                    if let Expr::Lit(syn::ExprLit {
                        lit: syn::Lit::Int(i),
                        ..
                    }) = &*idx.index
                    {
                        if let Ok(v) = i.base10_parse::<u64>() {
                            return ArgKind::ArrayElem(
                                base.path.segments[0].ident.to_string(),
                                v,
                            );
                        }
                    }
                }
            }
            ArgKind::Other(render_expr(unwrap_ref(expr)))
        }
        Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(i),
            ..
        }) => match i.base10_parse::<i64>() {
            Ok(v) => ArgKind::IntLiteral(v),
            Err(_) => ArgKind::Other(render_expr(unwrap_ref(expr))),
        },
        Expr::Call(c) => {
            let is_seq = matches!(&*c.func, Expr::Path(p) if p.path.segments.last().is_some_and(|s| s.ident == "seq"));
            if is_seq {
                ArgKind::Seq
            } else {
                ArgKind::Other(render_expr(unwrap_ref(expr)))
            }
        }
        other => ArgKind::Other(render_expr(other)),
    }
}

#[allow(clippy::too_many_arguments)]
fn bind_channel(
    fifos: &mut IndexMap<String, Fifo>,
    fifo_spans: &HashMap<String, (usize, usize)>,
    key: &str,
    cat: PortCategory,
    callee: &str,
    index: u32,
    diags: &mut Vec<Diagnostic>,
    call_loc: (usize, usize),
) {
    let Some(fifo) = fifos.get_mut(key) else {
        return;
    };
    let loc = fifo_spans.get(key).copied().unwrap_or(call_loc);
    let binding = Binding {
        task: callee.to_string(),
        index,
    };
    if cat.is_input_stream() {
        if fifo.consumed_by.is_some() {
            diags.push(Diagnostic::error(
                format!("fifo '{key}' is consumed by more than one task"),
                loc.0,
                loc.1,
            ));
            return;
        }
        fifo.consumed_by = Some(binding);
    } else if cat.is_output_stream() {
        if fifo.produced_by.is_some() {
            diags.push(Diagnostic::error(
                format!("fifo '{key}' is produced by more than one task"),
                loc.0,
                loc.1,
            ));
            return;
        }
        fifo.produced_by = Some(binding);
    }
}

/// Extracts one task's ports, FIFOs and (for an upper task) child
/// invocations. Diagnostics below `Error` severity do not abort extraction;
/// they are returned alongside a successful result so the caller can still
/// print them. Any `Error`-severity diagnostic aborts and returns the full
/// set (fatal and non-fatal together) so the caller has complete context.
pub fn extract<'a>(
    task: &DiscoveredTask<'a>,
    all_tasks: &IndexMap<String, DiscoveredTask<'a>>,
) -> Result<(ExtractedTask, Vec<Diagnostic>), Vec<Diagnostic>> {
    let mut diags = Vec::new();

    let own_params = match raw_params(task.item) {
        Ok(p) => p,
        Err(mut d) => {
            diags.append(&mut d);
            Vec::new()
        }
    };
    let ports = expand_ports(&own_params);

    let (mut fifos, mut array_lengths, fifo_spans) = extract_fifos(task.item);
    for p in &own_params {
        if p.cat.is_array() {
            array_lengths.insert(p.name.clone(), p.len);
        }
    }

    let mut tasks: IndexMap<String, Vec<Invocation>> = IndexMap::new();

    if task.is_upper {
        let mut counters: HashMap<String, u64> = HashMap::new();

        for inv in &task.invocations {
            let call_loc = span_line_col(inv.call_span);

            let Some(callee) = all_tasks.get(&inv.resolved_callee) else {
                // Discovery already reported the unknown-callee diagnostic.
                continue;
            };
            let callee_params = match raw_params(callee.item) {
                Ok(p) => p,
                // The callee's own extraction pass reports this.
                Err(_) => continue,
            };

            if inv.args.len() != callee_params.len() {
                diags.push(Diagnostic::error(
                    format!(
                        "invocation of '{}' passes {} argument(s) but the task takes {}",
                        inv.resolved_callee,
                        inv.args.len(),
                        callee_params.len()
                    ),
                    call_loc.0,
                    call_loc.1,
                ));
                continue;
            }

            for instance in 0..inv.vlen {
                let mut args = IndexMap::new();

                for (arg_expr, param) in inv.args.iter().zip(callee_params.iter()) {
                    let (rendered, fifo_key) = match classify_arg(arg_expr) {
                        ArgKind::IntLiteral(v) => (format!("64'd{v}"), None),
                        ArgKind::Seq => ("seq".to_string(), None),
                        ArgKind::ArrayElem(base, idx) => {
                            let key = format!("{base}[{idx}]");
                            (key.clone(), Some(key))
                        }
                        ArgKind::Var(name) => {
                            if let Some(&len) = array_lengths.get(&name) {
                                let counter = counters.entry(name.clone()).or_insert(0);
                                let idx = *counter;
                                *counter += 1;
                                if idx >= len {
                                    diags.push(Diagnostic::remark(
                                        format!(
                                            "invocation {instance} of '{}' reads index {idx} \
                                             of '{name}' (length {len}) by wraparound",
                                            inv.resolved_callee
                                        ),
                                        call_loc.0,
                                        call_loc.1,
                                    ));
                                }
                                let key = format!("{name}[{}]", idx % len);
                                (key.clone(), Some(key))
                            } else {
                                (name.clone(), Some(name))
                            }
                        }
                        ArgKind::Other(text) => (text, None),
                    };

                    if let Some(key) = &fifo_key {
                        bind_channel(
                            &mut fifos,
                            &fifo_spans,
                            key,
                            param.cat,
                            &inv.resolved_callee,
                            instance as u32,
                            &mut diags,
                            call_loc,
                        );
                    }

                    args.insert(
                        param.name.clone(),
                        ArgBinding {
                            cat: param.cat,
                            arg: rendered,
                        },
                    );
                }

                tasks
                    .entry(inv.resolved_callee.clone())
                    .or_default()
                    .push(Invocation {
                        step: inv.step,
                        name: inv.display_name.clone(),
                        args,
                    });
            }
        }
    }

    let mut unused = Vec::new();
    for (name, fifo) in fifos.iter() {
        let loc = fifo_spans.get(name).copied().unwrap_or((1, 1));
        if fifo.is_unused() {
            diags.push(Diagnostic::warning(
                format!("fifo '{name}' is declared but never bound"),
                loc.0,
                loc.1,
            ));
            unused.push(name.clone());
        } else if fifo.is_half_connected() {
            diags.push(Diagnostic::error(
                format!("fifo '{name}' is connected on only one end"),
                loc.0,
                loc.1,
            ));
        }
    }
    for name in unused {
        fifos.shift_remove(&name);
    }

    if diags.iter().any(Diagnostic::is_fatal) {
        return Err(diags);
    }

    Ok((
        ExtractedTask {
            ports,
            fifos,
            tasks,
        },
        diags,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::discover;
    use syn::parse_quote;

    #[test]
    fn minimal_pipeline_has_no_fifos_and_one_forwarded_stream() {
        let file: syn::File = parse_quote! {
            fn pass_through(mut in_: accel::IStream<i32>, mut out: accel::OStream<i32>) {}

            fn top(mut in_: accel::IStream<i32>, mut out: accel::OStream<i32>) {
                let mut tg = accel::TaskGraph::new();
                tg.invoke::<0, 1>(pass_through, (&mut in_, &mut out));
            }
        };
        let tasks = discover(&file, "top").unwrap();
        let (extracted, diags) = extract(&tasks["top"], &tasks).unwrap();
        assert!(diags.is_empty());
        assert!(extracted.fifos.is_empty());
        assert_eq!(extracted.tasks["pass_through"].len(), 1);
        let binding = &extracted.tasks["pass_through"][0].args["in_"];
        assert_eq!(binding.arg, "in_");
        assert_eq!(binding.cat, PortCategory::Istream);
    }

    #[test]
    fn internal_fifo_is_bound_on_both_ends() {
        let file: syn::File = parse_quote! {
            fn producer(mut out: accel::OStream<i32>) {}
            fn consumer(mut in_: accel::IStream<i32>) {}

            fn top() {
                let mut tg = accel::TaskGraph::new();
                let mut link: accel::Stream<i32, 8> = accel::Stream::new();
                tg.invoke::<0, 1>(producer, (&mut link,));
                tg.invoke::<0, 1>(consumer, (&mut link,));
            }
        };
        let tasks = discover(&file, "top").unwrap();
        let (extracted, diags) = extract(&tasks["top"], &tasks).unwrap();
        assert!(diags.is_empty());
        let fifo = &extracted.fifos["link"];
        assert_eq!(fifo.produced_by.as_ref().unwrap().task, "producer");
        assert_eq!(fifo.consumed_by.as_ref().unwrap().task, "consumer");
    }

    #[test]
    fn unused_fifo_is_a_warning_and_dropped() {
        let file: syn::File = parse_quote! {
            fn top() {
                let mut tg = accel::TaskGraph::new();
                let mut dangling: accel::Stream<i32, 8> = accel::Stream::new();
            }
        };
        let tasks = discover(&file, "top").unwrap();
        let (extracted, diags) = extract(&tasks["top"], &tasks).unwrap();
        assert!(!extracted.fifos.contains_key("dangling"));
        assert!(diags.iter().any(|d| d.message.contains("never bound")));
    }

    #[test]
    fn half_connected_fifo_is_fatal() {
        let file: syn::File = parse_quote! {
            fn producer(mut out: accel::OStream<i32>) {}

            fn top() {
                let mut tg = accel::TaskGraph::new();
                let mut link: accel::Stream<i32, 8> = accel::Stream::new();
                tg.invoke::<0, 1>(producer, (&mut link,));
            }
        };
        let tasks = discover(&file, "top").unwrap();
        let err = extract(&tasks["top"], &tasks).unwrap_err();
        assert!(err.iter().any(|d| d.message.contains("only one end")));
    }

    #[test]
    fn vectorized_invocation_demultiplexes_array_argument() {
        let file: syn::File = parse_quote! {
            fn worker(mut mem: accel::Mmap<i32>) {}

            fn top(mut mems: accel::Mmaps<i32, 2>) {
                let mut tg = accel::TaskGraph::new();
                tg.invoke::<0, 2>(worker, (&mut mems,));
            }
        };
        let tasks = discover(&file, "top").unwrap();
        let (extracted, diags) = extract(&tasks["top"], &tasks).unwrap();
        assert!(diags.is_empty());
        let invocations = &extracted.tasks["worker"];
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[0].args["mem"].arg, "mems[0]");
        assert_eq!(invocations[1].args["mem"].arg, "mems[1]");
    }

    #[test]
    fn wraparound_access_past_array_length_is_a_remark() {
        let file: syn::File = parse_quote! {
            fn worker(mut mem: accel::Mmap<i32>) {}

            fn top(mut mems: accel::Mmaps<i32, 2>) {
                let mut tg = accel::TaskGraph::new();
                tg.invoke::<0, 3>(worker, (&mut mems,));
            }
        };
        let tasks = discover(&file, "top").unwrap();
        let (extracted, diags) = extract(&tasks["top"], &tasks).unwrap();
        assert_eq!(extracted.tasks["worker"][2].args["mem"].arg, "mems[0]");
        assert!(diags.iter().any(|d| d.message.contains("wraparound")));
    }

    #[test]
    fn scalar_literal_argument_is_rendered_as_a_bit_literal() {
        let file: syn::File = parse_quote! {
            fn worker(n: i32) {}

            fn top() {
                let mut tg = accel::TaskGraph::new();
                tg.invoke::<0, 1>(worker, (64,));
            }
        };
        let tasks = discover(&file, "top").unwrap();
        let (extracted, diags) = extract(&tasks["top"], &tasks).unwrap();
        assert!(diags.is_empty());
        assert_eq!(extracted.tasks["worker"][0].args["n"].arg, "64'd64");
    }
}
