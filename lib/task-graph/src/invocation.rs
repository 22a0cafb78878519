//! Parses a `tg.invoke::<STEP, N>(callee, (args...), "name"?)` call into a
//! structured [`RawInvocation`], shared by task discovery (which only needs
//! the callee identity) and the graph extractor (which needs everything).

use ast_probes::{find_invocations, find_taskgraph_object};
use graph_abi::Diagnostic;
use proc_macro2::Span;
use syn::{Expr, ExprMethodCall, GenericArgument, ItemFn, Lit};

#[derive(Clone)]
pub struct RawInvocation {
    pub callee_base: String,
    pub callee_args: Vec<u64>,
    pub callee_span: Span,
    pub step: i64,
    pub vlen: u64,
    pub display_name: Option<String>,
    /// Per-parameter binding expressions, positional (parameter 0 first).
    pub args: Vec<Expr>,
    pub call_span: Span,
    /// The callee's mangled task name, filled in by task discovery once the
    /// callee's specialization identity (and any collision with a
    /// same-named specialization from a different parent) is resolved.
    pub resolved_callee: String,
}

fn const_ints(turbofish: &syn::AngleBracketedGenericArguments) -> Vec<i64> {
    turbofish
        .args
        .iter()
        .filter_map(|a| match a {
            GenericArgument::Const(Expr::Lit(syn::ExprLit {
                lit: Lit::Int(i), ..
            })) => i.base10_parse::<i64>().ok(),
            _ => None,
        })
        .collect()
}

fn callee_identity(expr: &Expr) -> Option<(String, Vec<u64>, Span)> {
    let Expr::Path(p) = expr else { return None };
    let seg = p.path.segments.last()?;
    let base = seg.ident.to_string();
    let args = match &seg.arguments {
        syn::PathArguments::AngleBracketed(a) => a
            .args
            .iter()
            .filter_map(|a| match a {
                GenericArgument::Const(Expr::Lit(syn::ExprLit {
                    lit: Lit::Int(i), ..
                })) => i.base10_parse::<u64>().ok(),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Some((base, args, seg.ident.span()))
}

fn parse_one(call: &ExprMethodCall, task: &str) -> Result<RawInvocation, Diagnostic> {
    let (step, vlen) = match &call.turbofish {
        Some(tf) => {
            let ints = const_ints(tf);
            (
                ints.first().copied().unwrap_or(0),
                ints.get(1).map(|v| *v as u64).unwrap_or(1),
            )
        }
        None => (0, 1),
    };

    if call.args.len() < 2 || call.args.len() > 3 {
        let start = call.method.span().start();
        return Err(Diagnostic::error(
            format!(
                "invoke() in task '{task}' takes a callee, an argument tuple, \
                 and an optional display name; got {} arguments",
                call.args.len()
            ),
            start.line,
            start.column + 1,
        ));
    }
    let mut args_iter = call.args.iter();
    let callee_expr = args_iter.next().unwrap();
    let tuple_expr = args_iter.next().unwrap();
    let display_name = args_iter
        .next()
        .and_then(|e| match e {
            Expr::Lit(syn::ExprLit {
                lit: Lit::Str(s), ..
            }) => Some(s.value()),
            _ => None,
        });

    let Some((callee_base, callee_args, callee_span)) = callee_identity(callee_expr) else {
        let start = callee_expr_span(callee_expr);
        return Err(Diagnostic::error(
            format!("invoke() in task '{task}' has a non-path callee expression"),
            start.line,
            start.column + 1,
        ));
    };

    let args = match tuple_expr {
        Expr::Tuple(t) => t.elems.iter().cloned().collect(),
        other => {
            let start = callee_expr_span(other);
            return Err(Diagnostic::error(
                format!(
                    "invoke() in task '{task}' expects its second argument to be \
                     a parenthesized argument tuple"
                ),
                start.line,
                start.column + 1,
            ));
        }
    };

    Ok(RawInvocation {
        callee_base,
        callee_args,
        callee_span,
        step,
        vlen,
        display_name,
        args,
        call_span: call.method.span(),
        resolved_callee: String::new(),
    })
}

fn callee_expr_span(expr: &Expr) -> proc_macro2::LineColumn {
    use syn::spanned::Spanned;
    expr.span().start()
}

/// Extracts every `invoke(...)` call inside `item`'s task-graph object, in
/// source order. Returns all diagnostics accumulated across every call
/// rather than stopping at the first malformed one, since the rest of the
/// body may still be worth reporting on in one pass.
pub fn parse_invocations(item: &ItemFn, task: &str) -> Result<Vec<RawInvocation>, Vec<Diagnostic>> {
    let Some(tg) = find_taskgraph_object(&item.block) else {
        return Ok(Vec::new());
    };
    let calls = find_invocations(tg.var, &item.block);

    let mut out = Vec::new();
    let mut diags = Vec::new();
    for call in calls {
        match parse_one(call, task) {
            Ok(inv) => out.push(inv),
            Err(d) => diags.push(d),
        }
    }
    if diags.is_empty() {
        Ok(out)
    } else {
        Err(diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn parses_step_vlen_and_display_name() {
        let item: ItemFn = parse_quote! {
            fn top(mut a: accel::IStream<i32>) {
                let mut tg = accel::TaskGraph::new();
                tg.invoke::<1, 4>(worker, (&mut a,), "workers");
            }
        };
        let invs = parse_invocations(&item, "top").unwrap();
        assert_eq!(invs.len(), 1);
        assert_eq!(invs[0].step, 1);
        assert_eq!(invs[0].vlen, 4);
        assert_eq!(invs[0].display_name.as_deref(), Some("workers"));
        assert_eq!(invs[0].args.len(), 1);
    }

    #[test]
    fn parses_callee_template_args() {
        let item: ItemFn = parse_quote! {
            fn top(mut a: accel::IStream<i32>) {
                let mut tg = accel::TaskGraph::new();
                tg.invoke::<0, 1>(f::<2>, (&mut a,));
            }
        };
        let invs = parse_invocations(&item, "top").unwrap();
        assert_eq!(invs[0].callee_base, "f");
        assert_eq!(invs[0].callee_args, vec![2]);
    }

    #[test]
    fn rejects_non_tuple_second_argument() {
        let item: ItemFn = parse_quote! {
            fn top() {
                let mut tg = accel::TaskGraph::new();
                tg.invoke::<0, 1>(worker, a_bare_var);
            }
        };
        assert!(parse_invocations(&item, "top").is_err());
    }
}
