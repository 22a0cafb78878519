//! Locating the task-graph object and its invocations inside a function
//! body, and finding loop bodies for the pipeline/unroll attribute hooks.
//!
//! These are shallow, single-purpose walks; `task-graph`'s extractor is
//! what assigns meaning to what they find.

use syn::visit::{self, Visit};
use syn::{Block, Expr, ExprMethodCall, Ident, Local, Stmt};

use crate::type_preds;

/// The `let` binding that introduces the task-graph object, e.g.
/// `let mut tg = accel::TaskGraph::new();`.
pub struct TaskGraphObject<'a> {
    pub var: &'a Ident,
    pub local: &'a Local,
}

/// Returns the first top-level `let` statement in `body` whose declared (or
/// inferred-from-initializer) type is the framework's task-graph object.
///
/// Only direct children of the block are considered, matching the
/// original's "first child expression of the function body" contract: a
/// task-graph object nested inside a conditional or loop does not count,
/// since invocations reachable only conditionally would make the graph
/// extraction path-dependent.
pub fn find_taskgraph_object(body: &Block) -> Option<TaskGraphObject<'_>> {
    for stmt in &body.stmts {
        let Stmt::Local(local) = stmt else { continue };
        let Some(var) = local_ident(local) else {
            continue;
        };
        if let syn::Pat::Type(p) = &local.pat {
            if type_preds::is_task_graph_object(&p.ty) {
                return Some(TaskGraphObject { var, local });
            }
        }
        if initializer_constructs_taskgraph(local) {
            return Some(TaskGraphObject { var, local });
        }
    }
    None
}

fn local_ident(local: &Local) -> Option<&Ident> {
    match &local.pat {
        syn::Pat::Ident(p) => Some(&p.ident),
        syn::Pat::Type(p) => match &*p.pat {
            syn::Pat::Ident(p) => Some(&p.ident),
            _ => None,
        },
        _ => None,
    }
}

fn initializer_constructs_taskgraph(local: &Local) -> bool {
    let Some(init) = &local.init else {
        return false;
    };
    let mut expr: &Expr = &init.expr;
    loop {
        match expr {
            Expr::Call(c) => {
                if let Expr::Path(p) = &*c.func {
                    if path_ends_with(&p.path, "TaskGraph", "new") {
                        return true;
                    }
                }
                return false;
            }
            Expr::Reference(r) => expr = &r.expr,
            _ => return false,
        }
    }
}

fn path_ends_with(path: &syn::Path, ty: &str, method: &str) -> bool {
    let segs: Vec<_> = path.segments.iter().map(|s| s.ident.to_string()).collect();
    segs.len() >= 2 && segs[segs.len() - 2] == ty && segs[segs.len() - 1] == method
}

/// Every `<tg_var>.invoke(...)` call reachable anywhere under `root`
/// (including inside nested loops and conditionals -- an invocation's
/// *reachability* may be conditional even though the task-graph object's
/// declaration may not be, see [`find_taskgraph_object`]).
pub fn find_invocations<'a>(tg_var: &Ident, root: &'a Block) -> Vec<&'a ExprMethodCall> {
    struct Finder<'a, 'b> {
        tg_var: &'b Ident,
        out: Vec<&'a ExprMethodCall>,
    }

    impl<'a, 'b> Visit<'a> for Finder<'a, 'b> {
        fn visit_expr_method_call(&mut self, node: &'a ExprMethodCall) {
            if node.method == "invoke" && receiver_is(&node.receiver, self.tg_var) {
                self.out.push(node);
            }
            visit::visit_expr_method_call(self, node);
        }
    }

    fn receiver_is(expr: &Expr, var: &Ident) -> bool {
        matches!(expr, Expr::Path(p) if p.path.get_ident() == Some(var))
    }

    let mut finder = Finder {
        tg_var,
        out: Vec::new(),
    };
    finder.visit_block(root);
    finder.out
}

/// Returns the body of a `loop`, `while`, or `for` statement's expression,
/// or `None` if `stmt` is not a loop. Rust has no `do`/`while` form, so the
/// union of `loop` (bare), `while` and `for` covers the original's
/// do/for/while/ranged-for set.
pub fn loop_body(stmt: &Stmt) -> Option<&Block> {
    let expr = match stmt {
        Stmt::Expr(e, _) => e,
        _ => return None,
    };
    match expr {
        Expr::Loop(l) => Some(&l.body),
        Expr::While(w) => Some(&w.body),
        Expr::ForLoop(f) => Some(&f.body),
        _ => None,
    }
}

/// Returns the outer attributes carried by a loop statement's expression, or
/// `None` if `stmt` is not a loop. Paired with [`loop_body`] to locate both
/// halves (the `#[pipeline(...)]`/`#[unroll(...)]` attribute and the body
/// whose opening brace gets the resulting pragma) of a pipelined/unrolled
/// loop.
pub fn loop_attrs(stmt: &Stmt) -> Option<&[syn::Attribute]> {
    let expr = match stmt {
        Stmt::Expr(e, _) => e,
        _ => return None,
    };
    match expr {
        Expr::Loop(l) => Some(&l.attrs),
        Expr::While(w) => Some(&w.attrs),
        Expr::ForLoop(f) => Some(&f.attrs),
        _ => None,
    }
}

/// A `#[pipeline]`/`#[pipeline(5)]` or `#[unroll]`/`#[unroll(4)]` attribute
/// found on a loop statement, carrying the optional integer argument
/// (initiation interval for pipelining, unroll factor for unrolling).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPragma {
    Pipeline(Option<u64>),
    Unroll(Option<u64>),
}

/// Recognizes a pipeline/unroll attribute among `attrs` (as returned by
/// [`loop_attrs`]), the analogue of matching a `TapaPipelineAttr` or
/// `TapaUnrollAttr` in the original's AST.
pub fn loop_pragma(attrs: &[syn::Attribute]) -> Option<LoopPragma> {
    for attr in attrs {
        let int_arg = attr
            .parse_args::<syn::LitInt>()
            .ok()
            .and_then(|lit| lit.base10_parse().ok());
        if attr.path().is_ident("pipeline") {
            return Some(LoopPragma::Pipeline(int_arg));
        }
        if attr.path().is_ident("unroll") {
            return Some(LoopPragma::Unroll(int_arg));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn finds_task_graph_object_by_initializer() {
        let body: Block = parse_quote!({
            let mut tg = accel::TaskGraph::new();
            tg.invoke(pass_through, (&mut in_, &mut out));
        });
        let found = find_taskgraph_object(&body).expect("task graph object");
        assert_eq!(found.var, "tg");
    }

    #[test]
    fn finds_task_graph_object_by_annotation() {
        let body: Block = parse_quote!({
            let tg: accel::TaskGraph = make_graph();
        });
        assert!(find_taskgraph_object(&body).is_some());
    }

    #[test]
    fn collects_invocations_including_nested() {
        let body: Block = parse_quote!({
            let mut tg = accel::TaskGraph::new();
            tg.invoke(a, (&mut x,));
            if cond {
                tg.invoke(b, (&mut y,));
            }
        });
        let tg = find_taskgraph_object(&body).unwrap();
        let invocations = find_invocations(tg.var, &body);
        assert_eq!(invocations.len(), 2);
    }

    #[test]
    fn loop_body_covers_loop_while_for() {
        let s: Stmt = parse_quote!(loop { x(); });
        assert!(loop_body(&s).is_some());
        let s: Stmt = parse_quote!(while c { x(); });
        assert!(loop_body(&s).is_some());
        let s: Stmt = parse_quote!(for i in 0..4 { x(); });
        assert!(loop_body(&s).is_some());
        let s: Stmt = parse_quote!(x(););
        assert!(loop_body(&s).is_none());
    }

    #[test]
    fn loop_pragma_recognizes_pipeline_and_unroll() {
        let s: Stmt = parse_quote!(
            #[pipeline(2)]
            for i in 0..4 {
                x();
            }
        );
        let attrs = loop_attrs(&s).expect("loop attrs");
        assert_eq!(loop_pragma(attrs), Some(LoopPragma::Pipeline(Some(2))));

        let s: Stmt = parse_quote!(
            #[unroll]
            while c {
                x();
            }
        );
        let attrs = loop_attrs(&s).expect("loop attrs");
        assert_eq!(loop_pragma(attrs), Some(LoopPragma::Unroll(None)));

        let s: Stmt = parse_quote!(
            for i in 0..4 {
                x();
            }
        );
        let attrs = loop_attrs(&s).expect("loop attrs");
        assert_eq!(loop_pragma(attrs), None);
    }
}
