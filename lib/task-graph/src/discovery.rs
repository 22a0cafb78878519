//! Task discovery (spec component C3): from a named top task, transitively
//! discover all reachable tasks by BFS over invocation edges.

use std::collections::{HashMap, HashSet};

use ast_probes::find_taskgraph_object;
use graph_abi::{Diagnostic, TargetTag};
use indexmap::IndexMap;
use proc_macro2::Span;
use syn::{File, Item, ItemFn};

use crate::invocation::{parse_invocations, RawInvocation};

/// One node of the reachable task set: a definition plus the identity that
/// produced it (callee name, the generic const args it was specialized
/// with, and the task that invoked it).
pub struct DiscoveredTask<'a> {
    pub mangled_name: String,
    pub base_name: String,
    pub item: &'a ItemFn,
    pub target: TargetTag,
    pub is_upper: bool,
    pub invocations: Vec<RawInvocation>,
}

fn span_line_col(span: Span) -> (usize, usize) {
    let start = span.start();
    (start.line, start.column + 1)
}

fn target_attr(item: &ItemFn) -> TargetTag {
    for attr in &item.attrs {
        if !attr.path().is_ident("target") {
            continue;
        }
        if let Ok(name) = attr.parse_args::<syn::Ident>() {
            if let Some(tag) = TargetTag::parse_attr(&name.to_string()) {
                return tag;
            }
        }
    }
    TargetTag::default()
}

/// A callee identity: its source name plus the const generic arguments it
/// was invoked with (empty for a non-template task), plus the mangled name
/// of whichever task invoked it.
type Identity = (String, Vec<u64>, Option<String>);

fn mangle(base: &str, args: &[u64]) -> String {
    if args.is_empty() {
        return base.to_string();
    }
    let joined = args
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join("_");
    format!("{base}_{joined}")
}

/// Assigns `identity` its mangled task name, disambiguating a collision
/// (two distinct specializations that happen to mangle to the same string,
/// e.g. one parent's `f::<2>` against an unrelated task literally named
/// `f_2`) by suffixing the invoking parent's own mangled name. Idempotent:
/// an identity already resolved returns its existing name.
fn resolve_mangled(
    identity: &Identity,
    mangled_owner: &mut HashMap<String, Identity>,
    identity_to_mangled: &mut HashMap<Identity, String>,
) -> String {
    if let Some(existing) = identity_to_mangled.get(identity) {
        return existing.clone();
    }
    let (base, args, parent) = identity;
    let mut mangled = mangle(base, args);
    if let Some(owner) = mangled_owner.get(&mangled) {
        if owner != identity {
            let parent_tag = parent.clone().unwrap_or_else(|| "top".to_string());
            mangled = format!("{mangled}__{parent_tag}");
        }
    }
    mangled_owner.insert(mangled.clone(), identity.clone());
    identity_to_mangled.insert(identity.clone(), mangled.clone());
    mangled
}

/// BFS-discovers every task reachable from `top_name`, returning them in
/// discovery order (top first). Returns accumulated diagnostics instead of
/// a partial map on any configuration error (missing top, duplicate
/// definition, or an invocation referencing an unknown callee).
pub fn discover<'a>(
    file: &'a File,
    top_name: &str,
) -> Result<IndexMap<String, DiscoveredTask<'a>>, Vec<Diagnostic>> {
    let mut defs: HashMap<String, Vec<&ItemFn>> = HashMap::new();
    for item in &file.items {
        if let Item::Fn(f) = item {
            defs.entry(f.sig.ident.to_string()).or_default().push(f);
        }
    }

    let mut diags = Vec::new();
    for (name, fns) in &defs {
        if fns.len() > 1 {
            let (line, col) = span_line_col(fns[1].sig.ident.span());
            diags.push(Diagnostic::error(
                format!("task '{name}' is redefined"),
                line,
                col,
            ));
        }
    }
    if !diags.is_empty() {
        return Err(diags);
    }

    let Some(top_defs) = defs.get(top_name) else {
        return Err(vec![Diagnostic::error(
            format!("top task '{top_name}' has no definition"),
            1,
            1,
        )]);
    };
    let top_item = top_defs[0];

    let mut tasks: IndexMap<String, DiscoveredTask<'a>> = IndexMap::new();
    let mut visited: HashSet<Identity> = HashSet::new();
    let mut mangled_owner: HashMap<String, Identity> = HashMap::new();
    let mut identity_to_mangled: HashMap<Identity, String> = HashMap::new();
    let mut queue: std::collections::VecDeque<(Identity, &ItemFn)> =
        std::collections::VecDeque::new();

    let top_identity: Identity = (top_name.to_string(), Vec::new(), None);
    resolve_mangled(&top_identity, &mut mangled_owner, &mut identity_to_mangled);
    visited.insert(top_identity.clone());
    queue.push_back((top_identity, top_item));

    while let Some((identity, item)) = queue.pop_front() {
        let (base_name, _args, _parent) = &identity;
        let mangled = identity_to_mangled[&identity].clone();

        let tg_object = find_taskgraph_object(&item.block);
        let is_upper = tg_object.is_some();
        let target = target_attr(item);

        let mut invocations = if is_upper && target != TargetTag::Ignore {
            match parse_invocations(item, &mangled) {
                Ok(invocations) => invocations,
                Err(mut more) => {
                    diags.append(&mut more);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        if !diags.is_empty() {
            continue;
        }

        for inv in &mut invocations {
            let child_identity: Identity = (
                inv.callee_base.clone(),
                inv.callee_args.clone(),
                Some(mangled.clone()),
            );
            let Some(child_defs) = defs.get(&inv.callee_base) else {
                let (line, col) = span_line_col(inv.callee_span);
                diags.push(Diagnostic::error(
                    format!(
                        "invocation of unknown task '{}' from '{}'",
                        inv.callee_base, mangled
                    ),
                    line,
                    col,
                ));
                continue;
            };
            let child_mangled =
                resolve_mangled(&child_identity, &mut mangled_owner, &mut identity_to_mangled);
            inv.resolved_callee = child_mangled;

            if visited.insert(child_identity.clone()) {
                queue.push_back((child_identity, child_defs[0]));
            }
        }

        tasks.insert(
            mangled.clone(),
            DiscoveredTask {
                mangled_name: mangled,
                base_name: base_name.clone(),
                item,
                target,
                is_upper,
                invocations,
            },
        );
    }

    if !diags.is_empty() {
        return Err(diags);
    }

    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn minimal_pipeline_discovers_two_tasks() {
        let file: File = parse_quote! {
            fn pass_through(mut in_: accel::IStream<i32>, mut out: accel::OStream<i32>) {}

            fn top(mut in_: accel::IStream<i32>, mut out: accel::OStream<i32>) {
                let mut tg = accel::TaskGraph::new();
                tg.invoke::<0, 1>(pass_through, (&mut in_, &mut out));
            }
        };
        let tasks = discover(&file, "top").expect("discovery should succeed");
        assert_eq!(tasks.len(), 2);
        assert!(tasks.contains_key("top"));
        assert!(tasks.contains_key("pass_through"));
        assert!(tasks["top"].is_upper);
        assert!(!tasks["pass_through"].is_upper);
        assert_eq!(tasks["top"].invocations[0].resolved_callee, "pass_through");
    }

    #[test]
    fn missing_top_is_a_configuration_error() {
        let file: File = parse_quote! {
            fn other() {}
        };
        let err = discover(&file, "top").unwrap_err();
        assert!(err[0].message.contains("top task"));
    }

    #[test]
    fn duplicate_definition_is_an_error() {
        let file: File = parse_quote! {
            fn top() {}
            fn top() {}
        };
        let err = discover(&file, "top").unwrap_err();
        assert!(err[0].message.contains("redefined"));
    }

    #[test]
    fn unreachable_task_is_absent() {
        let file: File = parse_quote! {
            fn top(mut in_: accel::IStream<i32>, mut out: accel::OStream<i32>) {
                let mut tg = accel::TaskGraph::new();
                tg.invoke::<0, 1>(used, (&mut in_, &mut out));
            }
            fn used(mut in_: accel::IStream<i32>, mut out: accel::OStream<i32>) {}
            fn unused() {}
        };
        let tasks = discover(&file, "top").unwrap();
        assert!(tasks.contains_key("used"));
        assert!(!tasks.contains_key("unused"));
    }

    #[test]
    fn template_specialization_yields_distinct_mangled_names() {
        let file: File = parse_quote! {
            fn top(mut a: accel::IStream<i32>, mut b: accel::IStream<i32>) {
                let mut tg = accel::TaskGraph::new();
                tg.invoke::<0, 1>(f::<2>, (&mut a,));
                tg.invoke::<0, 1>(f::<3>, (&mut b,));
            }
            fn f(mut x: accel::IStream<i32>) {}
        };
        let tasks = discover(&file, "top").unwrap();
        assert!(tasks.contains_key("f_2"));
        assert!(tasks.contains_key("f_3"));
        assert_eq!(tasks["f_2"].base_name, "f");
    }
}
