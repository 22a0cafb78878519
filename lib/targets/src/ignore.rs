//! Ignore backend, grounded in
//! `original_source/tapacc/target/ignore_target.cpp`: a lower-level task's
//! body is replaced by dummy reads/writes that force-evaluate every port
//! (legal syntax, no real interface) -- used for preview-only builds that
//! still need something downstream tools can parse. A task attributed
//! `Ignore` that turns out to be `Top` or `Middle` level is a configuration
//! error, matching the original's `RewriteTopLevelFunc`/
//! `RewriteMiddleLevelFunc` throwing `std::runtime_error` for exactly that
//! case ("the top-level function should be rewritten by a specific target,
//! instead of being ignored").

use graph_abi::Port;

use crate::{dummy_scalar_rw, dummy_stream_rw, Backend, BodyRewrite, HookLevel, PortHook};

pub struct IgnoreBackend;

impl Backend for IgnoreBackend {
    fn vendor_name(&self) -> &'static str {
        "ignore"
    }

    fn port_hook(&self, level: HookLevel, port: &Port) -> PortHook {
        let mut hook = PortHook::default();
        if level == HookLevel::Lower {
            if port.cat.is_stream() {
                for line in dummy_stream_rw(&port.name, port.cat) {
                    hook.push(line);
                }
            } else {
                hook.push(dummy_scalar_rw(&port.name));
            }
        }
        hook
    }

    fn whole_body(&self, level: HookLevel, item: &syn::ItemFn, _ports: &[Port], hooks: &[PortHook]) -> BodyRewrite {
        let sig_tokens = &item.sig;
        let sig = quote::quote!(#sig_tokens).to_string();
        match level {
            HookLevel::Top | HookLevel::Middle => panic!(
                "task '{}' is attributed #[target(ignore)] but is reachable as an \
                 upper-level task; the top-level/composition shell must be rewritten \
                 by a real vendor target instead",
                item.sig.ident
            ),
            HookLevel::Lower => {
                let mut out = format!("{sig} {{\n");
                for hook in hooks {
                    for line in &hook.lines {
                        out.push_str("    ");
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                out.push_str("}\n");
                BodyRewrite::Emit(out)
            }
            HookLevel::Other => BodyRewrite::Emit(format!("{sig} {{}}\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_abi::PortCategory;
    use syn::parse_quote;

    fn port(name: &str, cat: PortCategory) -> Port {
        Port {
            name: name.into(),
            cat,
            width: 32,
            ty: "i32".into(),
        }
    }

    #[test]
    fn lower_level_gets_dummy_reads_for_every_port() {
        let item: syn::ItemFn = parse_quote! {
            fn helper(mut a: accel::IStream<i32>, n: i32) {}
        };
        let ports = vec![port("a", PortCategory::Istream), port("n", PortCategory::Scalar)];
        let hooks: Vec<_> = ports.iter().map(|p| IgnoreBackend.port_hook(HookLevel::Lower, p)).collect();
        match IgnoreBackend.whole_body(HookLevel::Lower, &item, &ports, &hooks) {
            BodyRewrite::Emit(code) => {
                assert!(code.contains("try_peek"));
                assert!(code.contains("&n"));
            }
            BodyRewrite::Delete => panic!("ignore keeps siblings, just empties them"),
        }
    }

    #[test]
    fn other_task_body_is_cleared() {
        let item: syn::ItemFn = parse_quote! {
            fn sibling(x: i32) -> i32 { x }
        };
        match IgnoreBackend.whole_body(HookLevel::Other, &item, &[], &[]) {
            BodyRewrite::Emit(code) => assert!(code.trim_end().ends_with("{}")),
            BodyRewrite::Delete => panic!("ignore keeps siblings, just empties them"),
        }
    }

    #[test]
    #[should_panic(expected = "reachable as an upper-level task")]
    fn top_level_ignore_is_rejected() {
        let item: syn::ItemFn = parse_quote! {
            fn top() {}
        };
        let _ = IgnoreBackend.whole_body(HookLevel::Top, &item, &[], &[]);
    }
}
