//! Vendor-AIE backend, grounded in
//! `original_source/tapacc/target/xilinx_aie_target.cpp`. AI Engine kernels
//! describe connectivity through external graph objects rather than
//! interface pragmas, so almost every hook here is a no-op; the only real
//! work is retyping stream/mmap parameters to their AIE-native pointer
//! types and deleting non-current sibling tasks outright (an AIE kernel
//! file may declare only one kernel).

use graph_abi::{Port, PortCategory};

use crate::{ArgRewrite, Backend, BodyRewrite, HookLevel, PortHook};

pub struct AieBackend;

impl Backend for AieBackend {
    fn vendor_name(&self) -> &'static str {
        "xilinx-aie"
    }

    fn port_hook(&self, _level: HookLevel, _port: &Port) -> PortHook {
        // Every AddCodeFor* hook in the original is empty for this target:
        // connectivity is described by the AIE graph, not the kernel body.
        PortHook::default()
    }

    fn rewrite_args(&self, level: HookLevel, ports: &[Port]) -> ArgRewrite {
        let mut retyped = Vec::new();
        let mut extra_headers = Vec::new();
        if level != HookLevel::Lower {
            return ArgRewrite {
                retyped,
                extra_headers,
            };
        }
        for port in ports {
            match port.cat {
                PortCategory::Istream => {
                    retyped.push((port.name.clone(), format!("&mut input_stream<uint_{}>", port.width)));
                    extra_headers.push("// #include <adf.h>".to_string());
                }
                PortCategory::Ostream => {
                    retyped.push((port.name.clone(), format!("&mut output_stream<uint_{}>", port.width)));
                    extra_headers.push("// #include <adf.h>".to_string());
                }
                PortCategory::Mmap | PortCategory::AsyncMmap => {
                    retyped.push((port.name.clone(), format!("&mut input_window<uint_{}>", port.width)));
                }
                _ => {}
            }
        }
        extra_headers.dedup();
        ArgRewrite {
            retyped,
            extra_headers,
        }
    }

    fn whole_body(&self, level: HookLevel, item: &syn::ItemFn, ports: &[Port], _hooks: &[PortHook]) -> BodyRewrite {
        match level {
            HookLevel::Top | HookLevel::Middle => {
                // Graph-level wiring happens outside the kernel body; the
                // original's RewriteTopLevelFunc/RewriteMiddleLevelFunc are
                // both empty overrides.
                BodyRewrite::Emit(render_unchanged(item))
            }
            HookLevel::Lower => {
                let retyped = self.rewrite_args(level, ports).retyped;
                let sig = render_signature_without_target_attr(item, &retyped);
                let body = crate::render_block_with_loop_pragmas(&item.block, self);
                BodyRewrite::Emit(format!("{sig} {body}"))
            }
            HookLevel::Other => BodyRewrite::Delete,
        }
    }

    /// Grounded in `AddPipelinePragma` in `xilinx_aie_target.cpp`, which
    /// inserts this literal pragma regardless of an initiation-interval
    /// argument; AIE loops have no II concept, so `ii` is ignored.
    fn pipeline_pragma(&self, _ii: Option<u64>) -> Option<String> {
        Some("chess_prepare_for_pipelining".to_string())
    }

    // `RewriteUnrolledStmt` is an empty override for this target in the
    // original: AIE has no unroll pragma, so `unroll_pragma` keeps the
    // trait's `None` default.
}

fn render_unchanged(item: &syn::ItemFn) -> String {
    let filtered = strip_target_attr(item);
    quote::quote!(#filtered).to_string()
}

fn strip_target_attr(item: &syn::ItemFn) -> syn::ItemFn {
    let mut item = item.clone();
    item.attrs.retain(|a| !a.path().is_ident("target"));
    item
}

fn render_signature_without_target_attr(item: &syn::ItemFn, retyped: &[(String, String)]) -> String {
    let item = strip_target_attr(item);
    let sig = &item.sig;
    let vis = &item.vis;
    let name = &sig.ident;
    let generics = &sig.generics;
    let params = sig
        .inputs
        .iter()
        .map(|input| match input {
            syn::FnArg::Typed(pt) => {
                let name = match &*pt.pat {
                    syn::Pat::Ident(p) => Some(p.ident.to_string()),
                    _ => None,
                };
                if let Some(name) = name {
                    if let Some((_, new_ty)) = retyped.iter().find(|(n, _)| *n == name) {
                        return format!("{name}: {new_ty}");
                    }
                }
                quote::quote!(#input).to_string()
            }
            syn::FnArg::Receiver(r) => quote::quote!(#r).to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    let attr_lines: String = item
        .attrs
        .iter()
        .map(|a| format!("{}\n", quote::quote!(#a)))
        .collect();
    format!("{attr_lines}{vis} fn {name}{generics}({params})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn port(name: &str, cat: PortCategory, width: u32) -> Port {
        Port {
            name: name.into(),
            cat,
            width,
            ty: "i32".into(),
        }
    }

    #[test]
    fn lower_level_stream_params_become_aie_pointer_types() {
        let ports = vec![port("a", PortCategory::Istream, 32), port("b", PortCategory::Ostream, 16)];
        let rewrite = AieBackend.rewrite_args(HookLevel::Lower, &ports);
        assert!(rewrite.retyped.iter().any(|(n, t)| n == "a" && t.contains("input_stream<uint_32>")));
        assert!(rewrite.retyped.iter().any(|(n, t)| n == "b" && t.contains("output_stream<uint_16>")));
        assert_eq!(rewrite.extra_headers.len(), 1);
    }

    #[test]
    fn lower_level_mmap_becomes_input_window() {
        let ports = vec![port("m", PortCategory::Mmap, 64)];
        let rewrite = AieBackend.rewrite_args(HookLevel::Lower, &ports);
        assert!(rewrite.retyped[0].1.contains("input_window<uint_64>"));
    }

    #[test]
    fn lower_level_body_gets_chess_pipeline_pragma_and_drops_attribute() {
        let item: syn::ItemFn = parse_quote! {
            fn worker() {
                #[pipeline]
                for i in 0..4 {
                    step(i);
                }
            }
        };
        match AieBackend.whole_body(HookLevel::Lower, &item, &[], &[]) {
            BodyRewrite::Emit(code) => {
                assert!(code.contains("chess_prepare_for_pipelining"));
                assert!(!code.contains("#[pipeline"));
                assert!(code.contains("step"));
            }
            BodyRewrite::Delete => panic!("lower level keeps the original body"),
        }
    }

    #[test]
    fn lower_level_unroll_attribute_is_a_no_op() {
        let item: syn::ItemFn = parse_quote! {
            fn worker() {
                #[unroll(4)]
                for i in 0..4 {
                    step(i);
                }
            }
        };
        match AieBackend.whole_body(HookLevel::Lower, &item, &[], &[]) {
            BodyRewrite::Emit(code) => {
                assert!(!code.contains("unroll"));
                assert!(!code.contains("#[unroll"));
                assert!(code.contains("step"));
            }
            BodyRewrite::Delete => panic!("lower level keeps the original body"),
        }
    }

    #[test]
    fn non_current_sibling_is_deleted() {
        let item: syn::ItemFn = parse_quote! {
            fn sibling(mut a: accel::IStream<i32>) {}
        };
        assert!(matches!(AieBackend.whole_body(HookLevel::Other, &item, &[], &[]), BodyRewrite::Delete));
    }

    #[test]
    fn top_level_body_is_unchanged_but_target_attr_is_stripped() {
        let item: syn::ItemFn = parse_quote! {
            #[target(aie)]
            fn top() {
                let mut tg = accel::TaskGraph::new();
            }
        };
        match AieBackend.whole_body(HookLevel::Top, &item, &[], &[]) {
            BodyRewrite::Emit(code) => {
                assert!(!code.contains("target"));
                assert!(code.contains("TaskGraph"));
            }
            BodyRewrite::Delete => panic!("top level is always emitted"),
        }
    }
}
