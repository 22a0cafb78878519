//! Vendor-HLS backend: the default target, grounded in
//! `original_source/tapacc/target/xilinx_hls_target.cpp`. Only "Vitis mode"
//! is implemented (the original's non-Vitis branch just routes top-level
//! hooks to the middle-level ones, which this backend does directly).
//!
//! - Top level: body becomes an empty shell built from every port's
//!   top-level hook, the task gets an `extern "C"`-equivalent signature
//!   (`#[no_mangle] pub extern "C" fn`) and the control-interface pragma,
//!   and any `#[inline]` attribute is stripped (Vitis HLS rejects inlined
//!   kernels).
//! - Middle level: scalars and mmap offsets get `ap_none register` so a
//!   clock/reset pair is still generated; streams get the same
//!   disaggregation as lower level.
//! - Lower level: hook lines are inserted at the top of the *original*
//!   body (unlike top/middle, whose bodies are replaced outright).
//! - Other (a sibling task in the same file): body is cleared.

use std::fmt::Write as _;

use graph_abi::{Port, PortCategory};

use crate::{dummy_scalar_rw, dummy_stream_rw, shell_body, ArgRewrite, Backend, BodyRewrite, HookLevel, PortHook};

pub struct HlsBackend;

fn render_params(sig: &syn::Signature, retyped: &[(String, String)]) -> String {
    sig.inputs
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
        .join(", ")
}

fn render_signature(item: &syn::ItemFn, retyped: &[(String, String)], extern_c: bool) -> String {
    let sig = &item.sig;
    let vis = &item.vis;
    let name = &sig.ident;
    let generics = &sig.generics;
    let params = render_params(sig, retyped);
    let output = match &sig.output {
        syn::ReturnType::Default => String::new(),
        syn::ReturnType::Type(_, ty) => format!(" -> {}", quote::quote!(#ty)),
    };
    let qualifier = if extern_c { "extern \"C\" " } else { "" };
    let attr_lines: String = item
        .attrs
        .iter()
        .filter(|a| !a.path().is_ident("inline") && !a.path().is_ident("target"))
        .map(|a| format!("{}\n", quote::quote!(#a)))
        .collect();
    format!("{attr_lines}{vis} {qualifier}fn {name}{generics}({params}){output}")
}

fn lower_stream_hook(port: &Port) -> PortHook {
    let mut hook = PortHook::default();
    let name = &port.name;
    hook.push(format!("#pragma HLS disaggregate variable = {name}"));
    let fifo_var = format!("{name}._");
    hook.push(format!("#pragma HLS interface ap_fifo port = {fifo_var}"));
    hook.push(format!("#pragma HLS aggregate variable = {fifo_var} bit"));
    if port.cat.is_input_stream() {
        let peek_var = format!("{name}._peek");
        hook.push(format!("#pragma HLS interface ap_fifo port = {peek_var}"));
        hook.push(format!("#pragma HLS aggregate variable = {peek_var} bit"));
    }
    for line in dummy_stream_rw(name, port.cat) {
        hook.push(line);
    }
    hook
}

fn lower_async_mmap_hook(port: &Port) -> PortHook {
    let mut hook = PortHook::default();
    let name = &port.name;
    hook.push(format!("#pragma HLS disaggregate variable = {name}"));
    for tag in [".read_addr", ".read_data", ".write_addr", ".write_data", ".write_resp"] {
        let fifo_var = format!("{name}{tag}._");
        hook.push(format!("#pragma HLS interface ap_fifo port = {fifo_var}"));
        hook.push(format!("#pragma HLS aggregate variable = {fifo_var} bit"));
    }
    hook.push(dummy_scalar_rw(name));
    hook
}

impl Backend for HlsBackend {
    fn vendor_name(&self) -> &'static str {
        "xilinx-hls"
    }

    fn port_hook(&self, level: HookLevel, port: &Port) -> PortHook {
        let mut hook = PortHook::default();
        let name = &port.name;
        match level {
            HookLevel::Top => match port.cat {
                PortCategory::Istream | PortCategory::Ostream | PortCategory::Istreams | PortCategory::Ostreams => {
                    hook.push(format!("#pragma HLS interface axis port = {name}"));
                    for line in dummy_stream_rw(name, port.cat) {
                        hook.push(line);
                    }
                }
                PortCategory::Mmaps | PortCategory::Hmap => {
                    hook.push(format!("#pragma HLS interface s_axilite port = {name} bundle = control"));
                    hook.push(dummy_scalar_rw(name));
                }
                PortCategory::Mmap | PortCategory::AsyncMmap => {
                    hook.push(format!(
                        "#pragma HLS interface s_axilite port = {name}_offset bundle = control"
                    ));
                    hook.push(dummy_scalar_rw(name));
                }
                PortCategory::Scalar | PortCategory::Seq => {
                    hook.push(format!("#pragma HLS interface s_axilite port = {name} bundle = control"));
                    hook.push(dummy_scalar_rw(name));
                }
            },
            HookLevel::Middle => match port.cat {
                PortCategory::Istream | PortCategory::Ostream | PortCategory::Istreams | PortCategory::Ostreams => {
                    hook = lower_stream_hook(port);
                }
                PortCategory::AsyncMmap => {
                    hook.push(format!("#pragma HLS interface ap_none port = {name} register"));
                    hook.push(dummy_scalar_rw(name));
                }
                PortCategory::Mmap => {
                    hook.push(format!("#pragma HLS interface ap_none port = {name}_offset register"));
                    hook.push(dummy_scalar_rw(name));
                }
                PortCategory::Mmaps | PortCategory::Hmap => {
                    hook.push(format!("#pragma HLS interface ap_none port = {name} register"));
                    hook.push(dummy_scalar_rw(name));
                }
                PortCategory::Scalar | PortCategory::Seq => {
                    hook.push(format!("#pragma HLS interface ap_none port = {name} register"));
                    hook.push(dummy_scalar_rw(name));
                }
            },
            HookLevel::Lower => match port.cat {
                PortCategory::Istream | PortCategory::Ostream | PortCategory::Istreams | PortCategory::Ostreams => {
                    hook = lower_stream_hook(port);
                }
                PortCategory::AsyncMmap => {
                    hook = lower_async_mmap_hook(port);
                }
                PortCategory::Mmap => {
                    hook.push(format!(
                        "#pragma HLS interface m_axi port = {name} offset = direct bundle = {name}"
                    ));
                }
                PortCategory::Mmaps | PortCategory::Hmap => {
                    hook.push(format!("// #error '{name}': mmaps/hmap not supported for lower-level tasks"));
                }
                PortCategory::Scalar | PortCategory::Seq => {
                    hook.push(dummy_scalar_rw(name));
                }
            },
            HookLevel::Other => {}
        }
        hook
    }

    fn rewrite_args(&self, level: HookLevel, ports: &[Port]) -> ArgRewrite {
        let mut retyped = Vec::new();
        if matches!(level, HookLevel::Top | HookLevel::Middle) {
            for port in ports {
                if matches!(port.cat, PortCategory::Mmap | PortCategory::AsyncMmap) {
                    retyped.push((port.name.clone(), "u64".to_string()));
                }
            }
        }
        ArgRewrite {
            retyped,
            extra_headers: Vec::new(),
        }
    }

    fn whole_body(&self, level: HookLevel, item: &syn::ItemFn, ports: &[Port], hooks: &[PortHook]) -> BodyRewrite {
        match level {
            HookLevel::Top => {
                let retyped = self.rewrite_args(level, ports).retyped;
                let sig = render_signature(item, &retyped, true);
                let control = "#pragma HLS interface s_axilite port = return bundle = control".to_string();
                let body = shell_body(hooks, &[control]);
                BodyRewrite::Emit(format!("#[no_mangle]\n{sig} {body}"))
            }
            HookLevel::Middle => {
                let retyped = self.rewrite_args(level, ports).retyped;
                let sig = render_signature(item, &retyped, false);
                let body = shell_body(hooks, &[]);
                BodyRewrite::Emit(format!("{sig} {body}"))
            }
            HookLevel::Lower => {
                let sig = render_signature(item, &[], false);
                let mut out = String::new();
                out.push_str(&sig);
                out.push_str(" {\n");
                for hook in hooks {
                    for line in &hook.lines {
                        let _ = writeln!(out, "    {line}");
                    }
                }
                out.push_str(&crate::render_body_stmts(&item.block, self, "    "));
                out.push_str("}\n");
                BodyRewrite::Emit(out)
            }
            HookLevel::Other => {
                let sig = render_signature(item, &[], false);
                BodyRewrite::Emit(format!("{sig} {{}}\n"))
            }
        }
    }

    fn pipeline_pragma(&self, ii: Option<u64>) -> Option<String> {
        Some(match ii {
            Some(ii) => format!("#pragma HLS pipeline II = {ii}"),
            None => "#pragma HLS pipeline".to_string(),
        })
    }

    fn unroll_pragma(&self, factor: Option<u64>) -> Option<String> {
        Some(match factor {
            Some(factor) => format!("#pragma HLS unroll factor = {factor}"),
            None => "#pragma HLS unroll".to_string(),
        })
    }
}
