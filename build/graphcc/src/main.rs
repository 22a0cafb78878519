//! `graphcc`: the command-line driver tying the task-graph extractor (C3/C4)
//! and the vendor target backends (C5/C6) together. Parses one source file,
//! discovers every task reachable from `--top`, extracts each task's ports
//! and invocations, asks the chosen backend to rewrite every task's body for
//! every other task's emitted file, and prints the resulting `Graph` as JSON.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use graph_abi::{Diagnostic, Graph, Level, TargetTag, TaskMeta};
use indexmap::IndexMap;
use targets::HookLevel;
use task_graph::discovery::DiscoveredTask;

#[derive(Debug, Parser)]
#[clap(max_term_width = 80, about = "Dataflow task-graph extractor and source rewriter")]
struct Args {
    /// Name of the task that roots the dataflow graph.
    #[clap(long)]
    top: String,

    /// Default backend for a task with no `#[target(...)]` attribute of its
    /// own.
    #[clap(long, default_value = "xilinx-hls")]
    target: String,

    /// Source file to read.
    source: PathBuf,

    /// Accepted and ignored: stands in for arguments that would otherwise
    /// be forwarded to an external AST front end.
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    _forwarded: Vec<String>,
}

fn parse_default_target(name: &str) -> Result<TargetTag> {
    TargetTag::parse_attr(&name.replace('-', "_"))
        .with_context(|| format!("unknown --target '{name}'"))
}

fn print_diagnostics(path: &std::path::Path, diags: &[Diagnostic]) {
    for diag in diags {
        eprintln!("{}:{diag}", path.display());
    }
}

fn hook_level(task: &DiscoveredTask<'_>, top_name: &str) -> HookLevel {
    if task.base_name == top_name {
        HookLevel::Top
    } else if task.is_upper {
        HookLevel::Middle
    } else {
        HookLevel::Lower
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let default_target = parse_default_target(&args.target)?;

    let source_text = fs::read_to_string(&args.source)
        .with_context(|| format!("reading {}", args.source.display()))?;
    let file = syn::parse_file(&source_text)
        .with_context(|| format!("parsing {}", args.source.display()))?;

    let tasks = match task_graph::discover(&file, &args.top) {
        Ok(tasks) => tasks,
        Err(diags) => {
            print_diagnostics(&args.source, &diags);
            anyhow::bail!("failed to discover tasks reachable from '{}'", args.top);
        }
    };

    let mut extracted = IndexMap::new();
    let mut fatal = false;
    for (name, task) in &tasks {
        match task_graph::extract(task, &tasks) {
            Ok((extracted_task, diags)) => {
                print_diagnostics(&args.source, &diags);
                extracted.insert(name.clone(), extracted_task);
            }
            Err(diags) => {
                print_diagnostics(&args.source, &diags);
                fatal = true;
            }
        }
    }
    if fatal {
        anyhow::bail!("aborting after fatal diagnostics");
    }

    // Every task's rewritten file text depends on every *other* task's
    // `extracted` entry (for its sibling ports), so nothing here may be
    // removed from `extracted` until all tasks have been rewritten.
    // Collect the per-task (target, level, file text) first, against
    // immutable borrows only, then drain `extracted` in a second pass.
    let mut rewritten: IndexMap<String, (TargetTag, Level, String)> = IndexMap::new();
    for (name, task) in &tasks {
        let effective_target = if task_has_explicit_target(task) {
            task.target
        } else {
            default_target
        };
        let this_level = hook_level(task, &args.top);
        if effective_target == TargetTag::Ignore && matches!(this_level, HookLevel::Top | HookLevel::Middle) {
            anyhow::bail!(
                "task '{name}' is attributed #[target(ignore)] but is reachable as an \
                 upper-level task; the top-level/composition shell must be rewritten \
                 by a real vendor target instead"
            );
        }
        let backend = targets::backend_for(effective_target);

        let own_extracted = &extracted[name];
        let own_hooks: Vec<_> = own_extracted
            .ports
            .iter()
            .map(|p| backend.port_hook(this_level, p))
            .collect();
        let code = match backend.whole_body(this_level, task.item, &own_extracted.ports, &own_hooks) {
            targets::BodyRewrite::Emit(text) => text,
            targets::BodyRewrite::Delete => String::new(),
        };

        let mut file_text = String::new();
        for (other_name, other_task) in &tasks {
            if other_name == name {
                file_text.push_str(&code);
                file_text.push('\n');
                continue;
            }
            let other_extracted = &extracted[other_name];
            let other_hooks: Vec<_> = other_extracted
                .ports
                .iter()
                .map(|p| backend.port_hook(HookLevel::Other, p))
                .collect();
            match backend.whole_body(HookLevel::Other, other_task.item, &other_extracted.ports, &other_hooks) {
                targets::BodyRewrite::Emit(text) => {
                    file_text.push_str(&text);
                    file_text.push('\n');
                }
                targets::BodyRewrite::Delete => {}
            }
        }

        let level = if task.is_upper { Level::Upper } else { Level::Lower };
        rewritten.insert(name.clone(), (effective_target, level, file_text));
    }

    let mut graph_tasks = IndexMap::new();
    for (name, extracted_task) in extracted {
        let (effective_target, level, code) = rewritten
            .swap_remove(&name)
            .expect("every discovered task was rewritten above");
        let readable_name = tasks[&name].base_name.clone();
        graph_tasks.insert(
            name,
            TaskMeta {
                level,
                target: effective_target,
                vendor: effective_target.vendor().to_string(),
                readable_name,
                ports: extracted_task.ports,
                tasks: extracted_task.tasks,
                fifos: extracted_task.fifos,
                code,
            },
        );
    }

    let graph = Graph {
        top: args.top.clone(),
        tasks: graph_tasks,
    };
    serde_json::to_writer_pretty(std::io::stdout(), &graph).context("writing graph JSON")?;
    println!();
    Ok(())
}

fn task_has_explicit_target(task: &DiscoveredTask<'_>) -> bool {
    task.item.attrs.iter().any(|a| a.path().is_ident("target"))
}
