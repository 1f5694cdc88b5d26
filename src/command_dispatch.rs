//! Purpose: Hold top-level CLI command dispatch for `meegbind`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command
//! execution.
//! Invariants: Script steps run against one `Binding`; each step either fully
//! succeeds (one JSON line on stdout) or aborts the run with an error.
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead};
use std::path::Path;

use clap::CommandFactory;
use serde::Deserialize;
use serde_json::json;

use meegbind::core::error::{Error, ErrorKind};
use meegbind::core::value::Value;
use meegbind::dispatch::Binding;
use meegbind::driver::factory::FactoryRegistry;

use super::{Cli, Command};

pub(super) fn dispatch_command(cli: Cli) -> Result<i32, Error> {
    match cli.command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "meegbind", &mut io::stdout());
            Ok(0)
        }
        Command::Commands { json } => {
            let binding = Binding::new(FactoryRegistry::with_defaults());
            if json {
                let commands: Vec<_> = binding
                    .table()
                    .iter()
                    .map(|spec| json!({ "name": spec.name, "summary": spec.summary }))
                    .collect();
                println!("{}", json!({ "commands": commands }));
            } else {
                let width = binding
                    .table()
                    .iter()
                    .map(|spec| spec.name.len())
                    .max()
                    .unwrap_or(0);
                for spec in binding.table().iter() {
                    println!("{:width$}  {}", spec.name, spec.summary);
                }
            }
            Ok(0)
        }
        Command::Run { script } => match script {
            Some(path) => {
                let contents = fs::read_to_string(&path).map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message(format!("failed to read script {}", path.display()))
                        .with_source(err)
                })?;
                run_script(contents.lines().map(str::to_string), Some(&path))
            }
            None => {
                let stdin = io::stdin();
                let lines: Vec<String> = stdin
                    .lock()
                    .lines()
                    .collect::<Result<_, _>>()
                    .map_err(|err| {
                        Error::new(ErrorKind::Io)
                            .with_message("failed to read script from stdin")
                            .with_source(err)
                    })?;
                run_script(lines.into_iter(), None)
            }
        },
    }
}

/// One script step: the argument list (command name first), the expected
/// output count, and an optional name under which the first output is saved
/// for later `{"ref": name}` substitution.
#[derive(Deserialize)]
struct ScriptStep {
    call: Vec<ScriptArg>,
    #[serde(default)]
    nargout: usize,
    #[serde(default)]
    save: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptArg {
    Ref {
        #[serde(rename = "ref")]
        reference: String,
    },
    Value(Value),
}

fn run_script(lines: impl Iterator<Item = String>, path: Option<&Path>) -> Result<i32, Error> {
    let mut binding = Binding::new(FactoryRegistry::with_defaults());
    let mut saved: BTreeMap<String, Value> = BTreeMap::new();

    for (index, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: ScriptStep = serde_json::from_str(line).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "invalid script step on line {}{}",
                    index + 1,
                    path.map(|p| format!(" of {}", p.display())).unwrap_or_default()
                ))
                .with_source(err)
        })?;

        let mut args = Vec::with_capacity(step.call.len());
        for arg in step.call {
            match arg {
                ScriptArg::Value(value) => args.push(value),
                ScriptArg::Ref { reference } => {
                    let value = saved.get(&reference).cloned().ok_or_else(|| {
                        Error::new(ErrorKind::Usage)
                            .with_message(format!("unknown saved result \"{reference}\""))
                            .with_hint("Save an output first with \"save\" on an earlier step.")
                    })?;
                    args.push(value);
                }
            }
        }

        let outputs = binding.call(step.nargout, &args)?;
        if let Some(name) = step.save {
            let first = outputs.first().cloned().ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("step on line {} saved \"{name}\" but produced no outputs", index + 1))
            })?;
            saved.insert(name, first);
        }
        println!("{}", json!({ "outputs": outputs }));
    }

    if binding.live_objects() > 0 {
        tracing::warn!(
            live = binding.live_objects(),
            "script finished with live handles; the module lock stays pinned"
        );
    }
    Ok(0)
}
