use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::compile::{self, SourceUnit};
use crate::manifest;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum CliMode {
    Translate,
    Check,
}

pub fn run_cli<I>(args: I) -> i32
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();
    let mode = match args.peek().map(String::as_str) {
        Some("check") => {
            args.next();
            CliMode::Check
        }
        _ => CliMode::Translate,
    };

    let mut inputs: Vec<PathBuf> = Vec::new();
    let mut output: Option<PathBuf> = None;
    let mut layout_path: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" => match args.next() {
                Some(path) => output = Some(PathBuf::from(path)),
                None => {
                    eprintln!("expected output path after -o");
                    return 1;
                }
            },
            "--layout" => match args.next() {
                Some(path) => layout_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("expected manifest path after --layout");
                    return 1;
                }
            },
            "-h" | "--help" => {
                print_usage();
                return 0;
            }
            _ if arg.starts_with('-') => {
                eprintln!("unknown argument: {}", arg);
                return 1;
            }
            _ => inputs.push(PathBuf::from(arg)),
        }
    }
    if inputs.is_empty() {
        print_usage();
        return 1;
    }
    if output.is_some() && inputs.len() > 1 {
        eprintln!("-o requires exactly one input file");
        return 1;
    }

    let mut units = Vec::with_capacity(inputs.len());
    for path in &inputs {
        if output_path(path).is_none() {
            eprintln!(
                "{}: input must be named <stem>.<hostlang>.parlang",
                path.display()
            );
            return 1;
        }
        let text = match fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))
        {
            Ok(text) => text,
            Err(err) => {
                eprintln!("{:#}", err);
                return 1;
            }
        };
        units.push(SourceUnit::new(path.display().to_string(), text));
    }

    if mode == CliMode::Check {
        let table = match compile::check(&units) {
            Ok(table) => table,
            Err(err) => {
                eprintln!("{}", err);
                return 1;
            }
        };
        if let Some(path) = layout_path {
            if let Err(err) = manifest::write_manifest(&path, &table) {
                eprintln!("{:#}", err);
                return 1;
            }
        }
        return 0;
    }

    let translation = match compile::translate(&units) {
        Ok(t) => t,
        Err(err) => {
            eprintln!("{}", err);
            return 1;
        }
    };
    for warning in &translation.warnings {
        eprintln!("warning: {}", warning);
    }

    for (path, text) in inputs.iter().zip(&translation.outputs) {
        let out_path = match &output {
            Some(p) => p.clone(),
            None => match output_path(path) {
                Some(p) => p,
                None => {
                    eprintln!("{}: cannot derive output path", path.display());
                    return 1;
                }
            },
        };
        if let Err(err) = fs::write(&out_path, text)
            .with_context(|| format!("writing {}", out_path.display()))
        {
            eprintln!("{:#}", err);
            return 1;
        }
    }
    if let Some(path) = layout_path {
        if let Err(err) = manifest::write_manifest(&path, &translation.table) {
            eprintln!("{:#}", err);
            return 1;
        }
    }
    0
}

/// Inputs carry a two-suffix extension `<stem>.<hostlang>.parlang`; the
/// output strips the outer suffix.
fn output_path(input: &Path) -> Option<PathBuf> {
    let name = input.file_name()?.to_str()?;
    let stem = name.strip_suffix(".parlang")?;
    if !stem.contains('.') || stem.starts_with('.') {
        return None;
    }
    Some(input.with_file_name(stem))
}

fn print_usage() {
    eprintln!("usage: parlangc [check] <file>.<hostlang>.parlang... [-o <out>] [--layout <path>]");
    eprintln!();
    eprintln!("  check            validate and compute layouts without writing output");
    eprintln!("  -o <out>         output path (single input only)");
    eprintln!("  --layout <path>  write a JSON layout manifest");
}

#[cfg(test)]
mod tests {
    use super::output_path;
    use std::path::{Path, PathBuf};

    #[test]
    fn output_strips_outer_suffix_only() {
        assert_eq!(
            output_path(Path::new("dir/demo.js.parlang")),
            Some(PathBuf::from("dir/demo.js"))
        );
        assert_eq!(output_path(Path::new("demo.js.parlang")), Some(PathBuf::from("demo.js")));
    }

    #[test]
    fn single_suffix_inputs_are_rejected() {
        assert_eq!(output_path(Path::new("demo.parlang")), None);
        assert_eq!(output_path(Path::new("demo.js")), None);
        assert_eq!(output_path(Path::new(".parlang")), None);
    }
}
