// Purpose: Orchestrate the translation pipeline from annotated sources to host-language output.
// Inputs/Outputs: Consumes in-memory source units; returns transformed text plus non-fatal notes.
// Invariants: Passes run to completion for all files before the next pass begins.
// Gotchas: The first fatal diagnostic aborts the whole translation; there is no partial output.

use crate::codegen;
use crate::codegen::expander::Expander;
use crate::frontend::ast::CollectedFile;
use crate::frontend::collector::Collector;
use crate::frontend::diagnostic::format_diagnostic;
use crate::sema::types::TypeTable;
use crate::sema::{self, layout, vtable, FileUnit};

/// One input file: display name plus full text.
#[derive(Clone, Debug)]
pub struct SourceUnit {
    pub name: String,
    pub text: String,
}

impl SourceUnit {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Translation result: one output text per input unit, in input order, plus
/// rendered non-fatal diagnostics from the macro expander. The finished
/// type table rides along for layout-manifest export.
#[derive(Debug)]
pub struct Translation {
    pub outputs: Vec<String>,
    pub warnings: Vec<String>,
    pub table: TypeTable,
}

pub fn translate(units: &[SourceUnit]) -> Result<Translation, String> {
    let (table, files) = analyze_units(units)?;
    let (outputs, warnings) = {
        let mut expander = Expander::new(&table);
        let mut outputs = Vec::with_capacity(files.len());
        for f in &files {
            let pasted = codegen::paste_up(&table, f);
            let expanded = expander
                .expand_file(&f.name, &pasted)
                .map_err(|d| format_diagnostic(&d))?;
            outputs.push(expanded);
        }
        let warnings = expander
            .warnings
            .items
            .iter()
            .map(format_diagnostic)
            .collect::<Vec<_>>();
        (outputs, warnings)
    };
    Ok(Translation {
        outputs,
        warnings,
        table,
    })
}

/// Run the pipeline through vtable construction without emitting output.
pub fn check(units: &[SourceUnit]) -> Result<TypeTable, String> {
    let (table, _) = analyze_units(units)?;
    Ok(table)
}

fn analyze_units(units: &[SourceUnit]) -> Result<(TypeTable, Vec<FileUnit>), String> {
    let collector = Collector::new();
    let mut collected: Vec<CollectedFile> = Vec::with_capacity(units.len());
    for u in units {
        collected.push(
            collector
                .collect(&u.name, &u.text)
                .map_err(|d| format_diagnostic(&d))?,
        );
    }
    let (mut table, files) =
        sema::build_registry(collected).map_err(|d| format_diagnostic(&d))?;
    sema::resolve(&mut table).map_err(|d| format_diagnostic(&d))?;
    sema::check_cycles(&mut table).map_err(|d| format_diagnostic(&d))?;
    layout::compute(&mut table).map_err(|d| format_diagnostic(&d))?;
    vtable::build(&mut table).map_err(|d| format_diagnostic(&d))?;
    codegen::expand_self_accessors(&mut table);
    Ok((table, files))
}
