// Purpose: Export computed layouts as JSON for sibling tooling that shares the flat buffer.
// Inputs/Outputs: Reads the finished type table and writes a pretty-printed manifest file.
// Invariants: Field order follows layout order so diffs stay stable across runs.
// Gotchas: Only leaf entries carry typed-view access; aggregates are marked leaf=false.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::sema::types::TypeTable;

#[derive(Serialize)]
pub struct LayoutManifest {
    pub types: Vec<TypeLayout>,
}

#[derive(Serialize)]
pub struct TypeLayout {
    pub name: String,
    pub kind: &'static str,
    pub size: u32,
    pub align: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clsid: Option<u32>,
    pub fields: Vec<FieldLayout>,
}

#[derive(Serialize)]
pub struct FieldLayout {
    pub name: String,
    pub offset: u32,
    #[serde(rename = "type")]
    pub type_name: String,
    pub leaf: bool,
}

pub fn manifest_from(table: &TypeTable) -> LayoutManifest {
    let types = table
        .defs
        .iter()
        .map(|d| TypeLayout {
            name: d.name.clone(),
            kind: if d.is_class() { "class" } else { "struct" },
            size: d.size,
            align: d.align,
            clsid: d.class().map(|ci| ci.clsid),
            fields: d
                .map
                .entries
                .iter()
                .map(|e| FieldLayout {
                    name: e.name.clone(),
                    offset: e.offset,
                    type_name: table.type_name(e.ty),
                    leaf: e.expand,
                })
                .collect(),
        })
        .collect();
    LayoutManifest { types }
}

pub fn write_manifest(path: &Path, table: &TypeTable) -> anyhow::Result<()> {
    let manifest = manifest_from(table);
    let json = serde_json::to_string_pretty(&manifest)?;
    fs::write(path, json).with_context(|| format!("writing layout manifest {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::collector::Collector;
    use crate::sema::{build_registry, check_cycles, layout, resolve};

    #[test]
    fn manifest_reports_sizes_and_offsets() {
        let src = "\
shared struct Pair {
  x: float64
  y: int32
} end
shared class Box {
  p: Pair
} end";
        let cf = Collector::new().collect("t.js.parlang", src).expect("collect");
        let (mut table, _) = build_registry(vec![cf]).expect("registry");
        resolve(&mut table).expect("resolve");
        check_cycles(&mut table).expect("cycles");
        layout::compute(&mut table).expect("layout");

        let m = manifest_from(&table);
        assert_eq!(m.types.len(), 2);
        let pair = &m.types[0];
        assert_eq!(pair.kind, "struct");
        assert_eq!(pair.size, 16);
        assert!(pair.clsid.is_none());
        let boxed = &m.types[1];
        assert_eq!(boxed.kind, "class");
        assert!(boxed.clsid.is_some());
        let p = boxed.fields.iter().find(|f| f.name == "p").expect("p");
        assert_eq!(p.offset, 8);
        assert!(!p.leaf);
        assert_eq!(p.type_name, "Pair");
        let px = boxed.fields.iter().find(|f| f.name == "p_x").expect("p_x");
        assert_eq!(px.offset, 8);
        assert!(px.leaf);

        let json = serde_json::to_string(&m).expect("json");
        assert!(json.contains("\"type\":\"float64\""));
    }
}
