use std::collections::HashMap;

use crate::frontend::diagnostic::Diagnostic;

use super::types::{DefnId, FieldMap, MapEntry, PrimKind, TypeRef, TypeTable};

/// Compute size, alignment, and the per-field offset map for every type,
/// then assign each class its dotted name and 28-bit identifier.
pub fn compute(table: &mut TypeTable) -> Result<(), Diagnostic> {
    for id in 0..table.defs.len() {
        ensure_layout(table, id)?;
    }
    assign_class_ids(table)
}

fn align_up(x: u32, a: u32) -> u32 {
    (x + a - 1) / a * a
}

fn ensure_layout(table: &mut TypeTable, id: DefnId) -> Result<(), Diagnostic> {
    if table.defs[id].laid_out {
        return Ok(());
    }
    let is_class = table.defs[id].is_class();
    let base = table.defs[id].class().and_then(|ci| ci.base);

    // Classes start from their base layout (or the reserved 4-byte class-id
    // slot); structs start empty and round up at the end.
    let (mut size, mut align, mut map) = if is_class {
        if let Some(b) = base {
            ensure_layout(table, b)?;
            let bd = &table.defs[b];
            (bd.size, bd.align, bd.map.clone())
        } else {
            (4, 4, FieldMap::default())
        }
    } else {
        (0, 0, FieldMap::default())
    };

    let props = table.defs[id].props.clone();
    for p in &props {
        if p.is_array {
            // Array fields are 4-byte slots holding a buffer offset.
            size = align_up(size, 4);
            map.insert(MapEntry {
                name: p.name.clone(),
                expand: true,
                offset: size,
                ty: TypeRef::Prim(PrimKind::Int32),
            });
            size += 4;
            align = align.max(4);
            continue;
        }
        let ty = p
            .ty
            .ok_or_else(|| Diagnostic::internal(format!("unresolved field '{}'", p.name)))?;
        match ty {
            TypeRef::Prim(pk) => {
                let s = pk.size();
                size = align_up(size, s);
                map.insert(MapEntry {
                    name: p.name.clone(),
                    expand: true,
                    offset: size,
                    ty,
                });
                size += s;
                align = align.max(s);
            }
            TypeRef::User(uid) if table.defs[uid].is_class() => {
                // Class-typed fields are pointer slots.
                size = align_up(size, 4);
                map.insert(MapEntry {
                    name: p.name.clone(),
                    expand: true,
                    offset: size,
                    ty,
                });
                size += 4;
                align = align.max(4);
            }
            TypeRef::User(uid) => {
                ensure_layout(table, uid)?;
                let (s_size, s_align, s_entries) = {
                    let sd = &table.defs[uid];
                    (sd.size, sd.align, sd.map.entries.clone())
                };
                size = align_up(size, s_align.max(1));
                map.insert(MapEntry {
                    name: p.name.clone(),
                    expand: false,
                    offset: size,
                    ty,
                });
                for e in s_entries {
                    map.insert(MapEntry {
                        name: format!("{}_{}", p.name, e.name),
                        expand: e.expand,
                        offset: size + e.offset,
                        ty: e.ty,
                    });
                }
                size += s_size;
                align = align.max(s_align);
            }
        }
    }

    if !is_class && align > 0 {
        // Arrays of structs must align every element.
        size = align_up(size, align);
    }

    let d = &mut table.defs[id];
    d.size = size;
    d.align = align;
    d.map = map;
    d.laid_out = true;
    Ok(())
}

fn assign_class_ids(table: &mut TypeTable) -> Result<(), Diagnostic> {
    let mut seen: HashMap<u32, DefnId> = HashMap::new();
    for id in 0..table.defs.len() {
        if !table.defs[id].is_class() {
            continue;
        }
        let dotted = ensure_dotted(table, id);
        let clsid = class_id_hash(&dotted)?;
        if let Some(&other) = seen.get(&clsid) {
            return Err(Diagnostic::new(
                format!(
                    "class identifier collision between '{}' and '{}'",
                    table.defs[other].name, table.defs[id].name
                ),
                Some(table.defs[id].pos()),
            ));
        }
        seen.insert(clsid, id);
        if let Some(ci) = table.defs[id].class_mut() {
            ci.clsid = clsid;
        }
    }
    Ok(())
}

fn ensure_dotted(table: &mut TypeTable, id: DefnId) -> String {
    if let Some(ci) = table.defs[id].class() {
        if !ci.dotted.is_empty() {
            return ci.dotted.clone();
        }
    }
    let base = table.defs[id].class().and_then(|ci| ci.base);
    let dotted = match base {
        Some(b) => format!("{}>{}", ensure_dotted(table, b), table.defs[id].name),
        None => table.defs[id].name.clone(),
    };
    if let Some(ci) = table.defs[id].class_mut() {
        ci.dotted = dotted.clone();
    }
    dotted
}

/// Hash a dotted class name into a 28-bit nonnegative identifier.
pub fn class_id_hash(dotted: &str) -> Result<u32, Diagnostic> {
    let mut id = dotted.len() as u32;
    for ch in dotted.chars() {
        let v = char_code(ch)
            .ok_or_else(|| Diagnostic::internal(format!("unhashable character '{}'", ch)))?;
        id = (((id & 0x01FF_FFFF) << 3) | (id >> 25)) ^ v;
    }
    Ok(id)
}

fn char_code(ch: char) -> Option<u32> {
    match ch {
        'A'..='Z' => Some(ch as u32 - 'A' as u32),
        'a'..='z' => Some(ch as u32 - 'a' as u32 + 26),
        '0'..='9' => Some(ch as u32 - '0' as u32 + 52),
        '_' => Some(62),
        '>' => Some(63),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::collector::Collector;
    use crate::sema::{build_registry, check_cycles, resolve};

    fn laid_out(src: &str) -> TypeTable {
        let cf = Collector::new().collect("t.js.parlang", src).expect("collect");
        let (mut table, _) = build_registry(vec![cf]).expect("registry");
        resolve(&mut table).expect("resolve");
        check_cycles(&mut table).expect("cycles");
        compute(&mut table).expect("layout");
        table
    }

    fn offset(table: &TypeTable, ty: &str, field: &str) -> u32 {
        let id = table.get(ty).expect("type");
        table.defs[id].map.get(field).expect("field").offset
    }

    #[test]
    fn two_int32_fields_follow_the_class_id_slot() {
        let table = laid_out("shared class Point {\n  x: int32\n  y: int32\n} end");
        let id = table.get("Point").expect("Point");
        assert_eq!(table.defs[id].size, 12);
        assert_eq!(table.defs[id].align, 4);
        assert_eq!(offset(&table, "Point", "x"), 4);
        assert_eq!(offset(&table, "Point", "y"), 8);
    }

    #[test]
    fn struct_rounds_size_to_alignment() {
        let table = laid_out("shared struct Pair {\n  x: float64\n  y: int32\n} end");
        let id = table.get("Pair").expect("Pair");
        assert_eq!(table.defs[id].size, 16);
        assert_eq!(table.defs[id].align, 8);
        assert_eq!(table.defs[id].size % table.defs[id].align, 0);
    }

    #[test]
    fn embedded_struct_gets_composite_entries() {
        let src = "\
shared struct Pair {
  x: float64
  y: int32
} end
shared class PairBox {
  pad1: float32
  pad2: float64
  p: Pair
  pad3: int32
} end";
        let table = laid_out(src);
        assert_eq!(offset(&table, "PairBox", "pad1"), 4);
        assert_eq!(offset(&table, "PairBox", "pad2"), 8);
        assert_eq!(offset(&table, "PairBox", "p"), 16);
        assert_eq!(offset(&table, "PairBox", "pad3"), 32);
        assert_eq!(offset(&table, "PairBox", "p_x"), 16);
        assert_eq!(offset(&table, "PairBox", "p_y"), 24);
        let id = table.get("PairBox").expect("PairBox");
        let p = table.defs[id].map.get("p").expect("p");
        assert!(!p.expand);
        let px = table.defs[id].map.get("p_x").expect("p_x");
        assert!(px.expand);
    }

    #[test]
    fn subclass_extends_base_layout() {
        let src = "\
shared class A {
  a: int32
} end
shared class B extends A {
  b: float64
} end";
        let table = laid_out(src);
        assert_eq!(offset(&table, "B", "a"), 4);
        assert_eq!(offset(&table, "B", "b"), 8);
        let b = table.get("B").expect("B");
        assert_eq!(table.defs[b].size, 16);
        assert_eq!(table.defs[b].align, 8);
    }

    #[test]
    fn array_and_class_fields_are_pointer_slots() {
        let src = "\
shared class Node {
  weight: float64
  next: Node
  kids: array(Node)
} end";
        let table = laid_out(src);
        assert_eq!(offset(&table, "Node", "weight"), 8);
        assert_eq!(offset(&table, "Node", "next"), 16);
        assert_eq!(offset(&table, "Node", "kids"), 20);
        let id = table.get("Node").expect("Node");
        let kids = table.defs[id].map.get("kids").expect("kids");
        assert_eq!(kids.ty, TypeRef::Prim(PrimKind::Int32));
    }

    #[test]
    fn dotted_names_chain_through_bases() {
        let src = "\
shared class A {
} end
shared class B extends A {
} end
shared class C extends B {
} end";
        let table = laid_out(src);
        let c = table.get("C").expect("C");
        assert_eq!(table.defs[c].class().expect("class").dotted, "A>B>C");
        let a = table.get("A").expect("A");
        assert_eq!(table.defs[a].class().expect("class").dotted, "A");
    }

    #[test]
    fn class_id_hash_matches_reference_values() {
        assert_eq!(class_id_hash("A").expect("hash"), 8);
        assert_eq!(class_id_hash("A>B").expect("hash"), 2041);
    }

    #[test]
    fn class_ids_are_distinct_and_28_bit() {
        let src = "\
shared class A {
} end
shared class B extends A {
} end
shared class C extends B {
} end
shared class D extends A {
} end";
        let table = laid_out(src);
        let mut ids = Vec::new();
        for d in &table.defs {
            if let Some(ci) = d.class() {
                assert!(ci.clsid < (1 << 28));
                ids.push(ci.clsid);
            }
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }
}
