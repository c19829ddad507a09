pub mod layout;
pub mod types;
pub mod vtable;

use crate::frontend::ast::{CollectedFile, DefnKeyword, MethodKind, Pos, PropQual, RawDefn};
use crate::frontend::diagnostic::Diagnostic;
use crate::frontend::suggest;

use self::types::{
    ClassInfo, DefnId, DefnKind, FieldMap, PrimKind, Prop, StructInfo, TypeDefn, TypeRef,
    TypeTable,
};

/// A file after its definitions have been merged into the global registry.
#[derive(Clone, Debug)]
pub struct FileUnit {
    pub name: String,
    pub retained: Vec<String>,
    pub defns: Vec<DefnId>,
}

/// Merge per-file definitions into one registry, rejecting duplicate names.
pub fn build_registry(
    files: Vec<CollectedFile>,
) -> Result<(TypeTable, Vec<FileUnit>), Diagnostic> {
    let mut table = TypeTable::default();
    let mut units = Vec::with_capacity(files.len());
    for cf in files {
        let mut ids = Vec::with_capacity(cf.defns.len());
        for raw in cf.defns {
            let id = table.insert(defn_from_raw(raw))?;
            ids.push(id);
        }
        units.push(FileUnit {
            name: cf.name,
            retained: cf.retained,
            defns: ids,
        });
    }
    Ok((table, units))
}

fn defn_from_raw(raw: RawDefn) -> TypeDefn {
    let kind = match raw.kind {
        DefnKeyword::Class => DefnKind::Class(ClassInfo {
            base_name: raw.base_name,
            base: None,
            dotted: String::new(),
            clsid: 0,
            subclasses: Vec::new(),
            vtable: Vec::new(),
        }),
        DefnKeyword::Struct => DefnKind::Struct(StructInfo {
            has_get: raw.methods.iter().any(|m| m.kind == MethodKind::Get),
            has_set: raw.methods.iter().any(|m| m.kind == MethodKind::Set),
        }),
    };
    let props = raw
        .props
        .into_iter()
        .map(|p| Prop {
            line: p.line,
            name: p.name,
            qual: p.qual,
            is_array: p.is_array,
            type_name: p.type_name,
            ty: None,
        })
        .collect();
    TypeDefn {
        file: raw.file,
        line: raw.line,
        name: raw.name,
        origin: raw.origin,
        kind,
        props,
        methods: raw.methods,
        size: 0,
        align: 0,
        map: FieldMap::default(),
        laid_out: false,
        live: false,
        checked: false,
    }
}

/// Bind base classes and property types; enforce qualifier constraints.
pub fn resolve(table: &mut TypeTable) -> Result<(), Diagnostic> {
    let mut links: Vec<(DefnId, DefnId)> = Vec::new();
    for id in 0..table.defs.len() {
        let d = &table.defs[id];
        let Some(ci) = d.class() else { continue };
        if ci.base_name.is_empty() {
            continue;
        }
        match table.get(&ci.base_name) {
            Some(b) if table.defs[b].is_class() => links.push((id, b)),
            Some(_) => {
                return Err(Diagnostic::new(
                    format!(
                        "base type '{}' of class '{}' is not a class",
                        ci.base_name, d.name
                    ),
                    Some(d.pos()),
                ));
            }
            None => {
                let note = suggest::did_you_mean(&ci.base_name, table.names())
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default();
                return Err(Diagnostic::new(
                    format!("unknown base class '{}'{}", ci.base_name, note),
                    Some(d.pos()),
                ));
            }
        }
    }
    for (id, b) in links {
        if let Some(ci) = table.defs[id].class_mut() {
            ci.base = Some(b);
        }
        if let Some(bi) = table.defs[b].class_mut() {
            bi.subclasses.push(id);
        }
    }

    for id in 0..table.defs.len() {
        let mut resolved: Vec<TypeRef> = Vec::with_capacity(table.defs[id].props.len());
        for p in &table.defs[id].props {
            let ty = if let Some(pk) = PrimKind::from_name(&p.type_name) {
                TypeRef::Prim(pk)
            } else if let Some(uid) = table.get(&p.type_name) {
                TypeRef::User(uid)
            } else {
                let mut candidates = table.names();
                candidates.extend(PrimKind::ALL.iter().map(|pk| pk.name().to_string()));
                let note = suggest::did_you_mean(&p.type_name, candidates)
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default();
                return Err(Diagnostic::new(
                    format!("unknown type '{}' for field '{}'{}", p.type_name, p.name, note),
                    Some(Pos::new(table.defs[id].file.clone(), p.line)),
                ));
            };
            if p.qual != PropQual::None {
                let atomic_int = matches!(ty, TypeRef::Prim(pk) if pk.is_atomic());
                if !atomic_int {
                    return Err(Diagnostic::new(
                        format!(
                            "atomic/synchronic qualifier on field '{}' requires an atomic integer type, found '{}'",
                            p.name, p.type_name
                        ),
                        Some(Pos::new(table.defs[id].file.clone(), p.line)),
                    ));
                }
            }
            resolved.push(ty);
        }
        for (p, ty) in table.defs[id].props.iter_mut().zip(resolved) {
            p.ty = Some(ty);
        }
    }
    Ok(())
}

/// Reject structs that contain themselves by value and classes that
/// inherit from themselves.
pub fn check_cycles(table: &mut TypeTable) -> Result<(), Diagnostic> {
    for id in 0..table.defs.len() {
        if table.defs[id].is_struct() {
            check_struct(table, id)?;
        }
    }
    for id in 0..table.defs.len() {
        if !table.defs[id].is_class() || table.defs[id].checked {
            continue;
        }
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            if table.defs[c].checked {
                break;
            }
            if table.defs[c].live {
                return Err(Diagnostic::new(
                    format!("class '{}' inherits from itself", table.defs[c].name),
                    Some(table.defs[c].pos()),
                ));
            }
            table.defs[c].live = true;
            chain.push(c);
            cur = table.defs[c].class().and_then(|ci| ci.base);
        }
        for c in chain {
            table.defs[c].live = false;
            table.defs[c].checked = true;
        }
    }
    Ok(())
}

fn check_struct(table: &mut TypeTable, id: DefnId) -> Result<(), Diagnostic> {
    if table.defs[id].checked {
        return Ok(());
    }
    if table.defs[id].live {
        return Err(Diagnostic::new(
            format!("struct '{}' contains itself by value", table.defs[id].name),
            Some(table.defs[id].pos()),
        ));
    }
    table.defs[id].live = true;
    let embedded: Vec<DefnId> = table.defs[id]
        .props
        .iter()
        .filter(|p| !p.is_array)
        .filter_map(|p| match p.ty {
            Some(TypeRef::User(u)) if table.defs[u].is_struct() => Some(u),
            _ => None,
        })
        .collect();
    for e in embedded {
        check_struct(table, e)?;
    }
    table.defs[id].live = false;
    table.defs[id].checked = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::collector::Collector;

    fn registry_of(src: &str) -> Result<(TypeTable, Vec<FileUnit>), Diagnostic> {
        let cf = Collector::new().collect("t.js.parlang", src).expect("collect");
        build_registry(vec![cf])
    }

    fn analyzed(src: &str) -> Result<TypeTable, Diagnostic> {
        let (mut table, _) = registry_of(src)?;
        resolve(&mut table)?;
        check_cycles(&mut table)?;
        Ok(table)
    }

    #[test]
    fn rejects_duplicate_type_names() {
        let err = registry_of("shared class A {\n} end\nshared struct A {\n} end")
            .expect_err("must fail");
        assert!(err.message.contains("duplicate type name 'A'"));
    }

    #[test]
    fn rejects_primitive_shadowing() {
        let err = registry_of("shared struct int32 {\n} end").expect_err("must fail");
        assert!(err.message.contains("shadows a primitive"));
    }

    #[test]
    fn binds_bases_and_subclasses() {
        let table = analyzed(
            "shared class A {\n} end\nshared class B extends A {\n} end\nshared class C extends A {\n} end",
        )
        .expect("analyze");
        let a = table.get("A").expect("A");
        let b = table.get("B").expect("B");
        let c = table.get("C").expect("C");
        assert_eq!(table.defs[b].class().expect("class").base, Some(a));
        assert_eq!(table.defs[a].class().expect("class").subclasses, vec![b, c]);
    }

    #[test]
    fn unknown_base_suggests_candidates() {
        let err = analyzed("shared class Base {\n} end\nshared class B extends Bse {\n} end")
            .expect_err("must fail");
        assert!(err.message.contains("unknown base class 'Bse'"));
        assert!(err.message.contains("did you mean"));
    }

    #[test]
    fn rejects_qualifier_on_float() {
        let err = analyzed("shared class A {\n  f: atomic float32\n} end").expect_err("must fail");
        assert!(err.message.contains("atomic integer type"));
    }

    #[test]
    fn rejects_qualifier_on_struct_type() {
        let err = analyzed(
            "shared struct S {\n  x: int32\n} end\nshared class A {\n  s: synchronic S\n} end",
        )
        .expect_err("must fail");
        assert!(err.message.contains("atomic integer type"));
    }

    #[test]
    fn detects_struct_value_cycle() {
        let err = analyzed(
            "shared struct S {\n  t: T\n} end\nshared struct T {\n  s: S\n} end",
        )
        .expect_err("must fail");
        assert!(err.message.contains("contains itself by value"));
    }

    #[test]
    fn array_fields_break_struct_cycles() {
        analyzed("shared struct S {\n  more: array(S)\n} end").expect("array of self is a pointer");
    }

    #[test]
    fn detects_class_inheritance_cycle() {
        let err = analyzed(
            "shared class A extends B {\n} end\nshared class B extends A {\n} end",
        )
        .expect_err("must fail");
        assert!(err.message.contains("inherits from itself"));
    }

    #[test]
    fn class_pointer_fields_are_not_cycles() {
        analyzed("shared class Node {\n  next: Node\n} end").expect("self pointer is fine");
    }
}
