use crate::frontend::ast::MethodKind;
use crate::frontend::diagnostic::Diagnostic;

use super::types::{DefnId, TypeTable, VirtualMethod};

/// For every class, build one dispatch table per virtual method name
/// visible through inheritance: which implementation each concrete class
/// id in the subtree routes to, plus the inherited fallback when the
/// declaration itself is inherited.
pub fn build(table: &mut TypeTable) -> Result<(), Diagnostic> {
    let mut computed: Vec<(DefnId, Vec<VirtualMethod>)> = Vec::new();
    for id in 0..table.defs.len() {
        if !table.defs[id].is_class() {
            continue;
        }
        computed.push((id, vtable_for(table, id)?));
    }
    for (id, vt) in computed {
        if let Some(ci) = table.defs[id].class_mut() {
            ci.vtable = vt;
        }
    }
    Ok(())
}

fn base_of(table: &TypeTable, id: DefnId) -> Option<DefnId> {
    table.defs[id].class().and_then(|ci| ci.base)
}

fn declares_virtual(table: &TypeTable, id: DefnId, name: &str) -> bool {
    table.defs[id]
        .methods
        .iter()
        .any(|m| m.kind == MethodKind::Virtual && m.name == name)
}

fn vtable_for(table: &TypeTable, id: DefnId) -> Result<Vec<VirtualMethod>, Diagnostic> {
    // Distinct virtual names visible on this class, own declarations first.
    let mut names: Vec<(String, bool)> = Vec::new();
    let mut cur = Some(id);
    let mut depth = 0;
    while let Some(c) = cur {
        for m in &table.defs[c].methods {
            if m.kind == MethodKind::Virtual
                && m.name != "init"
                && !names.iter().any(|(n, _)| n == &m.name)
            {
                names.push((m.name.clone(), depth > 0));
            }
        }
        cur = base_of(table, c);
        depth += 1;
    }

    let stop = base_of(table, id);
    let mut subtree = Vec::new();
    collect_subtree(table, id, &mut subtree);

    let mut out = Vec::with_capacity(names.len());
    for (name, inherited) in names {
        let mut vm = VirtualMethod {
            name: name.clone(),
            cases: Vec::new(),
            default: None,
        };
        for &s in &subtree {
            if let Some(owner) = nearest_impl(table, s, &name, stop) {
                let sym = format!("{}.{}_impl", table.defs[owner].name, name);
                let Some(ci) = table.defs[s].class() else { continue };
                vm.add_case(sym, ci.clsid);
            }
        }
        if inherited {
            if let Some(b) = stop {
                let owner = nearest_impl(table, b, &name, None).ok_or_else(|| {
                    Diagnostic::internal(format!(
                        "missing inherited implementation of '{}' for class '{}'",
                        name, table.defs[id].name
                    ))
                })?;
                vm.default = Some(format!("{}.{}_impl", table.defs[owner].name, name));
            }
        }
        out.push(vm);
    }
    Ok(out)
}

fn collect_subtree(table: &TypeTable, id: DefnId, out: &mut Vec<DefnId>) {
    out.push(id);
    if let Some(ci) = table.defs[id].class() {
        for &s in &ci.subclasses {
            collect_subtree(table, s, out);
        }
    }
}

/// Nearest implementation of `name` on `start` or an ancestor, stopping
/// (exclusive) at `stop`.
fn nearest_impl(
    table: &TypeTable,
    start: DefnId,
    name: &str,
    stop: Option<DefnId>,
) -> Option<DefnId> {
    let mut cur = Some(start);
    while let Some(c) = cur {
        if stop == Some(c) {
            return None;
        }
        if declares_virtual(table, c, name) {
            return Some(c);
        }
        cur = base_of(table, c);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::collector::Collector;
    use crate::sema::{build_registry, check_cycles, layout, resolve};
    use crate::sema::types::TypeTable;

    fn analyzed(src: &str) -> TypeTable {
        let cf = Collector::new().collect("t.js.parlang", src).expect("collect");
        let (mut table, _) = build_registry(vec![cf]).expect("registry");
        resolve(&mut table).expect("resolve");
        check_cycles(&mut table).expect("cycles");
        layout::compute(&mut table).expect("layout");
        build(&mut table).expect("vtables");
        table
    }

    const ABC: &str = "\
shared class A {
  method f(self) {
    return 1;
  }
} end
shared class B extends A {
  method f(self) {
    return 2;
  }
} end
shared class C extends B {
} end";

    #[test]
    fn routes_subtree_ids_to_nearest_impl() {
        let table = analyzed(ABC);
        let a = table.get("A").expect("A");
        let b = table.get("B").expect("B");
        let c = table.get("C").expect("C");
        let clsid = |id: usize| table.defs[id].class().expect("class").clsid;

        let vt = &table.defs[a].class().expect("class").vtable;
        assert_eq!(vt.len(), 1);
        let vm = &vt[0];
        assert_eq!(vm.name, "f");
        let case_for = |sym: &str| {
            vm.cases
                .iter()
                .find(|cse| cse.impl_sym == sym)
                .map(|cse| cse.ids.clone())
                .unwrap_or_default()
        };
        assert_eq!(case_for("A.f_impl"), vec![clsid(a)]);
        assert_eq!(case_for("B.f_impl"), vec![clsid(b), clsid(c)]);
        assert!(vm.default.is_none());
    }

    #[test]
    fn inherited_declaration_gets_base_default() {
        let table = analyzed(ABC);
        let c = table.get("C").expect("C");
        let vt = &table.defs[c].class().expect("class").vtable;
        assert_eq!(vt.len(), 1);
        let vm = &vt[0];
        assert_eq!(vm.default.as_deref(), Some("B.f_impl"));
        // C's own subtree holds no implementation below its base, so every
        // dispatch lands on the inherited fallback.
        assert!(vm.cases.is_empty());
    }

    #[test]
    fn init_is_never_virtual() {
        let src = "\
shared class A {
  method init(self) {
    return self;
  }
} end";
        let table = analyzed(src);
        let a = table.get("A").expect("A");
        assert!(table.defs[a].class().expect("class").vtable.is_empty());
    }

    #[test]
    fn accessor_methods_do_not_enter_vtables() {
        let src = "\
shared struct S {
  x: int32
  get(self) {
    return 0;
  }
} end
shared class A {
  method f(self) {
    return 1;
  }
} end";
        let table = analyzed(src);
        let a = table.get("A").expect("A");
        let vt = &table.defs[a].class().expect("class").vtable;
        assert_eq!(vt.len(), 1);
        assert_eq!(vt[0].name, "f");
    }
}
