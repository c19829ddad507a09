use crate::frontend::ast::MethodKind;
use crate::sema::types::{TypeTable, VirtualMethod};
use crate::sema::FileUnit;

pub mod expander;

/// Rewrite `SELF.…` shorthand inside every method body to qualified calls
/// on the defining type. Field existence is not validated here; unknown
/// names fall through to the macro expander untouched.
pub fn expand_self_accessors(table: &mut TypeTable) {
    for id in 0..table.defs.len() {
        let type_name = table.defs[id].name.clone();
        for m in table.defs[id].methods.iter_mut() {
            for line in m.body.iter_mut() {
                *line = rewrite_self_line(&type_name, line);
            }
        }
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn rewrite_self_line(type_name: &str, line: &str) -> String {
    let b = line.as_bytes();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'\'' | b'"' | b'`' => {
                let j = skip_string(b, i);
                out.push_str(&line[i..j]);
                i = j;
            }
            b'/' if i + 1 < b.len() && b[i + 1] == b'/' => {
                out.push_str(&line[i..]);
                break;
            }
            b'S' if line[i..].starts_with("SELF")
                && (i == 0 || !is_ident_byte(b[i - 1]))
                && (i + 4 >= b.len() || !is_ident_byte(b[i + 4])) =>
            {
                let after = i + 4;
                if after < b.len() && b[after] == b'.' {
                    let (ident, j) = read_ident(line, after + 1);
                    if ident.is_empty() {
                        out.push_str("self");
                        i = after;
                        continue;
                    }
                    // Chained form `SELF.f.op(…)`: qualify and splice self
                    // ahead of the arguments.
                    if j < b.len() && b[j] == b'.' {
                        let (op_ident, j2) = read_ident(line, j + 1);
                        if !op_ident.is_empty() {
                            let mut k2 = j2;
                            while k2 < b.len() && (b[k2] == b' ' || b[k2] == b'\t') {
                                k2 += 1;
                            }
                            if k2 < b.len() && b[k2] == b'(' {
                                let mut m2 = k2 + 1;
                                while m2 < b.len() && (b[m2] == b' ' || b[m2] == b'\t') {
                                    m2 += 1;
                                }
                                if m2 < b.len() && b[m2] == b')' {
                                    out.push_str(&format!(
                                        "{}.{}.{}(self)",
                                        type_name, ident, op_ident
                                    ));
                                    i = m2 + 1;
                                } else {
                                    out.push_str(&format!(
                                        "{}.{}.{}(self, ",
                                        type_name, ident, op_ident
                                    ));
                                    i = k2 + 1;
                                }
                                continue;
                            }
                        }
                    }
                    let mut k = j;
                    while k < b.len() && (b[k] == b' ' || b[k] == b'\t') {
                        k += 1;
                    }
                    if k < b.len() && b[k] == b'(' {
                        // Call form: splice `self` in as the first argument.
                        let mut m = k + 1;
                        while m < b.len() && (b[m] == b' ' || b[m] == b'\t') {
                            m += 1;
                        }
                        if m < b.len() && b[m] == b')' {
                            out.push_str(&format!("{}.{}(self)", type_name, ident));
                            i = m + 1;
                        } else {
                            out.push_str(&format!("{}.{}(self, ", type_name, ident));
                            i = k + 1;
                        }
                    } else {
                        out.push_str(&format!("{}.{}(self)", type_name, ident));
                        i = j;
                    }
                } else {
                    out.push_str("self");
                    i = after;
                }
            }
            _ => {
                if let Some(ch) = line[i..].chars().next() {
                    out.push(ch);
                    i += ch.len_utf8();
                } else {
                    break;
                }
            }
        }
    }
    out
}

fn read_ident(s: &str, start: usize) -> (&str, usize) {
    let b = s.as_bytes();
    if start >= b.len() || !(b[start].is_ascii_alphabetic() || b[start] == b'_') {
        return ("", start);
    }
    let mut j = start;
    while j < b.len() && is_ident_byte(b[j]) {
        j += 1;
    }
    (&s[start..j], j)
}

pub(crate) fn skip_string(b: &[u8], start: usize) -> usize {
    let quote = b[start];
    let mut j = start + 1;
    while j < b.len() {
        match b[j] {
            b'\\' => j += 2,
            b'\n' if quote != b'`' => return j,
            c if c == quote => return j + 1,
            _ => j += 1,
        }
    }
    b.len()
}

/// Splice lowered type records back into the retained line stream at each
/// definition's origin.
pub fn paste_up(table: &TypeTable, unit: &FileUnit) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut next = 0;
    for i in 0..=unit.retained.len() {
        while next < unit.defns.len() && table.defs[unit.defns[next]].origin == i {
            emit_defn(table, unit.defns[next], &mut out);
            next += 1;
        }
        if i < unit.retained.len() {
            out.push(unit.retained[i].clone());
        }
    }
    out.join("\n")
}

fn emit_defn(table: &TypeTable, id: usize, out: &mut Vec<String>) {
    let d = &table.defs[id];
    let class = d.class();
    let mut entries: Vec<Vec<String>> = Vec::new();

    entries.push(vec![format!("  NAME: \"{}\"", d.name)]);
    entries.push(vec![format!("  SIZE: {}", d.size)]);
    entries.push(vec![format!("  ALIGN: {}", d.align)]);
    if let Some(ci) = class {
        entries.push(vec![format!("  CLSID: {}", ci.clsid)]);
    }

    for m in &d.methods {
        let entry_name = match m.kind {
            MethodKind::Get => "_get_impl".to_string(),
            MethodKind::Set => "_set_impl".to_string(),
            MethodKind::Copy => "_copy_impl".to_string(),
            MethodKind::Virtual if m.name == "init" => "init".to_string(),
            MethodKind::Virtual => format!("{}_impl", m.name),
        };
        let mut end = m.body.len();
        while end > 1 && m.body[end - 1].trim().is_empty() {
            end -= 1;
        }
        let mut lines = vec![format!("  {}: function {}", entry_name, m.body[0])];
        for l in &m.body[1..end] {
            lines.push(l.clone());
        }
        entries.push(lines);
    }

    if let Some(ci) = class {
        for vm in &ci.vtable {
            entries.push(dispatcher_lines(vm));
        }
        entries.push(vec![
            "  initInstance: function (self) {".to_string(),
            format!("    _mem_int32[self>>2] = {};", ci.clsid),
            "    return self;".to_string(),
            "  }".to_string(),
        ]);
    }

    out.push(format!("var {} = {{", d.name));
    let count = entries.len();
    for (idx, mut entry) in entries.into_iter().enumerate() {
        if idx + 1 < count {
            if let Some(last) = entry.last_mut() {
                last.push(',');
            }
        }
        out.extend(entry);
    }
    out.push("};".to_string());
    if let Some(ci) = class {
        out.push(format!("Parlang._idToType[{}] = {};", ci.clsid, d.name));
    }
}

fn dispatcher_lines(vm: &VirtualMethod) -> Vec<String> {
    let mut lines = vec![
        format!("  {}: function (self) {{", vm.name),
        "    switch (_mem_int32[self>>2]) {".to_string(),
    ];
    for case in &vm.cases {
        for id in &case.ids {
            lines.push(format!("    case {}:", id));
        }
        lines.push(format!(
            "      return {}.apply(null, arguments);",
            case.impl_sym
        ));
    }
    lines.push("    default:".to_string());
    match &vm.default {
        Some(sym) => lines.push(format!("      return {}.apply(null, arguments);", sym)),
        None => lines.push(
            "      throw Error(\"Bad class id: \" + _mem_int32[self>>2]);".to_string(),
        ),
    }
    lines.push("    }".to_string());
    lines.push("  }".to_string());
    lines
}
