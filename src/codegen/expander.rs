// Purpose: Rewrite accessor, array, and allocator macros into inline flat-buffer accesses.
// Inputs/Outputs: Consumes pasted-up file text and produces the final host-language source.
// Invariants: Output must match no further macro patterns; literals and comments pass untouched.
// Gotchas: Argument-arity mismatches are the one non-fatal failure; they warn and skip.

use regex::Regex;

use crate::frontend::ast::Pos;
use crate::frontend::diagnostic::{Diagnostic, Diagnostics};
use crate::frontend::suggest;
use crate::sema::types::{log2, DefnId, PrimKind, TypeRef, TypeTable};

use super::skip_string;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Get,
    Set,
    Ref,
    Add,
    Sub,
    Or,
    CompareExchange,
    LoadWhenEqual,
    LoadWhenNotEqual,
    ExpectUpdate,
    Notify,
}

impl Op {
    fn from_name(name: &str) -> Option<Op> {
        match name {
            "get" => Some(Op::Get),
            "set" => Some(Op::Set),
            "ref" => Some(Op::Ref),
            "add" => Some(Op::Add),
            "sub" => Some(Op::Sub),
            "or" => Some(Op::Or),
            "compareExchange" => Some(Op::CompareExchange),
            "loadWhenEqual" => Some(Op::LoadWhenEqual),
            "loadWhenNotEqual" => Some(Op::LoadWhenNotEqual),
            "expectUpdate" => Some(Op::ExpectUpdate),
            "notify" => Some(Op::Notify),
            _ => None,
        }
    }

    /// Expected argument count, counting the leading pointer argument.
    fn arity(self) -> usize {
        match self {
            Op::Get | Op::Ref | Op::Notify => 1,
            Op::Set
            | Op::Add
            | Op::Sub
            | Op::Or
            | Op::LoadWhenEqual
            | Op::LoadWhenNotEqual => 2,
            Op::CompareExchange | Op::ExpectUpdate => 3,
        }
    }

    /// Read-modify-write and wait/notify operators need an atomic integer
    /// slot; plain get/set/ref work on any leaf.
    fn needs_atomic(self) -> bool {
        !matches!(self, Op::Get | Op::Set | Op::Ref)
    }

    fn runtime_name(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Or => "or",
            Op::CompareExchange => "compareExchange",
            Op::LoadWhenEqual => "loadWhenEqual",
            Op::LoadWhenNotEqual => "loadWhenNotEqual",
            Op::ExpectUpdate => "expectUpdate",
            Op::Notify => "notify",
            Op::Get | Op::Set | Op::Ref => "",
        }
    }

    fn is_synchronic(self) -> bool {
        matches!(
            self,
            Op::LoadWhenEqual | Op::LoadWhenNotEqual | Op::ExpectUpdate | Op::Notify
        )
    }
}

/// Final pass: rewrites `T.f(…)` accessor forms, `T.Array.…` element forms,
/// and `new …` allocations across the pasted-up text of each file.
pub struct Expander<'a> {
    table: &'a TypeTable,
    acc_head: Regex,
    pub warnings: Diagnostics,
}

impl<'a> Expander<'a> {
    pub fn new(table: &'a TypeTable) -> Self {
        Self {
            table,
            acc_head: Regex::new(
                r"^([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)(?:\.([A-Za-z_][A-Za-z0-9_]*))?\s*\(",
            )
            .unwrap(),
            warnings: Diagnostics::default(),
        }
    }

    pub fn expand_file(&mut self, file: &str, text: &str) -> Result<String, Diagnostic> {
        self.expand_chunk(file, text, 1)
    }

    fn expand_chunk(
        &mut self,
        file: &str,
        text: &str,
        start_line: usize,
    ) -> Result<String, Diagnostic> {
        let b = text.as_bytes();
        let mut out = String::with_capacity(text.len() + 64);
        let mut i = 0usize;
        let mut line = start_line;
        while i < b.len() {
            let c = b[i];
            if c == b'\n' {
                line += 1;
                out.push('\n');
                i += 1;
                continue;
            }
            if c == b'/' && i + 1 < b.len() && b[i + 1] == b'/' {
                let j = text[i..]
                    .find('\n')
                    .map(|k| i + k)
                    .unwrap_or(b.len());
                out.push_str(&text[i..j]);
                i = j;
                continue;
            }
            if c == b'/' && i + 1 < b.len() && b[i + 1] == b'*' {
                let j = text[i + 2..]
                    .find("*/")
                    .map(|k| i + 2 + k + 2)
                    .unwrap_or(b.len());
                line += text[i..j].matches('\n').count();
                out.push_str(&text[i..j]);
                i = j;
                continue;
            }
            if c == b'\'' || c == b'"' || c == b'`' {
                let j = skip_string(b, i);
                line += text[i..j].matches('\n').count();
                out.push_str(&text[i..j]);
                i = j;
                continue;
            }
            if (c.is_ascii_alphabetic() || c == b'_') && (i == 0 || !is_ident_byte(b[i - 1])) {
                let j = ident_end(b, i);
                let word = &text[i..j];
                if word == "new" {
                    if let Some((rep, end)) = self.try_new(file, text, i, j, line)? {
                        line += text[i..end].matches('\n').count();
                        out.push_str(&rep);
                        i = end;
                        continue;
                    }
                } else if self.is_type_name(word) {
                    if let Some((rep, end)) = self.try_accessor(file, text, i, line)? {
                        line += text[i..end].matches('\n').count();
                        out.push_str(&rep);
                        i = end;
                        continue;
                    }
                }
                out.push_str(word);
                i = j;
                continue;
            }
            if let Some(ch) = text[i..].chars().next() {
                out.push(ch);
                i += ch.len_utf8();
            } else {
                break;
            }
        }
        Ok(out)
    }

    fn is_type_name(&self, word: &str) -> bool {
        self.table.get(word).is_some() || PrimKind::from_name(word).is_some()
    }

    fn warn_unchanged(
        &mut self,
        file: &str,
        line: usize,
        what: &str,
        note: &str,
        text: &str,
        start: usize,
        resume: usize,
    ) -> Option<(String, usize)> {
        self.warnings.push(
            format!("{}: {}; leaving unchanged", what, note),
            Some(Pos::new(file, line)),
        );
        Some((text[start..resume].to_string(), resume))
    }

    /// `T.f(…)`, `T.f.op(…)`, `T.op_f(…)`, and `T.Array.…` forms. Returns
    /// None when the match is not a macro at all (the caller copies the
    /// type name and scanning continues).
    fn try_accessor(
        &mut self,
        file: &str,
        text: &str,
        start: usize,
        line: usize,
    ) -> Result<Option<(String, usize)>, Diagnostic> {
        let caps = match self.acc_head.captures(&text[start..]) {
            Some(c) => c,
            None => return Ok(None),
        };
        let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let open = start + whole - 1;
        let t_name = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let seg1 = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let seg2 = caps.get(3).map(|m| m.as_str());

        if seg1 == "Array" {
            let Some(op_str) = seg2 else { return Ok(None) };
            return self.try_array(file, text, start, open, line, t_name, op_str);
        }

        let Some(tid) = self.table.get(t_name) else {
            // primitives only carry Array element forms
            return Ok(None);
        };

        let (op, field) = match seg2 {
            Some(s2) => match Op::from_name(s2) {
                Some(op) => (op, seg1.to_string()),
                None => return Ok(None),
            },
            None => match split_op_prefix(self.table, tid, seg1) {
                Some(pair) => pair,
                None => return Ok(None),
            },
        };

        let Some(entry) = self.table.defs[tid].map.get(&field).cloned() else {
            return Ok(None);
        };
        if op.needs_atomic() && !is_atomic_leaf(entry.ty) {
            return Ok(self.warn_unchanged(
                file,
                line,
                &format!("{}.{}", t_name, seg1),
                &format!("'{}' needs an atomic integer field", op.runtime_name()),
                text,
                start,
                open + 1,
            ));
        }

        let (args, end) = match parse_call_args(text, open) {
            Ok(v) => v,
            Err(note) => {
                return Ok(self.warn_unchanged(
                    file,
                    line,
                    &format!("{}.{}", t_name, seg1),
                    &note,
                    text,
                    start,
                    open + 1,
                ));
            }
        };
        if args.len() != op.arity() {
            return Ok(self.warn_unchanged(
                file,
                line,
                &format!("{}.{}", t_name, seg1),
                &format!("expected {} argument(s), found {}", op.arity(), args.len()),
                text,
                start,
                open + 1,
            ));
        }

        let mut exp = Vec::with_capacity(args.len());
        for a in &args {
            exp.push(self.expand_chunk(file, a, line)?);
        }
        let r = format!("({}+{})", exp[0], entry.offset);
        if op == Op::Ref {
            return Ok(Some((r, end)));
        }
        let rep = self.load_from_ref(file, line, entry.ty, op, &r, &exp[1..])?;
        Ok(Some((rep, end)))
    }

    /// `T.Array.get/set/ref(…)` with an optional `_field` suffix narrowing
    /// a struct element to one of its fields.
    #[allow(clippy::too_many_arguments)]
    fn try_array(
        &mut self,
        file: &str,
        text: &str,
        start: usize,
        open: usize,
        line: usize,
        t_name: &str,
        op_str: &str,
    ) -> Result<Option<(String, usize)>, Diagnostic> {
        let (op_name, field) = match op_str.split_once('_') {
            Some((o, f)) => (o, Some(f)),
            None => (op_str, None),
        };
        let op = match Op::from_name(op_name) {
            Some(op @ (Op::Get | Op::Set | Op::Ref)) => op,
            _ => return Ok(None),
        };
        let elem_ty = if let Some(pk) = PrimKind::from_name(t_name) {
            TypeRef::Prim(pk)
        } else if let Some(tid) = self.table.get(t_name) {
            TypeRef::User(tid)
        } else {
            return Ok(None);
        };
        let (esize, _ealign) = self.table.elem_size_align(elem_ty);

        // resolve the optional struct-field narrowing before parsing args
        let narrowed = match field {
            None => None,
            Some(f) => {
                let entry = match elem_ty {
                    TypeRef::User(tid) if self.table.defs[tid].is_struct() => {
                        self.table.defs[tid].map.get(f).cloned()
                    }
                    _ => None,
                };
                match entry {
                    Some(e) => Some(e),
                    None => {
                        return Ok(self.warn_unchanged(
                            file,
                            line,
                            &format!("{}.Array.{}", t_name, op_str),
                            &format!("'{}' is not a struct field of '{}'", f, t_name),
                            text,
                            start,
                            open + 1,
                        ));
                    }
                }
            }
        };

        let arity = op.arity() + 1; // pointer plus index
        let (args, end) = match parse_call_args(text, open) {
            Ok(v) => v,
            Err(note) => {
                return Ok(self.warn_unchanged(
                    file,
                    line,
                    &format!("{}.Array.{}", t_name, op_str),
                    &note,
                    text,
                    start,
                    open + 1,
                ));
            }
        };
        if args.len() != arity {
            return Ok(self.warn_unchanged(
                file,
                line,
                &format!("{}.Array.{}", t_name, op_str),
                &format!("expected {} argument(s), found {}", arity, args.len()),
                text,
                start,
                open + 1,
            ));
        }

        let mut exp = Vec::with_capacity(args.len());
        for a in &args {
            exp.push(self.expand_chunk(file, a, line)?);
        }
        let mut r = format!("({}+{}*{})", exp[0], esize, exp[1]);
        let ty = match narrowed {
            Some(e) => {
                r = format!("({}+{})", r, e.offset);
                e.ty
            }
            None => elem_ty,
        };
        if op == Op::Ref {
            return Ok(Some((r, end)));
        }
        let rep = self.load_from_ref(file, line, ty, op, &r, &exp[2..])?;
        Ok(Some((rep, end)))
    }

    /// Lower a get/set/atomic access through a resolved byte ref.
    fn load_from_ref(
        &mut self,
        file: &str,
        line: usize,
        ty: TypeRef,
        op: Op,
        r: &str,
        rest: &[String],
    ) -> Result<String, Diagnostic> {
        match ty {
            TypeRef::User(tid) if self.table.defs[tid].is_struct() => {
                let d = &self.table.defs[tid];
                let si = d
                    .struct_info()
                    .ok_or_else(|| Diagnostic::internal("struct info missing"))?;
                match op {
                    Op::Get => {
                        if !si.has_get {
                            return Err(Diagnostic::new(
                                format!("struct '{}' has no get accessor", d.name),
                                Some(Pos::new(file, line)),
                            ));
                        }
                        Ok(format!("({}._get_impl({}))", d.name, r))
                    }
                    Op::Set => {
                        if !si.has_set {
                            return Err(Diagnostic::new(
                                format!("struct '{}' has no set accessor", d.name),
                                Some(Pos::new(file, line)),
                            ));
                        }
                        Ok(format!("({}._set_impl({}, {}))", d.name, r, rest[0]))
                    }
                    _ => Err(Diagnostic::new(
                        format!("operation is not supported on struct '{}'", d.name),
                        Some(Pos::new(file, line)),
                    )),
                }
            }
            _ => {
                let (view, size) = match ty {
                    TypeRef::Prim(pk) => (pk.view(), pk.size()),
                    // class references are 4-byte pointers
                    TypeRef::User(_) => (PrimKind::Int32.view(), 4),
                };
                let shift = log2(size)?;
                match op {
                    Op::Get => Ok(format!("({}[{}>>{}])", view, r, shift)),
                    Op::Set => Ok(format!("({}[{}>>{}] = {})", view, r, shift, rest[0])),
                    Op::Notify => Ok(format!(
                        "Parlang._synchronic_notify({}, {}>>{})",
                        view, r, shift
                    )),
                    op if op.is_synchronic() => Ok(format!(
                        "Parlang._synchronic_{}({}, {}>>{}, {})",
                        op.runtime_name(),
                        view,
                        r,
                        shift,
                        rest.join(", ")
                    )),
                    Op::Ref => Err(Diagnostic::internal("ref reached load_from_ref")),
                    op => Ok(format!(
                        "Atomics.{}({}, {}>>{}, {})",
                        op.runtime_name(),
                        view,
                        r,
                        shift,
                        rest.join(", ")
                    )),
                }
            }
        }
    }

    /// `new T`, `new T.Array(n)`, and `new array(T, n)`. The `new` keyword
    /// is reserved by the dialect: an unknown type here is fatal.
    fn try_new(
        &mut self,
        file: &str,
        text: &str,
        start: usize,
        after_kw: usize,
        line: usize,
    ) -> Result<Option<(String, usize)>, Diagnostic> {
        let b = text.as_bytes();
        let mut i = after_kw;
        if i >= b.len() || !b[i].is_ascii_whitespace() {
            return Ok(None);
        }
        while i < b.len() && b[i].is_ascii_whitespace() {
            i += 1;
        }
        let (t_name, j) = read_ident(text, i);
        if t_name.is_empty() {
            return Err(Diagnostic::new(
                "expected a shared type name after 'new'",
                Some(Pos::new(file, line)),
            ));
        }

        if t_name == "array" {
            let open = skip_spaces(b, j);
            if open >= b.len() || b[open] != b'(' {
                return Err(self.unknown_new_type(file, line, t_name));
            }
            let (args, end) = match parse_call_args(text, open) {
                Ok(v) => v,
                Err(note) => {
                    return Ok(self.warn_unchanged(
                        file, line, "new array", &note, text, start, open + 1,
                    ));
                }
            };
            if args.len() != 2 {
                return Ok(self.warn_unchanged(
                    file,
                    line,
                    "new array",
                    &format!("expected 2 argument(s), found {}", args.len()),
                    text,
                    start,
                    open + 1,
                ));
            }
            let elem = self.lookup_elem(file, line, args[0].trim())?;
            let (esize, ealign) = self.table.elem_size_align(elem);
            let count = self.expand_chunk(file, &args[1], line)?;
            return Ok(Some((
                format!("(Parlang.alloc({} * {}, {}))", esize, count, ealign),
                end,
            )));
        }

        let elem = self.lookup_elem(file, line, t_name)?;

        // tight `.Array(n)` suffix
        if j < b.len() && b[j] == b'.' {
            let (seg, k) = read_ident(text, j + 1);
            if seg == "Array" {
                let open = skip_spaces(b, k);
                if open >= b.len() || b[open] != b'(' {
                    return Ok(self.warn_unchanged(
                        file,
                        line,
                        &format!("new {}.Array", t_name),
                        "expected an element count",
                        text,
                        start,
                        k,
                    ));
                }
                let (args, end) = match parse_call_args(text, open) {
                    Ok(v) => v,
                    Err(note) => {
                        return Ok(self.warn_unchanged(
                            file,
                            line,
                            &format!("new {}.Array", t_name),
                            &note,
                            text,
                            start,
                            open + 1,
                        ));
                    }
                };
                if args.len() != 1 {
                    return Ok(self.warn_unchanged(
                        file,
                        line,
                        &format!("new {}.Array", t_name),
                        &format!("expected 1 argument(s), found {}", args.len()),
                        text,
                        start,
                        open + 1,
                    ));
                }
                let (esize, ealign) = self.table.elem_size_align(elem);
                let count = self.expand_chunk(file, &args[0], line)?;
                return Ok(Some((
                    format!("(Parlang.alloc({} * {}, {}))", esize, count, ealign),
                    end,
                )));
            }
        }

        match elem {
            TypeRef::Prim(_) => Err(Diagnostic::new(
                format!("cannot allocate primitive '{}' without an array length", t_name),
                Some(Pos::new(file, line)),
            )),
            TypeRef::User(tid) => {
                let d = &self.table.defs[tid];
                let rep = if d.is_class() {
                    format!(
                        "({}.initInstance(Parlang.alloc({},{})))",
                        d.name, d.size, d.align
                    )
                } else {
                    format!("(Parlang.alloc({},{}))", d.size, d.align)
                };
                Ok(Some((rep, j)))
            }
        }
    }

    fn lookup_elem(&self, file: &str, line: usize, name: &str) -> Result<TypeRef, Diagnostic> {
        if let Some(pk) = PrimKind::from_name(name) {
            return Ok(TypeRef::Prim(pk));
        }
        if let Some(tid) = self.table.get(name) {
            return Ok(TypeRef::User(tid));
        }
        Err(self.unknown_new_type(file, line, name))
    }

    fn unknown_new_type(&self, file: &str, line: usize, name: &str) -> Diagnostic {
        let mut candidates = self.table.names();
        candidates.extend(PrimKind::ALL.iter().map(|pk| pk.name().to_string()));
        let note = suggest::did_you_mean(name, candidates)
            .map(|n| format!(" ({})", n))
            .unwrap_or_default();
        Diagnostic::new(
            format!("unknown shared type '{}' in new expression{}", name, note),
            Some(Pos::new(file, line)),
        )
    }
}

// `$` counts so that host identifiers like `obj$Point` never expose a
// type-name tail to the matcher.
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn ident_end(b: &[u8], start: usize) -> usize {
    let mut j = start;
    while j < b.len() && is_ident_byte(b[j]) {
        j += 1;
    }
    j
}

fn read_ident(s: &str, start: usize) -> (&str, usize) {
    let b = s.as_bytes();
    if start >= b.len() || !(b[start].is_ascii_alphabetic() || b[start] == b'_') {
        return ("", start);
    }
    let j = ident_end(b, start);
    (&s[start..j], j)
}

fn skip_spaces(b: &[u8], start: usize) -> usize {
    let mut j = start;
    while j < b.len() && (b[j] == b' ' || b[j] == b'\t') {
        j += 1;
    }
    j
}

fn is_atomic_leaf(ty: TypeRef) -> bool {
    matches!(ty, TypeRef::Prim(pk) if pk.is_atomic())
}

/// `T.op_f(…)` spellings: the operator prefix wins only when the suffix
/// names an accessible field, so composite names like `p_x` still resolve
/// as plain gets.
fn split_op_prefix(table: &TypeTable, tid: DefnId, seg: &str) -> Option<(Op, String)> {
    if let Some((pre, suf)) = seg.split_once('_') {
        if let Some(op) = Op::from_name(pre) {
            if op != Op::Get && table.defs[tid].map.get(suf).is_some() {
                return Some((op, suf.to_string()));
            }
        }
    }
    if table.defs[tid].map.get(seg).is_some() {
        return Some((Op::Get, seg.to_string()));
    }
    None
}

/// Split a balanced argument list starting at the open paren. Returns the
/// trimmed arguments and the index one past the closing paren. Strings and
/// comments ride along inside arguments unparsed.
fn parse_call_args(text: &str, open: usize) -> Result<(Vec<String>, usize), String> {
    let b = text.as_bytes();
    let mut args: Vec<String> = Vec::new();
    let mut depth = 0usize;
    let mut cur_start = open + 1;
    let mut j = open + 1;
    while j < b.len() {
        match b[j] {
            b'\'' | b'"' | b'`' => j = skip_string(b, j),
            b'/' if j + 1 < b.len() && b[j + 1] == b'/' => {
                j = text[j..].find('\n').map(|k| j + k).unwrap_or(b.len());
            }
            b'/' if j + 1 < b.len() && b[j + 1] == b'*' => {
                j = text[j + 2..]
                    .find("*/")
                    .map(|k| j + 2 + k + 2)
                    .unwrap_or(b.len());
            }
            b'(' | b'[' | b'{' => {
                depth += 1;
                j += 1;
            }
            b')' if depth == 0 => {
                let a = text[cur_start..j].trim();
                if a.is_empty() {
                    if !args.is_empty() {
                        return Err("empty argument".to_string());
                    }
                } else {
                    args.push(a.to_string());
                }
                return Ok((args, j + 1));
            }
            b')' | b']' | b'}' => {
                if depth == 0 {
                    return Err("unbalanced brackets in argument list".to_string());
                }
                depth -= 1;
                j += 1;
            }
            b',' if depth == 0 => {
                let a = text[cur_start..j].trim();
                if a.is_empty() {
                    return Err("empty argument".to_string());
                }
                args.push(a.to_string());
                cur_start = j + 1;
                j += 1;
            }
            _ => j += 1,
        }
    }
    Err("unterminated argument list".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::collector::Collector;
    use crate::sema::{build_registry, check_cycles, layout, resolve, vtable};
    use crate::sema::types::TypeTable;

    const POINT: &str = "\
shared class Point {
  x: int32
  y: int32
} end";

    fn table_for(src: &str) -> TypeTable {
        let cf = Collector::new().collect("t.js.parlang", src).expect("collect");
        let (mut table, _) = build_registry(vec![cf]).expect("registry");
        resolve(&mut table).expect("resolve");
        check_cycles(&mut table).expect("cycles");
        layout::compute(&mut table).expect("layout");
        vtable::build(&mut table).expect("vtables");
        table
    }

    fn expand(table: &TypeTable, text: &str) -> String {
        Expander::new(table)
            .expand_file("t.js", text)
            .expect("expand")
    }

    #[test]
    fn get_set_ref_accessors() {
        let table = table_for(POINT);
        assert_eq!(expand(&table, "Point.x(p)"), "(_mem_int32[(p+4)>>2])");
        assert_eq!(
            expand(&table, "Point.x.set(p, 10)"),
            "(_mem_int32[(p+4)>>2] = 10)"
        );
        assert_eq!(expand(&table, "Point.x.ref(p)"), "(p+4)");
        assert_eq!(
            expand(&table, "Point.set_y(p, 1)"),
            "(_mem_int32[(p+8)>>2] = 1)"
        );
        assert_eq!(expand(&table, "Point.ref_y(p)"), "(p+8)");
    }

    #[test]
    fn wide_and_narrow_views_shift_correctly() {
        let src = "\
shared class Mixed {
  b: uint8
  d: float64
} end";
        let table = table_for(src);
        assert_eq!(expand(&table, "Mixed.b(p)"), "(_mem_uint8[(p+4)>>0])");
        assert_eq!(expand(&table, "Mixed.d(p)"), "(_mem_float64[(p+8)>>3])");
    }

    #[test]
    fn unknown_types_and_fields_pass_through() {
        let table = table_for(POINT);
        assert_eq!(expand(&table, "Other.x(p)"), "Other.x(p)");
        assert_eq!(expand(&table, "Point.z(p)"), "Point.z(p)");
        assert_eq!(expand(&table, "Point.x"), "Point.x");
        assert_eq!(
            expand(&table, "Point.f_impl.apply(null, a)"),
            "Point.f_impl.apply(null, a)"
        );
    }

    #[test]
    fn literals_and_comments_are_untouched() {
        let table = table_for(POINT);
        assert_eq!(
            expand(&table, "s = \"Point.x(p)\";"),
            "s = \"Point.x(p)\";"
        );
        assert_eq!(
            expand(&table, "// Point.x(p) and new Point\nPoint.x(p)"),
            "// Point.x(p) and new Point\n(_mem_int32[(p+4)>>2])"
        );
        assert_eq!(
            expand(&table, "/* new Point */ 1"),
            "/* new Point */ 1"
        );
    }

    #[test]
    fn atomic_and_synchronic_operations() {
        let src = "\
shared class Cell {
  n: atomic int32
  s: synchronic uint32
} end";
        let table = table_for(src);
        assert_eq!(
            expand(&table, "Cell.add_n(p, 2)"),
            "Atomics.add(_mem_int32, (p+4)>>2, 2)"
        );
        assert_eq!(
            expand(&table, "Cell.n.compareExchange(p, a, b)"),
            "Atomics.compareExchange(_mem_int32, (p+4)>>2, a, b)"
        );
        assert_eq!(
            expand(&table, "Cell.s.expectUpdate(p, v, t)"),
            "Parlang._synchronic_expectUpdate(_mem_uint32, (p+8)>>2, v, t)"
        );
        assert_eq!(
            expand(&table, "Cell.notify_s(p)"),
            "Parlang._synchronic_notify(_mem_uint32, (p+8)>>2)"
        );
    }

    #[test]
    fn atomic_op_on_plain_float_warns_and_skips() {
        let src = "\
shared class F {
  x: float32
} end";
        let table = table_for(src);
        let mut ex = Expander::new(&table);
        let out = ex.expand_file("t.js", "F.add_x(p, 1)").expect("expand");
        assert_eq!(out, "F.add_x(p, 1)");
        assert!(!ex.warnings.is_empty());
    }

    #[test]
    fn struct_accessors_route_through_impls() {
        let src = "\
shared struct Pair {
  x: float64
  y: int32
  get(self) {
    return 0;
  }
  set(self, v) {
  }
} end
shared class Box {
  p: Pair
} end";
        let table = table_for(src);
        assert_eq!(expand(&table, "Box.p(b)"), "(Pair._get_impl((b+8)))");
        assert_eq!(
            expand(&table, "Box.p.set(b, v)"),
            "(Pair._set_impl((b+8), v))"
        );
        assert_eq!(
            expand(&table, "Box.p_x(b)"),
            "(_mem_float64[(b+8)>>3])"
        );
        assert_eq!(
            expand(&table, "Box.p_y.set(b, 3)"),
            "(_mem_int32[(b+16)>>2] = 3)"
        );
    }

    #[test]
    fn struct_without_set_accessor_is_fatal() {
        let src = "\
shared struct S {
  x: int32
  get(self) {
    return 0;
  }
} end
shared class Box {
  s: S
} end";
        let table = table_for(src);
        let err = Expander::new(&table)
            .expand_file("t.js", "Box.s.set(b, v)")
            .expect_err("must fail");
        assert!(err.message.contains("no set accessor"));
    }

    #[test]
    fn array_element_accessors() {
        let src = "\
shared struct Pair {
  x: float64
  y: int32
} end
shared class Node {
} end";
        let table = table_for(src);
        assert_eq!(
            expand(&table, "int32.Array.get(a, i)"),
            "(_mem_int32[(a+4*i)>>2])"
        );
        assert_eq!(
            expand(&table, "int32.Array.set(a, i, v)"),
            "(_mem_int32[(a+4*i)>>2] = v)"
        );
        assert_eq!(expand(&table, "float64.Array.ref(a, i)"), "(a+8*i)");
        assert_eq!(
            expand(&table, "Pair.Array.get_y(a, i)"),
            "(_mem_int32[((a+16*i)+8)>>2])"
        );
        assert_eq!(
            expand(&table, "Pair.Array.ref_x(a, i)"),
            "((a+16*i)+0)"
        );
        // class elements are pointer slots
        assert_eq!(
            expand(&table, "Node.Array.get(a, i)"),
            "(_mem_int32[(a+4*i)>>2])"
        );
    }

    #[test]
    fn allocator_expansion() {
        let table = table_for(POINT);
        assert_eq!(
            expand(&table, "var p = new Point;"),
            "var p = (Point.initInstance(Parlang.alloc(12,4)));"
        );
        assert_eq!(
            expand(&table, "new int32.Array(7)"),
            "(Parlang.alloc(4 * 7, 4))"
        );
        assert_eq!(
            expand(&table, "new array(int32, 7)"),
            "(Parlang.alloc(4 * 7, 4))"
        );
    }

    #[test]
    fn struct_allocation_has_no_init_instance() {
        let src = "\
shared struct Pair {
  x: float64
  y: int32
} end";
        let table = table_for(src);
        assert_eq!(expand(&table, "new Pair"), "(Parlang.alloc(16,8))");
        assert_eq!(
            expand(&table, "new Pair.Array(n)"),
            "(Parlang.alloc(16 * n, 8))"
        );
    }

    #[test]
    fn unknown_new_type_is_fatal() {
        let table = table_for(POINT);
        let err = Expander::new(&table)
            .expand_file("t.js", "new Pointt")
            .expect_err("must fail");
        assert!(err.message.contains("unknown shared type 'Pointt'"));
        assert!(err.message.contains("did you mean"));
    }

    #[test]
    fn arity_mismatch_warns_and_leaves_text() {
        let table = table_for(POINT);
        let mut ex = Expander::new(&table);
        let out = ex
            .expand_file("t.js", "Point.x(p, q) + Point.y(r)")
            .expect("expand");
        assert_eq!(out, "Point.x(p, q) + (_mem_int32[(r+8)>>2])");
        assert_eq!(ex.warnings.items.len(), 1);
        assert!(ex.warnings.items[0].message.contains("expected 1"));
    }

    #[test]
    fn nested_arguments_expand_recursively() {
        let src = "\
shared class Point {
  x: int32
  y: int32
} end
shared class Line {
  a: Point
} end";
        let table = table_for(src);
        assert_eq!(
            expand(&table, "Point.x(Line.a(l))"),
            "(_mem_int32[((_mem_int32[(l+4)>>2])+4)>>2])"
        );
        assert_eq!(
            expand(&table, "Point.x.set(p, Point.y(q))"),
            "(_mem_int32[(p+4)>>2] = (_mem_int32[(q+8)>>2]))"
        );
        assert_eq!(
            expand(&table, "new int32.Array(Point.y(q))"),
            "(Parlang.alloc(4 * (_mem_int32[(q+8)>>2]), 4))"
        );
    }

    #[test]
    fn expansion_is_idempotent() {
        let src = "\
shared struct Pair {
  x: float64
  y: int32
  get(self) {
    return 0;
  }
} end
shared class Point {
  x: int32
  y: int32
} end";
        let table = table_for(src);
        let input = "Point.x(p); Point.y.set(p, 2); new Point; Pair.Array.get(a, i); new int32.Array(3)";
        let once = expand(&table, input);
        let twice = expand(&table, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn strings_inside_argument_lists_survive() {
        let table = table_for(POINT);
        assert_eq!(
            expand(&table, "Point.x.set(p, f(\"a, b)\"))"),
            "(_mem_int32[(p+4)>>2] = f(\"a, b)\"))"
        );
    }
}
