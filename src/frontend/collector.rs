use regex::Regex;

use super::ast::{
    CollectedFile, DefnKeyword, MethodDefn, MethodKind, Pos, PropDefn, PropQual, RawDefn,
};
use super::diagnostic::Diagnostic;

/// Line-oriented extraction of `shared class`/`shared struct` blocks.
///
/// Lines outside a definition pass through verbatim into the retained
/// stream; a definition records the retained length at its opener as the
/// splice point for the lowered code.
pub struct Collector {
    opener: Regex,
    shared_probe: Regex,
    method: Regex,
    accessor: Regex,
    array_prop: Regex,
    prop: Regex,
    end: Regex,
    blank: Regex,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Self {
            opener: Regex::new(
                r"^\s*shared\s+(class|struct)\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s+extends\s+([A-Za-z_][A-Za-z0-9_]*))?\s*\{\s*$",
            )
            .unwrap(),
            shared_probe: Regex::new(r"^\s*shared\b").unwrap(),
            method: Regex::new(r"^\s*method\s+([A-Za-z_][A-Za-z0-9_]*)\s*(\(\s*self.*)$").unwrap(),
            accessor: Regex::new(r"^\s*(get|set|copy)\s*(\(\s*self.*)$").unwrap(),
            array_prop: Regex::new(
                r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*:\s*array\s*\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*\)\s*;?\s*$",
            )
            .unwrap(),
            prop: Regex::new(
                r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*:\s*(?:(atomic|synchronic)\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*;?\s*$",
            )
            .unwrap(),
            end: Regex::new(r"^\s*\}\s*end\s*$").unwrap(),
            blank: Regex::new(r"^\s*(//.*)?$").unwrap(),
        }
    }

    pub fn collect(&self, file: &str, source: &str) -> Result<CollectedFile, Diagnostic> {
        let mut retained: Vec<String> = Vec::new();
        let mut defns: Vec<RawDefn> = Vec::new();
        let mut cur: Option<RawDefn> = None;
        let mut cur_method: Option<MethodDefn> = None;

        for (idx, raw_line) in source.split('\n').enumerate() {
            let line_no = idx + 1;
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);

            if cur.is_none() {
                if let Some(c) = self.opener.captures(line) {
                    let kind = if &c[1] == "class" {
                        DefnKeyword::Class
                    } else {
                        DefnKeyword::Struct
                    };
                    cur = Some(RawDefn {
                        file: file.to_string(),
                        line: line_no,
                        kind,
                        name: c[2].to_string(),
                        base_name: c.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
                        origin: retained.len(),
                        props: Vec::new(),
                        methods: Vec::new(),
                    });
                } else if self.shared_probe.is_match(line) {
                    return Err(Diagnostic::new(
                        "malformed shared type definition",
                        Some(Pos::new(file, line_no)),
                    ));
                } else {
                    retained.push(line.to_string());
                }
                continue;
            }

            if self.end.is_match(line) {
                if let Some(mut defn) = cur.take() {
                    if let Some(m) = cur_method.take() {
                        defn.methods.push(m);
                    }
                    defns.push(defn);
                }
                continue;
            }
            if let Some(c) = self.method.captures(line) {
                if let Some(defn) = cur.as_mut() {
                    if let Some(m) = cur_method.take() {
                        defn.methods.push(m);
                    }
                }
                cur_method = Some(MethodDefn {
                    line: line_no,
                    kind: MethodKind::Virtual,
                    name: c[1].to_string(),
                    body: vec![c[2].to_string()],
                });
                continue;
            }
            if let Some(c) = self.accessor.captures(line) {
                if let Some(defn) = cur.as_mut() {
                    if let Some(m) = cur_method.take() {
                        defn.methods.push(m);
                    }
                }
                let kind = match &c[1] {
                    "get" => MethodKind::Get,
                    "set" => MethodKind::Set,
                    _ => MethodKind::Copy,
                };
                cur_method = Some(MethodDefn {
                    line: line_no,
                    kind,
                    name: String::new(),
                    body: vec![c[2].to_string()],
                });
                continue;
            }
            if let Some(c) = self.array_prop.captures(line) {
                if let Some(defn) = cur.as_mut() {
                    defn.props.push(PropDefn {
                        line: line_no,
                        name: c[1].to_string(),
                        qual: PropQual::None,
                        is_array: true,
                        type_name: c[2].to_string(),
                    });
                }
                continue;
            }
            if let Some(c) = self.prop.captures(line) {
                if let Some(defn) = cur.as_mut() {
                    let qual = match c.get(2).map(|m| m.as_str()) {
                        Some("atomic") => PropQual::Atomic,
                        Some("synchronic") => PropQual::Synchronic,
                        _ => PropQual::None,
                    };
                    defn.props.push(PropDefn {
                        line: line_no,
                        name: c[1].to_string(),
                        qual,
                        is_array: false,
                        type_name: c[3].to_string(),
                    });
                }
                continue;
            }
            if let Some(m) = cur_method.as_mut() {
                m.body.push(line.to_string());
                continue;
            }
            if self.blank.is_match(line) {
                continue;
            }
            let name = cur.as_ref().map(|d| d.name.clone()).unwrap_or_default();
            return Err(Diagnostic::new(
                format!("unrecognized line inside shared type '{}'", name),
                Some(Pos::new(file, line_no)),
            ));
        }

        if let Some(defn) = cur {
            return Err(Diagnostic::new(
                format!(
                    "unterminated definition of shared type '{}' (missing `}} end`)",
                    defn.name
                ),
                Some(Pos::new(file, defn.line)),
            ));
        }

        Ok(CollectedFile {
            name: file.to_string(),
            retained,
            defns,
        })
    }
}
