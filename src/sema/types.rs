use std::collections::HashMap;

use crate::frontend::ast::{MethodDefn, Pos, PropQual};
use crate::frontend::diagnostic::Diagnostic;

/// Fixed-size scalar types of the flat buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimKind {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl PrimKind {
    pub const ALL: [PrimKind; 8] = [
        PrimKind::Int8,
        PrimKind::Uint8,
        PrimKind::Int16,
        PrimKind::Uint16,
        PrimKind::Int32,
        PrimKind::Uint32,
        PrimKind::Float32,
        PrimKind::Float64,
    ];

    pub fn from_name(name: &str) -> Option<PrimKind> {
        match name {
            "int8" => Some(PrimKind::Int8),
            "uint8" => Some(PrimKind::Uint8),
            "int16" => Some(PrimKind::Int16),
            "uint16" => Some(PrimKind::Uint16),
            "int32" => Some(PrimKind::Int32),
            "uint32" => Some(PrimKind::Uint32),
            "float32" => Some(PrimKind::Float32),
            "float64" => Some(PrimKind::Float64),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimKind::Int8 => "int8",
            PrimKind::Uint8 => "uint8",
            PrimKind::Int16 => "int16",
            PrimKind::Uint16 => "uint16",
            PrimKind::Int32 => "int32",
            PrimKind::Uint32 => "uint32",
            PrimKind::Float32 => "float32",
            PrimKind::Float64 => "float64",
        }
    }

    pub fn size(self) -> u32 {
        match self {
            PrimKind::Int8 | PrimKind::Uint8 => 1,
            PrimKind::Int16 | PrimKind::Uint16 => 2,
            PrimKind::Int32 | PrimKind::Uint32 | PrimKind::Float32 => 4,
            PrimKind::Float64 => 8,
        }
    }

    /// Alignment equals size for every scalar.
    pub fn align(self) -> u32 {
        self.size()
    }

    /// Integer scalars support atomic access; floats do not.
    pub fn is_atomic(self) -> bool {
        !matches!(self, PrimKind::Float32 | PrimKind::Float64)
    }

    /// Name of the typed view array over the flat buffer.
    pub fn view(self) -> &'static str {
        match self {
            PrimKind::Int8 => "_mem_int8",
            PrimKind::Uint8 => "_mem_uint8",
            PrimKind::Int16 => "_mem_int16",
            PrimKind::Uint16 => "_mem_uint16",
            PrimKind::Int32 => "_mem_int32",
            PrimKind::Uint32 => "_mem_uint32",
            PrimKind::Float32 => "_mem_float32",
            PrimKind::Float64 => "_mem_float64",
        }
    }
}

/// Floor log2 of an element size, used as the index shift into typed views.
pub fn log2(x: u32) -> Result<u32, Diagnostic> {
    if x == 0 {
        return Err(Diagnostic::internal("log2 of non-positive value"));
    }
    Ok(31 - x.leading_zeros())
}

pub type DefnId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Prim(PrimKind),
    User(DefnId),
}

/// One slot in a layout: either a leaf (scalar or pointer, expand=true) or
/// an embedded struct aggregate (expand=false). Embedding a struct `p` also
/// copies its entries under composite `p_<name>` keys with biased offsets.
#[derive(Clone, Debug)]
pub struct MapEntry {
    pub name: String,
    pub expand: bool,
    pub offset: u32,
    pub ty: TypeRef,
}

#[derive(Clone, Debug, Default)]
pub struct FieldMap {
    pub entries: Vec<MapEntry>,
}

impl FieldMap {
    pub fn insert(&mut self, entry: MapEntry) {
        self.entries.push(entry);
    }

    pub fn get(&self, name: &str) -> Option<&MapEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// A declared field after registry construction; `ty` is bound by the
/// reference resolver.
#[derive(Clone, Debug)]
pub struct Prop {
    pub line: usize,
    pub name: String,
    pub qual: PropQual,
    pub is_array: bool,
    pub type_name: String,
    pub ty: Option<TypeRef>,
}

#[derive(Clone, Debug)]
pub struct DispatchCase {
    pub impl_sym: String,
    pub ids: Vec<u32>,
}

/// One virtual method visible on a class: which implementation each
/// concrete class id dispatches to, plus an optional inherited fallback.
#[derive(Clone, Debug)]
pub struct VirtualMethod {
    pub name: String,
    pub cases: Vec<DispatchCase>,
    pub default: Option<String>,
}

impl VirtualMethod {
    pub fn add_case(&mut self, impl_sym: String, id: u32) {
        if let Some(c) = self.cases.iter_mut().find(|c| c.impl_sym == impl_sym) {
            c.ids.push(id);
        } else {
            self.cases.push(DispatchCase {
                impl_sym,
                ids: vec![id],
            });
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub base_name: String,
    pub base: Option<DefnId>,
    /// `>`-joined ancestor chain ending with this class's own name.
    pub dotted: String,
    /// 28-bit identifier stored at offset 0 of every instance.
    pub clsid: u32,
    pub subclasses: Vec<DefnId>,
    pub vtable: Vec<VirtualMethod>,
}

#[derive(Clone, Debug)]
pub struct StructInfo {
    pub has_get: bool,
    pub has_set: bool,
}

#[derive(Clone, Debug)]
pub enum DefnKind {
    Class(ClassInfo),
    Struct(StructInfo),
}

#[derive(Clone, Debug)]
pub struct TypeDefn {
    pub file: String,
    pub line: usize,
    pub name: String,
    pub origin: usize,
    pub kind: DefnKind,
    pub props: Vec<Prop>,
    pub methods: Vec<MethodDefn>,
    pub size: u32,
    pub align: u32,
    pub map: FieldMap,
    pub laid_out: bool,
    // gray/black markers for cycle detection
    pub live: bool,
    pub checked: bool,
}

impl TypeDefn {
    pub fn is_class(&self) -> bool {
        matches!(self.kind, DefnKind::Class(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, DefnKind::Struct(_))
    }

    pub fn class(&self) -> Option<&ClassInfo> {
        match &self.kind {
            DefnKind::Class(ci) => Some(ci),
            DefnKind::Struct(_) => None,
        }
    }

    pub fn class_mut(&mut self) -> Option<&mut ClassInfo> {
        match &mut self.kind {
            DefnKind::Class(ci) => Some(ci),
            DefnKind::Struct(_) => None,
        }
    }

    pub fn struct_info(&self) -> Option<&StructInfo> {
        match &self.kind {
            DefnKind::Struct(si) => Some(si),
            DefnKind::Class(_) => None,
        }
    }

    pub fn pos(&self) -> Pos {
        Pos::new(self.file.clone(), self.line)
    }
}

/// Global registry of user-defined types, in definition order. Cross
/// references between definitions are indices, never shared pointers.
#[derive(Clone, Debug, Default)]
pub struct TypeTable {
    pub defs: Vec<TypeDefn>,
    by_name: HashMap<String, DefnId>,
}

impl TypeTable {
    pub fn insert(&mut self, defn: TypeDefn) -> Result<DefnId, Diagnostic> {
        if PrimKind::from_name(&defn.name).is_some() {
            return Err(Diagnostic::new(
                format!("type name '{}' shadows a primitive type", defn.name),
                Some(defn.pos()),
            ));
        }
        if let Some(&prev) = self.by_name.get(&defn.name) {
            let first = &self.defs[prev];
            return Err(Diagnostic::new(
                format!(
                    "duplicate type name '{}' (first defined at {}:{})",
                    defn.name, first.file, first.line
                ),
                Some(defn.pos()),
            ));
        }
        let id = self.defs.len();
        self.by_name.insert(defn.name.clone(), id);
        self.defs.push(defn);
        Ok(id)
    }

    pub fn get(&self, name: &str) -> Option<DefnId> {
        self.by_name.get(name).copied()
    }

    pub fn names(&self) -> Vec<String> {
        self.defs.iter().map(|d| d.name.clone()).collect()
    }

    pub fn type_name(&self, ty: TypeRef) -> String {
        match ty {
            TypeRef::Prim(pk) => pk.name().to_string(),
            TypeRef::User(id) => self.defs[id].name.clone(),
        }
    }

    /// Element footprint when `ty` is used as an array element or pointer
    /// slot: scalars are themselves, structs are inline, classes are
    /// 4-byte pointers.
    pub fn elem_size_align(&self, ty: TypeRef) -> (u32, u32) {
        match ty {
            TypeRef::Prim(pk) => (pk.size(), pk.align()),
            TypeRef::User(id) => {
                let d = &self.defs[id];
                if d.is_class() {
                    (4, 4)
                } else {
                    (d.size, d.align)
                }
            }
        }
    }
}
