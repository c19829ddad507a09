#[derive(Clone, Debug)]
pub struct Pos {
    pub file: String,
    pub line: usize,
}

impl Pos {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefnKeyword {
    Class,
    Struct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropQual {
    None,
    Atomic,
    Synchronic,
}

/// A declared field, as written. Type binding happens in sema.
#[derive(Clone, Debug)]
pub struct PropDefn {
    pub line: usize,
    pub name: String,
    pub qual: PropQual,
    pub is_array: bool,
    pub type_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodKind {
    Virtual,
    Get,
    Set,
    Copy,
}

/// A collected method. `body[0]` is the signature fragment starting at the
/// open paren of the self-parameter list; the remaining lines are verbatim
/// host-language text.
#[derive(Clone, Debug)]
pub struct MethodDefn {
    pub line: usize,
    pub kind: MethodKind,
    pub name: String,
    pub body: Vec<String>,
}

/// One `shared class`/`shared struct` block as extracted by the collector.
#[derive(Clone, Debug)]
pub struct RawDefn {
    pub file: String,
    pub line: usize,
    pub kind: DefnKeyword,
    pub name: String,
    pub base_name: String,
    /// Index into the owning file's retained line stream where the lowered
    /// code is spliced back in.
    pub origin: usize,
    pub props: Vec<PropDefn>,
    pub methods: Vec<MethodDefn>,
}

/// Per-file collector output: the non-annotated lines plus the extracted
/// definitions in source order.
#[derive(Clone, Debug)]
pub struct CollectedFile {
    pub name: String,
    pub retained: Vec<String>,
    pub defns: Vec<RawDefn>,
}
