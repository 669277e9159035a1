use std::collections::{BTreeSet, HashSet};
use std::fmt::{self, Write};

use tracing::debug;

use crate::error::{CodegenError, CodegenResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "__label.{}", self.0) }
}

/// A data or function symbol as NASM should read it. The `$` prefix keeps
/// names such as `r12`, `byte` or `rel` identifiers rather than keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sym<'a>(pub &'a str);

impl fmt::Display for Sym<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "${}", self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Byte,
    Word,
    Dword,
    Qword,
}

impl SizeClass {
    pub fn from_bytes(bytes: u32) -> Self {
        match bytes {
            1 => SizeClass::Byte,
            2 => SizeClass::Word,
            4 => SizeClass::Dword,
            _ => SizeClass::Qword,
        }
    }

    fn suffix(self) -> char {
        match self {
            SizeClass::Byte => 'b',
            SizeClass::Word => 'w',
            SizeClass::Dword => 'd',
            SizeClass::Qword => 'q',
        }
    }

    /// Operand size keyword for a memory reference.
    pub fn keyword(self) -> &'static str {
        match self {
            SizeClass::Byte => "byte",
            SizeClass::Word => "word",
            SizeClass::Dword => "dword",
            SizeClass::Qword => "qword",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataInit {
    Int(u64),
    /// Leading bytes of the object; the rest of `count` is zero-filled.
    Bytes(Vec<u8>),
    /// Address of another data symbol.
    Address(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    pub name: String,
    pub class: SizeClass,
    pub count: u32,
    pub init: Option<DataInit>,
}

impl DataEntry {
    fn write_to(&self, out: &mut String) -> fmt::Result {
        let suffix = self.class.suffix();
        let name = Sym(&self.name);
        match &self.init {
            None => writeln!(out, "{name}: res{suffix} {}", self.count),
            Some(DataInit::Int(v)) => writeln!(out, "{name}: d{suffix} {v}"),
            Some(DataInit::Address(target)) => writeln!(out, "{name}: dq {}", Sym(target)),
            Some(DataInit::Bytes(bytes)) => {
                let mut values: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
                let count = self.count as usize;
                if values.len() < count {
                    values.resize(count, "0".into());
                }
                writeln!(out, "{name}: d{suffix} {}", values.join(","))
            }
        }
    }
}

/// Data-section symbols in declaration order, names unique.
#[derive(Debug, Default)]
pub struct DataTable {
    entries: Vec<DataEntry>,
    names: HashSet<String>,
}

impl DataTable {
    pub fn add(&mut self, entry: DataEntry) -> CodegenResult<()> {
        if !self.names.insert(entry.name.clone()) {
            return Err(CodegenError::DuplicateDataSymbol { name: entry.name });
        }
        debug!(symbol = %entry.name, class = ?entry.class, count = entry.count, initialized = entry.init.is_some(), "data symbol");
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[DataEntry] { &self.entries }
}

/// Accumulates the text section and everything the trailer needs.
#[derive(Debug, Default)]
pub struct Emitter {
    text: String,
    next_label: u32,
    next_string: u32,
    data: DataTable,
    externs: BTreeSet<String>,
}

impl Emitter {
    pub fn new() -> Self { Self::default() }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn place_label(&mut self, label: Label) -> CodegenResult<()> {
        writeln!(self.text, "{label}:")?;
        Ok(())
    }

    pub fn ins(&mut self, args: fmt::Arguments<'_>) -> CodegenResult<()> {
        writeln!(self.text, "    {args}")?;
        Ok(())
    }

    pub fn function_label(&mut self, name: &str) -> CodegenResult<()> {
        writeln!(self.text, "global {}", Sym(name))?;
        writeln!(self.text, "{}:", Sym(name))?;
        Ok(())
    }

    pub fn use_extern(&mut self, name: &str) {
        if self.externs.insert(name.into()) {
            debug!(symbol = name, "extern");
        }
    }

    pub fn reserve(&mut self, entry: DataEntry) -> CodegenResult<()> { self.data.add(entry) }

    /// Adds a zero-terminated anonymous byte string and returns its symbol.
    /// The `.` in the name can't appear in a source identifier.
    pub fn string_literal(&mut self, s: &str) -> CodegenResult<String> {
        let name = format!("__str.{}", self.next_string);
        self.next_string += 1;
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        let count = bytes.len() as u32;
        self.data.add(DataEntry { name: name.clone(), class: SizeClass::Byte, count, init: Some(DataInit::Bytes(bytes)) })?;
        Ok(name)
    }

    pub fn finish(self) -> CodegenResult<String> {
        let mut out = String::from("default rel\n");
        for name in &self.externs {
            writeln!(out, "extern {name}")?;
        }
        out.push_str("section .text\n");
        out.push_str(&self.text);

        let (initialized, reserved): (Vec<&DataEntry>, Vec<&DataEntry>) =
            self.data.entries().iter().partition(|e| e.init.is_some());
        if !initialized.is_empty() {
            out.push_str("section .data\n");
            for entry in initialized {
                entry.write_to(&mut out)?;
            }
        }
        if !reserved.is_empty() {
            out.push_str("section .bss\n");
            for entry in reserved {
                entry.write_to(&mut out)?;
            }
        }
        out.push_str("section .note.GNU-stack noalloc noexec nowrite progbits\n");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn labels_are_never_reused() {
        let mut e = Emitter::new();
        let a = e.new_label();
        let b = e.new_label();
        assert_ne!(a, b);
        assert_eq!(b.to_string(), "__label.1");
    }

    #[test]
    fn duplicate_data_symbol_is_fatal() {
        let mut e = Emitter::new();
        let entry = DataEntry { name: "a".into(), class: SizeClass::Dword, count: 1, init: None };
        e.reserve(entry.clone()).unwrap();
        assert_eq!(e.reserve(entry).unwrap_err(), CodegenError::DuplicateDataSymbol { name: "a".into() });
    }

    #[test]
    fn string_names_leave_identifiers_free() {
        let mut e = Emitter::new();
        e.reserve(DataEntry { name: "__str__0".into(), class: SizeClass::Byte, count: 1, init: None }).unwrap();
        assert_eq!(e.string_literal("x").unwrap(), "__str.0");
        assert_eq!(Sym("r12").to_string(), "$r12");
    }

    #[test]
    fn finish_layout() {
        let mut e = Emitter::new();
        e.use_extern("print");
        e.use_extern("print");
        e.function_label("main").unwrap();
        e.ins(format_args!("ret")).unwrap();
        e.reserve(DataEntry { name: "arr".into(), class: SizeClass::Dword, count: 10, init: None }).unwrap();
        e.reserve(DataEntry { name: "n".into(), class: SizeClass::Qword, count: 1, init: Some(DataInit::Int(5)) })
            .unwrap();
        e.reserve(DataEntry {
            name: "buf".into(),
            class: SizeClass::Byte,
            count: 4,
            init: Some(DataInit::Bytes(vec![104, 105, 0])),
        })
        .unwrap();
        assert_eq!(e.string_literal("ok").unwrap(), "__str.0");
        assert_eq!(
            e.finish().unwrap(),
            "default rel\n\
             extern print\n\
             section .text\n\
             global $main\n\
             $main:\n    ret\n\
             section .data\n\
             $n: dq 5\n\
             $buf: db 104,105,0,0\n\
             $__str.0: db 111,107,0\n\
             section .bss\n\
             $arr: resd 10\n\
             section .note.GNU-stack noalloc noexec nowrite progbits\n"
        );
    }
}
