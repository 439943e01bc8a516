//! Per-unit symbol tables.
//!
//! A [`CodeUnitMetadata`] assigns stable indices to the constants, names,
//! and variables of one compilation unit. Index assignment is first-seen
//! order and immutable once made: the index is the operand every
//! index-based opcode carries, so later stages depend on it never moving.

use std::sync::Arc;

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use flint_core::{CompileError, NO_LOCATION};

use crate::code::CodeObject;

/// Interpreter ceiling on per-unit table sizes.
///
/// Exceeding it is a user-facing error: the program simply has too many
/// constants, names, or locals for one unit.
pub const TABLE_LIMIT: usize = 1 << 16;

/// Values stored in the constant pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// The none/null singleton.
    None,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// A string literal.
    Str(String),
    /// A nested unit's finished code object.
    Code(Arc<CodeObject>),
}

impl Constant {
    /// Truthiness as the interpreter would evaluate it.
    pub fn is_truthy(&self) -> bool {
        match self {
            Constant::None => false,
            Constant::Bool(b) => *b,
            Constant::Int(v) => *v != 0,
            Constant::Float(v) => *v != 0.0,
            Constant::Str(s) => !s.is_empty(),
            Constant::Code(_) => true,
        }
    }
}

/// Hashable dedup key for a constant.
///
/// Floats key on their bit pattern so `0.0` and `-0.0` stay distinct and
/// equal values always share a slot. Code objects never deduplicate; each
/// nested unit gets its own entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    None,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
}

impl ConstKey {
    fn of(constant: &Constant) -> Option<Self> {
        match constant {
            Constant::None => Some(ConstKey::None),
            Constant::Bool(b) => Some(ConstKey::Bool(*b)),
            Constant::Int(v) => Some(ConstKey::Int(*v)),
            Constant::Float(v) => Some(ConstKey::Float(OrderedFloat(*v))),
            Constant::Str(s) => Some(ConstKey::Str(s.clone())),
            Constant::Code(_) => None,
        }
    }
}

/// A first-seen-order string intern table.
#[derive(Debug, Clone)]
struct NameTable {
    values: Vec<String>,
    index: FxHashMap<String, u32>,
    what: &'static str,
}

impl NameTable {
    fn new(what: &'static str) -> Self {
        Self {
            values: Vec::new(),
            index: FxHashMap::default(),
            what,
        }
    }

    fn intern(&mut self, name: &str) -> Result<u32, CompileError> {
        if let Some(&idx) = self.index.get(name) {
            return Ok(idx);
        }
        if self.values.len() >= TABLE_LIMIT {
            return Err(CompileError::user(
                format!("too many {}", self.what),
                NO_LOCATION,
            ));
        }
        let idx = self.values.len() as u32;
        self.values.push(name.to_owned());
        self.index.insert(name.to_owned(), idx);
        Ok(idx)
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }
}

/// Symbol tables and signature metadata for one compilation unit.
#[derive(Debug, Clone)]
pub struct CodeUnitMetadata {
    /// Unqualified unit name.
    pub name: String,
    /// Dot-separated qualified name, computed lazily.
    qualname: Option<String>,
    consts: Vec<Constant>,
    const_index: FxHashMap<ConstKey, u32>,
    names: NameTable,
    varnames: NameTable,
    cellvars: NameTable,
    freevars: NameTable,
    /// Names temporarily treated as slot-addressed inside inlined
    /// constructs. Value false restores name addressing without forgetting
    /// the override existed.
    fast_hidden: FxHashMap<String, bool>,
    /// Total argument count.
    pub argcount: u32,
    /// Positional-only argument count.
    pub posonlyargcount: u32,
    /// Keyword-only argument count.
    pub kwonlyargcount: u32,
    /// The signature accepts a variable positional tail.
    pub has_varargs: bool,
    /// The signature accepts arbitrary keywords.
    pub has_varkeywords: bool,
    /// The unit is a function body rather than a module scope. Function
    /// units execute with slot-addressed locals in a fresh frame.
    pub is_function: bool,
    /// First source line of the unit.
    pub firstlineno: i32,
}

impl CodeUnitMetadata {
    /// Fresh metadata for a unit.
    pub fn new(name: impl Into<String>, firstlineno: i32) -> Self {
        Self {
            name: name.into(),
            qualname: None,
            consts: Vec::new(),
            const_index: FxHashMap::default(),
            names: NameTable::new("names"),
            varnames: NameTable::new("local variables"),
            cellvars: NameTable::new("cell variables"),
            freevars: NameTable::new("free variables"),
            fast_hidden: FxHashMap::default(),
            argcount: 0,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            has_varargs: false,
            has_varkeywords: false,
            is_function: false,
            firstlineno,
        }
    }

    /// Intern a constant, returning the existing index when an equal value
    /// is already pooled.
    pub fn intern_const(&mut self, constant: Constant) -> Result<u32, CompileError> {
        if let Some(key) = ConstKey::of(&constant)
            && let Some(&idx) = self.const_index.get(&key)
        {
            return Ok(idx);
        }
        if self.consts.len() >= TABLE_LIMIT {
            return Err(CompileError::user("too many constants", NO_LOCATION));
        }
        let idx = self.consts.len() as u32;
        if let Some(key) = ConstKey::of(&constant) {
            self.const_index.insert(key, idx);
        }
        self.consts.push(constant);
        Ok(idx)
    }

    /// Constant by index.
    pub fn const_at(&self, index: u32) -> Option<&Constant> {
        self.consts.get(index as usize)
    }

    /// The constant pool in assigned-index order.
    pub fn consts(&self) -> &[Constant] {
        &self.consts
    }

    /// Intern a name used by name-based opcodes.
    pub fn intern_name(&mut self, name: &str) -> Result<u32, CompileError> {
        self.names.intern(name)
    }

    /// Intern a local variable slot.
    pub fn intern_varname(&mut self, name: &str) -> Result<u32, CompileError> {
        self.varnames.intern(name)
    }

    /// Intern a cell variable slot.
    pub fn intern_cellvar(&mut self, name: &str) -> Result<u32, CompileError> {
        self.cellvars.intern(name)
    }

    /// Intern a free variable slot.
    pub fn intern_freevar(&mut self, name: &str) -> Result<u32, CompileError> {
        self.freevars.intern(name)
    }

    /// Slot of an already-interned local, if any.
    pub fn varname_slot(&self, name: &str) -> Option<u32> {
        self.varnames.lookup(name)
    }

    /// Names table in assigned-index order.
    pub fn names(&self) -> &[String] {
        &self.names.values
    }

    /// Local variable table in slot order.
    pub fn varnames(&self) -> &[String] {
        &self.varnames.values
    }

    /// Cell variable table in slot order.
    pub fn cellvars(&self) -> &[String] {
        &self.cellvars.values
    }

    /// Free variable table in slot order.
    pub fn freevars(&self) -> &[String] {
        &self.freevars.values
    }

    /// Combined local + cell + free slot count.
    pub fn nlocalsplus(&self) -> u32 {
        (self.varnames.values.len() + self.cellvars.values.len() + self.freevars.values.len())
            as u32
    }

    /// Mark a name as temporarily slot-addressed.
    pub fn set_fast_hidden(&mut self, name: &str, fast: bool) {
        self.fast_hidden.insert(name.to_owned(), fast);
    }

    /// Whether a name is currently under a fast-local override.
    pub fn is_fast_hidden(&self, name: &str) -> bool {
        self.fast_hidden.get(name).copied().unwrap_or(false)
    }

    /// Compute the qualified name from the enclosing unit's, once.
    pub fn qualname_for(&mut self, parent: Option<&str>) -> &str {
        if self.qualname.is_none() {
            self.qualname = Some(match parent {
                Some(parent) => format!("{parent}.{}", self.name),
                None => self.name.clone(),
            });
        }
        self.qualname.as_deref().unwrap()
    }

    /// The qualified name, falling back to the plain name if never
    /// computed.
    pub fn qualname(&self) -> &str {
        self.qualname.as_deref().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_interning_dedups_by_value() {
        let mut meta = CodeUnitMetadata::new("<module>", 1);
        let a = meta.intern_const(Constant::Float(3.14)).unwrap();
        let b = meta.intern_const(Constant::Float(3.14)).unwrap();
        let c = meta.intern_const(Constant::Float(2.71)).unwrap();

        assert_eq!(a, b);
        assert!(c > a);
        assert_eq!(meta.consts().len(), 2);
    }

    #[test]
    fn const_indices_are_first_seen_order() {
        let mut meta = CodeUnitMetadata::new("f", 1);
        assert_eq!(meta.intern_const(Constant::Int(10)).unwrap(), 0);
        assert_eq!(meta.intern_const(Constant::None).unwrap(), 1);
        assert_eq!(meta.intern_const(Constant::Int(10)).unwrap(), 0);
        assert_eq!(meta.intern_const(Constant::Int(11)).unwrap(), 2);
    }

    #[test]
    fn bool_and_int_do_not_share_slots() {
        let mut meta = CodeUnitMetadata::new("f", 1);
        let t = meta.intern_const(Constant::Bool(true)).unwrap();
        let one = meta.intern_const(Constant::Int(1)).unwrap();
        assert_ne!(t, one);
    }

    #[test]
    fn negative_zero_is_distinct_from_zero() {
        let mut meta = CodeUnitMetadata::new("f", 1);
        let pos = meta.intern_const(Constant::Float(0.0)).unwrap();
        let neg = meta.intern_const(Constant::Float(-0.0)).unwrap();
        assert_ne!(pos, neg);
    }

    #[test]
    fn name_tables_are_independent() {
        let mut meta = CodeUnitMetadata::new("f", 1);
        let n = meta.intern_name("x").unwrap();
        let v = meta.intern_varname("x").unwrap();
        assert_eq!(n, 0);
        assert_eq!(v, 0);
        assert_eq!(meta.names(), ["x"]);
        assert_eq!(meta.varnames(), ["x"]);
    }

    #[test]
    fn nlocalsplus_counts_all_variable_kinds() {
        let mut meta = CodeUnitMetadata::new("f", 1);
        meta.intern_varname("a").unwrap();
        meta.intern_varname("b").unwrap();
        meta.intern_cellvar("c").unwrap();
        meta.intern_freevar("d").unwrap();
        assert_eq!(meta.nlocalsplus(), 4);
    }

    #[test]
    fn fast_hidden_override_toggles() {
        let mut meta = CodeUnitMetadata::new("f", 1);
        assert!(!meta.is_fast_hidden("x"));
        meta.set_fast_hidden("x", true);
        assert!(meta.is_fast_hidden("x"));
        meta.set_fast_hidden("x", false);
        assert!(!meta.is_fast_hidden("x"));
    }

    #[test]
    fn qualname_is_lazy_and_stable() {
        let mut meta = CodeUnitMetadata::new("inner", 3);
        assert_eq!(meta.qualname(), "inner");
        assert_eq!(meta.qualname_for(Some("outer")), "outer.inner");
        // A second computation does not re-derive.
        assert_eq!(meta.qualname_for(Some("other")), "outer.inner");
    }

    #[test]
    fn table_limit_is_a_user_error() {
        let mut meta = CodeUnitMetadata::new("f", 1);
        for i in 0..TABLE_LIMIT {
            meta.intern_const(Constant::Int(i as i64)).unwrap();
        }
        let err = meta.intern_const(Constant::Int(-1)).unwrap_err();
        assert!(!err.is_internal());
    }
}
