//! # Program Counter → Function Lookup
//!
//! The only symbol question this crate asks is "which function contains this
//! pc?", and only for the blocked-thread heuristic. [`SymbolResolver`] is that
//! question; [`SymbolTable`] is a small answer built from an object file's
//! symbol table.
//!
//! Names are normalised once at load time:
//!
//! - Mach-O's leading `_` is stripped (`_runtime.kevent` → `runtime.kevent`)
//! - Rust symbols are demangled without the hash suffix

use std::collections::BTreeMap;

use object::{BinaryFormat, Object, ObjectSection, ObjectSymbol, SymbolKind};
use rustc_demangle::try_demangle;
use thiserror::Error;
use tracing::debug;

use crate::types::Address;

/// Function containing a program counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor
{
    /// Fully-qualified function name
    pub name: String,
    /// First instruction of the function (after slide)
    pub entry: Address,
    /// One past the last instruction, when the size or the enclosing section
    /// end is known
    pub end: Option<Address>,
}

/// Maps an instruction pointer to the enclosing function
pub trait SymbolResolver: Send + Sync
{
    /// The function containing `pc`, or `None` if no function is known to.
    fn resolve_function(&self, pc: Address) -> Option<FunctionDescriptor>;
}

/// Failure to build a [`SymbolTable`] from an object file
#[derive(Error, Debug)]
pub enum SymbolError
{
    /// The bytes are not a supported object file
    #[error("failed to parse object file: {0}")]
    Parse(#[from] object::Error),
}

/// Sorted table of function start addresses
#[derive(Debug, Clone, Default)]
pub struct SymbolTable
{
    functions: BTreeMap<u64, FunctionDescriptor>,
}

impl SymbolTable
{
    /// An empty table; every lookup misses.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Load every text symbol from a Mach-O or ELF image.
    ///
    /// `slide` is added to each symbol address (ASLR load bias).
    ///
    /// ## Errors
    ///
    /// `SymbolError::Parse` if `data` is not a supported object file.
    pub fn from_object_bytes(data: &[u8], slide: i64) -> Result<Self, SymbolError>
    {
        let file = object::File::parse(data)?;
        let strip_underscore = file.format() == BinaryFormat::MachO;
        let mut table = Self::new();

        for symbol in file.symbols() {
            if symbol.kind() != SymbolKind::Text || symbol.is_undefined() || symbol.address() == 0 {
                continue;
            }
            let Ok(raw) = symbol.name() else {
                continue;
            };
            let raw = if strip_underscore { raw.strip_prefix('_').unwrap_or(raw) } else { raw };
            let entry = symbol.address().wrapping_add_signed(slide);
            let size = match symbol.size() {
                // Sizeless: bound by the enclosing section so the last one in
                // the image does not cover every higher address.
                0 => symbol
                    .section_index()
                    .and_then(|index| file.section_by_index(index).ok())
                    .and_then(|section| section.address().checked_add(section.size()))
                    .and_then(|end| end.checked_sub(symbol.address()))
                    .filter(|size| *size > 0),
                size => Some(size),
            };
            table.insert(normalize_name(raw), Address::new(entry), size);
        }

        debug!(functions = table.len(), "loaded symbol table");
        Ok(table)
    }

    /// Add one function. A later insert at the same entry replaces the earlier one.
    pub fn insert(&mut self, name: impl Into<String>, entry: Address, size: Option<u64>)
    {
        let descriptor = FunctionDescriptor {
            name: name.into(),
            entry,
            end: size.and_then(|size| entry.checked_add(size)),
        };
        self.functions.insert(entry.value(), descriptor);
    }

    /// Number of functions in the table.
    pub fn len(&self) -> usize
    {
        self.functions.len()
    }

    /// Whether the table has no functions.
    pub fn is_empty(&self) -> bool
    {
        self.functions.is_empty()
    }
}

impl SymbolResolver for SymbolTable
{
    fn resolve_function(&self, pc: Address) -> Option<FunctionDescriptor>
    {
        let (_, candidate) = self.functions.range(..=pc.value()).next_back()?;
        let within = match candidate.end {
            Some(end) => pc < end,
            // Sizeless symbols extend up to the next symbol, never past the last.
            None => self.functions.range(pc.value().saturating_add(1)..).next().is_some(),
        };
        within.then(|| candidate.clone())
    }
}

fn normalize_name(raw: &str) -> String
{
    match try_demangle(raw) {
        Ok(demangled) => format!("{demangled:#}"),
        Err(_) => raw.to_string(),
    }
}
