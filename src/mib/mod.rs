//! In-memory MIB registry.
//!
//! Holds every published object keyed by its OID in lexicographic order, so
//! `get` and `get_next` are plain ordered-map lookups. Tables and scalars are
//! defined once at startup; the publish loop then rewrites their contents.
//!
//! Table cells live at `<entry>.<column>.<row>`, scalars at `<object>.0`.

pub mod freenas;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

pub use freenas::{ArcScalars, DatasetRow, FreenasMib, L2ArcScalars, PoolRow, ZilScalars};

/// An object identifier as a list of arcs.
pub type Oid = Vec<u32>;

/// Parses dotted notation. A leading dot is optional.
pub fn parse_oid(text: &str) -> Result<Oid, MibError> {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('.').unwrap_or(trimmed);
    if body.is_empty() {
        return Err(MibError::InvalidOid(text.to_string()));
    }
    body.split('.')
        .map(|arc| {
            arc.parse::<u32>()
                .map_err(|_| MibError::InvalidOid(text.to_string()))
        })
        .collect()
}

/// Formats an OID in dotted notation with a leading dot.
pub fn format_oid(oid: &[u32]) -> String {
    let mut out = String::with_capacity(oid.len() * 4);
    for arc in oid {
        out.push('.');
        out.push_str(&arc.to_string());
    }
    out
}

/// SMI syntax of a published object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Integer32,
    Unsigned32,
    Counter32,
    Counter64,
    DisplayString,
}

impl ValueType {
    /// The value a freshly defined object holds before its first publish.
    pub fn zero(self) -> Value {
        match self {
            ValueType::Integer32 => Value::Integer32(0),
            ValueType::Unsigned32 => Value::Unsigned32(0),
            ValueType::Counter32 => Value::Counter32(0),
            ValueType::Counter64 => Value::Counter64(0),
            ValueType::DisplayString => Value::DisplayString(String::new()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Integer32 => "Integer32",
            ValueType::Unsigned32 => "Unsigned32",
            ValueType::Counter32 => "Counter32",
            ValueType::Counter64 => "Counter64",
            ValueType::DisplayString => "DisplayString",
        };
        f.write_str(name)
    }
}

/// A typed object value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer32(i32),
    /// Published as a Gauge32.
    Unsigned32(u32),
    Counter32(u32),
    Counter64(u64),
    DisplayString(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Integer32(_) => ValueType::Integer32,
            Value::Unsigned32(_) => ValueType::Unsigned32,
            Value::Counter32(_) => ValueType::Counter32,
            Value::Counter64(_) => ValueType::Counter64,
            Value::DisplayString(_) => ValueType::DisplayString,
        }
    }
}

/// Renders the bare value; strings are printed verbatim.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer32(v) => write!(f, "{}", v),
            Value::Unsigned32(v) | Value::Counter32(v) => write!(f, "{}", v),
            Value::Counter64(v) => write!(f, "{}", v),
            Value::DisplayString(s) => f.write_str(s),
        }
    }
}

/// Error type for registry misuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MibError {
    /// Text that is not a dotted OID.
    InvalidOid(String),
    /// A definition whose OID range overlaps an existing one.
    Overlap { name: String, oid: String },
    /// A value of the wrong type for its object.
    TypeMismatch {
        oid: String,
        expected: ValueType,
        found: ValueType,
    },
    /// A row with the wrong number of cells.
    RowArity {
        table: String,
        expected: usize,
        found: usize,
    },
    /// A handle that does not belong to this registry.
    UnknownHandle,
}

impl fmt::Display for MibError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MibError::InvalidOid(text) => write!(f, "invalid OID '{}'", text),
            MibError::Overlap { name, oid } => {
                write!(f, "{} at {} overlaps an existing definition", name, oid)
            }
            MibError::TypeMismatch {
                oid,
                expected,
                found,
            } => write!(f, "{} expects {}, got {}", oid, expected, found),
            MibError::RowArity {
                table,
                expected,
                found,
            } => write!(f, "{} row needs {} cells, got {}", table, expected, found),
            MibError::UnknownHandle => write!(f, "handle from another registry"),
        }
    }
}

impl std::error::Error for MibError {}

/// Handle to a table defined in a [`Mib`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableId(usize);

/// Handle to a scalar defined in a [`Mib`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarId(usize);

#[derive(Debug)]
struct TableDef {
    name: String,
    entry: Oid,
    /// `(column number, syntax)` in column order.
    columns: Vec<(u32, ValueType)>,
    rows: u32,
}

impl TableDef {
    fn cell_oid(&self, column: u32, row: u32) -> Oid {
        let mut oid = self.entry.clone();
        oid.push(column);
        oid.push(row);
        oid
    }
}

#[derive(Debug)]
struct ScalarDef {
    instance: Oid,
    value_type: ValueType,
}

fn is_prefix(prefix: &[u32], oid: &[u32]) -> bool {
    oid.len() >= prefix.len() && oid[..prefix.len()] == *prefix
}

/// Ordered OID → value store with table and scalar bookkeeping.
#[derive(Debug, Default)]
pub struct Mib {
    objects: BTreeMap<Oid, Value>,
    tables: Vec<TableDef>,
    scalars: Vec<ScalarDef>,
}

impl Mib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that `oid` neither contains nor lies inside another definition.
    fn check_free(&self, name: &str, oid: &[u32]) -> Result<(), MibError> {
        let taken = self
            .tables
            .iter()
            .map(|t| t.entry.as_slice())
            .chain(self.scalars.iter().map(|s| s.instance.as_slice()))
            .any(|other| is_prefix(other, oid) || is_prefix(oid, other));
        if taken {
            return Err(MibError::Overlap {
                name: name.to_string(),
                oid: format_oid(oid),
            });
        }
        Ok(())
    }

    /// Defines an empty table whose conceptual row is `entry`.
    pub fn define_table(
        &mut self,
        name: &str,
        entry: Oid,
        columns: &[(u32, ValueType)],
    ) -> Result<TableId, MibError> {
        self.check_free(name, &entry)?;
        self.tables.push(TableDef {
            name: name.to_string(),
            entry,
            columns: columns.to_vec(),
            rows: 0,
        });
        Ok(TableId(self.tables.len() - 1))
    }

    /// Defines a scalar object; its instance `<object>.0` starts at zero.
    pub fn define_scalar(
        &mut self,
        name: &str,
        object: Oid,
        value_type: ValueType,
    ) -> Result<ScalarId, MibError> {
        let mut instance = object;
        instance.push(0);
        self.check_free(name, &instance)?;
        self.objects.insert(instance.clone(), value_type.zero());
        self.scalars.push(ScalarDef {
            instance,
            value_type,
        });
        Ok(ScalarId(self.scalars.len() - 1))
    }

    fn table(&self, id: TableId) -> Result<&TableDef, MibError> {
        self.tables.get(id.0).ok_or(MibError::UnknownHandle)
    }

    /// Removes every row of a table.
    pub fn clear_table(&mut self, id: TableId) -> Result<(), MibError> {
        let table = self.tables.get_mut(id.0).ok_or(MibError::UnknownHandle)?;
        let entry = &table.entry;
        self.objects.retain(|oid, _| !is_prefix(entry, oid));
        table.rows = 0;
        Ok(())
    }

    /// Appends a row; `cells` follow the table's column order.
    ///
    /// Returns the new row's index (0-based, in insertion order).
    pub fn add_row(&mut self, id: TableId, cells: Vec<Value>) -> Result<u32, MibError> {
        let table = self.table(id)?;
        if cells.len() != table.columns.len() {
            return Err(MibError::RowArity {
                table: table.name.clone(),
                expected: table.columns.len(),
                found: cells.len(),
            });
        }

        let row = table.rows;
        let mut staged = Vec::with_capacity(cells.len());
        for (&(column, expected), value) in table.columns.iter().zip(cells) {
            let oid = table.cell_oid(column, row);
            if value.value_type() != expected {
                return Err(MibError::TypeMismatch {
                    oid: format_oid(&oid),
                    expected,
                    found: value.value_type(),
                });
            }
            staged.push((oid, value));
        }

        self.objects.extend(staged);
        self.tables[id.0].rows += 1;
        Ok(row)
    }

    pub fn row_count(&self, id: TableId) -> Result<u32, MibError> {
        Ok(self.table(id)?.rows)
    }

    /// Replaces the value of a scalar.
    pub fn update_scalar(&mut self, id: ScalarId, value: Value) -> Result<(), MibError> {
        let scalar = self.scalars.get(id.0).ok_or(MibError::UnknownHandle)?;
        if value.value_type() != scalar.value_type {
            return Err(MibError::TypeMismatch {
                oid: format_oid(&scalar.instance),
                expected: scalar.value_type,
                found: value.value_type(),
            });
        }
        self.objects.insert(scalar.instance.clone(), value);
        Ok(())
    }

    /// Exact lookup of an instance.
    pub fn get(&self, oid: &[u32]) -> Option<&Value> {
        self.objects.get(oid)
    }

    /// The first instance strictly after `oid` in lexicographic order.
    pub fn get_next(&self, oid: &[u32]) -> Option<(&Oid, &Value)> {
        self.objects
            .range::<[u32], _>((Bound::Excluded(oid), Bound::Unbounded))
            .next()
    }

    /// Every instance in walk order.
    pub fn walk(&self) -> impl Iterator<Item = (&Oid, &Value)> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
