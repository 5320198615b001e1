//! Schema model for protocol types.
//!
//! Named types (records, errors, enums, fixed) live once in a [`NamedTypes`]
//! table owned by the protocol. Every other use of a named type is a
//! [`Schema::Ref`] resolved through that table, which is what allows a record
//! to refer to itself.

mod parser;
mod validate;

pub(crate) use parser::{SchemaParser, validate_simple_name};
pub(crate) use validate::select_branch;
pub use validate::validate;

use indexmap::IndexMap;
use std::fmt;

/// A type as used by fields, parameters, responses, items and branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    /// `null`.
    Null,
    /// `boolean`.
    Boolean,
    /// `int`.
    Int,
    /// `long`.
    Long,
    /// `float`.
    Float,
    /// `double`.
    Double,
    /// `bytes`.
    Bytes,
    /// `string`.
    String,
    /// `array` of items.
    Array(Box<Schema>),
    /// `map` of string keys to values.
    Map(Box<Schema>),
    /// Union of branches, in declaration order.
    Union(Vec<Schema>),
    /// Reference to a named type by full name.
    Ref(Name),
}

impl Schema {
    /// Parse a primitive type name.
    pub fn primitive(name: &str) -> Option<Self> {
        Some(match name {
            "null" => Self::Null,
            "boolean" => Self::Boolean,
            "int" => Self::Int,
            "long" => Self::Long,
            "float" => Self::Float,
            "double" => Self::Double,
            "bytes" => Self::Bytes,
            "string" => Self::String,
            _ => return None,
        })
    }

    /// Key used to detect duplicate union branches.
    pub(crate) fn branch_key(&self) -> String {
        match self {
            Self::Array(_) => "array".to_string(),
            Self::Map(_) => "map".to_string(),
            Self::Union(_) => "union".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean => f.write_str("boolean"),
            Self::Int => f.write_str("int"),
            Self::Long => f.write_str("long"),
            Self::Float => f.write_str("float"),
            Self::Double => f.write_str("double"),
            Self::Bytes => f.write_str("bytes"),
            Self::String => f.write_str("string"),
            Self::Array(items) => write!(f, "array<{items}>"),
            Self::Map(values) => write!(f, "map<{values}>"),
            Self::Union(branches) => {
                f.write_str("[")?;
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{branch}")?;
                }
                f.write_str("]")
            }
            Self::Ref(name) => write!(f, "{name}"),
        }
    }
}

/// A possibly namespaced type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    /// Simple name.
    pub name: String,
    /// Namespace, if any.
    pub namespace: Option<String>,
}

impl Name {
    /// Resolve a declared or referenced name against a namespace.
    ///
    /// A dotted name carries its own namespace and ignores `namespace`.
    pub fn new(name: &str, namespace: Option<&str>) -> Self {
        match name.rsplit_once('.') {
            Some((ns, simple)) => Self {
                name: simple.to_string(),
                namespace: Some(ns.to_string()),
            },
            None => Self {
                name: name.to_string(),
                namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            },
        }
    }

    /// The dotted full name.
    pub fn fullname(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A record or request field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Field type.
    pub schema: Schema,
    /// Default value as written in the schema.
    pub default: Option<serde_json::Value>,
    /// Documentation.
    pub doc: Option<String>,
}

/// A record or error type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    /// Type name.
    pub name: Name,
    /// Fields in declaration order.
    pub fields: Vec<Field>,
    /// Declared as `error` rather than `record`.
    pub is_error: bool,
    /// Documentation.
    pub doc: Option<String>,
}

/// An enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumSchema {
    /// Type name.
    pub name: Name,
    /// Symbols in declaration order.
    pub symbols: Vec<String>,
    /// Documentation.
    pub doc: Option<String>,
}

/// A fixed-size bytes type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedSchema {
    /// Type name.
    pub name: Name,
    /// Size in bytes.
    pub size: usize,
}

/// A named type definition.
#[derive(Debug, Clone, PartialEq)]
pub enum NamedSchema {
    /// `record` or `error`.
    Record(RecordSchema),
    /// `enum`.
    Enum(EnumSchema),
    /// `fixed`.
    Fixed(FixedSchema),
}

impl NamedSchema {
    /// The type name.
    pub const fn name(&self) -> &Name {
        match self {
            Self::Record(r) => &r.name,
            Self::Enum(e) => &e.name,
            Self::Fixed(f) => &f.name,
        }
    }

    /// Whether this is an error record.
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Record(RecordSchema { is_error: true, .. }))
    }
}

/// Named types of a protocol, keyed by full name in definition order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedTypes {
    types: IndexMap<String, NamedSchema>,
}

impl NamedTypes {
    /// Look up a type by full name.
    pub fn get(&self, fullname: &str) -> Option<&NamedSchema> {
        self.types.get(fullname)
    }

    /// Resolve a reference.
    pub fn resolve(&self, name: &Name) -> Option<&NamedSchema> {
        self.types.get(&name.fullname())
    }

    /// Iterate over the types in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &NamedSchema> {
        self.types.values()
    }

    /// Number of named types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether there are no named types.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub(crate) fn contains(&self, fullname: &str) -> bool {
        self.types.contains_key(fullname)
    }

    pub(crate) fn insert(&mut self, schema: NamedSchema) {
        self.types.insert(schema.name().fullname(), schema);
    }
}
