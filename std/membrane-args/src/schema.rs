//!
//! Argument Schemas
//!
//! A `Schema` is the ordered slot list of one native function. Each slot has
//! a name, a semantic type and either `Required` or `Optional(default)`.
//! Schemas are checked once, when built:
//!
//! - slot names are non-empty and unique
//! - no required slot follows an optional one
//! - every default is compatible with its slot type
//!
//! `DefaultValue::NoValue` marks an optional slot that stays unset when not
//! supplied. It is distinct from `DefaultValue::None`, which binds the
//! runtime's `None`.
//!

use std::fmt;

use membrane_core::ValueType;
use thiserror::Error;

/// Native integer representation requested by an int slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    I32,
    I64,
    U32,
    U64,
}

impl IntWidth {
    pub fn name(self) -> &'static str {
        match self {
            IntWidth::I32 => "i32",
            IntWidth::I64 => "i64",
            IntWidth::U32 => "u32",
            IntWidth::U64 => "u64",
        }
    }

    pub fn fits(self, value: i128) -> bool {
        match self {
            IntWidth::I32 => i32::try_from(value).is_ok(),
            IntWidth::I64 => i64::try_from(value).is_ok(),
            IntWidth::U32 => u32::try_from(value).is_ok(),
            IntWidth::U64 => u64::try_from(value).is_ok(),
        }
    }
}

/// Container kinds accepted by exact-type slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    List,
    Dict,
    Set,
    Tuple,
}

impl ContainerKind {
    pub fn value_type(self) -> ValueType {
        match self {
            ContainerKind::List => ValueType::List,
            ContainerKind::Dict => ValueType::Dict,
            ContainerKind::Set => ValueType::Set,
            ContainerKind::Tuple => ValueType::Tuple,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotType {
    Int(IntWidth),
    /// Accepts float, int and bool
    Float,
    Text,
    Bytes,
    Bool,
    /// Any value, bound as an owned handle
    Object,
    /// Exactly this container kind, bound as an owned handle
    Exact(ContainerKind),
    /// An exact list whose every element checks against the element type
    ListOf(Box<SlotType>),
    /// A fixed-arity tuple unpacked element by element
    Tuple(Vec<SlotType>),
}

impl SlotType {
    pub fn list_of(element: SlotType) -> Self {
        SlotType::ListOf(Box::new(element))
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Int(_) => f.write_str("int"),
            SlotType::Float => f.write_str("float"),
            SlotType::Text => f.write_str("str"),
            SlotType::Bytes => f.write_str("bytes"),
            SlotType::Bool => f.write_str("bool"),
            SlotType::Object => f.write_str("object"),
            SlotType::Exact(kind) => write!(f, "{}", kind.value_type()),
            SlotType::ListOf(element) => write!(f, "list of {element}"),
            SlotType::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Leave the slot unset
    NoValue,
    /// The runtime `None`
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl DefaultValue {
    fn compatible_with(&self, ty: &SlotType) -> bool {
        match (self, ty) {
            (DefaultValue::NoValue | DefaultValue::None, _) => true,
            (_, SlotType::Object) => true,
            (DefaultValue::Bool(_), SlotType::Bool) => true,
            (DefaultValue::Int(i), SlotType::Int(width)) => width.fits(*i),
            (DefaultValue::Int(_) | DefaultValue::Float(_), SlotType::Float) => true,
            (DefaultValue::Text(_), SlotType::Text) => true,
            (DefaultValue::Bytes(_), SlotType::Bytes) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    Required,
    Optional(DefaultValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub name: String,
    pub ty: SlotType,
    pub requirement: Requirement,
}

impl Slot {
    pub fn is_required(&self) -> bool {
        matches!(self.requirement, Requirement::Required)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("{function}: slot {index} has an empty name")]
    EmptyName { function: String, index: usize },

    #[error("{function}: duplicate slot '{name}'")]
    DuplicateSlot { function: String, name: String },

    #[error("{function}: required slot '{name}' follows an optional slot")]
    RequiredAfterOptional { function: String, name: String },

    #[error("{function}: default for slot '{name}' is not a valid {ty}")]
    DefaultMismatch {
        function: String,
        name: String,
        ty: String,
    },
}

/// Validated slot list of one native function
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    function: String,
    slots: Vec<Slot>,
    keywords: bool,
}

impl Schema {
    pub fn builder(function: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            function: function.into(),
            slots: Vec::new(),
            keywords: false,
        }
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Whether arguments may be passed by name
    pub fn accepts_keywords(&self) -> bool {
        self.keywords
    }

    pub fn required_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_required()).count()
    }

    pub fn max_positional(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name == name)
    }
}

pub struct SchemaBuilder {
    function: String,
    slots: Vec<Slot>,
    keywords: bool,
}

impl SchemaBuilder {
    pub fn required(mut self, name: impl Into<String>, ty: SlotType) -> Self {
        self.slots.push(Slot {
            name: name.into(),
            ty,
            requirement: Requirement::Required,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, ty: SlotType, default: DefaultValue) -> Self {
        self.slots.push(Slot {
            name: name.into(),
            ty,
            requirement: Requirement::Optional(default),
        });
        self
    }

    /// Allow arguments to be passed by name.
    pub fn keywords(mut self, enabled: bool) -> Self {
        self.keywords = enabled;
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut seen_optional = false;
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.name.is_empty() {
                return Err(SchemaError::EmptyName {
                    function: self.function,
                    index,
                });
            }
            if self.slots[..index].iter().any(|earlier| earlier.name == slot.name) {
                return Err(SchemaError::DuplicateSlot {
                    function: self.function,
                    name: slot.name.clone(),
                });
            }
            match &slot.requirement {
                Requirement::Required if seen_optional => {
                    return Err(SchemaError::RequiredAfterOptional {
                        function: self.function,
                        name: slot.name.clone(),
                    });
                }
                Requirement::Required => {}
                Requirement::Optional(default) => {
                    seen_optional = true;
                    if !default.compatible_with(&slot.ty) {
                        return Err(SchemaError::DefaultMismatch {
                            function: self.function,
                            name: slot.name.clone(),
                            ty: slot.ty.to_string(),
                        });
                    }
                }
            }
        }

        Ok(Schema {
            function: self.function,
            slots: self.slots,
            keywords: self.keywords,
        })
    }
}
