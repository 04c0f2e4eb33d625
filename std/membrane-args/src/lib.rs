//!
//! membrane-args - Argument Marshaling
//!
//! Decodes the arguments of one native call against a declarative schema.
//! A `Schema` lists the slots of a function; an `ArgBundle` carries what the
//! caller supplied; `decode` checks one against the other and produces
//! `Bindings`, which convert into a Rust tuple:
//!
//! ```ignore
//! let schema = Schema::builder("typed_args")
//!     .required("i", SlotType::Int(IntWidth::I32))
//!     .required("d", SlotType::Float)
//!     .required("s", SlotType::Text)
//!     .build()?;
//! let (i, d, s): (i32, f64, String) = decode(held, &schema, &args)?.extract(held)?;
//! ```
//!
//! Decoding either binds every slot or raises exactly one error.
//!

pub mod schema;
pub mod bundle;
pub mod bindings;
pub mod decode;

pub use schema::*;
pub use bundle::*;
pub use bindings::*;
pub use decode::decode;
