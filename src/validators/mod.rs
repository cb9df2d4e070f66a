//! RelaxNG validators
//!
//! This module contains the compilation and validation pipeline: name classes
//! and patterns (the compiled grammar representation), the datatype library
//! registry, grammar parsing, and derivative-based validation.

pub mod datatypes;
pub mod derivatives;
pub mod name_classes;
pub mod parsing;
pub mod patterns;
pub mod schemas;
pub mod validation;

pub use datatypes::{cleanup_types, register_library, DatatypeLibrary};
pub use name_classes::NameClass;
pub use parsing::ParserCtxt;
pub use patterns::Pattern;
pub use schemas::RelaxNg;
pub use validation::{ErrorReporter, ValidCtxt};
