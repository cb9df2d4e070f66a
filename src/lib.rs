//! # relaxng
//!
//! A RelaxNG (XML syntax) schema compiler and validator.
//!
//! Grammars are compiled into an immutable [`RelaxNg`] schema; documents are
//! checked against it either wholesale or incrementally (push validation),
//! with every failure classified by a [`ValidErr`] code.
//!
//! ## Example
//!
//! ```rust
//! use relaxng::{Document, RelaxNg};
//!
//! let schema = RelaxNg::from_str(r#"
//!     <element name="greeting" xmlns="http://relaxng.org/ns/structure/1.0">
//!       <text/>
//!     </element>
//! "#).unwrap();
//!
//! let doc = Document::from_string("<greeting>hello</greeting>").unwrap();
//! assert!(schema.validate(&doc).is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;

pub mod locations;
pub mod names;
pub mod namespaces;

pub mod documents;
pub mod loaders;

pub mod validators;

pub use documents::Document;
pub use error::{Error, Result, ValidErr, ValidationError};
pub use validators::{cleanup_types, ErrorReporter, ParserCtxt, RelaxNg, ValidCtxt};

/// Version of the relaxng library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// RelaxNG grammar namespace
pub const RELAXNG_NAMESPACE: &str = "http://relaxng.org/ns/structure/1.0";

/// W3C XML Schema datatypes library namespace
pub const XSD_DATATYPES_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-datatypes";

/// XML namespace
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
