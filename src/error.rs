//! Error types for relaxng-rs
//!
//! This module defines all error types used throughout the library, plus the
//! closed `ValidErr` code enumeration that classifies every way a document can
//! fail to match a grammar.

use std::fmt;
use thiserror::Error;

/// Result type alias using the relaxng Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for relaxng operations
#[derive(Error, Debug)]
pub enum Error {
    /// Document does not match the grammar
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Grammar parsing/compilation error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Resource loading error
    #[error("resource error: {0}")]
    Resource(String),

    /// Namespace error
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Name error (invalid XML name)
    #[error("name error: {0}")]
    Name(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the validation error code, if this error carries one
    pub fn code(&self) -> ValidErr {
        match self {
            Error::Validation(e) => e.code,
            Error::Parse(e) => e.code.unwrap_or(ValidErr::Ok),
            _ => ValidErr::Ok,
        }
    }
}

/// Codes classifying validation failures
///
/// `Ok` is the zero value; every other member is a distinct non-zero failure
/// kind. Codes cover structural mismatches, namespace mismatches, datatype and
/// value errors, identity errors and internal-consistency failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ValidErr {
    /// No error
    Ok = 0,
    /// Out of memory while validating
    Memory,
    /// Reference to an unknown datatype
    UnknownType,
    /// Value does not match its declared datatype
    TypeValue,
    /// Duplicate ID value in the document
    DuplicateId,
    /// Two values of a datatype failed to compare
    TypeCompare,
    /// Validation reached a state with no continuation
    NoState,
    /// Reference to an undefined pattern
    NoDefine,
    /// Extra token at the end of a list
    ListExtra,
    /// List value is empty where tokens are required
    ListEmpty,
    /// Interleave branch matched no data
    InterleaveNoData,
    /// Interleave branches could not be sequenced
    InterleaveSequence,
    /// Content left over after all interleave branches
    InterleaveExtra,
    /// Element name does not match the expected name
    ElementName,
    /// Attribute name does not match the expected name
    AttributeName,
    /// Element has no namespace where one is required
    ElementNoNamespace,
    /// Attribute has no namespace where one is required
    AttributeNoNamespace,
    /// Element namespace does not match
    ElementWrongNamespace,
    /// Attribute namespace does not match
    AttributeWrongNamespace,
    /// Element carries a namespace where none is allowed
    ElementExtraNamespace,
    /// Attribute carries a namespace where none is allowed
    AttributeExtraNamespace,
    /// Element should be empty but has content
    ElementNotEmpty,
    /// Expected an element, found none
    NoElement,
    /// Expected an element, found something else
    NotElement,
    /// Attribute failed to validate
    AttributeInvalid,
    /// Element content failed to validate
    ContentInvalid,
    /// Extra content at the end of an element
    ExtraContent,
    /// Attribute not allowed on this element
    InvalidAttribute,
    /// Element found where data was expected
    DataElement,
    /// Element found where a fixed value was expected
    ValueElement,
    /// Element found inside a list
    ListElement,
    /// Datatype library or type lookup failed
    UnknownDatatype,
    /// Value does not match the expected fixed value
    InvalidValue,
    /// List value failed to validate
    InvalidList,
    /// Grammar has no start pattern
    NoGrammar,
    /// Extra data at the end of the document
    ExtraData,
    /// Required data is missing
    MissingData,
    /// Internal consistency failure
    Internal,
    /// Wrong element at this position
    WrongElement,
    /// Text not allowed at this position
    WrongText,
}

impl ValidErr {
    /// Numeric code; zero means accept
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Check whether this code represents success
    pub fn is_ok(&self) -> bool {
        matches!(self, ValidErr::Ok)
    }

    /// Short mnemonic used in reports and JSON output
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidErr::Ok => "ok",
            ValidErr::Memory => "memory",
            ValidErr::UnknownType => "unknown-type",
            ValidErr::TypeValue => "type-value",
            ValidErr::DuplicateId => "duplicate-id",
            ValidErr::TypeCompare => "type-compare",
            ValidErr::NoState => "no-state",
            ValidErr::NoDefine => "no-define",
            ValidErr::ListExtra => "list-extra",
            ValidErr::ListEmpty => "list-empty",
            ValidErr::InterleaveNoData => "interleave-no-data",
            ValidErr::InterleaveSequence => "interleave-sequence",
            ValidErr::InterleaveExtra => "interleave-extra",
            ValidErr::ElementName => "element-name",
            ValidErr::AttributeName => "attribute-name",
            ValidErr::ElementNoNamespace => "element-no-namespace",
            ValidErr::AttributeNoNamespace => "attribute-no-namespace",
            ValidErr::ElementWrongNamespace => "element-wrong-namespace",
            ValidErr::AttributeWrongNamespace => "attribute-wrong-namespace",
            ValidErr::ElementExtraNamespace => "element-extra-namespace",
            ValidErr::AttributeExtraNamespace => "attribute-extra-namespace",
            ValidErr::ElementNotEmpty => "element-not-empty",
            ValidErr::NoElement => "no-element",
            ValidErr::NotElement => "not-element",
            ValidErr::AttributeInvalid => "attribute-invalid",
            ValidErr::ContentInvalid => "content-invalid",
            ValidErr::ExtraContent => "extra-content",
            ValidErr::InvalidAttribute => "invalid-attribute",
            ValidErr::DataElement => "data-element",
            ValidErr::ValueElement => "value-element",
            ValidErr::ListElement => "list-element",
            ValidErr::UnknownDatatype => "unknown-datatype",
            ValidErr::InvalidValue => "invalid-value",
            ValidErr::InvalidList => "invalid-list",
            ValidErr::NoGrammar => "no-grammar",
            ValidErr::ExtraData => "extra-data",
            ValidErr::MissingData => "missing-data",
            ValidErr::Internal => "internal",
            ValidErr::WrongElement => "wrong-element",
            ValidErr::WrongText => "wrong-text",
        }
    }

    /// All members of the enumeration, in declaration order
    pub fn all() -> &'static [ValidErr] {
        &[
            ValidErr::Ok,
            ValidErr::Memory,
            ValidErr::UnknownType,
            ValidErr::TypeValue,
            ValidErr::DuplicateId,
            ValidErr::TypeCompare,
            ValidErr::NoState,
            ValidErr::NoDefine,
            ValidErr::ListExtra,
            ValidErr::ListEmpty,
            ValidErr::InterleaveNoData,
            ValidErr::InterleaveSequence,
            ValidErr::InterleaveExtra,
            ValidErr::ElementName,
            ValidErr::AttributeName,
            ValidErr::ElementNoNamespace,
            ValidErr::AttributeNoNamespace,
            ValidErr::ElementWrongNamespace,
            ValidErr::AttributeWrongNamespace,
            ValidErr::ElementExtraNamespace,
            ValidErr::AttributeExtraNamespace,
            ValidErr::ElementNotEmpty,
            ValidErr::NoElement,
            ValidErr::NotElement,
            ValidErr::AttributeInvalid,
            ValidErr::ContentInvalid,
            ValidErr::ExtraContent,
            ValidErr::InvalidAttribute,
            ValidErr::DataElement,
            ValidErr::ValueElement,
            ValidErr::ListElement,
            ValidErr::UnknownDatatype,
            ValidErr::InvalidValue,
            ValidErr::InvalidList,
            ValidErr::NoGrammar,
            ValidErr::ExtraData,
            ValidErr::MissingData,
            ValidErr::Internal,
            ValidErr::WrongElement,
            ValidErr::WrongText,
        ]
    }
}

impl fmt::Display for ValidErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validation error with context
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Error message
    pub message: String,
    /// Error code classifying the failure
    pub code: ValidErr,
    /// Path to the element that failed validation
    pub path: Option<String>,
    /// Original failure reason
    pub reason: Option<String>,
    /// What the grammar expected at this point
    pub expected: Option<String>,
    /// What the document actually contained
    pub actual: Option<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: ValidErr::Internal,
            path: None,
            reason: None,
            expected: None,
            actual: None,
        }
    }

    /// Set the error code
    pub fn with_code(mut self, code: ValidErr) -> Self {
        self.code = code;
        self
    }

    /// Set the path where validation failed
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the expected content
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    /// Set the actual content
    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;

        if let Some(ref reason) = self.reason {
            write!(f, "\nReason: {}", reason)?;
        }

        if let Some(ref path) = self.path {
            write!(f, "\nPath: {}", path)?;
        }

        if let Some(ref expected) = self.expected {
            write!(f, "\nExpected: {}", expected)?;
        }

        if let Some(ref actual) = self.actual {
            write!(f, "\nActual: {}", actual)?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Grammar parsing/compilation error
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Error code, when the failure maps to a validation code
    pub code: Option<ValidErr>,
    /// Location in the grammar source
    pub location: Option<String>,
    /// Grammar fragment that caused the error
    pub source: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            location: None,
            source: None,
        }
    }

    /// Set the error code
    pub fn with_code(mut self, code: ValidErr) -> Self {
        self.code = Some(code);
        self
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(code) = self.code {
            write!(f, " ({})", code)?;
        }

        if let Some(ref loc) = self.location {
            write!(f, "\nLocation: {}", loc)?;
        }

        if let Some(ref src) = self.source {
            write!(f, "\nSource:\n{}", src)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}
