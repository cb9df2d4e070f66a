//! Datatype library dispatch
//!
//! RelaxNG `data` and `value` patterns name a datatype inside a datatype
//! library, identified by URI. Two libraries ship with the crate: the builtin
//! RelaxNG library (`string` and `token`, URI "") and a subset of the W3C XML
//! Schema datatypes library. Additional libraries can be registered process
//! wide; `cleanup_types` releases every process-wide cached resource.

use base64::Engine;
use lazy_static::lazy_static;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};

use super::patterns::Param;
use crate::names::{is_valid_ncname, is_valid_qname};

/// URI of the builtin RelaxNG datatype library
pub const BUILTIN_LIBRARY: &str = "";

/// URI of the W3C XML Schema datatypes library
pub const XSD_DATATYPES_LIBRARY: &str = "http://www.w3.org/2001/XMLSchema-datatypes";

/// Prefix binding in scope where a value was written
pub type Bindings = [(String, String)];

/// A datatype library: checks values against named types and compares them
pub trait DatatypeLibrary: Send + Sync {
    /// Check whether the library defines a type of this name
    fn has_type(&self, name: &str) -> bool;

    /// Check a value against a type and its parameters
    fn allows(
        &self,
        name: &str,
        params: &[Param],
        value: &str,
        context: &Bindings,
    ) -> std::result::Result<(), String>;

    /// Compare a grammar-supplied value with a document value
    fn equal(
        &self,
        name: &str,
        expected: &str,
        expected_context: &Bindings,
        actual: &str,
        actual_context: &Bindings,
    ) -> bool;

    /// Whether values of this type are document-unique identifiers
    fn is_id_type(&self, _name: &str) -> bool {
        false
    }
}

/// Collapse leading/trailing whitespace and internal runs to single spaces
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Builtin RelaxNG library: string and token
// ---------------------------------------------------------------------------

/// The builtin RelaxNG datatype library (`string`, `token`)
#[derive(Debug, Default)]
pub struct BuiltinLibrary;

impl DatatypeLibrary for BuiltinLibrary {
    fn has_type(&self, name: &str) -> bool {
        matches!(name, "string" | "token")
    }

    fn allows(
        &self,
        name: &str,
        params: &[Param],
        _value: &str,
        _context: &Bindings,
    ) -> std::result::Result<(), String> {
        if !self.has_type(name) {
            return Err(format!("unknown builtin datatype '{}'", name));
        }
        if !params.is_empty() {
            return Err(format!("builtin datatype '{}' takes no parameters", name));
        }
        Ok(())
    }

    fn equal(
        &self,
        name: &str,
        expected: &str,
        _expected_context: &Bindings,
        actual: &str,
        _actual_context: &Bindings,
    ) -> bool {
        match name {
            "string" => expected == actual,
            "token" => normalize_whitespace(expected) == normalize_whitespace(actual),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// XSD datatypes library
// ---------------------------------------------------------------------------

lazy_static! {
    /// Types compared with literal (non-collapsed) equality
    static ref LITERAL_TYPES: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("string");
        s.insert("normalizedString");
        s
    };

    /// Types whose values are compared numerically
    static ref NUMERIC_TYPES: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("decimal");
        s.insert("integer");
        s.insert("long");
        s.insert("int");
        s.insert("short");
        s.insert("byte");
        s.insert("nonNegativeInteger");
        s.insert("positiveInteger");
        s.insert("nonPositiveInteger");
        s.insert("negativeInteger");
        s.insert("unsignedLong");
        s.insert("unsignedInt");
        s.insert("unsignedShort");
        s.insert("unsignedByte");
        s
    };

    static ref LANGUAGE_RE: Regex =
        Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").expect("language pattern is valid");

    static ref NMTOKEN_RE: Regex =
        Regex::new(r"^[A-Za-z0-9\u{C0}-\u{2FF}\u{370}-\u{1FFF}_\-\.:\u{B7}]+$")
            .expect("NMTOKEN pattern is valid");

    static ref DURATION_RE: Regex = Regex::new(
        r"^-?P(?:\d+Y)?(?:\d+M)?(?:\d+D)?(?:T(?:\d+H)?(?:\d+M)?(?:\d+(?:\.\d+)?S)?)?$"
    )
    .expect("duration pattern is valid");

    static ref HEX_BINARY_RE: Regex =
        Regex::new(r"^(?:[0-9a-fA-F]{2})*$").expect("hexBinary pattern is valid");
}

/// A subset of the W3C XML Schema datatypes library
#[derive(Debug, Default)]
pub struct XsdLibrary;

const XSD_TYPES: &[&str] = &[
    "string",
    "normalizedString",
    "token",
    "language",
    "Name",
    "NCName",
    "NMTOKEN",
    "ID",
    "IDREF",
    "ENTITY",
    "boolean",
    "decimal",
    "integer",
    "long",
    "int",
    "short",
    "byte",
    "nonNegativeInteger",
    "positiveInteger",
    "nonPositiveInteger",
    "negativeInteger",
    "unsignedLong",
    "unsignedInt",
    "unsignedShort",
    "unsignedByte",
    "float",
    "double",
    "duration",
    "dateTime",
    "date",
    "time",
    "hexBinary",
    "base64Binary",
    "anyURI",
    "QName",
];

impl XsdLibrary {
    /// Check the lexical space of a type, ignoring parameters
    fn check_lexical(
        &self,
        name: &str,
        value: &str,
        context: &Bindings,
    ) -> std::result::Result<(), String> {
        let v = if LITERAL_TYPES.contains(name) {
            value.to_string()
        } else {
            normalize_whitespace(value)
        };
        let v = v.as_str();

        match name {
            "string" | "normalizedString" | "token" => Ok(()),
            "language" => check_regex(&LANGUAGE_RE, v, name),
            "Name" => {
                if is_valid_qname(v) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not a valid Name", v))
                }
            }
            "NCName" | "ID" | "IDREF" | "ENTITY" => {
                if is_valid_ncname(v) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not a valid NCName", v))
                }
            }
            "NMTOKEN" => check_regex(&NMTOKEN_RE, v, name),
            "boolean" => match v {
                "true" | "false" | "1" | "0" => Ok(()),
                _ => Err(format!("'{}' is not a valid boolean", v)),
            },
            "decimal" => Decimal::from_str(v)
                .map(|_| ())
                .map_err(|_| format!("'{}' is not a valid decimal", v)),
            "integer" => parse_big_int(v).map(|_| ()),
            "long" => check_int_range(v, i64::MIN as i128, i64::MAX as i128, name),
            "int" => check_int_range(v, i32::MIN as i128, i32::MAX as i128, name),
            "short" => check_int_range(v, i16::MIN as i128, i16::MAX as i128, name),
            "byte" => check_int_range(v, i8::MIN as i128, i8::MAX as i128, name),
            "nonNegativeInteger" => check_int_range(v, 0, i128::MAX, name),
            "positiveInteger" => check_int_range(v, 1, i128::MAX, name),
            "nonPositiveInteger" => check_int_range(v, i128::MIN, 0, name),
            "negativeInteger" => check_int_range(v, i128::MIN, -1, name),
            "unsignedLong" => check_int_range(v, 0, u64::MAX as i128, name),
            "unsignedInt" => check_int_range(v, 0, u32::MAX as i128, name),
            "unsignedShort" => check_int_range(v, 0, u16::MAX as i128, name),
            "unsignedByte" => check_int_range(v, 0, u8::MAX as i128, name),
            "float" | "double" => parse_xsd_float(v).map(|_| ()),
            "duration" => {
                if v.len() > 1 && v.contains('P') && DURATION_RE.is_match(v) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not a valid duration", v))
                }
            }
            "dateTime" => parse_date_time(v).map(|_| ()),
            "date" => chrono::NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .map(|_| ())
                .map_err(|_| format!("'{}' is not a valid date", v)),
            "time" => chrono::NaiveTime::parse_from_str(v, "%H:%M:%S%.f")
                .map(|_| ())
                .map_err(|_| format!("'{}' is not a valid time", v)),
            "hexBinary" => check_regex(&HEX_BINARY_RE, v, name),
            "base64Binary" => {
                let compact: String = v.chars().filter(|c| !c.is_whitespace()).collect();
                base64::engine::general_purpose::STANDARD
                    .decode(compact.as_bytes())
                    .map(|_| ())
                    .map_err(|_| format!("'{}' is not valid base64Binary", v))
            }
            "anyURI" => {
                // Absolute URIs must parse; relative references are accepted
                // as long as they contain no whitespace or angle brackets
                if url::Url::parse(v).is_ok()
                    || !v.chars().any(|c| c.is_whitespace() || c == '<' || c == '>')
                {
                    Ok(())
                } else {
                    Err(format!("'{}' is not a valid anyURI", v))
                }
            }
            "QName" => {
                if !is_valid_qname(v) {
                    return Err(format!("'{}' is not a valid QName", v));
                }
                if let Some((prefix, _)) = v.split_once(':') {
                    if !context.iter().any(|(p, _)| p == prefix) {
                        return Err(format!("undeclared QName prefix '{}'", prefix));
                    }
                }
                Ok(())
            }
            other => Err(format!("unknown XSD datatype '{}'", other)),
        }
    }

    /// Apply facet parameters after the lexical check
    fn check_params(
        &self,
        name: &str,
        params: &[Param],
        value: &str,
    ) -> std::result::Result<(), String> {
        let v = if LITERAL_TYPES.contains(name) {
            value.to_string()
        } else {
            normalize_whitespace(value)
        };
        let v = v.as_str();

        for (param, arg) in params {
            match param.as_str() {
                "length" => {
                    let expected: usize = parse_param_usize(param, arg)?;
                    if value_length(name, v) != expected {
                        return Err(format!("length of '{}' is not {}", v, expected));
                    }
                }
                "minLength" => {
                    let min: usize = parse_param_usize(param, arg)?;
                    if value_length(name, v) < min {
                        return Err(format!("'{}' is shorter than {}", v, min));
                    }
                }
                "maxLength" => {
                    let max: usize = parse_param_usize(param, arg)?;
                    if value_length(name, v) > max {
                        return Err(format!("'{}' is longer than {}", v, max));
                    }
                }
                "pattern" => {
                    let re = cached_regex(arg)?;
                    if !re.is_match(v) {
                        return Err(format!("'{}' does not match pattern '{}'", v, arg));
                    }
                }
                "minInclusive" => check_bound(name, v, arg, |ord| ord >= 0, "minInclusive")?,
                "maxInclusive" => check_bound(name, v, arg, |ord| ord <= 0, "maxInclusive")?,
                "minExclusive" => check_bound(name, v, arg, |ord| ord > 0, "minExclusive")?,
                "maxExclusive" => check_bound(name, v, arg, |ord| ord < 0, "maxExclusive")?,
                other => return Err(format!("unsupported parameter '{}'", other)),
            }
        }
        Ok(())
    }
}

impl DatatypeLibrary for XsdLibrary {
    fn has_type(&self, name: &str) -> bool {
        XSD_TYPES.contains(&name)
    }

    fn allows(
        &self,
        name: &str,
        params: &[Param],
        value: &str,
        context: &Bindings,
    ) -> std::result::Result<(), String> {
        self.check_lexical(name, value, context)?;
        self.check_params(name, params, value)
    }

    fn equal(
        &self,
        name: &str,
        expected: &str,
        expected_context: &Bindings,
        actual: &str,
        actual_context: &Bindings,
    ) -> bool {
        if LITERAL_TYPES.contains(name) {
            return expected == actual;
        }

        let e = normalize_whitespace(expected);
        let a = normalize_whitespace(actual);

        if NUMERIC_TYPES.contains(name) {
            return match (Decimal::from_str(&e), Decimal::from_str(&a)) {
                (Ok(x), Ok(y)) => x == y,
                _ => false,
            };
        }

        match name {
            "boolean" => canonical_boolean(&e) == canonical_boolean(&a),
            "float" | "double" => match (parse_xsd_float(&e), parse_xsd_float(&a)) {
                (Ok(x), Ok(y)) => x == y || (x.is_nan() && y.is_nan()),
                _ => false,
            },
            "hexBinary" => e.eq_ignore_ascii_case(&a),
            "base64Binary" => {
                let engine = &base64::engine::general_purpose::STANDARD;
                match (engine.decode(e.as_bytes()), engine.decode(a.as_bytes())) {
                    (Ok(x), Ok(y)) => x == y,
                    _ => false,
                }
            }
            "QName" => {
                let ex = resolve_qname(&e, expected_context);
                let ac = resolve_qname(&a, actual_context);
                match (ex, ac) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                }
            }
            _ => e == a,
        }
    }

    fn is_id_type(&self, name: &str) -> bool {
        name == "ID"
    }
}

fn check_regex(re: &Regex, value: &str, name: &str) -> std::result::Result<(), String> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid {}", value, name))
    }
}

fn parse_big_int(v: &str) -> std::result::Result<i128, String> {
    let trimmed = v.strip_prefix('+').unwrap_or(v);
    trimmed
        .parse::<i128>()
        .map_err(|_| format!("'{}' is not a valid integer", v))
}

fn check_int_range(
    v: &str,
    min: i128,
    max: i128,
    name: &str,
) -> std::result::Result<(), String> {
    let n = parse_big_int(v)?;
    if n < min || n > max {
        Err(format!("'{}' is out of range for {}", v, name))
    } else {
        Ok(())
    }
}

fn parse_xsd_float(v: &str) -> std::result::Result<f64, String> {
    match v {
        "INF" => Ok(f64::INFINITY),
        "-INF" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        _ => v
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a valid float", v)),
    }
}

fn parse_date_time(v: &str) -> std::result::Result<(), String> {
    if chrono::DateTime::parse_from_rfc3339(v).is_ok() {
        return Ok(());
    }
    chrono::NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|_| ())
        .map_err(|_| format!("'{}' is not a valid dateTime", v))
}

fn canonical_boolean(v: &str) -> Option<bool> {
    match v {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_param_usize(param: &str, arg: &str) -> std::result::Result<usize, String> {
    arg.trim()
        .parse::<usize>()
        .map_err(|_| format!("invalid value '{}' for parameter '{}'", arg, param))
}

/// Length of a value for the length facets: bytes for binary types,
/// characters otherwise
fn value_length(name: &str, v: &str) -> usize {
    match name {
        "hexBinary" => v.len() / 2,
        "base64Binary" => base64::engine::general_purpose::STANDARD
            .decode(v.as_bytes())
            .map(|b| b.len())
            .unwrap_or(0),
        _ => v.chars().count(),
    }
}

/// Compare a value against a range bound, numerically where the type allows
fn check_bound(
    name: &str,
    value: &str,
    bound: &str,
    accept: impl Fn(i8) -> bool,
    facet: &str,
) -> std::result::Result<(), String> {
    let ord = if NUMERIC_TYPES.contains(name) {
        let x = Decimal::from_str(value)
            .map_err(|_| format!("'{}' is not comparable for {}", value, facet))?;
        let y = Decimal::from_str(bound.trim())
            .map_err(|_| format!("invalid {} bound '{}'", facet, bound))?;
        match x.cmp(&y) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }
    } else if matches!(name, "float" | "double") {
        let x = parse_xsd_float(value)?;
        let y = parse_xsd_float(bound.trim())?;
        if x < y {
            -1
        } else if x > y {
            1
        } else {
            0
        }
    } else {
        // Fall back to lexical ordering for dates and strings
        match value.cmp(bound.trim()) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }
    };

    if accept(ord) {
        Ok(())
    } else {
        Err(format!("'{}' violates {} {}", value, facet, bound))
    }
}

fn resolve_qname(v: &str, context: &Bindings) -> Option<(String, String)> {
    match v.split_once(':') {
        Some((prefix, local)) => context
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, ns)| (ns.clone(), local.to_string())),
        None => Some((String::new(), v.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Process-wide registry and caches
// ---------------------------------------------------------------------------

type Registry = HashMap<String, Arc<dyn DatatypeLibrary>>;

fn default_registry() -> Registry {
    let mut map: Registry = HashMap::new();
    map.insert(BUILTIN_LIBRARY.to_string(), Arc::new(BuiltinLibrary));
    map.insert(XSD_DATATYPES_LIBRARY.to_string(), Arc::new(XsdLibrary));
    map
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(default_registry()));

static REGEX_CACHE: Lazy<Mutex<HashMap<String, Regex>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Look up a datatype library by URI
pub fn lookup_library(uri: &str) -> Option<Arc<dyn DatatypeLibrary>> {
    REGISTRY.read().ok()?.get(uri).cloned()
}

/// Register a datatype library under a URI, replacing any existing one
pub fn register_library(uri: impl Into<String>, library: Arc<dyn DatatypeLibrary>) {
    if let Ok(mut registry) = REGISTRY.write() {
        registry.insert(uri.into(), library);
    }
}

/// Fetch a compiled regex for a pattern facet, compiling and caching on first use
///
/// Pattern facets are implicitly anchored to the whole value.
pub fn cached_regex(pattern: &str) -> std::result::Result<Regex, String> {
    let anchored = format!("^(?:{})$", pattern);

    if let Ok(cache) = REGEX_CACHE.lock() {
        if let Some(re) = cache.get(&anchored) {
            return Ok(re.clone());
        }
    }

    let re = Regex::new(&anchored).map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;

    if let Ok(mut cache) = REGEX_CACHE.lock() {
        cache.insert(anchored, re.clone());
    }

    Ok(re)
}

/// Release process-wide cached datatype resources
///
/// Resets the library registry to the shipped defaults and drops every cached
/// compiled regex. Intended to be called once at process shutdown; calling it
/// earlier is safe, later lookups simply repopulate the caches.
pub fn cleanup_types() {
    if let Ok(mut registry) = REGISTRY.write() {
        *registry = default_registry();
    }
    if let Ok(mut cache) = REGEX_CACHE.lock() {
        cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_ctx() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a  b \n c "), "a b c");
        assert_eq!(normalize_whitespace("abc"), "abc");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn test_builtin_string_vs_token_equality() {
        let lib = BuiltinLibrary;
        assert!(lib.equal("string", "a b", &no_ctx(), "a b", &no_ctx()));
        assert!(!lib.equal("string", "a b", &no_ctx(), "a  b", &no_ctx()));
        assert!(lib.equal("token", " a  b ", &no_ctx(), "a b", &no_ctx()));
    }

    #[test]
    fn test_builtin_rejects_params() {
        let lib = BuiltinLibrary;
        let params = vec![("minLength".to_string(), "1".to_string())];
        assert!(lib.allows("string", &params, "x", &no_ctx()).is_err());
        assert!(lib.allows("string", &[], "x", &no_ctx()).is_ok());
    }

    #[test]
    fn test_xsd_boolean() {
        let lib = XsdLibrary;
        for v in ["true", "false", "1", "0", " true "] {
            assert!(lib.allows("boolean", &[], v, &no_ctx()).is_ok(), "{}", v);
        }
        assert!(lib.allows("boolean", &[], "yes", &no_ctx()).is_err());
        assert!(lib.equal("boolean", "true", &no_ctx(), "1", &no_ctx()));
    }

    #[test]
    fn test_xsd_integer_ranges() {
        let lib = XsdLibrary;
        assert!(lib.allows("byte", &[], "127", &no_ctx()).is_ok());
        assert!(lib.allows("byte", &[], "128", &no_ctx()).is_err());
        assert!(lib.allows("unsignedByte", &[], "-1", &no_ctx()).is_err());
        assert!(lib.allows("positiveInteger", &[], "0", &no_ctx()).is_err());
        assert!(lib.allows("nonNegativeInteger", &[], "0", &no_ctx()).is_ok());
        assert!(lib.allows("integer", &[], "+42", &no_ctx()).is_ok());
        assert!(lib.allows("integer", &[], "4.2", &no_ctx()).is_err());
    }

    #[test]
    fn test_xsd_decimal_equality_is_numeric() {
        let lib = XsdLibrary;
        assert!(lib.equal("decimal", "1.0", &no_ctx(), "1.00", &no_ctx()));
        assert!(!lib.equal("decimal", "1.0", &no_ctx(), "1.01", &no_ctx()));
    }

    #[test]
    fn test_xsd_floats() {
        let lib = XsdLibrary;
        assert!(lib.allows("double", &[], "1.5e3", &no_ctx()).is_ok());
        assert!(lib.allows("double", &[], "INF", &no_ctx()).is_ok());
        assert!(lib.allows("double", &[], "NaN", &no_ctx()).is_ok());
        assert!(lib.allows("double", &[], "one", &no_ctx()).is_err());
        assert!(lib.equal("double", "NaN", &no_ctx(), "NaN", &no_ctx()));
    }

    #[test]
    fn test_xsd_dates() {
        let lib = XsdLibrary;
        assert!(lib.allows("date", &[], "2024-02-29", &no_ctx()).is_ok());
        assert!(lib.allows("date", &[], "2023-02-29", &no_ctx()).is_err());
        assert!(lib
            .allows("dateTime", &[], "2024-01-01T10:30:00Z", &no_ctx())
            .is_ok());
        assert!(lib.allows("time", &[], "23:59:59", &no_ctx()).is_ok());
        assert!(lib.allows("duration", &[], "P1Y2M3DT4H", &no_ctx()).is_ok());
        assert!(lib.allows("duration", &[], "1Y", &no_ctx()).is_err());
    }

    #[test]
    fn test_xsd_binary() {
        let lib = XsdLibrary;
        assert!(lib.allows("hexBinary", &[], "0fB8", &no_ctx()).is_ok());
        assert!(lib.allows("hexBinary", &[], "0fB", &no_ctx()).is_err());
        assert!(lib.allows("base64Binary", &[], "aGVsbG8=", &no_ctx()).is_ok());
        assert!(lib.allows("base64Binary", &[], "???", &no_ctx()).is_err());
        assert!(lib.equal("hexBinary", "0FB8", &no_ctx(), "0fb8", &no_ctx()));
    }

    #[test]
    fn test_xsd_names() {
        let lib = XsdLibrary;
        assert!(lib.allows("NCName", &[], "item", &no_ctx()).is_ok());
        assert!(lib.allows("NCName", &[], "a:b", &no_ctx()).is_err());
        assert!(lib.allows("NMTOKEN", &[], "a-b.c", &no_ctx()).is_ok());
        assert!(lib.allows("NMTOKEN", &[], "a b", &no_ctx()).is_err());
        assert!(lib.is_id_type("ID"));
        assert!(!lib.is_id_type("IDREF"));
    }

    #[test]
    fn test_xsd_qname_context() {
        let lib = XsdLibrary;
        let ctx = vec![("x".to_string(), "http://x.example".to_string())];
        assert!(lib.allows("QName", &[], "x:item", &ctx).is_ok());
        assert!(lib.allows("QName", &[], "y:item", &ctx).is_err());

        let ctx2 = vec![("z".to_string(), "http://x.example".to_string())];
        assert!(lib.equal("QName", "x:item", &ctx, "z:item", &ctx2));
        assert!(!lib.equal("QName", "x:item", &ctx, "x:other", &ctx));
    }

    #[test]
    fn test_length_facets() {
        let lib = XsdLibrary;
        let params = vec![
            ("minLength".to_string(), "2".to_string()),
            ("maxLength".to_string(), "4".to_string()),
        ];
        assert!(lib.allows("token", &params, "abc", &no_ctx()).is_ok());
        assert!(lib.allows("token", &params, "a", &no_ctx()).is_err());
        assert!(lib.allows("token", &params, "abcde", &no_ctx()).is_err());
    }

    #[test]
    fn test_pattern_facet_is_anchored() {
        let lib = XsdLibrary;
        let params = vec![("pattern".to_string(), "[0-9]{3}".to_string())];
        assert!(lib.allows("token", &params, "123", &no_ctx()).is_ok());
        assert!(lib.allows("token", &params, "1234", &no_ctx()).is_err());
        assert!(lib.allows("token", &params, "x123", &no_ctx()).is_err());
    }

    #[test]
    fn test_range_facets() {
        let lib = XsdLibrary;
        let params = vec![
            ("minInclusive".to_string(), "0".to_string()),
            ("maxExclusive".to_string(), "100".to_string()),
        ];
        assert!(lib.allows("integer", &params, "0", &no_ctx()).is_ok());
        assert!(lib.allows("integer", &params, "99", &no_ctx()).is_ok());
        assert!(lib.allows("integer", &params, "100", &no_ctx()).is_err());
        assert!(lib.allows("integer", &params, "-1", &no_ctx()).is_err());
    }

    #[test]
    fn test_registry_lookup() {
        assert!(lookup_library(BUILTIN_LIBRARY).is_some());
        assert!(lookup_library(XSD_DATATYPES_LIBRARY).is_some());
        assert!(lookup_library("http://nope.example").is_none());
    }

    #[test]
    fn test_cleanup_types_repopulates() {
        let _ = cached_regex("[a-z]+");
        cleanup_types();
        // Defaults survive cleanup, caches repopulate on demand
        assert!(lookup_library(BUILTIN_LIBRARY).is_some());
        assert!(cached_regex("[a-z]+").is_ok());
    }
}
