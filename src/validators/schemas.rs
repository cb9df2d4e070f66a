//! Compiled RelaxNG schemas
//!
//! A [`RelaxNg`] is the immutable, fully resolved form of a grammar: every
//! `ref` has been bound to a slot in the define table, includes and external
//! references have been merged, and sugar patterns have been rewritten. It is
//! the input to validation and can be shared freely between threads.

use super::parsing::ParserCtxt;
use super::patterns::Pattern;
use super::validation::ValidCtxt;
use crate::documents::Document;
use crate::error::Result;
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;

/// A compiled RelaxNG schema
#[derive(Debug, Clone)]
pub struct RelaxNg {
    /// The start pattern of the grammar
    start: Arc<Pattern>,
    /// Bodies of named defines, indexed by `Pattern::Ref`
    defines: Arc<Vec<Pattern>>,
    /// Define names in declaration order, mapping to slots in `defines`
    define_names: Arc<IndexMap<String, usize>>,
}

impl RelaxNg {
    pub(crate) fn new(
        start: Pattern,
        defines: Vec<Pattern>,
        define_names: IndexMap<String, usize>,
    ) -> Self {
        Self {
            start: Arc::new(start),
            defines: Arc::new(defines),
            define_names: Arc::new(define_names),
        }
    }

    /// Compile a schema from a grammar file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        ParserCtxt::from_url(path)?.parse()
    }

    /// Compile a schema from grammar text held in memory
    pub fn from_str(grammar: &str) -> Result<Self> {
        ParserCtxt::from_memory(grammar).parse()
    }

    /// Compile a schema from an already parsed grammar document
    pub fn from_document(document: Document) -> Result<Self> {
        ParserCtxt::from_document(document).parse()
    }

    /// The start pattern
    pub fn start(&self) -> &Pattern {
        &self.start
    }

    /// Bodies of named defines, indexed by `Pattern::Ref`
    pub fn defines(&self) -> &[Pattern] {
        &self.defines
    }

    /// Name of the define occupying a slot
    pub fn define_name(&self, slot: usize) -> Option<&str> {
        self.define_names
            .iter()
            .find(|(_, i)| **i == slot)
            .map(|(name, _)| name.as_str())
    }

    /// Number of named defines in the grammar
    pub fn define_count(&self) -> usize {
        self.defines.len()
    }

    /// Create a validation context bound to this schema
    pub fn validator(&self) -> ValidCtxt<'_> {
        ValidCtxt::new(self)
    }

    /// Validate a whole document against this schema
    ///
    /// Convenience for the common case; use [`RelaxNg::validator`] when the
    /// individual errors are needed.
    pub fn validate(&self, document: &Document) -> Result<()> {
        let mut ctxt = self.validator();
        ctxt.validate_document(document)
    }

    /// Render the compiled grammar as an indented tree, for debugging
    #[cfg(feature = "dump")]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        out.push_str("start:\n");
        dump_pattern(&self.start, 1, &mut out);
        for (name, slot) in self.define_names.iter() {
            out.push_str(&format!("define {}:\n", name));
            if let Some(body) = self.defines.get(*slot) {
                dump_pattern(body, 1, &mut out);
            }
        }
        out
    }
}

#[cfg(feature = "dump")]
fn dump_pattern(pattern: &Pattern, depth: usize, out: &mut String) {
    use std::fmt::Write;

    let pad = "  ".repeat(depth);
    match pattern {
        Pattern::Empty => {
            let _ = writeln!(out, "{}empty", pad);
        }
        Pattern::NotAllowed => {
            let _ = writeln!(out, "{}notAllowed", pad);
        }
        Pattern::Text => {
            let _ = writeln!(out, "{}text", pad);
        }
        Pattern::Choice(p1, p2) => {
            let _ = writeln!(out, "{}choice", pad);
            dump_pattern(p1, depth + 1, out);
            dump_pattern(p2, depth + 1, out);
        }
        Pattern::Group(p1, p2) => {
            let _ = writeln!(out, "{}group", pad);
            dump_pattern(p1, depth + 1, out);
            dump_pattern(p2, depth + 1, out);
        }
        Pattern::Interleave(p1, p2) => {
            let _ = writeln!(out, "{}interleave", pad);
            dump_pattern(p1, depth + 1, out);
            dump_pattern(p2, depth + 1, out);
        }
        Pattern::OneOrMore(p) => {
            let _ = writeln!(out, "{}oneOrMore", pad);
            dump_pattern(p, depth + 1, out);
        }
        Pattern::List(p) => {
            let _ = writeln!(out, "{}list", pad);
            dump_pattern(p, depth + 1, out);
        }
        Pattern::Data {
            library,
            name,
            params,
            except,
        } => {
            let _ = writeln!(
                out,
                "{}data {{{}}}{} params={}",
                pad,
                library,
                name,
                params.len()
            );
            if let Some(e) = except {
                let _ = writeln!(out, "{}  except", pad);
                dump_pattern(e, depth + 2, out);
            }
        }
        Pattern::Value { name, value, .. } => {
            let _ = writeln!(out, "{}value {} \"{}\"", pad, name, value);
        }
        Pattern::Attribute(nc, p) => {
            let _ = writeln!(out, "{}attribute {}", pad, nc);
            dump_pattern(p, depth + 1, out);
        }
        Pattern::Element(nc, p) => {
            let _ = writeln!(out, "{}element {}", pad, nc);
            dump_pattern(p, depth + 1, out);
        }
        Pattern::Ref(i) => {
            let _ = writeln!(out, "{}ref#{}", pad, i);
        }
        Pattern::After(p1, p2) => {
            let _ = writeln!(out, "{}after", pad);
            dump_pattern(p1, depth + 1, out);
            dump_pattern(p2, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS_BOOK: &str = r#"
        <element name="addressBook" xmlns="http://relaxng.org/ns/structure/1.0">
          <zeroOrMore>
            <element name="card">
              <element name="name"><text/></element>
              <element name="email"><text/></element>
            </element>
          </zeroOrMore>
        </element>
    "#;

    #[test]
    fn test_compile_from_str() {
        let schema = RelaxNg::from_str(ADDRESS_BOOK).unwrap();
        assert!(matches!(schema.start(), Pattern::Element(_, _)));
    }

    #[test]
    fn test_schema_is_shareable() {
        let schema = RelaxNg::from_str(ADDRESS_BOOK).unwrap();
        let clone = schema.clone();

        let handle = std::thread::spawn(move || {
            let doc = Document::from_string("<addressBook/>").unwrap();
            clone.validate(&doc).is_ok()
        });
        assert!(handle.join().unwrap());

        let doc = Document::from_string("<addressBook/>").unwrap();
        assert!(schema.validate(&doc).is_ok());
    }

    #[cfg(feature = "dump")]
    #[test]
    fn test_dump_mentions_start() {
        let schema = RelaxNg::from_str(ADDRESS_BOOK).unwrap();
        let dump = schema.dump();
        assert!(dump.starts_with("start:"));
        assert!(dump.contains("element"));
    }
}
