//! RelaxNG patterns
//!
//! The compiled form of a grammar is a tree of patterns. Grammar-only sugar
//! (`optional`, `zeroOrMore`, `mixed`) is rewritten into this core set during
//! compilation, so validation only ever deals with these constructors.
//!
//! `After` never appears in a compiled grammar; it is produced internally by
//! the derivative computation to track the continuation of an open element.

use super::name_classes::NameClass;
use std::fmt;

/// Datatype parameter (facet) as written in the grammar: name and value
pub type Param = (String, String);

/// Compiled RelaxNG pattern
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Matches nothing but is satisfied (`empty`)
    Empty,
    /// Matches nothing and cannot be satisfied (`notAllowed`)
    NotAllowed,
    /// Matches any text (`text`)
    Text,
    /// Matches either branch (`choice`)
    Choice(Box<Pattern>, Box<Pattern>),
    /// Matches both branches in order (`group`)
    Group(Box<Pattern>, Box<Pattern>),
    /// Matches both branches in any interleaving (`interleave`)
    Interleave(Box<Pattern>, Box<Pattern>),
    /// Matches one or more repetitions (`oneOrMore`)
    OneOrMore(Box<Pattern>),
    /// Matches a whitespace-separated token list (`list`)
    List(Box<Pattern>),
    /// Matches text valid against a datatype (`data`)
    Data {
        /// Datatype library URI ("" for the builtin library)
        library: String,
        /// Datatype local name
        name: String,
        /// Facet parameters
        params: Vec<Param>,
        /// Values also matching this pattern are excluded (`except`)
        except: Option<Box<Pattern>>,
    },
    /// Matches one specific value of a datatype (`value`)
    Value {
        /// Datatype library URI ("" for the builtin library)
        library: String,
        /// Datatype local name
        name: String,
        /// The expected value as written in the grammar
        value: String,
        /// Prefix bindings in scope where the value was written, for
        /// context-dependent datatypes such as QName
        context: Vec<(String, String)>,
    },
    /// Matches one attribute (`attribute`)
    Attribute(NameClass, Box<Pattern>),
    /// Matches one element (`element`)
    Element(NameClass, Box<Pattern>),
    /// Reference to a named define, by index into the schema's define table
    Ref(usize),
    /// Derivative-internal: the first pattern must complete before the
    /// continuation (second) resumes
    After(Box<Pattern>, Box<Pattern>),
}

impl Pattern {
    /// Choice constructor with the standard simplifications
    pub fn choice(p1: Pattern, p2: Pattern) -> Pattern {
        match (p1, p2) {
            (p, Pattern::NotAllowed) => p,
            (Pattern::NotAllowed, p) => p,
            (p1, p2) => {
                if p1 == p2 {
                    p1
                } else {
                    Pattern::Choice(Box::new(p1), Box::new(p2))
                }
            }
        }
    }

    /// Group constructor with the standard simplifications
    pub fn group(p1: Pattern, p2: Pattern) -> Pattern {
        match (p1, p2) {
            (Pattern::NotAllowed, _) | (_, Pattern::NotAllowed) => Pattern::NotAllowed,
            (p, Pattern::Empty) => p,
            (Pattern::Empty, p) => p,
            (p1, p2) => Pattern::Group(Box::new(p1), Box::new(p2)),
        }
    }

    /// Interleave constructor with the standard simplifications
    pub fn interleave(p1: Pattern, p2: Pattern) -> Pattern {
        match (p1, p2) {
            (Pattern::NotAllowed, _) | (_, Pattern::NotAllowed) => Pattern::NotAllowed,
            (p, Pattern::Empty) => p,
            (Pattern::Empty, p) => p,
            (p1, p2) => Pattern::Interleave(Box::new(p1), Box::new(p2)),
        }
    }

    /// After constructor with the standard simplifications
    pub fn after(p1: Pattern, p2: Pattern) -> Pattern {
        match (p1, p2) {
            (Pattern::NotAllowed, _) | (_, Pattern::NotAllowed) => Pattern::NotAllowed,
            (p1, p2) => Pattern::After(Box::new(p1), Box::new(p2)),
        }
    }

    /// OneOrMore constructor with the standard simplifications
    pub fn one_or_more(p: Pattern) -> Pattern {
        match p {
            Pattern::NotAllowed => Pattern::NotAllowed,
            p => Pattern::OneOrMore(Box::new(p)),
        }
    }

    /// `optional` sugar: choice with empty
    pub fn optional(p: Pattern) -> Pattern {
        Pattern::choice(p, Pattern::Empty)
    }

    /// `zeroOrMore` sugar: optional repetition
    pub fn zero_or_more(p: Pattern) -> Pattern {
        Pattern::choice(Pattern::one_or_more(p), Pattern::Empty)
    }

    /// `mixed` sugar: interleave with text
    pub fn mixed(p: Pattern) -> Pattern {
        Pattern::interleave(p, Pattern::Text)
    }

    /// Whether the pattern matches the empty sequence
    ///
    /// References are expanded through the define table; compilation rejects
    /// reference cycles not guarded by an `element`, so this terminates.
    pub fn nullable(&self, defines: &[Pattern]) -> bool {
        match self {
            Pattern::Empty | Pattern::Text => true,
            Pattern::NotAllowed => false,
            Pattern::Group(p1, p2) | Pattern::Interleave(p1, p2) => {
                p1.nullable(defines) && p2.nullable(defines)
            }
            Pattern::Choice(p1, p2) => p1.nullable(defines) || p2.nullable(defines),
            Pattern::OneOrMore(p) => p.nullable(defines),
            Pattern::Element(_, _)
            | Pattern::Attribute(_, _)
            | Pattern::List(_)
            | Pattern::Value { .. }
            | Pattern::Data { .. }
            | Pattern::After(_, _) => false,
            Pattern::Ref(i) => defines.get(*i).map(|p| p.nullable(defines)).unwrap_or(false),
        }
    }

    /// Collect the element name classes acceptable as the next child
    ///
    /// Used for "expected one of" diagnostics when a start tag is rejected.
    pub fn expected_elements<'a>(&'a self, defines: &'a [Pattern], out: &mut Vec<&'a NameClass>) {
        match self {
            Pattern::Element(nc, _) => {
                if !out.contains(&nc) {
                    out.push(nc);
                }
            }
            Pattern::Choice(p1, p2) | Pattern::Interleave(p1, p2) => {
                p1.expected_elements(defines, out);
                p2.expected_elements(defines, out);
            }
            Pattern::Group(p1, p2) => {
                p1.expected_elements(defines, out);
                if p1.nullable(defines) {
                    p2.expected_elements(defines, out);
                }
            }
            Pattern::OneOrMore(p) => p.expected_elements(defines, out),
            Pattern::After(p1, _) => p1.expected_elements(defines, out),
            Pattern::Ref(i) => {
                if let Some(p) = defines.get(*i) {
                    p.expected_elements(defines, out);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Empty => write!(f, "empty"),
            Pattern::NotAllowed => write!(f, "notAllowed"),
            Pattern::Text => write!(f, "text"),
            Pattern::Choice(p1, p2) => write!(f, "({} | {})", p1, p2),
            Pattern::Group(p1, p2) => write!(f, "({}, {})", p1, p2),
            Pattern::Interleave(p1, p2) => write!(f, "({} & {})", p1, p2),
            Pattern::OneOrMore(p) => write!(f, "{}+", p),
            Pattern::List(p) => write!(f, "list {{ {} }}", p),
            Pattern::Data { name, except, .. } => match except {
                Some(e) => write!(f, "data {} - {}", name, e),
                None => write!(f, "data {}", name),
            },
            Pattern::Value { value, .. } => write!(f, "\"{}\"", value),
            Pattern::Attribute(nc, p) => write!(f, "attribute {} {{ {} }}", nc, p),
            Pattern::Element(nc, p) => write!(f, "element {} {{ {} }}", nc, p),
            Pattern::Ref(i) => write!(f, "ref#{}", i),
            Pattern::After(p1, p2) => write!(f, "({} >> {})", p1, p2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::QName;

    fn elem(name: &str) -> Pattern {
        Pattern::Element(
            NameClass::name(QName::local(name)),
            Box::new(Pattern::Empty),
        )
    }

    #[test]
    fn test_choice_simplification() {
        assert_eq!(Pattern::choice(Pattern::NotAllowed, Pattern::Text), Pattern::Text);
        assert_eq!(Pattern::choice(Pattern::Text, Pattern::NotAllowed), Pattern::Text);
        assert_eq!(Pattern::choice(Pattern::Text, Pattern::Text), Pattern::Text);
    }

    #[test]
    fn test_group_simplification() {
        assert_eq!(Pattern::group(Pattern::NotAllowed, Pattern::Text), Pattern::NotAllowed);
        assert_eq!(Pattern::group(Pattern::Empty, Pattern::Text), Pattern::Text);
        assert_eq!(Pattern::group(Pattern::Text, Pattern::Empty), Pattern::Text);
    }

    #[test]
    fn test_interleave_simplification() {
        assert_eq!(
            Pattern::interleave(Pattern::Empty, Pattern::Text),
            Pattern::Text
        );
        assert_eq!(
            Pattern::interleave(Pattern::NotAllowed, Pattern::Text),
            Pattern::NotAllowed
        );
    }

    #[test]
    fn test_nullable() {
        let defines: Vec<Pattern> = Vec::new();
        assert!(Pattern::Empty.nullable(&defines));
        assert!(Pattern::Text.nullable(&defines));
        assert!(!Pattern::NotAllowed.nullable(&defines));
        assert!(!elem("a").nullable(&defines));
        assert!(Pattern::optional(elem("a")).nullable(&defines));
        assert!(Pattern::zero_or_more(elem("a")).nullable(&defines));
        assert!(!Pattern::one_or_more(elem("a")).nullable(&defines));
        assert!(Pattern::one_or_more(Pattern::Text).nullable(&defines));
    }

    #[test]
    fn test_nullable_through_ref() {
        let defines = vec![Pattern::Empty];
        assert!(Pattern::Ref(0).nullable(&defines));

        let defines = vec![elem("a")];
        assert!(!Pattern::Ref(0).nullable(&defines));
    }

    #[test]
    fn test_expected_elements() {
        let defines: Vec<Pattern> = Vec::new();
        let p = Pattern::choice(elem("a"), Pattern::group(Pattern::optional(elem("b")), elem("c")));
        let mut out = Vec::new();
        p.expected_elements(&defines, &mut out);
        let names: Vec<String> = out.iter().map(|nc| nc.to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_mixed_is_interleave_with_text() {
        let p = Pattern::mixed(elem("a"));
        assert!(matches!(p, Pattern::Interleave(_, _)));
    }
}
