//! Pattern derivatives
//!
//! Validation is computed as a derivative: consuming a piece of the document
//! (a start tag, an attribute, a run of text, an end tag) maps the current
//! pattern to the pattern matching the rest of the document. A document is
//! valid when the derivative of the start pattern over the whole root element
//! is nullable; any step reaching `notAllowed` is a validation failure.
//!
//! Open elements are tracked inside the pattern itself through `After`
//! continuations, which is what makes streaming (push) validation possible
//! with nothing more than the current pattern as state.

use super::datatypes::{lookup_library, Bindings};
use super::patterns::{Param, Pattern};
use crate::documents::{Element, XmlNode};
use crate::namespaces::QName;

/// Derivative of a pattern over a whole child node (element or text)
pub fn child_deriv(defines: &[Pattern], cx: &Bindings, p: &Pattern, node: &XmlNode) -> Pattern {
    match node {
        XmlNode::Text(s) => text_deriv(defines, cx, p, s),
        XmlNode::Element(element) => element_deriv(defines, p, element),
    }
}

/// Derivative of a pattern over a complete element subtree
pub fn element_deriv(defines: &[Pattern], p: &Pattern, element: &Element) -> Pattern {
    let cx = element_bindings(element);
    let p = start_tag_open_deriv(defines, p, &element.qname);
    let p = atts_deriv(defines, &cx, p, &element.attributes);
    let p = start_tag_close_deriv(defines, &p);
    let p = children_deriv(defines, &cx, &p, &element.children);
    end_tag_deriv(defines, &p)
}

/// Prefix bindings in scope at an element, for context-dependent datatypes
pub fn element_bindings(element: &Element) -> Vec<(String, String)> {
    element
        .namespaces
        .prefixes()
        .map(|(p, ns)| (p.to_string(), ns.to_string()))
        .collect()
}

/// Derivative over a run of character data
pub fn text_deriv(defines: &[Pattern], cx: &Bindings, p: &Pattern, s: &str) -> Pattern {
    match p {
        Pattern::Choice(p1, p2) => Pattern::choice(
            text_deriv(defines, cx, p1, s),
            text_deriv(defines, cx, p2, s),
        ),
        Pattern::Interleave(p1, p2) => Pattern::choice(
            Pattern::interleave(text_deriv(defines, cx, p1, s), (**p2).clone()),
            Pattern::interleave((**p1).clone(), text_deriv(defines, cx, p2, s)),
        ),
        Pattern::Group(p1, p2) => {
            let d = Pattern::group(text_deriv(defines, cx, p1, s), (**p2).clone());
            if p1.nullable(defines) {
                Pattern::choice(d, text_deriv(defines, cx, p2, s))
            } else {
                d
            }
        }
        Pattern::After(p1, p2) => {
            Pattern::after(text_deriv(defines, cx, p1, s), (**p2).clone())
        }
        Pattern::OneOrMore(p1) => Pattern::group(
            text_deriv(defines, cx, p1, s),
            Pattern::optional(Pattern::one_or_more((**p1).clone())),
        ),
        Pattern::Text => Pattern::Text,
        Pattern::Value {
            library,
            name,
            value,
            context,
        } => {
            if datatype_equal(library, name, value, context, s, cx) {
                Pattern::Empty
            } else {
                Pattern::NotAllowed
            }
        }
        Pattern::Data {
            library,
            name,
            params,
            except,
        } => {
            if !datatype_allows(library, name, params, s, cx) {
                return Pattern::NotAllowed;
            }
            if let Some(ex) = except {
                if text_deriv(defines, cx, ex, s).nullable(defines) {
                    return Pattern::NotAllowed;
                }
            }
            Pattern::Empty
        }
        Pattern::List(p1) => {
            let tokens: Vec<&str> = s.split_whitespace().collect();
            if list_deriv(defines, cx, (**p1).clone(), &tokens).nullable(defines) {
                Pattern::Empty
            } else {
                Pattern::NotAllowed
            }
        }
        Pattern::Ref(i) => match defines.get(*i) {
            Some(body) => text_deriv(defines, cx, body, s),
            None => Pattern::NotAllowed,
        },
        _ => Pattern::NotAllowed,
    }
}

/// Derivative over the tokens of a `list` value
fn list_deriv(defines: &[Pattern], cx: &Bindings, p: Pattern, tokens: &[&str]) -> Pattern {
    let mut current = p;
    for token in tokens {
        if matches!(current, Pattern::NotAllowed) {
            return Pattern::NotAllowed;
        }
        current = text_deriv(defines, cx, &current, token);
    }
    current
}

/// Derivative over a start tag name
///
/// On a match the element's content pattern is placed in front of the
/// continuation via `After`; `end_tag_deriv` resumes the continuation.
pub fn start_tag_open_deriv(defines: &[Pattern], p: &Pattern, qn: &QName) -> Pattern {
    match p {
        Pattern::Choice(p1, p2) => Pattern::choice(
            start_tag_open_deriv(defines, p1, qn),
            start_tag_open_deriv(defines, p2, qn),
        ),
        Pattern::Element(nc, body) => {
            if nc.contains(qn) {
                Pattern::after((**body).clone(), Pattern::Empty)
            } else {
                Pattern::NotAllowed
            }
        }
        Pattern::Interleave(p1, p2) => Pattern::choice(
            apply_after(
                &|x| Pattern::interleave(x, (**p2).clone()),
                start_tag_open_deriv(defines, p1, qn),
            ),
            apply_after(
                &|x| Pattern::interleave((**p1).clone(), x),
                start_tag_open_deriv(defines, p2, qn),
            ),
        ),
        Pattern::OneOrMore(p1) => apply_after(
            &|x| Pattern::group(x, Pattern::optional(Pattern::one_or_more((**p1).clone()))),
            start_tag_open_deriv(defines, p1, qn),
        ),
        Pattern::Group(p1, p2) => {
            let d = apply_after(
                &|x| Pattern::group(x, (**p2).clone()),
                start_tag_open_deriv(defines, p1, qn),
            );
            if p1.nullable(defines) {
                Pattern::choice(d, start_tag_open_deriv(defines, p2, qn))
            } else {
                d
            }
        }
        Pattern::After(p1, p2) => apply_after(
            &|x| Pattern::after(x, (**p2).clone()),
            start_tag_open_deriv(defines, p1, qn),
        ),
        Pattern::Ref(i) => match defines.get(*i) {
            Some(body) => start_tag_open_deriv(defines, body, qn),
            None => Pattern::NotAllowed,
        },
        _ => Pattern::NotAllowed,
    }
}

/// Map a function over the continuations of an `After` tree
fn apply_after(f: &impl Fn(Pattern) -> Pattern, p: Pattern) -> Pattern {
    match p {
        Pattern::After(p1, p2) => Pattern::after(*p1, f(*p2)),
        Pattern::Choice(p1, p2) => Pattern::choice(apply_after(f, *p1), apply_after(f, *p2)),
        Pattern::NotAllowed => Pattern::NotAllowed,
        // start_tag_open_deriv only produces After, Choice and NotAllowed
        other => other,
    }
}

/// Derivative over a full attribute set
pub fn atts_deriv(
    defines: &[Pattern],
    cx: &Bindings,
    p: Pattern,
    attributes: &[(QName, String)],
) -> Pattern {
    let mut current = p;
    for (qn, value) in attributes {
        if matches!(current, Pattern::NotAllowed) {
            return Pattern::NotAllowed;
        }
        current = att_deriv(defines, cx, &current, qn, value);
    }
    current
}

/// Derivative over a single attribute
pub fn att_deriv(
    defines: &[Pattern],
    cx: &Bindings,
    p: &Pattern,
    qn: &QName,
    value: &str,
) -> Pattern {
    match p {
        Pattern::After(p1, p2) => Pattern::after(
            att_deriv(defines, cx, p1, qn, value),
            (**p2).clone(),
        ),
        Pattern::Choice(p1, p2) => Pattern::choice(
            att_deriv(defines, cx, p1, qn, value),
            att_deriv(defines, cx, p2, qn, value),
        ),
        Pattern::Group(p1, p2) => Pattern::choice(
            Pattern::group(att_deriv(defines, cx, p1, qn, value), (**p2).clone()),
            Pattern::group((**p1).clone(), att_deriv(defines, cx, p2, qn, value)),
        ),
        Pattern::Interleave(p1, p2) => Pattern::choice(
            Pattern::interleave(att_deriv(defines, cx, p1, qn, value), (**p2).clone()),
            Pattern::interleave((**p1).clone(), att_deriv(defines, cx, p2, qn, value)),
        ),
        Pattern::OneOrMore(p1) => Pattern::group(
            att_deriv(defines, cx, p1, qn, value),
            Pattern::optional(Pattern::one_or_more((**p1).clone())),
        ),
        Pattern::Attribute(nc, pv) => {
            if nc.contains(qn) && value_match(defines, cx, pv, value) {
                Pattern::Empty
            } else {
                Pattern::NotAllowed
            }
        }
        Pattern::Ref(i) => match defines.get(*i) {
            Some(body) => att_deriv(defines, cx, body, qn, value),
            None => Pattern::NotAllowed,
        },
        _ => Pattern::NotAllowed,
    }
}

/// Whether an attribute value matches a content pattern
///
/// An empty or whitespace-only value matches a nullable pattern even when the
/// pattern matches no text at all.
fn value_match(defines: &[Pattern], cx: &Bindings, p: &Pattern, s: &str) -> bool {
    (p.nullable(defines) && s.chars().all(|c| c.is_whitespace()))
        || text_deriv(defines, cx, p, s).nullable(defines)
}

/// Derivative over the end of a start tag
///
/// Remaining `attribute` patterns become `notAllowed`: every required
/// attribute must have been consumed by then.
pub fn start_tag_close_deriv(defines: &[Pattern], p: &Pattern) -> Pattern {
    match p {
        Pattern::After(p1, p2) => Pattern::after(
            start_tag_close_deriv(defines, p1),
            (**p2).clone(),
        ),
        Pattern::Choice(p1, p2) => Pattern::choice(
            start_tag_close_deriv(defines, p1),
            start_tag_close_deriv(defines, p2),
        ),
        Pattern::Group(p1, p2) => Pattern::group(
            start_tag_close_deriv(defines, p1),
            start_tag_close_deriv(defines, p2),
        ),
        Pattern::Interleave(p1, p2) => Pattern::interleave(
            start_tag_close_deriv(defines, p1),
            start_tag_close_deriv(defines, p2),
        ),
        Pattern::OneOrMore(p1) => Pattern::one_or_more(start_tag_close_deriv(defines, p1)),
        Pattern::Attribute(_, _) => Pattern::NotAllowed,
        Pattern::Ref(i) => match defines.get(*i) {
            Some(body) => start_tag_close_deriv(defines, body),
            None => Pattern::NotAllowed,
        },
        other => other.clone(),
    }
}

/// Derivative over the ordered content of an element
pub fn children_deriv(
    defines: &[Pattern],
    cx: &Bindings,
    p: &Pattern,
    children: &[XmlNode],
) -> Pattern {
    match children {
        // No content at all is treated as empty text, so that both
        // `empty` and `text` content models accept an empty element
        [] => children_deriv(defines, cx, p, &[XmlNode::Text(String::new())]),
        [XmlNode::Text(s)] => {
            let d = text_deriv(defines, cx, p, s);
            if s.chars().all(|c| c.is_whitespace()) {
                // Whitespace-only content also matches patterns that
                // allow no text
                Pattern::choice(p.clone(), d)
            } else {
                d
            }
        }
        _ => {
            let mut current = p.clone();
            for node in children {
                if matches!(current, Pattern::NotAllowed) {
                    return Pattern::NotAllowed;
                }
                // In mixed content, whitespace-only runs are not significant
                if node.is_whitespace() {
                    continue;
                }
                current = child_deriv(defines, cx, &current, node);
            }
            current
        }
    }
}

/// Derivative over an end tag: resume the continuation when the content
/// pattern has been satisfied
pub fn end_tag_deriv(defines: &[Pattern], p: &Pattern) -> Pattern {
    match p {
        Pattern::Choice(p1, p2) => Pattern::choice(
            end_tag_deriv(defines, p1),
            end_tag_deriv(defines, p2),
        ),
        Pattern::After(p1, p2) => {
            if p1.nullable(defines) {
                (**p2).clone()
            } else {
                Pattern::NotAllowed
            }
        }
        _ => Pattern::NotAllowed,
    }
}

fn datatype_allows(library: &str, name: &str, params: &[Param], value: &str, cx: &Bindings) -> bool {
    match lookup_library(library) {
        Some(lib) => lib.allows(name, params, value, cx).is_ok(),
        None => false,
    }
}

fn datatype_equal(
    library: &str,
    name: &str,
    expected: &str,
    expected_cx: &Bindings,
    actual: &str,
    actual_cx: &Bindings,
) -> bool {
    match lookup_library(library) {
        Some(lib) => lib.equal(name, expected, expected_cx, actual, actual_cx),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::name_classes::NameClass;

    fn qn(local: &str) -> QName {
        QName::local(local)
    }

    fn elem(name: &str, content: Pattern) -> Pattern {
        Pattern::Element(NameClass::name(qn(name)), Box::new(content))
    }

    fn no_ctx() -> Vec<(String, String)> {
        Vec::new()
    }

    fn accepts_element(p: &Pattern, element: &Element) -> bool {
        element_deriv(&[], p, element).nullable(&[])
    }

    fn make_element(name: &str) -> Element {
        Element::new(qn(name))
    }

    #[test]
    fn test_start_tag_open_matches_name() {
        let p = elem("a", Pattern::Empty);
        let d = start_tag_open_deriv(&[], &p, &qn("a"));
        assert!(!matches!(d, Pattern::NotAllowed));

        let d = start_tag_open_deriv(&[], &p, &qn("b"));
        assert!(matches!(d, Pattern::NotAllowed));
    }

    #[test]
    fn test_empty_element_accepted() {
        let p = elem("a", Pattern::Empty);
        assert!(accepts_element(&p, &make_element("a")));
        assert!(!accepts_element(&p, &make_element("b")));
    }

    #[test]
    fn test_text_content() {
        let p = elem("a", Pattern::Text);
        let mut e = make_element("a");
        e.push_node(XmlNode::Text("hello".to_string()));
        assert!(accepts_element(&p, &e));

        // text also matches no content
        assert!(accepts_element(&p, &make_element("a")));
    }

    #[test]
    fn test_empty_rejects_text() {
        let p = elem("a", Pattern::Empty);
        let mut e = make_element("a");
        e.push_node(XmlNode::Text("hello".to_string()));
        assert!(!accepts_element(&p, &e));

        // whitespace-only content is fine for empty
        let mut e = make_element("a");
        e.push_node(XmlNode::Text("  \n".to_string()));
        assert!(accepts_element(&p, &e));
    }

    #[test]
    fn test_group_order_matters() {
        let content = Pattern::group(elem("b", Pattern::Empty), elem("c", Pattern::Empty));
        let p = elem("a", content);

        let mut e = make_element("a");
        e.push_node(XmlNode::Element(make_element("b")));
        e.push_node(XmlNode::Element(make_element("c")));
        assert!(accepts_element(&p, &e));

        let mut e = make_element("a");
        e.push_node(XmlNode::Element(make_element("c")));
        e.push_node(XmlNode::Element(make_element("b")));
        assert!(!accepts_element(&p, &e));
    }

    #[test]
    fn test_interleave_allows_any_order() {
        let content = Pattern::interleave(elem("b", Pattern::Empty), elem("c", Pattern::Empty));
        let p = elem("a", content);

        for order in [["b", "c"], ["c", "b"]] {
            let mut e = make_element("a");
            for name in order {
                e.push_node(XmlNode::Element(make_element(name)));
            }
            assert!(accepts_element(&p, &e));
        }

        // Both children are still required
        let mut e = make_element("a");
        e.push_node(XmlNode::Element(make_element("b")));
        assert!(!accepts_element(&p, &e));
    }

    #[test]
    fn test_one_or_more() {
        let p = elem("a", Pattern::one_or_more(elem("b", Pattern::Empty)));

        assert!(!accepts_element(&p, &make_element("a")));

        for count in 1..4 {
            let mut e = make_element("a");
            for _ in 0..count {
                e.push_node(XmlNode::Element(make_element("b")));
            }
            assert!(accepts_element(&p, &e), "count {}", count);
        }
    }

    #[test]
    fn test_required_attribute() {
        let content = Pattern::Attribute(NameClass::name(qn("id")), Box::new(Pattern::Text));
        let p = elem("a", content);

        let mut e = make_element("a");
        e.attributes.push((qn("id"), "x1".to_string()));
        assert!(accepts_element(&p, &e));

        assert!(!accepts_element(&p, &make_element("a")));
    }

    #[test]
    fn test_unexpected_attribute_rejected() {
        let p = elem("a", Pattern::Empty);
        let mut e = make_element("a");
        e.attributes.push((qn("id"), "x1".to_string()));
        assert!(!accepts_element(&p, &e));
    }

    #[test]
    fn test_attribute_value_pattern() {
        let value = Pattern::Value {
            library: String::new(),
            name: "token".to_string(),
            value: "yes".to_string(),
            context: no_ctx(),
        };
        let content = Pattern::Attribute(NameClass::name(qn("ok")), Box::new(value));
        let p = elem("a", content);

        let mut e = make_element("a");
        e.attributes.push((qn("ok"), " yes ".to_string()));
        assert!(accepts_element(&p, &e));

        let mut e = make_element("a");
        e.attributes.push((qn("ok"), "no".to_string()));
        assert!(!accepts_element(&p, &e));
    }

    #[test]
    fn test_data_content() {
        let content = Pattern::Data {
            library: "http://www.w3.org/2001/XMLSchema-datatypes".to_string(),
            name: "integer".to_string(),
            params: Vec::new(),
            except: None,
        };
        let p = elem("a", content);

        let mut e = make_element("a");
        e.push_node(XmlNode::Text("42".to_string()));
        assert!(accepts_element(&p, &e));

        let mut e = make_element("a");
        e.push_node(XmlNode::Text("forty-two".to_string()));
        assert!(!accepts_element(&p, &e));
    }

    #[test]
    fn test_data_except() {
        let content = Pattern::Data {
            library: "http://www.w3.org/2001/XMLSchema-datatypes".to_string(),
            name: "integer".to_string(),
            params: Vec::new(),
            except: Some(Box::new(Pattern::Value {
                library: "http://www.w3.org/2001/XMLSchema-datatypes".to_string(),
                name: "integer".to_string(),
                value: "0".to_string(),
                context: no_ctx(),
            })),
        };
        let p = elem("a", content);

        let mut e = make_element("a");
        e.push_node(XmlNode::Text("7".to_string()));
        assert!(accepts_element(&p, &e));

        let mut e = make_element("a");
        e.push_node(XmlNode::Text("0".to_string()));
        assert!(!accepts_element(&p, &e));
    }

    #[test]
    fn test_list_content() {
        let item = Pattern::Data {
            library: "http://www.w3.org/2001/XMLSchema-datatypes".to_string(),
            name: "integer".to_string(),
            params: Vec::new(),
            except: None,
        };
        let content = Pattern::List(Box::new(Pattern::one_or_more(item)));
        let p = elem("a", content);

        let mut e = make_element("a");
        e.push_node(XmlNode::Text("1 2 3".to_string()));
        assert!(accepts_element(&p, &e));

        let mut e = make_element("a");
        e.push_node(XmlNode::Text("1 two 3".to_string()));
        assert!(!accepts_element(&p, &e));

        // oneOrMore inside list requires at least one token
        let mut e = make_element("a");
        e.push_node(XmlNode::Text("   ".to_string()));
        assert!(!accepts_element(&p, &e));
    }

    #[test]
    fn test_mixed_content() {
        let p = elem("a", Pattern::mixed(Pattern::optional(elem("b", Pattern::Empty))));

        let mut e = make_element("a");
        e.push_node(XmlNode::Text("before ".to_string()));
        e.push_node(XmlNode::Element(make_element("b")));
        e.push_node(XmlNode::Text(" after".to_string()));
        assert!(accepts_element(&p, &e));
    }

    #[test]
    fn test_recursive_grammar_through_ref() {
        // define 0: element item { ref 0 | empty }
        let defines = vec![elem(
            "item",
            Pattern::optional(Pattern::Ref(0)),
        )];
        let p = Pattern::Ref(0);

        let inner = make_element("item");
        let mut middle = make_element("item");
        middle.push_node(XmlNode::Element(inner));
        let mut outer = make_element("item");
        outer.push_node(XmlNode::Element(middle));

        assert!(element_deriv(&defines, &p, &outer).nullable(&defines));
        assert!(element_deriv(&defines, &p, &make_element("item")).nullable(&defines));
    }
}
