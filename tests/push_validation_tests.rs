//! Push (streaming) validation tests
//!
//! These drive the push API the way a streaming XML reader would: a start
//! event per element with its attributes, text events for character data, an
//! end event per element, and a final finish check.

use relaxng::documents::{Document, Element, XmlNode};
use relaxng::namespaces::QName;
use relaxng::{RelaxNg, Result, ValidCtxt, ValidErr};

fn compile(grammar: &str) -> RelaxNg {
    RelaxNg::from_str(grammar).expect("grammar should compile")
}

/// Feed a parsed document through the push API, event by event
fn stream(ctxt: &mut ValidCtxt<'_>, element: &Element) -> Result<()> {
    ctxt.push_element(element)?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => stream(ctxt, e)?,
            XmlNode::Text(s) => ctxt.push_text(s)?,
        }
    }
    ctxt.pop_element()
}

fn stream_document(schema: &RelaxNg, xml: &str) -> (bool, Vec<ValidErr>) {
    let doc = Document::from_string(xml).expect("document should parse");
    let root = doc.root().expect("document should have a root");

    let mut ctxt = schema.validator();
    let ok = stream(&mut ctxt, root).and_then(|_| ctxt.finish()).is_ok();
    let codes = ctxt.errors().iter().map(|e| e.code).collect();
    (ok, codes)
}

const CATALOG: &str = r#"
    <element name="catalog" xmlns="http://relaxng.org/ns/structure/1.0">
      <zeroOrMore>
        <element name="product">
          <attribute name="id"><text/></attribute>
          <element name="title"><text/></element>
          <optional><element name="price"><text/></element></optional>
        </element>
      </zeroOrMore>
    </element>
"#;

#[test]
fn streams_a_valid_document() {
    let schema = compile(CATALOG);
    let (ok, codes) = stream_document(
        &schema,
        r#"
        <catalog>
          <product id="p1"><title>Widget</title><price>9.99</price></product>
          <product id="p2"><title>Gadget</title></product>
        </catalog>
        "#,
    );
    assert!(ok, "codes: {:?}", codes);
}

#[test]
fn streaming_fails_fast_on_unexpected_element() {
    let schema = compile(CATALOG);
    let (ok, codes) = stream_document(
        &schema,
        r#"<catalog><product id="p1"><sku>x</sku></product></catalog>"#,
    );
    assert!(!ok);
    assert_eq!(codes[0], ValidErr::ElementName);
}

#[test]
fn streaming_detects_incomplete_element_on_pop() {
    let schema = compile(CATALOG);
    let (ok, codes) = stream_document(&schema, r#"<catalog><product id="p1"/></catalog>"#);
    assert!(!ok);
    assert_eq!(codes[0], ValidErr::ContentInvalid);
}

#[test]
fn streaming_detects_missing_attribute_at_start_tag() {
    let schema = compile(CATALOG);
    let (ok, codes) = stream_document(
        &schema,
        "<catalog><product><title>t</title></product></catalog>",
    );
    assert!(!ok);
    assert_eq!(codes[0], ValidErr::AttributeInvalid);
}

#[test]
fn manual_event_sequence() {
    let schema = compile(CATALOG);
    let mut ctxt = schema.validator();

    let catalog = Element::new(QName::local("catalog"));
    let mut product = Element::new(QName::local("product"));
    product
        .attributes
        .push((QName::local("id"), "p1".to_string()));
    let title = Element::new(QName::local("title"));

    ctxt.push_element(&catalog).unwrap();
    ctxt.push_element(&product).unwrap();
    ctxt.push_element(&title).unwrap();
    ctxt.push_text("Widget").unwrap();
    ctxt.pop_element().unwrap();
    ctxt.pop_element().unwrap();
    ctxt.pop_element().unwrap();
    assert!(ctxt.finish().is_ok());
}

#[test]
fn whitespace_between_children_is_accepted() {
    let schema = compile(CATALOG);
    let mut ctxt = schema.validator();

    let catalog = Element::new(QName::local("catalog"));
    ctxt.push_element(&catalog).unwrap();
    ctxt.push_text("\n  ").unwrap();
    ctxt.pop_element().unwrap();
    assert!(ctxt.finish().is_ok());
}

#[test]
fn text_outside_any_element_is_rejected() {
    let schema = compile(CATALOG);
    let mut ctxt = schema.validator();
    assert!(ctxt.push_text("stray").is_err());
    assert_eq!(ctxt.errors()[0].code, ValidErr::WrongText);
}

#[test]
fn finish_before_any_push_reports_missing_element() {
    let schema = compile(CATALOG);
    let mut ctxt = schema.validator();
    let result = ctxt.finish();
    assert!(result.is_err());
    assert_eq!(ctxt.errors()[0].code, ValidErr::NoElement);
}

#[test]
fn whole_subtrees_can_be_spliced_into_a_stream() {
    let schema = compile(CATALOG);
    let mut ctxt = schema.validator();

    let catalog = Element::new(QName::local("catalog"));
    ctxt.push_element(&catalog).unwrap();

    // A fully built product subtree validated in one call
    let mut product = Element::new(QName::local("product"));
    product
        .attributes
        .push((QName::local("id"), "p9".to_string()));
    let mut title = Element::new(QName::local("title"));
    title.push_node(XmlNode::Text("Bulk".to_string()));
    product.push_node(XmlNode::Element(title));
    ctxt.validate_element(&product).unwrap();

    ctxt.pop_element().unwrap();
    assert!(ctxt.finish().is_ok());
}

#[test]
fn push_and_whole_document_agree() {
    let schema = compile(CATALOG);
    let cases = [
        (r#"<catalog/>"#, true),
        (
            r#"<catalog><product id="a"><title>t</title></product></catalog>"#,
            true,
        ),
        (r#"<catalog><item/></catalog>"#, false),
        (
            r#"<catalog><product id="a"><title>t</title><title>u</title></product></catalog>"#,
            false,
        ),
    ];

    for (xml, expected) in cases {
        let doc = Document::from_string(xml).unwrap();
        let whole = schema.validate(&doc).is_ok();
        let (pushed, _) = stream_document(&schema, xml);
        assert_eq!(whole, expected, "whole-document on {}", xml);
        assert_eq!(pushed, expected, "push on {}", xml);
    }
}
