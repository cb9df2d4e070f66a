//! Validation contexts
//!
//! A [`ValidCtxt`] binds a compiled schema to one validation run. It supports
//! two modes: whole-document validation, and push (streaming) validation where
//! the caller feeds start tags, character data and end tags as the document is
//! read. In both modes every failure is recorded as a [`ValidationError`] with
//! a classifying [`ValidErr`] code; the first failure is also returned as the
//! operation's error.

use super::derivatives::{
    att_deriv, children_deriv, element_bindings, end_tag_deriv, start_tag_close_deriv,
    start_tag_open_deriv, text_deriv,
};
use super::name_classes::NameClass;
use super::patterns::Pattern;
use super::schemas::RelaxNg;
use crate::documents::{Document, Element, XmlNode};
use crate::error::{Error, Result, ValidErr, ValidationError};
use crate::limits::Limits;
use crate::names::is_valid_ncname;
use crate::namespaces::QName;
use std::collections::HashSet;

/// Namespace of the reserved `xml:` prefix, home of `xml:id`
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Receiver for validation diagnostics
///
/// A reporter observes errors and warnings as they are found; the context
/// still collects every error regardless of whether a reporter is installed.
pub trait ErrorReporter {
    /// Called for every validation error
    fn error(&mut self, error: &ValidationError);

    /// Called for conditions worth surfacing that do not fail validation
    fn warning(&mut self, _message: &str) {}
}

/// One frame of push-mode state, tracking an open element
#[derive(Debug)]
struct OpenElement {
    /// Element name, for error paths
    name: QName,
    /// Prefix bindings in scope, for context-dependent datatypes
    bindings: Vec<(String, String)>,
    /// Whether any significant content has been consumed
    saw_content: bool,
}

/// Validation context bound to a compiled schema
pub struct ValidCtxt<'s> {
    schema: &'s RelaxNg,
    limits: Limits,
    reporter: Option<Box<dyn ErrorReporter + 's>>,
    errors: Vec<ValidationError>,
    /// Current derivative in push mode
    current: Pattern,
    /// Open elements in push mode, innermost last
    open: Vec<OpenElement>,
    /// Whether any element has been pushed or validated
    started: bool,
    /// `xml:id` values seen so far
    ids: HashSet<String>,
}

impl<'s> ValidCtxt<'s> {
    /// Create a context bound to a schema
    pub fn new(schema: &'s RelaxNg) -> Self {
        Self {
            schema,
            limits: Limits::default(),
            reporter: None,
            errors: Vec::new(),
            current: schema.start().clone(),
            open: Vec::new(),
            started: false,
            ids: HashSet::new(),
        }
    }

    /// Set the limits enforced during validation
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Install a reporter that observes errors and warnings as they occur
    pub fn set_reporter(&mut self, reporter: impl ErrorReporter + 's) {
        self.reporter = Some(Box::new(reporter));
    }

    /// The installed reporter, if any
    pub fn reporter(&mut self) -> Option<&mut (dyn ErrorReporter + 's)> {
        self.reporter.as_deref_mut()
    }

    /// All errors collected so far, in document order
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Check whether no errors have been collected
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn defines(&self) -> &[Pattern] {
        self.schema.defines()
    }

    fn path(&self) -> String {
        let mut out = String::new();
        for frame in &self.open {
            out.push('/');
            out.push_str(&frame.name.local_name);
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }

    fn record(&mut self, error: ValidationError) -> Error {
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.error(&error);
        }
        self.errors.push(error.clone());
        Error::Validation(error)
    }

    fn warn(&mut self, message: &str) {
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.warning(message);
        }
    }

    fn check_xml_id(&mut self, element: &Element, path: &str) -> Result<()> {
        for (qname, value) in &element.attributes {
            if qname.local_name == "id" && qname.namespace.as_deref() == Some(XML_NAMESPACE) {
                let id = value.trim().to_string();
                // xml:id values must be NCNames; a malformed one is still
                // tracked for duplicate detection
                if !is_valid_ncname(&id) {
                    self.warn(&format!("xml:id value '{}' is not an NCName", id));
                }
                if !self.ids.insert(id.clone()) {
                    let error = ValidationError::new(format!("duplicate ID value '{}'", id))
                        .with_code(ValidErr::DuplicateId)
                        .with_path(path)
                        .with_actual(id);
                    return Err(self.record(error));
                }
            }
        }
        Ok(())
    }

    /// Describe the element names a pattern accepts next, for diagnostics
    fn expected_names(&self, p: &Pattern) -> String {
        let mut out: Vec<&NameClass> = Vec::new();
        p.expected_elements(self.defines(), &mut out);
        out.iter()
            .map(|nc| nc.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Classify a rejected start tag against the names the pattern accepts
    fn start_tag_code(&self, p: &Pattern, qn: &QName) -> ValidErr {
        let mut expected: Vec<&NameClass> = Vec::new();
        p.expected_elements(self.defines(), &mut expected);

        if expected.is_empty() {
            return ValidErr::ExtraContent;
        }
        for nc in &expected {
            if let NameClass::Name(name) = nc {
                if name.local_name == qn.local_name {
                    return match (&name.namespace, &qn.namespace) {
                        (Some(_), None) => ValidErr::ElementNoNamespace,
                        (None, Some(_)) => ValidErr::ElementExtraNamespace,
                        _ => ValidErr::ElementWrongNamespace,
                    };
                }
            }
        }
        ValidErr::ElementName
    }

    // ------------------------------------------------------------------
    // Whole-document validation
    // ------------------------------------------------------------------

    /// Validate a whole document
    ///
    /// Returns `Ok(())` exactly when the document matches the grammar. On
    /// failure the first error is returned and all errors are retained on the
    /// context.
    pub fn validate_document(&mut self, document: &Document) -> Result<()> {
        let root = match document.root() {
            Some(root) => root,
            None => {
                let error = ValidationError::new("document has no root element")
                    .with_code(ValidErr::NoElement);
                return Err(self.record(error));
            }
        };

        let start = self.schema.start().clone();
        self.check_element(&start, root, "", 1)?;
        Ok(())
    }

    /// Validate a single element subtree against the current pattern,
    /// independent of any document
    ///
    /// In push mode this consumes the element as a child of the innermost
    /// open element.
    pub fn validate_element(&mut self, element: &Element) -> Result<()> {
        self.started = true;
        if let Some(frame) = self.open.last_mut() {
            frame.saw_content = true;
        }
        let current = self.current.clone();
        let parent_path = self.path().trim_end_matches('/').to_string();
        let next = self.check_element(&current, element, &parent_path, self.open.len() + 1)?;
        self.current = next;
        Ok(())
    }

    /// Stepwise validation of one element, recording a classified error for
    /// the first stage that fails. Returns the derivative after the element.
    fn check_element(
        &mut self,
        p: &Pattern,
        element: &Element,
        parent_path: &str,
        depth: usize,
    ) -> Result<Pattern> {
        self.limits.check_xml_depth(depth)?;

        let path = format!("{}/{}", parent_path, element.qname);
        self.check_xml_id(element, &path)?;

        let cx = element_bindings(element);

        let after_open = start_tag_open_deriv(self.defines(), p, &element.qname);
        if matches!(after_open, Pattern::NotAllowed) {
            let code = self.start_tag_code(p, &element.qname);
            let error = ValidationError::new(format!(
                "element '{}' is not allowed here",
                element.qname
            ))
            .with_code(code)
            .with_path(&path)
            .with_expected(self.expected_names(p))
            .with_actual(element.qname.to_string());
            return Err(self.record(error));
        }

        let mut after_atts = after_open.clone();
        for (qn, value) in &element.attributes {
            let next = att_deriv(self.defines(), &cx, &after_atts, qn, value);
            if matches!(next, Pattern::NotAllowed) {
                let error = ValidationError::new(format!(
                    "attribute '{}' is not allowed or has an invalid value",
                    qn
                ))
                .with_code(ValidErr::InvalidAttribute)
                .with_path(&path)
                .with_actual(format!("{}=\"{}\"", qn, value));
                return Err(self.record(error));
            }
            after_atts = next;
        }

        let after_close = start_tag_close_deriv(self.defines(), &after_atts);
        if matches!(after_close, Pattern::NotAllowed) {
            let error = ValidationError::new(format!(
                "element '{}' is missing required attributes",
                element.qname
            ))
            .with_code(ValidErr::AttributeInvalid)
            .with_path(&path);
            return Err(self.record(error));
        }

        let after_children = self.check_children(&after_close, element, &cx, &path, depth)?;

        let after_end = end_tag_deriv(self.defines(), &after_children);
        if matches!(after_end, Pattern::NotAllowed) {
            let error = ValidationError::new(format!(
                "element '{}' has incomplete content",
                element.qname
            ))
            .with_code(ValidErr::ContentInvalid)
            .with_path(&path)
            .with_expected(self.expected_names(&after_children));
            return Err(self.record(error));
        }

        Ok(after_end)
    }

    /// Validate the ordered content of an element, localizing the failing
    /// child where possible
    fn check_children(
        &mut self,
        p: &Pattern,
        element: &Element,
        cx: &[(String, String)],
        path: &str,
        depth: usize,
    ) -> Result<Pattern> {
        let has_child_elements = element
            .children
            .iter()
            .any(|n| matches!(n, XmlNode::Element(_)));

        // Text-only (or empty) content follows the text rules wholesale,
        // including the whitespace fallback for patterns allowing no text
        if !has_child_elements {
            let d = children_deriv(self.defines(), cx, p, &element.children);
            if matches!(d, Pattern::NotAllowed) {
                let error = ValidationError::new(format!(
                    "text content of element '{}' is invalid",
                    element.qname
                ))
                .with_code(ValidErr::WrongText)
                .with_path(path)
                .with_actual(element.text())
                .with_expected(self.expected_names(p));
                return Err(self.record(error));
            }
            return Ok(d);
        }

        let mut current = p.clone();
        for node in &element.children {
            if node.is_whitespace() {
                continue;
            }
            match node {
                XmlNode::Element(child) => {
                    current = self.check_element(&current, child, path, depth + 1)?;
                }
                XmlNode::Text(s) => {
                    let next = text_deriv(self.defines(), cx, &current, s);
                    if matches!(next, Pattern::NotAllowed) {
                        let error = ValidationError::new(format!(
                            "text is not allowed inside element '{}'",
                            element.qname
                        ))
                        .with_code(ValidErr::WrongText)
                        .with_path(path)
                        .with_actual(s.trim().to_string());
                        return Err(self.record(error));
                    }
                    current = next;
                }
            }
        }
        Ok(current)
    }

    // ------------------------------------------------------------------
    // Push validation
    // ------------------------------------------------------------------

    /// Push the start of an element: its name and attributes
    ///
    /// Children are then supplied by further pushes; [`ValidCtxt::pop_element`]
    /// closes the element.
    pub fn push_element(&mut self, element: &Element) -> Result<()> {
        self.started = true;
        self.limits.check_xml_depth(self.open.len() + 1)?;

        let path = format!("{}/{}", self.path().trim_end_matches('/'), element.qname);
        self.check_xml_id(element, &path)?;

        let cx = element_bindings(element);

        let after_open = start_tag_open_deriv(self.defines(), &self.current, &element.qname);
        if matches!(after_open, Pattern::NotAllowed) {
            let code = self.start_tag_code(&self.current, &element.qname);
            let error = ValidationError::new(format!(
                "element '{}' is not allowed here",
                element.qname
            ))
            .with_code(code)
            .with_path(&path)
            .with_expected(self.expected_names(&self.current))
            .with_actual(element.qname.to_string());
            return Err(self.record(error));
        }

        let mut after_atts = after_open;
        for (qn, value) in &element.attributes {
            let next = att_deriv(self.defines(), &cx, &after_atts, qn, value);
            if matches!(next, Pattern::NotAllowed) {
                let error = ValidationError::new(format!(
                    "attribute '{}' is not allowed or has an invalid value",
                    qn
                ))
                .with_code(ValidErr::InvalidAttribute)
                .with_path(&path)
                .with_actual(format!("{}=\"{}\"", qn, value));
                return Err(self.record(error));
            }
            after_atts = next;
        }

        let after_close = start_tag_close_deriv(self.defines(), &after_atts);
        if matches!(after_close, Pattern::NotAllowed) {
            let error = ValidationError::new(format!(
                "element '{}' is missing required attributes",
                element.qname
            ))
            .with_code(ValidErr::AttributeInvalid)
            .with_path(&path);
            return Err(self.record(error));
        }

        if let Some(parent) = self.open.last_mut() {
            parent.saw_content = true;
        }
        self.open.push(OpenElement {
            name: element.qname.clone(),
            bindings: cx,
            saw_content: false,
        });
        self.current = after_close;
        Ok(())
    }

    /// Push a run of character data inside the currently open element
    ///
    /// Whitespace-only runs never invalidate content models that allow no
    /// text.
    pub fn push_text(&mut self, text: &str) -> Result<()> {
        if self.open.is_empty() {
            let error = ValidationError::new("text pushed outside any element")
                .with_code(ValidErr::WrongText);
            return Err(self.record(error));
        }
        let cx = self
            .open
            .last()
            .map(|f| f.bindings.clone())
            .unwrap_or_default();

        if text.chars().all(|c| c.is_whitespace()) {
            let d = text_deriv(self.defines(), &cx, &self.current, text);
            self.current = Pattern::choice(self.current.clone(), d);
            return Ok(());
        }

        if let Some(frame) = self.open.last_mut() {
            frame.saw_content = true;
        }
        let next = text_deriv(self.defines(), &cx, &self.current, text);
        if matches!(next, Pattern::NotAllowed) {
            let path = self.path();
            let error = ValidationError::new("text is not allowed here")
                .with_code(ValidErr::WrongText)
                .with_path(path)
                .with_actual(text.trim().to_string());
            return Err(self.record(error));
        }
        self.current = next;
        Ok(())
    }

    /// Pop the innermost open element, checking its content is complete
    pub fn pop_element(&mut self) -> Result<()> {
        let frame = match self.open.pop() {
            Some(frame) => frame,
            None => {
                let error = ValidationError::new("unbalanced element pop")
                    .with_code(ValidErr::Internal);
                return Err(self.record(error));
            }
        };

        // An element with no significant content is matched as empty text,
        // so that both empty and text content models accept it
        if !frame.saw_content {
            let d = text_deriv(self.defines(), &frame.bindings, &self.current, "");
            self.current = Pattern::choice(self.current.clone(), d);
        }

        let next = end_tag_deriv(self.defines(), &self.current);
        if matches!(next, Pattern::NotAllowed) {
            let path = format!("{}/{}", self.path().trim_end_matches('/'), frame.name);
            let error = ValidationError::new(format!(
                "element '{}' has incomplete content",
                frame.name
            ))
            .with_code(ValidErr::ContentInvalid)
            .with_path(path)
            .with_expected(self.expected_names(&self.current));
            return Err(self.record(error));
        }
        self.current = next;
        Ok(())
    }

    /// Finish a push-mode run, checking the whole document was matched
    pub fn finish(&mut self) -> Result<()> {
        if !self.started {
            let error = ValidationError::new("no element was supplied")
                .with_code(ValidErr::NoElement);
            return Err(self.record(error));
        }
        if !self.open.is_empty() {
            let error = ValidationError::new(format!(
                "{} element(s) left open",
                self.open.len()
            ))
            .with_code(ValidErr::Internal)
            .with_path(self.path());
            return Err(self.record(error));
        }
        if !self.current.nullable(self.defines()) {
            let error = ValidationError::new("document ended before the grammar was satisfied")
                .with_code(ValidErr::ExtraData)
                .with_expected(self.expected_names(&self.current));
            return Err(self.record(error));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ValidCtxt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidCtxt")
            .field("errors", &self.errors.len())
            .field("open", &self.open.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::schemas::RelaxNg;

    const CARD_GRAMMAR: &str = r#"
        <element name="card" xmlns="http://relaxng.org/ns/structure/1.0">
          <attribute name="kind"><text/></attribute>
          <element name="name"><text/></element>
          <optional><element name="email"><text/></element></optional>
        </element>
    "#;

    fn schema() -> RelaxNg {
        RelaxNg::from_str(CARD_GRAMMAR).unwrap()
    }

    fn doc(xml: &str) -> Document {
        Document::from_string(xml).unwrap()
    }

    #[test]
    fn test_valid_document() {
        let schema = schema();
        let mut ctxt = schema.validator();
        let result =
            ctxt.validate_document(&doc(r#"<card kind="a"><name>N</name><email>e</email></card>"#));
        assert!(result.is_ok());
        assert!(ctxt.is_valid());
    }

    #[test]
    fn test_optional_element_may_be_absent() {
        let schema = schema();
        let mut ctxt = schema.validator();
        assert!(ctxt
            .validate_document(&doc(r#"<card kind="a"><name>N</name></card>"#))
            .is_ok());
    }

    #[test]
    fn test_missing_attribute() {
        let schema = schema();
        let mut ctxt = schema.validator();
        let result = ctxt.validate_document(&doc("<card><name>N</name></card>"));
        assert!(result.is_err());
        assert_eq!(ctxt.errors()[0].code, ValidErr::AttributeInvalid);
    }

    #[test]
    fn test_wrong_root_element() {
        let schema = schema();
        let mut ctxt = schema.validator();
        let result = ctxt.validate_document(&doc("<list/>"));
        assert!(result.is_err());
        assert_eq!(ctxt.errors()[0].code, ValidErr::ElementName);
    }

    #[test]
    fn test_unexpected_child_reports_path() {
        let schema = schema();
        let mut ctxt = schema.validator();
        let result = ctxt
            .validate_document(&doc(r#"<card kind="a"><name>N</name><phone>5</phone></card>"#));
        assert!(result.is_err());
        let error = &ctxt.errors()[0];
        assert!(error.path.as_deref().unwrap_or("").contains("phone"));
    }

    #[test]
    fn test_incomplete_content() {
        let schema = schema();
        let mut ctxt = schema.validator();
        let result = ctxt.validate_document(&doc(r#"<card kind="a"/>"#));
        assert!(result.is_err());
        assert_eq!(ctxt.errors()[0].code, ValidErr::ContentInvalid);
    }

    #[test]
    fn test_unexpected_attribute() {
        let schema = schema();
        let mut ctxt = schema.validator();
        let result =
            ctxt.validate_document(&doc(r#"<card kind="a" bad="x"><name>N</name></card>"#));
        assert!(result.is_err());
        assert_eq!(ctxt.errors()[0].code, ValidErr::InvalidAttribute);
    }

    #[test]
    fn test_duplicate_xml_id() {
        let grammar = r#"
            <element name="r" xmlns="http://relaxng.org/ns/structure/1.0">
              <oneOrMore>
                <element name="i">
                  <attribute><anyName/></attribute>
                </element>
              </oneOrMore>
            </element>
        "#;
        let schema = RelaxNg::from_str(grammar).unwrap();
        let mut ctxt = schema.validator();
        let xml = r#"<r xmlns:xml="http://www.w3.org/XML/1998/namespace"><i xml:id="a"/><i xml:id="a"/></r>"#;
        let result = ctxt.validate_document(&doc(xml));
        assert!(result.is_err());
        assert_eq!(ctxt.errors()[0].code, ValidErr::DuplicateId);
    }

    #[test]
    fn test_push_validation_accepts() {
        let schema = schema();
        let mut ctxt = schema.validator();

        let mut card = Element::new(QName::local("card"));
        card.attributes.push((QName::local("kind"), "a".into()));
        let name = Element::new(QName::local("name"));

        ctxt.push_element(&card).unwrap();
        ctxt.push_element(&name).unwrap();
        ctxt.push_text("N").unwrap();
        ctxt.pop_element().unwrap();
        ctxt.pop_element().unwrap();
        assert!(ctxt.finish().is_ok());
    }

    #[test]
    fn test_push_validation_rejects_wrong_child() {
        let schema = schema();
        let mut ctxt = schema.validator();

        let mut card = Element::new(QName::local("card"));
        card.attributes.push((QName::local("kind"), "a".into()));
        let phone = Element::new(QName::local("phone"));

        ctxt.push_element(&card).unwrap();
        let result = ctxt.push_element(&phone);
        assert!(result.is_err());
        assert_eq!(ctxt.errors()[0].code, ValidErr::ElementName);
    }

    #[test]
    fn test_push_pop_of_incomplete_element() {
        let schema = schema();
        let mut ctxt = schema.validator();

        let mut card = Element::new(QName::local("card"));
        card.attributes.push((QName::local("kind"), "a".into()));

        ctxt.push_element(&card).unwrap();
        let result = ctxt.pop_element();
        assert!(result.is_err());
        assert_eq!(ctxt.errors()[0].code, ValidErr::ContentInvalid);
    }

    #[test]
    fn test_push_whole_subtree_with_validate_element() {
        let schema = schema();
        let mut ctxt = schema.validator();

        let mut card = Element::new(QName::local("card"));
        card.attributes.push((QName::local("kind"), "a".into()));
        ctxt.push_element(&card).unwrap();

        let mut name = Element::new(QName::local("name"));
        name.push_node(XmlNode::Text("N".into()));
        ctxt.validate_element(&name).unwrap();

        ctxt.pop_element().unwrap();
        assert!(ctxt.finish().is_ok());
    }

    #[test]
    fn test_finish_without_any_element() {
        let schema = schema();
        let mut ctxt = schema.validator();
        let result = ctxt.finish();
        assert!(result.is_err());
        assert_eq!(ctxt.errors()[0].code, ValidErr::NoElement);
    }

    #[test]
    fn test_reporter_sees_errors() {
        struct Collect(std::rc::Rc<std::cell::RefCell<Vec<ValidErr>>>);
        impl ErrorReporter for Collect {
            fn error(&mut self, error: &ValidationError) {
                self.0.borrow_mut().push(error.code);
            }
        }

        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let schema = schema();
        let mut ctxt = schema.validator();
        ctxt.set_reporter(Collect(seen.clone()));

        let _ = ctxt.validate_document(&doc("<nope/>"));
        assert_eq!(seen.borrow().as_slice(), &[ValidErr::ElementName]);
    }

    #[test]
    fn test_reporter_accessor() {
        struct Silent;
        impl ErrorReporter for Silent {
            fn error(&mut self, _error: &ValidationError) {}
        }

        let schema = schema();
        let mut ctxt = schema.validator();
        assert!(ctxt.reporter().is_none());
        ctxt.set_reporter(Silent);
        assert!(ctxt.reporter().is_some());
    }

    #[test]
    fn test_reporter_sees_warnings() {
        struct Warnings(std::rc::Rc<std::cell::RefCell<Vec<String>>>);
        impl ErrorReporter for Warnings {
            fn error(&mut self, _error: &ValidationError) {}
            fn warning(&mut self, message: &str) {
                self.0.borrow_mut().push(message.to_string());
            }
        }

        let grammar = r#"
            <element name="r" xmlns="http://relaxng.org/ns/structure/1.0">
              <element name="i">
                <attribute><anyName/></attribute>
              </element>
            </element>
        "#;
        let schema = RelaxNg::from_str(grammar).unwrap();
        let mut ctxt = schema.validator();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        ctxt.set_reporter(Warnings(seen.clone()));

        let xml = r#"<r xmlns:xml="http://www.w3.org/XML/1998/namespace"><i xml:id="not an ncname"/></r>"#;
        // A malformed xml:id does not fail validation, it only warns
        assert!(ctxt.validate_document(&doc(xml)).is_ok());
        assert_eq!(seen.borrow().len(), 1);
        assert!(seen.borrow()[0].contains("NCName"));
    }
}
