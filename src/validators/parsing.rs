//! Grammar parsing and compilation
//!
//! A [`ParserCtxt`] holds one grammar source (file, in-memory text or an
//! already parsed document) and compiles it into a [`RelaxNg`] schema.
//! Compilation resolves `include` and `externalRef` against the source
//! location, merges `define`s according to their `combine` attributes,
//! rewrites the sugar patterns into the core set and binds every `ref` to a
//! slot in the define table. The context is consumed by [`ParserCtxt::parse`];
//! a compiled schema never changes.

use super::datatypes::{lookup_library, BUILTIN_LIBRARY};
use super::name_classes::NameClass;
use super::patterns::{Param, Pattern};
use super::schemas::RelaxNg;
use crate::documents::{Document, Element};
use crate::error::{Error, ParseError, Result, ValidErr};
use crate::limits::Limits;
use crate::loaders::Loader;
use crate::locations::Location;
use crate::names::validate_ncname;
use crate::namespaces::QName;
use indexmap::IndexMap;
use std::path::Path;

/// Namespace of RelaxNG grammar elements
pub const RELAXNG_NS: &str = "http://relaxng.org/ns/structure/1.0";

/// Handler invoked for every compilation error
pub type ParseErrorHandler<'h> = Box<dyn FnMut(&ParseError) + 'h>;

/// Handler invoked for recoverable oddities in the grammar
pub type ParseWarningHandler<'h> = Box<dyn FnMut(&str) + 'h>;

enum Source {
    Location(Location),
    Memory(String),
    Document(Document),
}

/// Parser context: one grammar source plus compilation settings
pub struct ParserCtxt<'h> {
    source: Source,
    base: Option<Location>,
    limits: Limits,
    loader: Loader,
    error_handler: Option<ParseErrorHandler<'h>>,
    warning_handler: Option<ParseWarningHandler<'h>>,
}

impl<'h> ParserCtxt<'h> {
    /// Create a context reading the grammar from a file or `file:` URL
    pub fn from_url(path: impl AsRef<Path>) -> Result<Self> {
        let location = Location::from_str(&path.as_ref().to_string_lossy())?;
        Ok(Self {
            base: Some(location.clone()),
            source: Source::Location(location),
            limits: Limits::default(),
            loader: Loader::new(),
            error_handler: None,
            warning_handler: None,
        })
    }

    /// Create a context reading the grammar from in-memory text
    pub fn from_memory(grammar: &str) -> Self {
        Self {
            source: Source::Memory(grammar.to_string()),
            base: None,
            limits: Limits::default(),
            loader: Loader::new(),
            error_handler: None,
            warning_handler: None,
        }
    }

    /// Create a context around an already parsed grammar document
    pub fn from_document(document: Document) -> Self {
        Self {
            source: Source::Document(document),
            base: None,
            limits: Limits::default(),
            loader: Loader::new(),
            error_handler: None,
            warning_handler: None,
        }
    }

    /// Set the limits enforced during compilation
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.loader = Loader::new().with_limits(limits.clone());
        self.limits = limits;
        self
    }

    /// Install a handler observing compilation errors as they are found
    pub fn set_error_handler(&mut self, handler: impl FnMut(&ParseError) + 'h) {
        self.error_handler = Some(Box::new(handler));
    }

    /// Install a handler observing compilation warnings
    pub fn set_warning_handler(&mut self, handler: impl FnMut(&str) + 'h) {
        self.warning_handler = Some(Box::new(handler));
    }

    /// The installed error handler, if any
    pub fn error_handler(&mut self) -> Option<&mut ParseErrorHandler<'h>> {
        self.error_handler.as_mut()
    }

    /// The installed warning handler, if any
    pub fn warning_handler(&mut self) -> Option<&mut ParseWarningHandler<'h>> {
        self.warning_handler.as_mut()
    }

    /// Compile the grammar, consuming the context
    pub fn parse(mut self) -> Result<RelaxNg> {
        let source = std::mem::replace(&mut self.source, Source::Memory(String::new()));
        let document = match source {
            Source::Location(location) => {
                let text = self.loader.load(&location)?;
                Document::parse_with_limits(text.as_bytes(), &self.limits)?
            }
            Source::Memory(text) => Document::parse_with_limits(text.as_bytes(), &self.limits)?,
            Source::Document(doc) => doc,
        };

        let mut compiler = Compiler::new(&self.limits, &self.loader, self.base.clone());
        let result = compiler.compile(&document);
        let warnings = std::mem::take(&mut compiler.warnings);
        drop(compiler);

        if let Some(handler) = self.warning_handler.as_mut() {
            for warning in &warnings {
                handler(warning);
            }
        }

        match result {
            Ok(schema) => Ok(schema),
            Err(error) => {
                if let (Some(handler), Error::Parse(parse_error)) =
                    (self.error_handler.as_mut(), &error)
                {
                    handler(parse_error);
                }
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for ParserCtxt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserCtxt").finish_non_exhaustive()
    }
}

/// Inherited attributes: `ns` and `datatypeLibrary`
#[derive(Debug, Clone)]
struct ParseScope {
    ns: Option<String>,
    datatype_library: String,
}

impl ParseScope {
    fn root() -> Self {
        Self {
            ns: None,
            datatype_library: BUILTIN_LIBRARY.to_string(),
        }
    }

    /// Fold an element's own `ns`/`datatypeLibrary` attributes into the scope
    fn descend(&self, element: &Element) -> Self {
        let mut scope = self.clone();
        if let Some(ns) = element.get_attribute("ns") {
            scope.ns = if ns.is_empty() {
                None
            } else {
                Some(ns.to_string())
            };
        }
        if let Some(library) = element.get_attribute("datatypeLibrary") {
            scope.datatype_library = library.to_string();
        }
        scope
    }
}

/// One `define` (or `start`) occurrence awaiting combination
struct DefineDecl {
    combine: Option<String>,
    /// The `define`/`start` element together with the scope it was written in
    body: Element,
    scope: ParseScope,
}

struct Compiler<'c> {
    limits: &'c Limits,
    loader: &'c Loader,
    base: Option<Location>,
    /// Names of defines, in declaration order; values are `Pattern::Ref` slots
    define_names: IndexMap<String, usize>,
    /// Collected define occurrences by slot
    decls: Vec<Vec<DefineDecl>>,
    starts: Vec<DefineDecl>,
    /// Locations currently being included, for cycle detection
    include_stack: Vec<String>,
    pattern_count: usize,
    /// Recoverable oddities found along the way, delivered after compilation
    warnings: Vec<String>,
}

impl<'c> Compiler<'c> {
    fn new(limits: &'c Limits, loader: &'c Loader, base: Option<Location>) -> Self {
        Self {
            limits,
            loader,
            base,
            define_names: IndexMap::new(),
            decls: Vec::new(),
            starts: Vec::new(),
            include_stack: Vec::new(),
            pattern_count: 0,
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn compile(&mut self, document: &Document) -> Result<RelaxNg> {
        let root = document.root().ok_or_else(|| {
            parse_error("grammar document has no root element", ValidErr::NoGrammar)
        })?;

        check_rng_element(root)?;

        let start = if root.local_name() == "grammar" {
            let scope = ParseScope::root().descend(root);
            self.collect_grammar(root, &scope)?;
            self.compile_collected()?
        } else {
            // Shorthand form: the root element is itself the start pattern
            self.parse_pattern(root, &ParseScope::root())?
        };

        let defines = self.compile_defines()?;
        check_ref_cycles(&defines, &self.define_names)?;

        Ok(RelaxNg::new(start, defines, std::mem::take(&mut self.define_names)))
    }

    // ------------------------------------------------------------------
    // Grammar collection: start/define/div/include
    // ------------------------------------------------------------------

    fn collect_grammar(&mut self, grammar: &Element, scope: &ParseScope) -> Result<()> {
        for child in grammar.child_elements() {
            check_rng_element(child)?;
            let child_scope = scope.descend(child);
            match child.local_name() {
                "start" => {
                    self.starts.push(DefineDecl {
                        combine: child.get_attribute("combine").map(str::to_string),
                        body: child.clone(),
                        scope: child_scope,
                    });
                }
                "define" => self.collect_define(child, &child_scope)?,
                "div" => self.collect_grammar(child, &child_scope)?,
                "include" => self.collect_include(child, &child_scope)?,
                other => {
                    return Err(parse_error(
                        format!("unexpected element '{}' inside grammar", other),
                        ValidErr::Internal,
                    ))
                }
            }
        }
        Ok(())
    }

    fn collect_define(&mut self, define: &Element, scope: &ParseScope) -> Result<()> {
        let name = define
            .get_attribute("name")
            .ok_or_else(|| parse_error("define is missing a name", ValidErr::NoDefine))?
            .trim()
            .to_string();
        validate_ncname(&name)?;

        let slot = self.define_slot(&name)?;
        self.decls[slot].push(DefineDecl {
            combine: define.get_attribute("combine").map(str::to_string),
            body: define.clone(),
            scope: scope.clone(),
        });
        Ok(())
    }

    fn define_slot(&mut self, name: &str) -> Result<usize> {
        if let Some(slot) = self.define_names.get(name) {
            return Ok(*slot);
        }
        let slot = self.decls.len();
        self.limits.check_defines(slot + 1)?;
        self.define_names.insert(name.to_string(), slot);
        self.decls.push(Vec::new());
        Ok(slot)
    }

    fn collect_include(&mut self, include: &Element, scope: &ParseScope) -> Result<()> {
        let href = include
            .get_attribute("href")
            .ok_or_else(|| parse_error("include is missing href", ValidErr::NoGrammar))?;

        let location = self.resolve_href(href)?;
        let key = location.as_str();
        if self.include_stack.contains(&key) {
            return Err(parse_error(
                format!("include cycle through '{}'", key),
                ValidErr::NoGrammar,
            ));
        }
        self.limits.check_include_depth(self.include_stack.len() + 1)?;

        let text = self.loader.load(&location)?;
        let document = Document::parse_with_limits(text.as_bytes(), self.limits)?;
        let root = document.root().ok_or_else(|| {
            parse_error(
                format!("included grammar '{}' is empty", key),
                ValidErr::NoGrammar,
            )
        })?;
        check_rng_element(root)?;
        if root.local_name() != "grammar" {
            return Err(parse_error(
                format!("included resource '{}' is not a grammar", key),
                ValidErr::NoGrammar,
            ));
        }

        // Overriding definitions in the include element replace same-named
        // definitions from the included grammar
        let overridden: Vec<String> = include
            .child_elements()
            .filter(|e| e.local_name() == "define")
            .filter_map(|e| e.get_attribute("name").map(|n| n.trim().to_string()))
            .collect();
        let overrides_start = include
            .child_elements()
            .any(|e| e.local_name() == "start");

        for name in &overridden {
            if !grammar_defines(root, name) {
                self.warn(format!(
                    "include override '{}' matches no define in '{}'",
                    name, key
                ));
            }
        }
        if overrides_start && !grammar_has_start(root) {
            self.warn(format!("include overrides a start that '{}' does not declare", key));
        }

        let saved_base = self.base.clone();
        self.base = Some(location);
        self.include_stack.push(key);

        let included_scope = ParseScope::root().descend(root);
        let mut pruned = root.clone();
        prune_overridden(&mut pruned, &overridden, overrides_start);
        self.collect_grammar(&pruned, &included_scope)?;

        self.include_stack.pop();
        self.base = saved_base;

        // The include element's own content behaves like a div
        self.collect_grammar(include, scope)
    }

    fn resolve_href(&self, href: &str) -> Result<Location> {
        match &self.base {
            Some(base) => base.resolve(href),
            None => Location::from_str(href),
        }
    }

    // ------------------------------------------------------------------
    // Combination and body compilation
    // ------------------------------------------------------------------

    fn compile_collected(&mut self) -> Result<Pattern> {
        if self.starts.is_empty() {
            return Err(parse_error(
                "grammar has no start pattern",
                ValidErr::NoGrammar,
            ));
        }
        let starts = std::mem::take(&mut self.starts);
        self.combine_decls("start", starts)
    }

    fn compile_defines(&mut self) -> Result<Vec<Pattern>> {
        let mut defines: Vec<Pattern> = Vec::new();
        // Body compilation can register further slots through forward refs,
        // so iterate by index instead of draining
        let mut slot = 0;
        while slot < self.decls.len() {
            let occurrences = std::mem::take(&mut self.decls[slot]);
            let name = self
                .define_names
                .iter()
                .find(|(_, s)| **s == slot)
                .map(|(n, _)| n.clone())
                .unwrap_or_default();
            if occurrences.is_empty() {
                return Err(parse_error(
                    format!("reference to undefined pattern '{}'", name),
                    ValidErr::NoDefine,
                ));
            }
            defines.push(self.combine_decls(&name, occurrences)?);
            slot += 1;
        }
        Ok(defines)
    }

    /// Merge multiple occurrences of a define (or start) per their `combine`
    fn combine_decls(&mut self, name: &str, decls: Vec<DefineDecl>) -> Result<Pattern> {
        let mut combine: Option<String> = None;
        for decl in &decls {
            if let Some(c) = &decl.combine {
                match c.as_str() {
                    "choice" | "interleave" => {}
                    other => {
                        return Err(parse_error(
                            format!("invalid combine value '{}' on '{}'", other, name),
                            ValidErr::Internal,
                        ))
                    }
                }
                match &combine {
                    None => combine = Some(c.clone()),
                    Some(existing) if existing == c => {}
                    Some(existing) => {
                        return Err(parse_error(
                            format!(
                                "conflicting combine values '{}' and '{}' on '{}'",
                                existing, c, name
                            ),
                            ValidErr::Internal,
                        ))
                    }
                }
            }
        }
        if decls.len() > 1 && combine.is_none() {
            return Err(parse_error(
                format!("multiple definitions of '{}' without combine", name),
                ValidErr::Internal,
            ));
        }

        let interleave = combine.as_deref() == Some("interleave");
        let mut merged: Option<Pattern> = None;
        for decl in decls {
            let body = self.parse_children(&decl.body, &decl.scope)?;
            merged = Some(match merged {
                None => body,
                Some(acc) if interleave => Pattern::interleave(acc, body),
                Some(acc) => Pattern::choice(acc, body),
            });
        }
        merged.ok_or_else(|| {
            parse_error(format!("'{}' has no pattern", name), ValidErr::NoGrammar)
        })
    }

    // ------------------------------------------------------------------
    // Pattern compilation
    // ------------------------------------------------------------------

    /// Parse an element's pattern children as an implicit group, skipping the
    /// leading `skip` child elements (a consumed name class)
    fn parse_children_opt(
        &mut self,
        parent: &Element,
        scope: &ParseScope,
        skip: usize,
    ) -> Result<Option<Pattern>> {
        let mut merged: Option<Pattern> = None;
        for child in parent.child_elements().skip(skip) {
            let p = self.parse_pattern(child, scope)?;
            merged = Some(match merged {
                None => p,
                Some(acc) => Pattern::group(acc, p),
            });
        }
        Ok(merged)
    }

    fn parse_children(&mut self, parent: &Element, scope: &ParseScope) -> Result<Pattern> {
        self.parse_children_opt(parent, scope, 0)?.ok_or_else(|| {
            parse_error(
                format!("'{}' requires a content pattern", parent.local_name()),
                ValidErr::NoGrammar,
            )
        })
    }

    fn parse_pattern(&mut self, element: &Element, scope: &ParseScope) -> Result<Pattern> {
        check_rng_element(element)?;
        self.pattern_count += 1;
        self.limits.check_patterns(self.pattern_count)?;

        let scope = scope.descend(element);
        match element.local_name() {
            "element" => {
                let (nc, skip) = self.parse_name_class_of(element, &scope, false)?;
                let content = self
                    .parse_children_opt(element, &scope, skip)?
                    .ok_or_else(|| {
                        parse_error(
                            "element pattern requires a content pattern",
                            ValidErr::NoGrammar,
                        )
                    })?;
                Ok(Pattern::Element(nc, Box::new(content)))
            }
            "attribute" => {
                let (nc, skip) = self.parse_name_class_of(element, &scope, true)?;
                // An attribute without a content pattern accepts any text
                let content = self
                    .parse_children_opt(element, &scope, skip)?
                    .unwrap_or(Pattern::Text);
                Ok(Pattern::Attribute(nc, Box::new(content)))
            }
            "group" => self.parse_children(element, &scope),
            "choice" => self.fold_children(element, &scope, Pattern::choice),
            "interleave" => self.fold_children(element, &scope, Pattern::interleave),
            "optional" => Ok(Pattern::optional(self.parse_children(element, &scope)?)),
            "zeroOrMore" => Ok(Pattern::zero_or_more(self.parse_children(element, &scope)?)),
            "oneOrMore" => Ok(Pattern::one_or_more(self.parse_children(element, &scope)?)),
            "mixed" => Ok(Pattern::mixed(self.parse_children(element, &scope)?)),
            "list" => Ok(Pattern::List(Box::new(self.parse_children(element, &scope)?))),
            "empty" => Ok(Pattern::Empty),
            "text" => Ok(Pattern::Text),
            "notAllowed" => Ok(Pattern::NotAllowed),
            "value" => self.parse_value(element, &scope),
            "data" => self.parse_data(element, &scope),
            "ref" => {
                let name = element
                    .get_attribute("name")
                    .ok_or_else(|| parse_error("ref is missing a name", ValidErr::NoDefine))?
                    .trim()
                    .to_string();
                validate_ncname(&name)?;
                Ok(Pattern::Ref(self.define_slot(&name)?))
            }
            "externalRef" => self.parse_external_ref(element),
            "grammar" | "parentRef" => Err(parse_error(
                "nested grammars are not supported",
                ValidErr::Internal,
            )),
            other => Err(parse_error(
                format!("unknown pattern element '{}'", other),
                ValidErr::Internal,
            )),
        }
    }

    fn fold_children(
        &mut self,
        parent: &Element,
        scope: &ParseScope,
        combine: fn(Pattern, Pattern) -> Pattern,
    ) -> Result<Pattern> {
        let mut merged: Option<Pattern> = None;
        for child in parent.child_elements() {
            let p = self.parse_pattern(child, scope)?;
            merged = Some(match merged {
                None => p,
                Some(acc) => combine(acc, p),
            });
        }
        merged.ok_or_else(|| {
            parse_error(
                format!("'{}' requires at least one pattern", parent.local_name()),
                ValidErr::NoGrammar,
            )
        })
    }

    fn parse_value(&mut self, element: &Element, scope: &ParseScope) -> Result<Pattern> {
        // A value without a type uses the builtin token datatype
        let (library, name) = match element.get_attribute("type") {
            Some(type_name) => {
                let library = scope.datatype_library.clone();
                check_datatype(&library, type_name.trim())?;
                (library, type_name.trim().to_string())
            }
            None => (BUILTIN_LIBRARY.to_string(), "token".to_string()),
        };
        Ok(Pattern::Value {
            library,
            name,
            value: element.text(),
            context: element
                .namespaces
                .prefixes()
                .map(|(p, ns)| (p.to_string(), ns.to_string()))
                .collect(),
        })
    }

    fn parse_data(&mut self, element: &Element, scope: &ParseScope) -> Result<Pattern> {
        let type_name = element
            .get_attribute("type")
            .ok_or_else(|| parse_error("data is missing a type", ValidErr::UnknownType))?
            .trim()
            .to_string();
        check_datatype(&scope.datatype_library, &type_name)?;

        let mut params: Vec<Param> = Vec::new();
        let mut except: Option<Box<Pattern>> = None;
        for child in element.child_elements() {
            match child.local_name() {
                "param" => {
                    let param_name = child.get_attribute("name").ok_or_else(|| {
                        parse_error("param is missing a name", ValidErr::UnknownType)
                    })?;
                    params.push((param_name.to_string(), child.text()));
                }
                "except" => {
                    let p = self.fold_children(child, scope, Pattern::choice)?;
                    except = Some(Box::new(p));
                }
                other => {
                    return Err(parse_error(
                        format!("unexpected element '{}' inside data", other),
                        ValidErr::UnknownType,
                    ))
                }
            }
        }

        Ok(Pattern::Data {
            library: scope.datatype_library.clone(),
            name: type_name,
            params,
            except,
        })
    }

    fn parse_external_ref(&mut self, element: &Element) -> Result<Pattern> {
        let href = element
            .get_attribute("href")
            .ok_or_else(|| parse_error("externalRef is missing href", ValidErr::NoGrammar))?;

        let location = self.resolve_href(href)?;
        let key = location.as_str();
        if self.include_stack.contains(&key) {
            return Err(parse_error(
                format!("externalRef cycle through '{}'", key),
                ValidErr::NoGrammar,
            ));
        }
        self.limits.check_include_depth(self.include_stack.len() + 1)?;

        let text = self.loader.load(&location)?;
        let document = Document::parse_with_limits(text.as_bytes(), self.limits)?;
        let root = document
            .root()
            .ok_or_else(|| {
                parse_error(
                    format!("externalRef target '{}' is empty", key),
                    ValidErr::NoGrammar,
                )
            })?
            .clone();

        let saved_base = self.base.clone();
        self.base = Some(location);
        self.include_stack.push(key);

        let result = self.parse_pattern(&root, &ParseScope::root());

        self.include_stack.pop();
        self.base = saved_base;
        result
    }

    // ------------------------------------------------------------------
    // Name classes
    // ------------------------------------------------------------------

    /// Name class of an `element` or `attribute` pattern: either a `name`
    /// attribute or the first child element
    ///
    /// Returns the class and the number of leading children it consumed. An
    /// unprefixed `name` attribute on an attribute pattern only takes a
    /// namespace from an `ns` attribute written on the pattern itself, never
    /// from an inherited one; `name` child elements inherit `ns` normally.
    fn parse_name_class_of(
        &mut self,
        element: &Element,
        scope: &ParseScope,
        for_attribute: bool,
    ) -> Result<(NameClass, usize)> {
        if let Some(name) = element.get_attribute("name") {
            let default_ns = if for_attribute {
                element
                    .get_attribute("ns")
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            } else {
                scope.ns.clone()
            };
            let nc = self.resolve_name(name.trim(), element, default_ns)?;
            return Ok((nc, 0));
        }
        let nc_child = element.child_elements().next().ok_or_else(|| {
            parse_error(
                format!(
                    "'{}' has neither a name nor a name class",
                    element.local_name()
                ),
                ValidErr::ElementName,
            )
        })?;
        Ok((self.parse_name_class(nc_child, scope)?, 1))
    }

    fn parse_name_class(&mut self, element: &Element, scope: &ParseScope) -> Result<NameClass> {
        check_rng_element(element)?;
        let scope = scope.descend(element);
        match element.local_name() {
            "name" => {
                let ns = scope.ns.clone();
                self.resolve_name(element.text().trim(), element, ns)
            }
            "anyName" => Ok(NameClass::AnyName {
                except: self.parse_name_class_except(element, &scope)?,
            }),
            "nsName" => Ok(NameClass::NsName {
                ns: scope.ns.clone().unwrap_or_default(),
                except: self.parse_name_class_except(element, &scope)?,
            }),
            "choice" => {
                let mut merged: Option<NameClass> = None;
                for child in element.child_elements() {
                    let nc = self.parse_name_class(child, &scope)?;
                    merged = Some(match merged {
                        None => nc,
                        Some(acc) => NameClass::choice(acc, nc),
                    });
                }
                merged.ok_or_else(|| parse_error("empty name-class choice", ValidErr::ElementName))
            }
            other => Err(parse_error(
                format!("unknown name-class element '{}'", other),
                ValidErr::ElementName,
            )),
        }
    }

    fn parse_name_class_except(
        &mut self,
        element: &Element,
        scope: &ParseScope,
    ) -> Result<Option<Box<NameClass>>> {
        for child in element.child_elements() {
            if child.local_name() == "except" {
                let mut merged: Option<NameClass> = None;
                for grandchild in child.child_elements() {
                    let nc = self.parse_name_class(grandchild, scope)?;
                    merged = Some(match merged {
                        None => nc,
                        Some(acc) => NameClass::choice(acc, nc),
                    });
                }
                return Ok(merged.map(Box::new));
            }
        }
        Ok(None)
    }

    /// Resolve a possibly prefixed name against the document's declarations,
    /// falling back to the given namespace for unprefixed names
    fn resolve_name(
        &mut self,
        name: &str,
        element: &Element,
        default_ns: Option<String>,
    ) -> Result<NameClass> {
        let qname = if let Some((prefix, local)) = name.split_once(':') {
            validate_ncname(prefix)?;
            validate_ncname(local)?;
            let ns = element
                .namespaces
                .get_namespace(prefix)
                .ok_or_else(|| Error::Namespace(format!("Unknown prefix: {}", prefix)))?;
            QName::namespaced(ns, local)
        } else {
            validate_ncname(name)?;
            QName::new(default_ns, name)
        };
        Ok(NameClass::Name(qname))
    }
}

/// Check that a grammar element is in the RelaxNG namespace
fn check_rng_element(element: &Element) -> Result<()> {
    if element.namespace() == Some(RELAXNG_NS) {
        Ok(())
    } else {
        Err(parse_error(
            format!(
                "element '{}' is not in the RelaxNG namespace",
                element.qname
            ),
            ValidErr::NoGrammar,
        ))
    }
}

fn check_datatype(library: &str, name: &str) -> Result<()> {
    let lib = lookup_library(library).ok_or_else(|| {
        parse_error(
            format!("unknown datatype library '{}'", library),
            ValidErr::UnknownType,
        )
    })?;
    if !lib.has_type(name) {
        return Err(parse_error(
            format!("unknown datatype '{}' in library '{}'", name, library),
            ValidErr::UnknownType,
        ));
    }
    Ok(())
}

fn parse_error(message: impl Into<String>, code: ValidErr) -> Error {
    Error::Parse(ParseError::new(message).with_code(code))
}

/// Whether a grammar declares a define with the given name, recursing into div
fn grammar_defines(grammar: &Element, name: &str) -> bool {
    grammar.child_elements().any(|e| match e.local_name() {
        "define" => e
            .get_attribute("name")
            .map(|n| n.trim() == name)
            .unwrap_or(false),
        "div" => grammar_defines(e, name),
        _ => false,
    })
}

/// Whether a grammar declares a start pattern, recursing into div
fn grammar_has_start(grammar: &Element) -> bool {
    grammar.child_elements().any(|e| match e.local_name() {
        "start" => true,
        "div" => grammar_has_start(e),
        _ => false,
    })
}

/// Remove overridden definitions from an included grammar before collection
fn prune_overridden(grammar: &mut Element, overridden: &[String], overrides_start: bool) {
    use crate::documents::XmlNode;
    grammar.children.retain(|node| match node {
        XmlNode::Element(e) => match e.local_name() {
            "start" => !overrides_start,
            "define" => e
                .get_attribute("name")
                .map(|n| !overridden.contains(&n.trim().to_string()))
                .unwrap_or(true),
            _ => true,
        },
        XmlNode::Text(_) => true,
    });
    for node in &mut grammar.children {
        if let XmlNode::Element(e) = node {
            if e.local_name() == "div" {
                prune_overridden(e, overridden, overrides_start);
            }
        }
    }
}

/// Reject `ref` cycles not guarded by an `element` pattern
///
/// Such cycles would make nullable computation non-terminating, so they are
/// compile errors.
fn check_ref_cycles(defines: &[Pattern], names: &IndexMap<String, usize>) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        InProgress,
        Done,
    }

    fn walk(p: &Pattern, defines: &[Pattern], state: &mut [State]) -> std::result::Result<(), usize> {
        match p {
            // An element guard breaks the cycle: derivatives only enter its
            // body after consuming a start tag
            Pattern::Element(_, _) => Ok(()),
            Pattern::Ref(i) => visit(*i, defines, state),
            Pattern::Choice(p1, p2)
            | Pattern::Group(p1, p2)
            | Pattern::Interleave(p1, p2)
            | Pattern::After(p1, p2) => {
                walk(p1, defines, state)?;
                walk(p2, defines, state)
            }
            Pattern::OneOrMore(p1) | Pattern::List(p1) | Pattern::Attribute(_, p1) => {
                walk(p1, defines, state)
            }
            Pattern::Data {
                except: Some(ex), ..
            } => walk(ex, defines, state),
            _ => Ok(()),
        }
    }

    fn visit(i: usize, defines: &[Pattern], state: &mut [State]) -> std::result::Result<(), usize> {
        match state.get(i).copied() {
            Some(State::InProgress) => Err(i),
            Some(State::Done) | None => Ok(()),
            Some(State::Unvisited) => {
                state[i] = State::InProgress;
                walk(&defines[i], defines, state)?;
                state[i] = State::Done;
                Ok(())
            }
        }
    }

    let mut state = vec![State::Unvisited; defines.len()];
    for i in 0..defines.len() {
        if let Err(slot) = visit(i, defines, &mut state) {
            let name = names
                .iter()
                .find(|(_, s)| **s == slot)
                .map(|(n, _)| n.clone())
                .unwrap_or_default();
            return Err(parse_error(
                format!("define '{}' references itself without an intervening element", name),
                ValidErr::NoDefine,
            ));
        }
    }
    Ok(())
}
