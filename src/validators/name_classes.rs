//! RelaxNG name classes
//!
//! A name class decides which qualified names an `element` or `attribute`
//! pattern accepts: a single name, any name in a namespace, any name at all,
//! a choice of name classes, each optionally with exceptions.

use crate::namespaces::QName;
use std::fmt;

/// Name class of an element or attribute pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameClass {
    /// Any name, minus an optional exception (`anyName`)
    AnyName {
        /// Names excluded from the class
        except: Option<Box<NameClass>>,
    },
    /// Any name in a specific namespace, minus an optional exception (`nsName`)
    NsName {
        /// Namespace URI ("" for no namespace)
        ns: String,
        /// Names excluded from the class
        except: Option<Box<NameClass>>,
    },
    /// Exactly one qualified name (`name`)
    Name(QName),
    /// Union of two name classes (`choice`)
    Choice(Box<NameClass>, Box<NameClass>),
}

impl NameClass {
    /// Name class accepting any name
    pub fn any() -> Self {
        NameClass::AnyName { except: None }
    }

    /// Name class accepting one specific name
    pub fn name(qname: QName) -> Self {
        NameClass::Name(qname)
    }

    /// Name class accepting any name in a namespace
    pub fn ns_name(ns: impl Into<String>) -> Self {
        NameClass::NsName {
            ns: ns.into(),
            except: None,
        }
    }

    /// Union of two name classes
    pub fn choice(a: NameClass, b: NameClass) -> Self {
        NameClass::Choice(Box::new(a), Box::new(b))
    }

    /// Check whether a qualified name belongs to this class
    pub fn contains(&self, qname: &QName) -> bool {
        match self {
            NameClass::AnyName { except } => match except {
                Some(e) => !e.contains(qname),
                None => true,
            },
            NameClass::NsName { ns, except } => {
                if qname.namespace_or_empty() != ns {
                    return false;
                }
                match except {
                    Some(e) => !e.contains(qname),
                    None => true,
                }
            }
            NameClass::Name(expected) => {
                expected.local_name == qname.local_name
                    && expected.namespace_or_empty() == qname.namespace_or_empty()
            }
            NameClass::Choice(a, b) => a.contains(qname) || b.contains(qname),
        }
    }

    /// Check whether this class names exactly one QName
    pub fn is_single_name(&self) -> bool {
        matches!(self, NameClass::Name(_))
    }
}

impl fmt::Display for NameClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameClass::AnyName { except: None } => write!(f, "*"),
            NameClass::AnyName { except: Some(e) } => write!(f, "* - ({})", e),
            NameClass::NsName { ns, except: None } => write!(f, "{{{}}}*", ns),
            NameClass::NsName { ns, except: Some(e) } => write!(f, "{{{}}}* - ({})", ns, e),
            NameClass::Name(qname) => write!(f, "{}", qname),
            NameClass::Choice(a, b) => write!(f, "{} | {}", a, b),
        }
    }
}
