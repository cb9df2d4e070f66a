//! Limits and constraints for RelaxNG processing
//!
//! This module defines various limits to prevent resource exhaustion
//! and protect against XML attacks (e.g., billion laughs, XML bombs).

use crate::error::{Error, Result};

/// Global limits configuration
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum XML nesting depth
    pub max_xml_depth: usize,

    /// Maximum XML input size in bytes
    pub max_xml_size: usize,

    /// Maximum number of attributes per element
    pub max_attributes: usize,

    /// Maximum include/externalRef chain depth
    pub max_include_depth: usize,

    /// Maximum number of compiled patterns per grammar
    pub max_patterns: usize,

    /// Maximum number of named defines per grammar
    pub max_defines: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_depth: 1000,
            max_xml_size: 100 * 1024 * 1024, // 100 MB
            max_attributes: 1000,
            max_include_depth: 100,
            max_patterns: 100000,
            max_defines: 10000,
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_xml_depth: 100,
            max_xml_size: 10 * 1024 * 1024, // 10 MB
            max_attributes: 100,
            max_include_depth: 20,
            max_patterns: 10000,
            max_defines: 1000,
        }
    }

    /// Create permissive limits (less restrictive, use with caution)
    pub fn permissive() -> Self {
        Self {
            max_xml_depth: 10000,
            max_xml_size: 1024 * 1024 * 1024, // 1 GB
            max_attributes: 10000,
            max_include_depth: 1000,
            max_patterns: 1000000,
            max_defines: 100000,
        }
    }

    /// Check if XML depth is within limits
    pub fn check_xml_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_xml_depth {
            Err(Error::LimitExceeded(format!(
                "XML depth {} exceeds maximum {}",
                depth, self.max_xml_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if XML size is within limits
    pub fn check_xml_size(&self, size: usize) -> Result<()> {
        if size > self.max_xml_size {
            Err(Error::LimitExceeded(format!(
                "XML size {} bytes exceeds maximum {} bytes",
                size, self.max_xml_size
            )))
        } else {
            Ok(())
        }
    }

    /// Check if number of attributes is within limits
    pub fn check_attributes(&self, count: usize) -> Result<()> {
        if count > self.max_attributes {
            Err(Error::LimitExceeded(format!(
                "Attribute count {} exceeds maximum {}",
                count, self.max_attributes
            )))
        } else {
            Ok(())
        }
    }

    /// Check if include/externalRef depth is within limits
    pub fn check_include_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_include_depth {
            Err(Error::LimitExceeded(format!(
                "Include depth {} exceeds maximum {}",
                depth, self.max_include_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if compiled pattern count is within limits
    pub fn check_patterns(&self, count: usize) -> Result<()> {
        if count > self.max_patterns {
            Err(Error::LimitExceeded(format!(
                "Pattern count {} exceeds maximum {}",
                count, self.max_patterns
            )))
        } else {
            Ok(())
        }
    }

    /// Check if define count is within limits
    pub fn check_defines(&self, count: usize) -> Result<()> {
        if count > self.max_defines {
            Err(Error::LimitExceeded(format!(
                "Define count {} exceeds maximum {}",
                count, self.max_defines
            )))
        } else {
            Ok(())
        }
    }
}
