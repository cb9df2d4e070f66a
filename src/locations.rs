//! Resource location resolution
//!
//! This module handles resolution of resource locations (URLs, file paths,
//! in-memory sources) for loading grammars, including resolution of the
//! relative `href` values used by `include` and `externalRef`.

use crate::error::{Error, Result};
use std::path::PathBuf;
use url::Url;

/// Resource location - can be a URL, file path, or string identifier
#[derive(Debug, Clone)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// URL (http, https, file, etc.)
    Url(Url),
    /// In-memory source
    String(String),
}

impl Location {
    /// Create a location from a string (auto-detect type)
    pub fn from_str(s: &str) -> Result<Self> {
        // Try to parse as URL first
        if let Ok(url) = Url::parse(s) {
            if url.scheme() == "file" {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::Resource(format!("Invalid file URL: {}", s)))?;
                return Ok(Location::Path(path));
            }
            return Ok(Location::Url(url));
        }

        Ok(Location::Path(PathBuf::from(s)))
    }

    /// Get the location as a string
    pub fn as_str(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().to_string(),
            Location::Url(u) => u.to_string(),
            Location::String(_) => "<memory>".to_string(),
        }
    }

    /// Check if this is a remote location (URL)
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }

    /// Check if this is a local file
    pub fn is_file(&self) -> bool {
        matches!(self, Location::Path(_))
    }

    /// Resolve a relative href against this location
    ///
    /// Used for `include` and `externalRef`: a relative href resolves against
    /// the directory of the including grammar.
    pub fn resolve(&self, href: &str) -> Result<Location> {
        // Absolute references stand on their own
        if let Ok(url) = Url::parse(href) {
            if url.scheme() == "file" {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::Resource(format!("Invalid file URL: {}", href)))?;
                return Ok(Location::Path(path));
            }
            return Ok(Location::Url(url));
        }

        match self {
            Location::Path(base) => {
                let dir = base.parent().unwrap_or_else(|| std::path::Path::new("."));
                Ok(Location::Path(dir.join(href)))
            }
            Location::Url(base) => {
                let joined = base
                    .join(href)
                    .map_err(|e| Error::Resource(format!("Cannot resolve '{}': {}", href, e)))?;
                Ok(Location::Url(joined))
            }
            Location::String(_) => {
                // In-memory grammars have no base to resolve against
                Ok(Location::Path(PathBuf::from(href)))
            }
        }
    }
}
