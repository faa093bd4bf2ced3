//! Message catalog and templated field decoding.
//!
//! A catalog maps template names to message text. `decode` substitutes
//! `%<key>` tokens with the named bag entry (dotted paths descend nested
//! bags); a token that does not resolve to a scalar expands to the empty
//! string. `%%` is a literal percent sign.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::render::scalar_text;
use crate::{NvBag, NvValue};

#[derive(Debug)]
pub enum MsgError {
    UnknownTemplate { name: String },
    Catalog { why: String },
}

impl std::fmt::Display for MsgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MsgError::UnknownTemplate { name } => {
                write!(f, "unknown message template {name:?}")
            }
            MsgError::Catalog { why } => write!(f, "message catalog: {why}"),
        }
    }
}

impl std::error::Error for MsgError {}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    templates: BTreeMap<String, String>,
}

/// Template name -> message text.
#[derive(Debug, Default)]
pub struct MsgCatalog {
    templates: BTreeMap<String, String>,
}

impl MsgCatalog {
    /// Load a catalog from a JSON file of the form
    /// `{"templates": {"name": "text with %<tokens>"}}`.
    pub fn load(path: &Path) -> Result<Self, MsgError> {
        let bytes = std::fs::read(path).map_err(|err| MsgError::Catalog {
            why: format!("read {}: {err}", path.display()),
        })?;
        let file: CatalogFile =
            serde_json::from_slice(&bytes).map_err(|err| MsgError::Catalog {
                why: format!("parse {}: {err}", path.display()),
            })?;
        Ok(Self {
            templates: file.templates,
        })
    }

    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            templates: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// Resolve `name` and substitute its tokens from `bag`.
    pub fn decode(&self, bag: &NvBag, name: &str) -> Result<String, MsgError> {
        let template = self.lookup(name).ok_or_else(|| MsgError::UnknownTemplate {
            name: name.to_string(),
        })?;
        Ok(expand(template, bag))
    }
}

fn expand(template: &str, bag: &NvBag) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pct) = rest.find('%') {
        out.push_str(&rest[..pct]);
        let after = &rest[pct + 1..];
        if let Some(stripped) = after.strip_prefix('%') {
            out.push('%');
            rest = stripped;
        } else if let Some(body) = after.strip_prefix('<') {
            match body.find('>') {
                Some(end) => {
                    out.push_str(&token_text(&body[..end], bag));
                    rest = &body[end + 1..];
                }
                // Unterminated token: nothing more to substitute.
                None => return out,
            }
        } else {
            out.push('%');
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

fn token_text(key: &str, bag: &NvBag) -> String {
    match bag.lookup_path(key) {
        Some(NvValue::Bag(_)) | None => String::new(),
        Some(scalar) => scalar_text(scalar),
    }
}
