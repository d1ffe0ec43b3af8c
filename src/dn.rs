//! Module implement distinguished-names and the primary record-key
//! encoding.

use std::{convert::TryFrom, fmt, result};

use crate::{schema::Schema, Error, Result};

/// Special record holding the sequence-number and modify-timestamp.
pub const BASEINFO: &str = "@BASEINFO";
/// Special record holding per-attribute syntax overrides.
pub const ATTRIBUTES: &str = "@ATTRIBUTES";
/// Special record declaring the indexed attributes.
pub const INDEXLIST: &str = "@INDEXLIST";
/// Key prefix reserved for index records.
pub const INDEX: &str = "@INDEX";

/// Single `attr=value` component of a distinguished-name. Attribute
/// names are case-insensitive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rdn {
    pub attr: String,
    pub value: String,
}

impl Rdn {
    pub fn new(attr: &str, value: &str) -> Rdn {
        Rdn {
            attr: attr.to_string(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}={}", self.attr, self.value)
    }
}

/// Dn type identify a directory entry.
///
/// Names whose first component begin with `@` are special, reserved
/// for metadata and index records. Special names pass through key
/// encoding verbatim, ordinary names are casefolded, refer to
/// [Dn::casefold].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Dn {
    Special(String),
    Rdns(Vec<Rdn>),
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Dn::Special(name) => write!(f, "{}", name),
            Dn::Rdns(rdns) => {
                let parts: Vec<String> = rdns.iter().map(|r| r.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

impl TryFrom<&str> for Dn {
    type Error = Error;

    fn try_from(text: &str) -> Result<Dn> {
        if text.starts_with('@') {
            return Ok(Dn::Special(text.to_string()));
        } else if text.is_empty() {
            return Ok(Dn::Rdns(vec![]));
        }

        let mut rdns = vec![];
        for comp in text.split(',') {
            let comp = comp.trim_start();
            match comp.find('=') {
                Some(n) if n > 0 => {
                    rdns.push(Rdn::new(comp[..n].trim(), &comp[n + 1..]))
                }
                Some(_) | None => {
                    err_at!(InvalidInput, msg: "invalid dn component {:?}", comp)?
                }
            }
        }

        Ok(Dn::Rdns(rdns))
    }
}

impl Dn {
    /// Return whether this name is reserved for metadata records.
    pub fn is_special(&self) -> bool {
        matches!(self, Dn::Special(_))
    }

    /// Return whether this name is the special record `name`.
    pub fn check_special(&self, name: &str) -> bool {
        match self {
            Dn::Special(s) => s == name,
            Dn::Rdns(_) => false,
        }
    }

    /// Casefolded form of this name. Attribute names are folded to ascii
    /// lower-case and values are canonicalized through the attribute's
    /// syntax. Special names are returned verbatim.
    ///
    /// Two names folding to the same string address the same entry, this
    /// is the sole definition of name equality used by the backend.
    pub fn casefold(&self, schema: &Schema) -> String {
        match self {
            Dn::Special(name) => name.clone(),
            Dn::Rdns(rdns) => {
                let parts: Vec<String> = rdns
                    .iter()
                    .map(|rdn| {
                        let syntax = schema.lookup(&rdn.attr).to_syntax();
                        let value = syntax.canonicalise(schema, rdn.value.as_bytes());
                        format!(
                            "{}={}",
                            rdn.attr.to_ascii_lowercase(),
                            String::from_utf8_lossy(&value)
                        )
                    })
                    .collect();
                parts.join(",")
            }
        }
    }

    /// Encode this name into its primary record key,
    /// `"DN=" + casefold + NUL`. The trailing NUL octet is part of
    /// the key.
    pub fn to_primary_key(&self, schema: &Schema) -> Vec<u8> {
        let mut key = "DN=".as_bytes().to_vec();
        key.extend_from_slice(self.casefold(schema).as_bytes());
        key.push(0);
        key
    }

    /// Return the parent name, obtained by dropping the leading
    /// component. Special names and names with less than two components
    /// have no parent.
    pub fn to_parent(&self) -> Option<Dn> {
        match self {
            Dn::Rdns(rdns) if rdns.len() >= 2 => Some(Dn::Rdns(rdns[1..].to_vec())),
            _ => None,
        }
    }

    /// Return whether `self` and `other` fold to the same key, i.e.
    /// whether they address the same entry.
    pub fn eq_fold(&self, other: &Dn, schema: &Schema) -> bool {
        self.casefold(schema) == other.casefold(schema)
    }
}

#[cfg(test)]
#[path = "dn_test.rs"]
mod dn_test;
