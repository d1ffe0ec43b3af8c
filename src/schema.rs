//! Module implement per-attribute syntax descriptors and the attribute
//! registry.
//!
//! Attribute values are opaque byte-strings to the storage layer. The
//! [Syntax] descriptor supplies the canonical form and the comparison
//! used for duplicate detection, index keys and casefolding. The
//! [Schema] registry maps attribute names to their syntax; it is
//! populated externally, from well-known defaults and the
//! `@ATTRIBUTES` record, and consulted read-only during comparisons.

use std::{borrow::Cow, cmp, convert::TryFrom, result};

use crate::dn::Dn;

/// Entries carrying this flag are never replaced or removed from the
/// registry.
pub const ATTR_FLAG_FIXED: u32 = 0x1;

/// Syntax descriptor bundling canonicalization and comparison for one
/// attribute. Two values comparing equal under the syntax are the same
/// value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Syntax {
    /// Opaque byte-string with binary comparison. The built-in default.
    OctetString,
    /// Case-insensitive string, internal whitespace runs collapsed.
    DirectoryString,
    /// Signed decimal integer, compared numerically.
    Integer,
    /// Distinguished-name, compared by casefolded form.
    Dn,
    /// Object-class names compare with directory-string semantics.
    ObjectClass,
    /// Escape variant for externally supplied behavior.
    Custom {
        canonicalise: fn(&[u8]) -> Vec<u8>,
        compare: fn(&[u8], &[u8]) -> cmp::Ordering,
    },
}

impl Syntax {
    /// Canonical form of `value` under this syntax. Malformed input
    /// canonicalizes to a verbatim copy.
    pub fn canonicalise(&self, schema: &Schema, value: &[u8]) -> Vec<u8> {
        match self {
            Syntax::OctetString => value.to_vec(),
            Syntax::DirectoryString | Syntax::ObjectClass => fold_string(value),
            Syntax::Integer => match to_integer(value) {
                Some(num) => num.to_string().into_bytes(),
                None => value.to_vec(),
            },
            Syntax::Dn => match to_dn(value) {
                Some(dn) => dn.casefold(schema).into_bytes(),
                None => value.to_vec(),
            },
            Syntax::Custom { canonicalise, .. } => canonicalise(value),
        }
    }

    /// Compare `a` and `b` under this syntax, [cmp::Ordering::Equal]
    /// means the values are duplicates of each other.
    pub fn compare(&self, schema: &Schema, a: &[u8], b: &[u8]) -> cmp::Ordering {
        match self {
            Syntax::OctetString => a.cmp(b),
            Syntax::DirectoryString | Syntax::ObjectClass => {
                fold_string(a).cmp(&fold_string(b))
            }
            Syntax::Integer => match (to_integer(a), to_integer(b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => a.cmp(b),
            },
            Syntax::Dn => {
                self.canonicalise(schema, a).cmp(&self.canonicalise(schema, b))
            }
            Syntax::Custom { compare, .. } => compare(a, b),
        }
    }
}

fn fold_string(value: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(value);
    let parts: Vec<&str> = text.split_whitespace().collect();
    parts.join(" ").to_ascii_lowercase().into_bytes()
}

fn to_integer(value: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(value).ok()?;
    text.trim().parse::<i64>().ok()
}

fn to_dn(value: &[u8]) -> Option<Dn> {
    let text = std::str::from_utf8(value).ok()?;
    Dn::try_from(text).ok()
}

/// Registry entry binding an attribute name to its syntax.
///
/// Names seeded from static tables are borrowed, names loaded from the
/// `@ATTRIBUTES` record are owned copies.
#[derive(Clone, Debug)]
pub struct AttrSchema {
    name: Cow<'static, str>,
    flags: u32,
    syntax: Syntax,
}

impl AttrSchema {
    pub fn to_name(&self) -> &str {
        &self.name
    }

    pub fn to_syntax(&self) -> Syntax {
        self.syntax
    }

    pub fn is_fixed(&self) -> bool {
        (self.flags & ATTR_FLAG_FIXED) != 0
    }
}

static DEFAULT_ATTR: AttrSchema = AttrSchema {
    name: Cow::Borrowed("*"),
    flags: 0,
    syntax: Syntax::OctetString,
};

/// Registry of attribute schema entries.
///
/// Entries are sorted by case-insensitive name and no two entries share
/// a name. A wildcard entry `"*"`, if present, sorts first (ascii `*`
/// orders before alphanumerics) and acts as the default when lookup
/// misses; otherwise misses fall back to octet-string with binary
/// comparison.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    attrs: Vec<AttrSchema>,
}

const WELLKNOWN: [(&str, Syntax); 6] = [
    ("dn", Syntax::Dn),
    ("distinguishedName", Syntax::Dn),
    ("cn", Syntax::DirectoryString),
    ("dc", Syntax::DirectoryString),
    ("ou", Syntax::DirectoryString),
    ("objectClass", Syntax::ObjectClass),
];

impl Schema {
    pub fn new() -> Schema {
        Schema { attrs: vec![] }
    }

    /// Install the well known attributes.
    pub fn seed_wellknown(&mut self) {
        for (name, syntax) in WELLKNOWN.iter() {
            self.add(Cow::Borrowed(name), 0, *syntax);
        }
    }

    /// Insert an entry keeping sort order. An existing entry with the
    /// same name is replaced, unless fixed, in which case the insert is
    /// silently ignored.
    pub fn add(&mut self, name: Cow<'static, str>, flags: u32, syntax: Syntax) {
        let entry = AttrSchema { name, flags, syntax };
        match self.search(entry.to_name()) {
            Ok(off) => {
                if !self.attrs[off].is_fixed() {
                    self.attrs[off] = entry;
                }
            }
            Err(off) => self.attrs.insert(off, entry),
        }
    }

    /// Remove the entry for `name`, no-op on fixed entries and on a
    /// lookup miss.
    pub fn remove(&mut self, name: &str) {
        if let Ok(off) = self.search(name) {
            if !self.attrs[off].is_fixed() {
                self.attrs.remove(off);
            }
        }
    }

    /// Return the entry for `name`, falling back to the wildcard entry
    /// and then to the built-in default.
    pub fn lookup(&self, name: &str) -> &AttrSchema {
        match self.search(name) {
            Ok(off) => &self.attrs[off],
            Err(_) => match self.attrs.first() {
                Some(first) if first.to_name() == "*" => first,
                _ => &DEFAULT_ATTR,
            },
        }
    }

    /// Drop entries whose name was loaded at runtime, keeping fixed
    /// entries and entries with borrowed names. Called when the
    /// `@ATTRIBUTES` overrides are reloaded.
    pub(crate) fn reset_allocated(&mut self) {
        self.attrs
            .retain(|a| a.is_fixed() || matches!(a.name, Cow::Borrowed(_)));
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    fn search(&self, name: &str) -> result::Result<usize, usize> {
        self.attrs.binary_search_by(|a| name_cmp(a.to_name(), name))
    }
}

fn name_cmp(a: &str, b: &str) -> cmp::Ordering {
    let x = a.bytes().map(|c| c.to_ascii_lowercase());
    let y = b.bytes().map(|c| c.to_ascii_lowercase());
    x.cmp(y)
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod schema_test;
