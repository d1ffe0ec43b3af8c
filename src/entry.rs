//! Module implement the entry data-model and the record codec.
//!
//! An [Entry] has a distinguished-name and an ordered sequence of
//! [Element]s, each element a named, flagged, multi-valued attribute.
//! Values are opaque byte-strings at this layer, no schema
//! consultation happens while packing or unpacking.

use arbitrary::Arbitrary;
use cbordata::Cborize;

use std::{cmp, fmt, result};

use crate::{dn::Dn, schema::Schema, util, Error, Result};

/// Mask extracting the modify operation from an element's flag word.
pub const MOD_MASK: u64 = 0x3;
/// Add the supplied values to the attribute.
pub const MOD_ADD: u64 = 0x1;
/// Replace all values of the attribute with the supplied values.
pub const MOD_REPLACE: u64 = 0x2;
/// Delete the supplied values, or the whole attribute when none given.
pub const MOD_DELETE: u64 = 0x3;

const RECORD_VER: u32 = 0x00010001;

/// Element type, one named multi-valued attribute within an entry.
///
/// During modify requests the flag word carries the modify operation,
/// refer to [MOD_ADD], [MOD_REPLACE], [MOD_DELETE]. An element with no
/// values acts as a tombstone during mutation and is never persisted.
#[derive(Clone, Debug, Eq, PartialEq, Cborize, Arbitrary)]
pub struct Element {
    pub name: String,
    pub flags: u64,
    pub values: Vec<Vec<u8>>,
}

impl Element {
    const ID: u32 = RECORD_VER;

    pub fn new(name: &str, values: Vec<Vec<u8>>) -> Element {
        Element {
            name: name.to_string(),
            flags: 0,
            values,
        }
    }

    /// Same as [Element::new] with the modify operation set in the
    /// flag word.
    pub fn with_op(name: &str, op: u64, values: Vec<Vec<u8>>) -> Element {
        let mut el = Element::new(name, values);
        el.flags = op & MOD_MASK;
        el
    }

    /// Return the modify operation carried in the flag word.
    pub fn to_mod_op(&self) -> u64 {
        self.flags & MOD_MASK
    }

    /// Return the offset of the first value comparing equal to `value`
    /// under this attribute's syntax.
    pub fn find_value(&self, schema: &Schema, value: &[u8]) -> Option<usize> {
        let syntax = schema.lookup(&self.name).to_syntax();
        self.values
            .iter()
            .position(|v| syntax.compare(schema, v, value) == cmp::Ordering::Equal)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "element<{},{}>", self.name, self.values.len())
    }
}

// Packed form of an entry, excluding the name. The name is implicit
// in the record key and filled back by the caller while unpacking.
#[derive(Cborize)]
struct Record {
    elements: Vec<Element>,
}

impl Record {
    const ID: u32 = RECORD_VER;
}

/// Entry type, a single directory record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    pub dn: Dn,
    pub elements: Vec<Element>,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "entry<{},{}>", self.dn, self.elements.len())
    }
}

impl Entry {
    pub fn new(dn: Dn) -> Entry {
        Entry { dn, elements: vec![] }
    }

    /// Append `value` to the named element, creating the element when
    /// missing.
    pub fn add_value(&mut self, name: &str, value: &[u8]) -> &mut Entry {
        match self.find_element(name) {
            Some(off) => self.elements[off].values.push(value.to_vec()),
            None => {
                let el = Element::new(name, vec![value.to_vec()]);
                self.elements.push(el);
            }
        }
        self
    }

    /// Replace the named element with a single `value`, creating the
    /// element when missing.
    pub fn set_value(&mut self, name: &str, value: &[u8]) -> &mut Entry {
        match self.find_element(name) {
            Some(off) => self.elements[off].values = vec![value.to_vec()],
            None => {
                let el = Element::new(name, vec![value.to_vec()]);
                self.elements.push(el);
            }
        }
        self
    }

    /// Return the offset of the first element matching `name`,
    /// attribute names are case-insensitive.
    pub fn find_element(&self, name: &str) -> Option<usize> {
        self.elements
            .iter()
            .position(|el| el.name.eq_ignore_ascii_case(name))
    }

    /// First value of the named element, as utf8 text.
    pub fn attr_as_str(&self, name: &str) -> Option<&str> {
        let el = &self.elements[self.find_element(name)?];
        std::str::from_utf8(el.values.first()?).ok()
    }

    /// First value of the named element parsed as decimal u64, else
    /// `default`.
    pub fn attr_as_u64(&self, name: &str, default: u64) -> u64 {
        self.attr_as_str(name)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(default)
    }

    /// Pack this entry's elements into the byte-blob stored under the
    /// primary key. The name is excluded, it is implicit in the key.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let record = Record { elements: self.elements.clone() };
        util::into_cbor_bytes(record)
    }

    /// Exact inverse of [Entry::pack]. The packed form carries no name,
    /// the caller supplies it from the record key.
    pub fn unpack(dn: Dn, data: &[u8]) -> Result<Entry> {
        let record = match util::from_cbor_bytes::<Record>(data) {
            Ok((record, _)) => record,
            Err(err) => err_at!(OperationsError, msg: "corrupt record, {}", err)?,
        };
        Ok(Entry { dn, elements: record.elements })
    }
}

#[cfg(test)]
#[path = "entry_test.rs"]
mod entry_test;
