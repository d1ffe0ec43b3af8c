//! Module implement loading of the schema-affecting special records.
//!
//! Three special records shape the backend's behavior, `@BASEINFO`
//! carries the sequence-number, `@ATTRIBUTES` carries per-attribute
//! syntax overrides and `@INDEXLIST` declares the indexed attributes.
//! The [Cache] is consulted before every mutation and search, and
//! reloads itself whenever the store's sequence number says any record
//! might have changed underneath it.

use chrono::Utc;
use log::{debug, warn};

use std::borrow::Cow;

use crate::{
    dn::{self, Dn},
    entry::Entry,
    schema::{Schema, Syntax},
    store::{SetFlag, Store},
    util, Result,
};

/// Attribute within `@INDEXLIST` listing the indexed attributes.
pub const IDXATTR: &str = "@IDXATTR";
/// Attribute within `@INDEXLIST` enabling the one-level index.
pub const IDXONE: &str = "@IDXONE";
/// Attribute within `@BASEINFO` holding the mutation counter.
pub const SEQUENCE_NUMBER: &str = "sequenceNumber";
/// Attribute within `@BASEINFO` holding the last mutation time.
pub const MOD_TIMESTAMP: &str = "modifyTimestamp";

/// Map an `@ATTRIBUTES` flag value to the syntax it selects.
pub fn to_flag_syntax(value: &[u8]) -> Option<Syntax> {
    let text = std::str::from_utf8(value).ok()?;
    if text.eq_ignore_ascii_case("CASE_INSENSITIVE") {
        Some(Syntax::DirectoryString)
    } else if text.eq_ignore_ascii_case("INTEGER") {
        Some(Syntax::Integer)
    } else if text.eq_ignore_ascii_case("CASE_SENSITIVE") {
        Some(Syntax::OctetString)
    } else if text.eq_ignore_ascii_case("BINARY") {
        Some(Syntax::OctetString)
    } else {
        None
    }
}

/// Cache over the schema-affecting special records.
pub struct Cache {
    pub(crate) schema: Schema,
    indexed: Vec<String>, // casefolded attribute names, sorted
    one_level: bool,
    loaded_seqno: Option<u64>,
}

impl Default for Cache {
    fn default() -> Cache {
        Cache::new()
    }
}

impl Cache {
    pub fn new() -> Cache {
        let mut schema = Schema::new();
        schema.seed_wellknown();
        Cache {
            schema,
            indexed: vec![],
            one_level: false,
            loaded_seqno: None,
        }
    }

    pub fn as_schema(&self) -> &Schema {
        &self.schema
    }

    /// Return whether `name` is declared in `@INDEXLIST`.
    pub fn is_indexed(&self, name: &str) -> bool {
        self.indexed.binary_search(&name.to_ascii_lowercase()).is_ok()
    }

    /// Return whether the one-level, parent linkage, index is enabled.
    pub fn has_one_level(&self) -> bool {
        self.one_level
    }

    pub fn to_indexed(&self) -> Vec<String> {
        self.indexed.clone()
    }

    /// Reload the special records when the store changed since the last
    /// load. Missing `@BASEINFO` is created on a writable store. Fixed
    /// schema entries survive the reload.
    pub fn load(&mut self, store: &mut Store) -> Result<()> {
        if self.loaded_seqno == Some(store.to_seqno()) {
            return Ok(());
        }

        self.init_baseinfo(store)?;
        self.load_attributes(store)?;
        self.load_indexlist(store)?;

        self.loaded_seqno = Some(store.to_seqno());
        debug!(
            target: "cache ",
            "loaded seqno:{} schema:{} indexed:{}",
            store.to_seqno(), self.schema.len(), self.indexed.len()
        );

        Ok(())
    }

    fn init_baseinfo(&self, store: &mut Store) -> Result<()> {
        let baseinfo = Dn::Special(dn::BASEINFO.to_string());
        let key = baseinfo.to_primary_key(&self.schema);
        if store.get(&key).is_none() && !store.is_read_only() {
            let mut entry = Entry::new(baseinfo);
            entry.set_value(SEQUENCE_NUMBER, b"0");
            let now = util::to_generalized_time(Utc::now());
            entry.set_value(MOD_TIMESTAMP, now.as_bytes());
            store.set(key, entry.pack()?, SetFlag::Insert)?;
        }
        Ok(())
    }

    fn load_attributes(&mut self, store: &mut Store) -> Result<()> {
        self.schema.reset_allocated();

        let entry = match read_special(store, &self.schema, dn::ATTRIBUTES)? {
            Some(entry) => entry,
            None => return Ok(()),
        };
        for el in entry.elements.iter() {
            let mut syntax = None;
            for value in el.values.iter() {
                match to_flag_syntax(value) {
                    Some(s) => syntax = Some(s),
                    None => warn!(
                        target: "cache ",
                        "@ATTRIBUTES {}, unrecognized flags {:?}",
                        el.name,
                        String::from_utf8_lossy(value)
                    ),
                }
            }
            if let Some(syntax) = syntax {
                self.schema.add(Cow::Owned(el.name.clone()), 0, syntax);
            }
        }

        Ok(())
    }

    fn load_indexlist(&mut self, store: &mut Store) -> Result<()> {
        self.indexed = vec![];
        self.one_level = false;

        let entry = match read_special(store, &self.schema, dn::INDEXLIST)? {
            Some(entry) => entry,
            None => return Ok(()),
        };
        if let Some(off) = entry.find_element(IDXATTR) {
            self.indexed = entry.elements[off]
                .values
                .iter()
                .map(|v| String::from_utf8_lossy(v).to_ascii_lowercase())
                .collect();
            self.indexed.sort();
            self.indexed.dedup();
        }
        self.one_level = entry.find_element(IDXONE).is_some();

        Ok(())
    }
}

fn read_special(store: &Store, schema: &Schema, name: &str) -> Result<Option<Entry>> {
    let dn = Dn::Special(name.to_string());
    match store.get(&dn.to_primary_key(schema)) {
        Some(data) => Ok(Some(Entry::unpack(dn, &data)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;
