//! Module implement the attribute-level inverted index.
//!
//! For every indexed `(attribute, value)` pair a record keyed
//! `@INDEX:<attr>:<canonical-value>` holds the ordered list of entry
//! names carrying that value. Index records are ordinary packed
//! entries with a single [IDX] element, the list collapses away with
//! its last name. Special records are never indexed.

use log::info;

use std::convert::TryFrom;

use crate::{
    cache::{Cache, IDXONE},
    dn::{self, Dn},
    entry::{Element, Entry},
    schema::Schema,
    store::{SetFlag, Store},
    Error, Result,
};

/// Attribute within an index record holding the name list.
pub const IDX: &str = "@IDX";

/// Add `entry`'s name to the index record of every indexed attribute
/// value. A name already listed is not appended again.
pub fn index_add(store: &mut Store, cache: &Cache, entry: &Entry) -> Result<()> {
    if entry.dn.is_special() {
        return Ok(());
    }
    for el in entry.elements.iter() {
        if !cache.is_indexed(&el.name) {
            continue;
        }
        for value in el.values.iter() {
            let idn = to_index_dn(cache, &el.name, value);
            add_to(store, cache, &idn, &entry.dn)?;
        }
    }
    Ok(())
}

/// Inverse of [index_add], removing `entry`'s name from every affected
/// index record.
pub fn index_del(store: &mut Store, cache: &Cache, entry: &Entry) -> Result<()> {
    if entry.dn.is_special() {
        return Ok(());
    }
    for el in entry.elements.iter() {
        if !cache.is_indexed(&el.name) {
            continue;
        }
        for value in el.values.iter() {
            let idn = to_index_dn(cache, &el.name, value);
            del_from(store, cache, &idn, &entry.dn)?;
        }
    }
    Ok(())
}

/// Remove `dn` from the single index record for value `off` of
/// element `el`. Used by modify-delete, which retires values one at a
/// time.
pub fn index_del_value(
    store: &mut Store,
    cache: &Cache,
    dn: &Dn,
    el: &Element,
    off: usize,
) -> Result<()> {
    if dn.is_special() || !cache.is_indexed(&el.name) {
        return Ok(());
    }
    let value = match el.values.get(off) {
        Some(value) => value,
        None => err_at!(Fatal, msg: "index_del_value {} {}", el.name, off)?,
    };
    let idn = to_index_dn(cache, &el.name, value);
    del_from(store, cache, &idn, dn)
}

/// Maintain the one-level, parent linkage, index for `entry`.
pub fn index_one(store: &mut Store, cache: &Cache, entry: &Entry, add: bool) -> Result<()> {
    if !cache.has_one_level() || entry.dn.is_special() {
        return Ok(());
    }
    let parent = match entry.dn.to_parent() {
        Some(parent) => parent,
        None => return Ok(()),
    };
    let idn = Dn::Special(format!(
        "{}:{}:{}",
        dn::INDEX,
        IDXONE,
        parent.casefold(cache.as_schema())
    ));
    match add {
        true => add_to(store, cache, &idn, &entry.dn),
        false => del_from(store, cache, &idn, &entry.dn),
    }
}

/// Point probe, return the names carrying `value` for attribute
/// `attr`. A missing index record yields the empty list.
pub fn index_probe(
    store: &Store,
    cache: &Cache,
    attr: &str,
    value: &[u8],
) -> Result<Vec<Dn>> {
    let idn = to_index_dn(cache, attr, value);
    let key = idn.to_primary_key(cache.as_schema());
    let record = match store.get(&key) {
        Some(data) => Entry::unpack(idn, &data)?,
        None => return Ok(vec![]),
    };

    let mut dns = vec![];
    if let Some(off) = record.find_element(IDX) {
        for value in record.elements[off].values.iter() {
            let text = match std::str::from_utf8(value) {
                Ok(text) => text,
                Err(_) => err_at!(Fatal, msg: "corrupt index record for {}", attr)?,
            };
            dns.push(Dn::try_from(text)?);
        }
    }
    Ok(dns)
}

/// Drop every index record and rebuild from a full scan of the
/// ordinary records. Invoked after `@ATTRIBUTES` or `@INDEXLIST`
/// change.
pub fn reindex(store: &mut Store, cache: &Cache) -> Result<()> {
    let index_prefix = format!("DN={}:", dn::INDEX).into_bytes();
    let mut n_dropped = 0;
    for (key, _value) in store.to_items().into_iter() {
        if key.starts_with(&index_prefix) {
            store.delete(&key)?;
            n_dropped += 1;
        }
    }

    let mut n_indexed = 0;
    for (key, value) in store.to_items().into_iter() {
        let entry_dn = match to_record_dn(&key) {
            Some(entry_dn) => entry_dn?,
            None => continue,
        };
        let entry = Entry::unpack(entry_dn, &value)?;
        index_add(store, cache, &entry)?;
        index_one(store, cache, &entry, true)?;
        n_indexed += 1;
    }

    info!(
        target: "index ",
        "reindexed {} records, dropped {} index records", n_indexed, n_dropped
    );
    Ok(())
}

// Recover the, casefolded, name from a primary record key. Special
// records yield None.
fn to_record_dn(key: &[u8]) -> Option<Result<Dn>> {
    if !key.starts_with(b"DN=") || key.last() != Some(&0) {
        return None;
    }
    let text = std::str::from_utf8(&key[3..key.len() - 1]).ok()?;
    if text.starts_with('@') {
        return None;
    }
    Some(Dn::try_from(text))
}

fn to_index_dn(cache: &Cache, attr: &str, value: &[u8]) -> Dn {
    let schema = cache.as_schema();
    let canon = schema.lookup(attr).to_syntax().canonicalise(schema, value);
    Dn::Special(format!(
        "{}:{}:{}",
        dn::INDEX,
        attr.to_ascii_lowercase(),
        String::from_utf8_lossy(&canon)
    ))
}

fn matches_dn(value: &[u8], dn: &Dn, schema: &Schema) -> bool {
    match std::str::from_utf8(value).ok().and_then(|s| Dn::try_from(s).ok()) {
        Some(d) => d.eq_fold(dn, schema),
        None => false,
    }
}

fn add_to(store: &mut Store, cache: &Cache, idn: &Dn, dn: &Dn) -> Result<()> {
    let schema = cache.as_schema();
    let key = idn.to_primary_key(schema);
    let mut record = match store.get(&key) {
        Some(data) => Entry::unpack(idn.clone(), &data)?,
        None => Entry::new(idn.clone()),
    };

    let off = match record.find_element(IDX) {
        Some(off) => off,
        None => {
            record.elements.push(Element::new(IDX, vec![]));
            record.elements.len() - 1
        }
    };
    let el = &mut record.elements[off];
    if el.values.iter().any(|v| matches_dn(v, dn, schema)) {
        return Ok(());
    }
    el.values.push(dn.to_string().into_bytes());

    store.set(key, record.pack()?, SetFlag::Replace)
}

fn del_from(store: &mut Store, cache: &Cache, idn: &Dn, dn: &Dn) -> Result<()> {
    let schema = cache.as_schema();
    let key = idn.to_primary_key(schema);
    let mut record = match store.get(&key) {
        Some(data) => Entry::unpack(idn.clone(), &data)?,
        None => return Ok(()),
    };

    match record.find_element(IDX) {
        Some(off) => {
            let el = &mut record.elements[off];
            el.values.retain(|v| !matches_dn(v, dn, schema));
            match el.values.is_empty() {
                true => store.delete(&key),
                false => store.set(key, record.pack()?, SetFlag::Replace),
            }
        }
        None => store.delete(&key),
    }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
