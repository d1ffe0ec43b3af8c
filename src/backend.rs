//! Module implement the backend, translating directory operations
//! into key,value reads and writes.
//!
//! The [Backend] owns the [Store][crate::store::Store] and the
//! [Cache][crate::cache::Cache], routes operation requests, applies
//! add/modify/delete/rename semantics over the record and its index
//! entries and keeps the `@BASEINFO` sequence number ticking. Every
//! mutation runs inside a transaction, opened by the caller or by the
//! dispatcher, so a partial failure never reaches the file.

use chrono::Utc;
use log::{debug, error};

use std::ffi;

use crate::{
    cache::{self, Cache},
    dn::{self, Dn},
    entry::{self, Element, Entry},
    index,
    store::{self, Config, SetFlag, Store},
    util, Error, Result,
};

/// Open the store read-only, mutations fail with insufficient-access.
pub const FLG_RDONLY: u32 = 0x1;
/// Relax the store's fsync discipline.
pub const FLG_NOSYNC: u32 = 0x2;
/// Disable memory-mapped reads.
pub const FLG_NOMMAP: u32 = 0x4;

/// Variants of the sequence-number query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeqType {
    /// Highest committed sequence number.
    HighestSeq,
    /// Sequence number the next mutation would commit. Nothing is
    /// persisted.
    Next,
    /// Highest modification time, in seconds since UNIX epoch.
    HighestTimestamp,
}

/// Request control. The backend recognizes none, any control flagged
/// critical fails the request.
#[derive(Clone, Debug)]
pub struct Control {
    pub oid: String,
    pub critical: bool,
}

/// Operations routed through [Backend::request].
#[derive(Clone, Debug)]
pub enum Op {
    Add(Entry),
    Modify(Entry),
    Delete(Dn),
    Rename(Dn, Dn),
    SequenceNumber(SeqType),
    /// Extension escape, always fails with operations-error.
    Extended(String),
}

/// Request envelope handed to [Backend::request].
#[derive(Clone, Debug)]
pub struct Request {
    pub op: Op,
    pub controls: Vec<Control>,
}

impl Request {
    pub fn new(op: Op) -> Request {
        Request { op, controls: vec![] }
    }
}

/// Completion callback, invoked exactly once per dispatched mutation.
/// Mutations complete with no message.
pub type Callback = Box<dyn FnMut(Option<&Entry>)>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandleState {
    Init,
    Done,
}

/// Handle for a dispatched request.
///
/// All operations complete synchronously relative to the caller, the
/// handle exists so callers can adopt a uniform waiting contract.
#[derive(Clone, Debug)]
pub struct Handle {
    pub state: HandleState,
    status: Result<()>,
    seq_num: Option<u64>,
}

impl Handle {
    fn new() -> Handle {
        Handle {
            state: HandleState::Init,
            status: Ok(()),
            seq_num: None,
        }
    }

    /// Return the stored status.
    pub fn wait(&self) -> Result<()> {
        self.status.clone()
    }

    /// Result of a sequence-number request.
    pub fn to_seq_num(&self) -> Option<u64> {
        self.seq_num
    }
}

/// Backend type, implement the directory operations over a single-file
/// key,value store.
pub struct Backend {
    store: Store,
    cache: Cache,
    in_transaction: usize,
}

impl Backend {
    /// Connect to the store at `url`, either `tdb://<path>` or a bare
    /// path. The store file is created when missing, unless opened
    /// with [FLG_RDONLY].
    pub fn connect(url: &str, flags: u32) -> Result<Backend> {
        let path = store::to_store_path(url)?;
        let mut config = Config::new(ffi::OsStr::new(&path));
        config
            .set_read_only((flags & FLG_RDONLY) != 0)
            .set_nosync((flags & FLG_NOSYNC) != 0)
            .set_nommap((flags & FLG_NOMMAP) != 0);
        let mut store = Store::open(config)?;

        let mut cache = Cache::new();
        cache.load(&mut store)?;
        debug!(target: "backnd", "connected {:?} flags:{:#x}", url, flags);

        Ok(Backend { store, cache, in_transaction: 0 })
    }

    /// Dispatch `req` and return its completed handle. Mutations
    /// arriving outside a transaction run in their own.
    pub fn request(&mut self, req: Request, mut callback: Option<Callback>) -> Handle {
        let mut handle = Handle::new();

        handle.status = match check_critical_controls(&req.controls) {
            Err(err) => Err(err),
            Ok(()) => match req.op {
                Op::Add(msg) => self.dispatch_write(&mut callback, |db| {
                    db.add_internal(&msg) //
                }),
                Op::Modify(msg) => self.dispatch_write(&mut callback, |db| {
                    db.modify_internal(&msg) //
                }),
                Op::Delete(dnv) => self.dispatch_write(&mut callback, |db| {
                    db.delete_internal(&dnv) //
                }),
                Op::Rename(old_dn, new_dn) => self.dispatch_write(&mut callback, |db| {
                    db.rename_internal(&old_dn, &new_dn)
                }),
                Op::SequenceNumber(typ) => match self.sequence_number(typ) {
                    Ok(num) => {
                        handle.seq_num = Some(num);
                        Ok(())
                    }
                    Err(err) => Err(err),
                },
                Op::Extended(name) => {
                    err_at!(OperationsError, msg: "unsupported request {:?}", name)
                }
            },
        };
        handle.state = HandleState::Done;
        handle
    }

    /// Add a new entry, fails with entry-already-exists when the name
    /// is taken.
    pub fn add(&mut self, msg: &Entry) -> Result<()> {
        self.in_txn(|db| db.add_internal(msg))
    }

    /// Apply modify operations to the entry under `msg.dn`. Each
    /// element carries one of the modify flags, refer to
    /// [entry::MOD_ADD], [entry::MOD_REPLACE], [entry::MOD_DELETE].
    pub fn modify(&mut self, msg: &Entry) -> Result<()> {
        self.in_txn(|db| db.modify_internal(msg))
    }

    /// Delete the entry under `dn`.
    pub fn delete(&mut self, dnv: &Dn) -> Result<()> {
        self.in_txn(|db| db.delete_internal(dnv))
    }

    /// Rename the entry under `old_dn` to `new_dn`.
    pub fn rename(&mut self, old_dn: &Dn, new_dn: &Dn) -> Result<()> {
        self.in_txn(|db| db.rename_internal(old_dn, new_dn))
    }

    /// Point lookup, fetch the entry stored under `dn`.
    pub fn search_dn(&mut self, dnv: &Dn) -> Result<Entry> {
        self.cache.load(&mut self.store)?;
        let key = dnv.to_primary_key(&self.cache.schema);
        match self.store.get(&key) {
            Some(data) => Entry::unpack(dnv.clone(), &data),
            None => err_at!(NoSuchObject, msg: "{}", dnv),
        }
    }

    /// Point index probe, return the names carrying `value` for the
    /// indexed attribute `attr`.
    pub fn index_probe(&mut self, attr: &str, value: &[u8]) -> Result<Vec<Dn>> {
        self.cache.load(&mut self.store)?;
        index::index_probe(&self.store, &self.cache, attr, value)
    }

    /// Sequence-number query over `@BASEINFO`. A missing record reads
    /// as zero, never an error.
    pub fn sequence_number(&mut self, typ: SeqType) -> Result<u64> {
        let baseinfo = Dn::Special(dn::BASEINFO.to_string());
        let key = baseinfo.to_primary_key(&self.cache.schema);
        let msg = match self.store.get(&key) {
            Some(data) => Entry::unpack(baseinfo, &data)?,
            None => return Ok(0),
        };

        let num = match typ {
            SeqType::HighestSeq => msg.attr_as_u64(cache::SEQUENCE_NUMBER, 0),
            SeqType::Next => msg.attr_as_u64(cache::SEQUENCE_NUMBER, 0) + 1,
            SeqType::HighestTimestamp => match msg.attr_as_str(cache::MOD_TIMESTAMP) {
                Some(text) => util::parse_generalized_time(text).unwrap_or(0),
                None => 0,
            },
        };
        Ok(num)
    }

    /// Begin a transaction on the underlying store, may be nested.
    pub fn start_transaction(&mut self) -> Result<()> {
        self.store.begin()?;
        self.in_transaction += 1;
        Ok(())
    }

    /// Commit the innermost transaction.
    pub fn end_transaction(&mut self) -> Result<()> {
        match self.in_transaction {
            0 => err_at!(Fatal, msg: "end_transaction without start"),
            _ => {
                self.in_transaction -= 1;
                self.store.commit()
            }
        }
    }

    /// Cancel the innermost transaction, undoing its writes.
    pub fn del_transaction(&mut self) -> Result<()> {
        match self.in_transaction {
            0 => err_at!(Fatal, msg: "del_transaction without start"),
            _ => {
                self.in_transaction -= 1;
                self.store.cancel()
            }
        }
    }

    fn dispatch_write<F>(&mut self, callback: &mut Option<Callback>, f: F) -> Result<()>
    where
        F: FnOnce(&mut Backend) -> Result<()>,
    {
        let res = self.in_txn(f);
        if let Some(cb) = callback.as_mut() {
            cb(None)
        }
        res
    }

    fn in_txn<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Backend) -> Result<()>,
    {
        if self.in_transaction > 0 {
            return f(self);
        }

        self.start_transaction()?;
        match f(self) {
            Ok(()) => self.end_transaction(),
            Err(err) => {
                if let Err(derr) = self.del_transaction() {
                    error!(target: "backnd", "rollback failed, {}", derr);
                }
                Err(err)
            }
        }
    }

    // Store `msg` under its primary key and index it. When indexing
    // fails the primary record is removed again, record and index
    // never drift.
    fn store_record(&mut self, msg: &Entry, flag: SetFlag) -> Result<()> {
        let key = msg.dn.to_primary_key(&self.cache.schema);
        let data = msg.pack()?;
        self.store.set(key.clone(), data, flag)?;

        if let Err(err) = index::index_add(&mut self.store, &self.cache, msg) {
            self.store.delete(&key).ok();
            return Err(err);
        }
        Ok(())
    }

    fn add_internal(&mut self, msg: &Entry) -> Result<()> {
        self.check_special_dn(msg)?;
        self.cache.load(&mut self.store)?;

        self.store_record(msg, SetFlag::Insert)?;
        index::index_one(&mut self.store, &self.cache, msg, true)?;
        self.modified(&msg.dn)
    }

    fn delete_internal(&mut self, dnv: &Dn) -> Result<()> {
        self.cache.load(&mut self.store)?;

        // fetch the old record, any of its attributes may be indexed.
        let old = self.search_dn(dnv)?;
        let key = old.dn.to_primary_key(&self.cache.schema);
        self.store.delete(&key)?;

        index::index_one(&mut self.store, &self.cache, &old, false)?;
        index::index_del(&mut self.store, &self.cache, &old)?;
        self.modified(dnv)
    }

    fn modify_internal(&mut self, msg: &Entry) -> Result<()> {
        self.check_special_dn(msg)?;
        self.cache.load(&mut self.store)?;

        let mut record = self.search_dn(&msg.dn)?;

        for el in msg.elements.iter() {
            match el.to_mod_op() {
                entry::MOD_ADD => self.modify_add(&mut record, el)?,
                entry::MOD_REPLACE => self.modify_replace(&mut record, el)?,
                entry::MOD_DELETE => self.modify_delete(&mut record, el)?,
                op => {
                    err_at!(ProtocolError, msg: "invalid modify flags on {}: {:#x}", el.name, op)?
                }
            }
        }

        self.store_record(&record, SetFlag::Modify)?;
        self.modified(&msg.dn)
    }

    // Add `el`'s values to the record, failing on duplicates, checked
    // against both the stored values and the incoming values.
    fn modify_add(&mut self, record: &mut Entry, el: &Element) -> Result<()> {
        let off = match record.find_element(&el.name) {
            Some(off) => off,
            None => {
                record.elements.push(clean_element(el));
                return Ok(());
            }
        };

        let schema = &self.cache.schema;
        for (j, value) in el.values.iter().enumerate() {
            if record.elements[off].find_value(schema, value).is_some() {
                err_at!(
                    AttributeOrValueExists, msg: "{}: value #{} already exists", el.name, j
                )?;
            }
            if el.find_value(schema, value) != Some(j) {
                err_at!(
                    AttributeOrValueExists,
                    msg: "{}: value #{} provided more than once", el.name, j
                )?;
            }
        }
        record.elements[off].values.extend(el.values.iter().cloned());
        Ok(())
    }

    // Replace every value of the attribute with `el`'s values. The
    // attribute not existing is not an error, zero incoming values
    // leave the attribute absent.
    fn modify_replace(&mut self, record: &mut Entry, el: &Element) -> Result<()> {
        self.delete_attribute(record, &el.name)?;

        let schema = &self.cache.schema;
        for (j, value) in el.values.iter().enumerate() {
            if el.find_value(schema, value) != Some(j) {
                err_at!(
                    AttributeOrValueExists,
                    msg: "{}: value #{} provided more than once", el.name, j
                )?;
            }
        }
        if !el.values.is_empty() {
            record.elements.push(clean_element(el));
        }
        Ok(())
    }

    // Delete the whole attribute, or the listed values one at a time,
    // retiring their index entries.
    fn modify_delete(&mut self, record: &mut Entry, el: &Element) -> Result<()> {
        if el.values.is_empty() {
            if self.delete_attribute(record, &el.name)? {
                return Ok(());
            }
            return err_at!(
                NoSuchAttribute, msg: "no such attribute {}, delete on {}", el.name, record.dn
            );
        }

        for (j, value) in el.values.iter().enumerate() {
            if !self.delete_value(record, &el.name, value)? {
                err_at!(
                    NoSuchAttribute,
                    msg: "no matching value of {}, delete on {}", el.name, record.dn
                )?;
            }
            index::index_del_value(&mut self.store, &self.cache, &record.dn, el, j)?;
        }
        Ok(())
    }

    // Remove every element named `name` from the record, retiring its
    // index entries. Return whether anything was removed.
    fn delete_attribute(&mut self, record: &mut Entry, name: &str) -> Result<bool> {
        let mut found = false;
        while let Some(off) = record.find_element(name) {
            let el = record.elements.remove(off);
            for j in 0..el.values.len() {
                index::index_del_value(&mut self.store, &self.cache, &record.dn, &el, j)?;
            }
            found = true;
        }
        Ok(found)
    }

    // Remove the first value of element `name` comparing equal to
    // `value` under the attribute's syntax. An element losing its last
    // value is removed whole.
    fn delete_value(&mut self, record: &mut Entry, name: &str, value: &[u8]) -> Result<bool> {
        let off = match record.find_element(name) {
            Some(off) => off,
            None => return Ok(false),
        };
        let at = match record.elements[off].find_value(&self.cache.schema, value) {
            Some(at) => at,
            None => return Ok(false),
        };

        record.elements[off].values.remove(at);
        if record.elements[off].values.is_empty() {
            record.elements.remove(off);
        }
        Ok(true)
    }

    fn rename_internal(&mut self, old_dn: &Dn, new_dn: &Dn) -> Result<()> {
        self.cache.load(&mut self.store)?;

        let mut msg = self.search_dn(old_dn)?;
        msg.dn = new_dn.clone();

        if old_dn.eq_fold(new_dn, &self.cache.schema) {
            // case-only rename, the names collide under folding.
            // Delete first, the add would otherwise fail with exists.
            self.delete_internal(old_dn)?;
            self.add_internal(&msg)
        } else {
            // adding first avoids clobbering an entry unrelated to
            // this rename.
            self.add_internal(&msg)?;
            match self.delete_internal(old_dn) {
                Ok(()) => Ok(()),
                Err(err) => match self.delete_internal(new_dn) {
                    Ok(()) => Err(err),
                    Err(derr) => err_at!(
                        OperationsError, msg: "rename undo failed, {}, after {}", derr, err
                    ),
                },
            }
        }
    }

    // `@ATTRIBUTES` values must match the attribute-flags grammar.
    fn check_special_dn(&self, msg: &Entry) -> Result<()> {
        if !msg.dn.check_special(dn::ATTRIBUTES) {
            return Ok(());
        }
        for el in msg.elements.iter() {
            for value in el.values.iter() {
                if cache::to_flag_syntax(value).is_none() {
                    err_at!(
                        InvalidAttributeSyntax,
                        msg: "invalid attribute value {:?} in @ATTRIBUTES",
                        String::from_utf8_lossy(value)
                    )?;
                }
            }
        }
        Ok(())
    }

    // A name was modified. `@ATTRIBUTES` and `@INDEXLIST` trigger a
    // full reindex, every name other than `@BASEINFO` bumps the
    // sequence number.
    fn modified(&mut self, dnv: &Dn) -> Result<()> {
        if dnv.check_special(dn::ATTRIBUTES) || dnv.check_special(dn::INDEXLIST) {
            self.cache.load(&mut self.store)?;
            index::reindex(&mut self.store, &self.cache)?;
        }

        match dnv.check_special(dn::BASEINFO) {
            true => Ok(()),
            false => self.increase_sequence_number(),
        }
    }

    fn increase_sequence_number(&mut self) -> Result<()> {
        let baseinfo = Dn::Special(dn::BASEINFO.to_string());
        let key = baseinfo.to_primary_key(&self.cache.schema);
        let mut msg = match self.store.get(&key) {
            Some(data) => Entry::unpack(baseinfo, &data)?,
            None => Entry::new(baseinfo),
        };

        let seqno = msg.attr_as_u64(cache::SEQUENCE_NUMBER, 0) + 1;
        msg.set_value(cache::SEQUENCE_NUMBER, seqno.to_string().as_bytes());
        let now = util::to_generalized_time(Utc::now());
        msg.set_value(cache::MOD_TIMESTAMP, now.as_bytes());

        self.store.set(key, msg.pack()?, SetFlag::Replace)
    }
}

// The backend recognizes no controls, any critical control fails the
// request before it is routed.
fn check_critical_controls(controls: &[Control]) -> Result<()> {
    for control in controls.iter() {
        if control.critical {
            err_at!(
                UnsupportedCriticalExtension, msg: "critical control {}", control.oid
            )?;
        }
    }
    Ok(())
}

// Copy of `el` with the modify bits cleared, persisted records carry
// no modify flags.
fn clean_element(el: &Element) -> Element {
    Element::new(&el.name, el.values.clone())
}

#[cfg(test)]
#[path = "backend_test.rs"]
mod backend_test;
