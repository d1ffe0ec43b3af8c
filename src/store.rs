//! Module implement the single-file key,value store.
//!
//! The whole data-set lives in memory and is serialized back to the
//! file on every outermost commit, by flushing a fresh snapshot beside
//! the file and renaming it into place. Writes outside a transaction
//! are flushed with the same discipline, one snapshot per write. A
//! sidecar advisory lock arbitrates between processes, exclusive for
//! writers and shared for read-only opens.

use cbordata::Cborize;
use log::{debug, info};

use std::{collections::BTreeMap, ffi, fs, io, io::Write, thread, time};

use crate::{util, Error, Result};

/// Default number of hash buckets, kept for interface compatibility
/// with stores that hash their keys.
pub const HASH_SIZE: usize = 10_000;

// Interval between lock attempts when a lock-timeout is configured.
const LOCK_RETRY: time::Duration = time::Duration::from_millis(10);

/// Extract the file-system path from a store URL. Accepts `tdb://<path>`
/// or a bare path, any other scheme is rejected.
pub fn to_store_path(url: &str) -> Result<String> {
    match url.strip_prefix("tdb://") {
        Some(path) => Ok(path.to_string()),
        None if url.contains("://") => {
            err_at!(InvalidFile, msg: "invalid store url {:?}", url)
        }
        None => Ok(url.to_string()),
    }
}

/// Write disposition for [Store::set].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SetFlag {
    /// Fail when the key already exists.
    Insert,
    /// Fail when the key is missing.
    Modify,
    /// Insert or overwrite.
    Replace,
}

/// Configuration options for opening a [Store].
#[derive(Clone, Debug)]
pub struct Config {
    pub path: ffi::OsString,
    pub read_only: bool,
    pub nosync: bool,
    pub nommap: bool,
    pub hash_size: usize,
    pub lock_timeout: Option<time::Duration>,
}

impl Config {
    pub fn new(path: &ffi::OsStr) -> Config {
        Config {
            path: path.to_os_string(),
            read_only: false,
            nosync: false,
            nommap: false,
            hash_size: HASH_SIZE,
            lock_timeout: None,
        }
    }

    /// Open the store read-only, every mutation shall fail with
    /// insufficient-access.
    pub fn set_read_only(&mut self, read_only: bool) -> &mut Self {
        self.read_only = read_only;
        self
    }

    /// Relax the fsync discipline while flushing snapshots.
    pub fn set_nosync(&mut self, nosync: bool) -> &mut Self {
        self.nosync = nosync;
        self
    }

    /// Disable memory-mapped reads. Accepted for interface
    /// compatibility, the snapshot loader always streams.
    pub fn set_nommap(&mut self, nommap: bool) -> &mut Self {
        self.nommap = nommap;
        self
    }

    pub fn set_hash_size(&mut self, hash_size: usize) -> &mut Self {
        self.hash_size = hash_size;
        self
    }

    /// Wait up to `timeout` for the file lock. Without a timeout a held
    /// lock fails immediately with busy, with a timeout exhaustion
    /// fails with time-limit-exceeded.
    pub fn set_lock_timeout(&mut self, timeout: time::Duration) -> &mut Self {
        self.lock_timeout = Some(timeout);
        self
    }
}

const SNAPSHOT_VER: u32 = 0x00010001;

#[derive(Cborize)]
struct Item {
    key: Vec<u8>,
    value: Vec<u8>,
}

impl Item {
    const ID: u32 = SNAPSHOT_VER;
}

#[derive(Cborize)]
struct Snapshot {
    seqno: u64,
    items: Vec<Item>,
}

impl Snapshot {
    const ID: u32 = SNAPSHOT_VER;
}

/// Single-file key,value store with nested transactions.
///
/// Keys iterate in lexicographic byte order. A store-wide sequence
/// number increments on every applied write and is persisted with the
/// snapshot, callers use it for cheap change detection.
pub struct Store {
    config: Config,
    _lock_file: fs::File, // advisory lock held for the store's lifetime
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    undo: Vec<(BTreeMap<Vec<u8>, Vec<u8>>, u64)>,
    seqno: u64,
}

impl Store {
    pub fn open(config: Config) -> Result<Store> {
        let lock_file = {
            let mut lock_path = config.path.clone();
            lock_path.push(".lock");
            let mut opts = fs::OpenOptions::new();
            err_at!(
                IOError,
                opts.create(true).read(true).write(true).open(&lock_path)
            )?
        };
        acquire_lock(&lock_file, &config)?;

        let (map, seqno, created) = match fs::read(&config.path) {
            Ok(data) => {
                let (snap, _) = match util::from_cbor_bytes::<Snapshot>(&data) {
                    Ok(res) => res,
                    Err(err) => {
                        err_at!(InvalidFile, msg: "corrupt store {:?}, {}", config.path, err)?
                    }
                };
                let mut map = BTreeMap::new();
                for item in snap.items.into_iter() {
                    map.insert(item.key, item.value);
                }
                (map, snap.seqno, false)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound && !config.read_only => {
                (BTreeMap::new(), 0, true)
            }
            Err(err) => err_at!(IOError, Err(err))?,
        };

        let mut store = Store {
            config,
            _lock_file: lock_file,
            map,
            undo: Vec::default(),
            seqno,
        };

        if created {
            store.persist()?;
            info!(target: "store ", "created {:?}", store.config.path);
        }
        debug!(
            target: "store ",
            "open {:?} seqno:{} entries:{}", store.config.path, store.seqno, store.map.len()
        );

        Ok(store)
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Return the store-wide sequence number, incremented on every
    /// applied write.
    pub fn to_seqno(&self) -> u64 {
        self.seqno
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>, flag: SetFlag) -> Result<()> {
        if self.config.read_only {
            err_at!(InsufficientAccess, msg: "set on read-only store")?
        }
        match flag {
            SetFlag::Insert if self.map.contains_key(&key) => {
                err_at!(
                    EntryAlreadyExists, msg: "key {}", String::from_utf8_lossy(&key)
                )?
            }
            SetFlag::Modify if !self.map.contains_key(&key) => {
                err_at!(NoSuchObject, msg: "key {}", String::from_utf8_lossy(&key))?
            }
            _ => (),
        }

        self.map.insert(key, value);
        self.touch()
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        if self.config.read_only {
            err_at!(InsufficientAccess, msg: "delete on read-only store")?
        }
        match self.map.remove(key) {
            Some(_) => self.touch(),
            None => {
                err_at!(NoSuchObject, msg: "key {}", String::from_utf8_lossy(key))
            }
        }
    }

    /// Copy out the full data-set in key order.
    pub fn to_items(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Begin a transaction, may be nested. Mutations apply immediately
    /// but reach the file only on the outermost commit.
    pub fn begin(&mut self) -> Result<()> {
        if self.config.read_only {
            err_at!(InsufficientAccess, msg: "transaction on read-only store")?
        }
        self.undo.push((self.map.clone(), self.seqno));
        Ok(())
    }

    /// Commit the innermost transaction. The outermost commit flushes
    /// a snapshot to the file.
    pub fn commit(&mut self) -> Result<()> {
        match self.undo.pop() {
            Some(_) if self.undo.is_empty() => self.persist(),
            Some(_) => Ok(()),
            None => err_at!(Fatal, msg: "commit without begin"),
        }
    }

    /// Cancel the innermost transaction, restoring the data-set and the
    /// sequence number to their state at the matching begin.
    pub fn cancel(&mut self) -> Result<()> {
        match self.undo.pop() {
            Some((map, seqno)) => {
                self.map = map;
                self.seqno = seqno;
                Ok(())
            }
            None => err_at!(Fatal, msg: "cancel without begin"),
        }
    }

    fn touch(&mut self) -> Result<()> {
        self.seqno += 1;
        match self.undo.is_empty() {
            true => self.persist(),
            false => Ok(()),
        }
    }

    fn persist(&mut self) -> Result<()> {
        let items: Vec<Item> = self
            .map
            .iter()
            .map(|(k, v)| Item { key: k.clone(), value: v.clone() })
            .collect();
        let data = util::into_cbor_bytes(Snapshot { seqno: self.seqno, items })?;

        let tmp_path = {
            let mut tmp_path = self.config.path.clone();
            tmp_path.push(".tmp");
            tmp_path
        };
        let mut file = {
            let mut opts = fs::OpenOptions::new();
            err_at!(
                IOError,
                opts.create(true).truncate(true).write(true).open(&tmp_path)
            )?
        };
        err_at!(IOError, file.write_all(&data))?;
        if !self.config.nosync {
            err_at!(IOError, file.sync_all())?;
        }
        err_at!(IOError, fs::rename(&tmp_path, &self.config.path))
    }
}

fn acquire_lock(file: &fs::File, config: &Config) -> Result<()> {
    let try_lock = |file: &fs::File| match config.read_only {
        true => fs2::FileExt::try_lock_shared(file),
        false => fs2::FileExt::try_lock_exclusive(file),
    };

    match try_lock(file) {
        Ok(()) => Ok(()),
        Err(_) => match config.lock_timeout {
            None => err_at!(Busy, msg: "lock held on {:?}", config.path),
            Some(timeout) => {
                let deadline = time::Instant::now() + timeout;
                loop {
                    thread::sleep(LOCK_RETRY);
                    match try_lock(file) {
                        Ok(()) => break Ok(()),
                        Err(_) if time::Instant::now() >= deadline => {
                            break err_at!(
                                TimeLimitExceeded, msg: "lock wait on {:?}", config.path
                            );
                        }
                        Err(_) => (),
                    }
                }
            }
        },
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;
