use rand::random;

use std::{convert::TryFrom, env, fs};

use super::*;
use crate::store::Config;

fn scratch_store(name: &str) -> Store {
    let mut path = env::temp_dir();
    path.push(format!("dirdb-cache-{}-{:x}.tdb", name, random::<u64>()));
    fs::remove_file(&path).ok();
    Store::open(Config::new(path.as_os_str())).unwrap()
}

fn write_special(store: &mut Store, schema: &Schema, name: &str, entry: &Entry) {
    let key = Dn::try_from(name).unwrap().to_primary_key(schema);
    store.set(key, entry.pack().unwrap(), SetFlag::Replace).unwrap();
}

#[test]
fn test_cache_baseinfo_init() {
    let mut store = scratch_store("baseinfo");
    let mut cache = Cache::new();
    cache.load(&mut store).unwrap();

    let key = Dn::Special(dn::BASEINFO.to_string()).to_primary_key(cache.as_schema());
    let data = store.get(&key).unwrap();
    let entry = Entry::unpack(Dn::Special(dn::BASEINFO.to_string()), &data).unwrap();
    assert_eq!(entry.attr_as_u64(SEQUENCE_NUMBER, 99), 0);
    assert!(entry.attr_as_str(MOD_TIMESTAMP).is_some());
}

#[test]
fn test_cache_attributes() {
    let mut store = scratch_store("attributes");
    let mut cache = Cache::new();

    let mut at = Entry::new(Dn::try_from("@ATTRIBUTES").unwrap());
    at.add_value("mail", b"CASE_INSENSITIVE");
    at.add_value("uidNumber", b"INTEGER");
    at.add_value("userPassword", b"CASE_SENSITIVE");
    at.add_value("junk", b"NO_SUCH_FLAG");
    write_special(&mut store, cache.as_schema(), "@ATTRIBUTES", &at);

    cache.load(&mut store).unwrap();

    let schema = cache.as_schema();
    assert_eq!(schema.lookup("MAIL").to_syntax(), Syntax::DirectoryString);
    assert_eq!(schema.lookup("uidnumber").to_syntax(), Syntax::Integer);
    assert_eq!(schema.lookup("userPassword").to_syntax(), Syntax::OctetString);
    // unrecognized flags are skipped.
    assert_eq!(schema.lookup("junk").to_syntax(), Syntax::OctetString);
    // wellknown entries survive.
    assert_eq!(schema.lookup("cn").to_syntax(), Syntax::DirectoryString);
}

#[test]
fn test_cache_indexlist() {
    let mut store = scratch_store("indexlist");
    let mut cache = Cache::new();

    let mut il = Entry::new(Dn::try_from("@INDEXLIST").unwrap());
    il.add_value(IDXATTR, b"member");
    il.add_value(IDXATTR, b"CN");
    il.add_value(IDXONE, b"1");
    write_special(&mut store, cache.as_schema(), "@INDEXLIST", &il);

    cache.load(&mut store).unwrap();

    assert!(cache.is_indexed("member"));
    assert!(cache.is_indexed("Member"));
    assert!(cache.is_indexed("cn"));
    assert!(!cache.is_indexed("ou"));
    assert!(cache.has_one_level());
    assert_eq!(cache.to_indexed(), vec!["cn".to_string(), "member".to_string()]);
}

#[test]
fn test_cache_reload() {
    let mut store = scratch_store("reload");
    let mut cache = Cache::new();
    cache.load(&mut store).unwrap();
    assert!(!cache.is_indexed("member"));

    // no change in the store, load is a no-op.
    cache.load(&mut store).unwrap();

    let mut il = Entry::new(Dn::try_from("@INDEXLIST").unwrap());
    il.add_value(IDXATTR, b"member");
    write_special(&mut store, cache.as_schema(), "@INDEXLIST", &il);

    cache.load(&mut store).unwrap();
    assert!(cache.is_indexed("member"));

    // dropping the record drops the indexed set.
    let key = Dn::try_from("@INDEXLIST").unwrap().to_primary_key(cache.as_schema());
    store.delete(&key).unwrap();
    cache.load(&mut store).unwrap();
    assert!(!cache.is_indexed("member"));
}

#[test]
fn test_cache_flag_syntax() {
    assert_eq!(to_flag_syntax(b"CASE_INSENSITIVE"), Some(Syntax::DirectoryString));
    assert_eq!(to_flag_syntax(b"case_insensitive"), Some(Syntax::DirectoryString));
    assert_eq!(to_flag_syntax(b"INTEGER"), Some(Syntax::Integer));
    assert_eq!(to_flag_syntax(b"CASE_SENSITIVE"), Some(Syntax::OctetString));
    assert_eq!(to_flag_syntax(b"BINARY"), Some(Syntax::OctetString));
    assert_eq!(to_flag_syntax(b"HIDDEN"), None);
    assert_eq!(to_flag_syntax(&[0xff]), None);
}
