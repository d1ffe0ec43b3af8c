use rand::random;

use std::{env, fs};

use super::*;
use crate::{cache::IDXATTR, store::Config};

fn setup(name: &str) -> (Store, Cache) {
    let mut path = env::temp_dir();
    path.push(format!("dirdb-index-{}-{:x}.tdb", name, random::<u64>()));
    fs::remove_file(&path).ok();
    let mut store = Store::open(Config::new(path.as_os_str())).unwrap();

    let mut cache = Cache::new();

    let mut il = Entry::new(Dn::try_from("@INDEXLIST").unwrap());
    il.add_value(IDXATTR, b"member");
    il.add_value(IDXATTR, b"mail");
    il.add_value(IDXONE, b"1");
    let key = il.dn.to_primary_key(cache.as_schema());
    store.set(key, il.pack().unwrap(), SetFlag::Replace).unwrap();

    let mut at = Entry::new(Dn::try_from("@ATTRIBUTES").unwrap());
    at.add_value("mail", b"CASE_INSENSITIVE");
    let key = at.dn.to_primary_key(cache.as_schema());
    store.set(key, at.pack().unwrap(), SetFlag::Replace).unwrap();

    cache.load(&mut store).unwrap();
    (store, cache)
}

fn group(dn_text: &str, members: &[&str]) -> Entry {
    let mut entry = Entry::new(Dn::try_from(dn_text).unwrap());
    entry.add_value("objectClass", b"group");
    for member in members.iter() {
        entry.add_value("member", member.as_bytes());
    }
    entry
}

fn probe_texts(store: &Store, cache: &Cache, attr: &str, value: &[u8]) -> Vec<String> {
    index_probe(store, cache, attr, value)
        .unwrap()
        .into_iter()
        .map(|dn| dn.to_string())
        .collect()
}

#[test]
fn test_index_add_probe() {
    let (mut store, cache) = setup("add-probe");

    let g1 = group("cn=g1,ou=groups", &["cn=bob", "cn=carol"]);
    index_add(&mut store, &cache, &g1).unwrap();

    assert_eq!(
        probe_texts(&store, &cache, "member", b"cn=bob"),
        vec!["cn=g1,ou=groups".to_string()]
    );
    assert_eq!(probe_texts(&store, &cache, "member", b"cn=dave").len(), 0);
    // attributes outside @INDEXLIST are not indexed.
    assert_eq!(probe_texts(&store, &cache, "objectClass", b"group").len(), 0);
}

#[test]
fn test_index_canonical_value() {
    let (mut store, cache) = setup("canonical");

    let mut entry = Entry::new(Dn::try_from("cn=alice,ou=people").unwrap());
    entry.add_value("mail", b"Alice@Example.COM");
    index_add(&mut store, &cache, &entry).unwrap();

    // mail is case-insensitive, any case probes the same record.
    assert_eq!(probe_texts(&store, &cache, "mail", b"alice@example.com").len(), 1);
    assert_eq!(probe_texts(&store, &cache, "mail", b"ALICE@EXAMPLE.COM").len(), 1);
}

#[test]
fn test_index_add_idempotent() {
    let (mut store, cache) = setup("idempotent");

    let g1 = group("cn=g1,ou=groups", &["cn=bob"]);
    index_add(&mut store, &cache, &g1).unwrap();
    index_add(&mut store, &cache, &g1).unwrap();

    assert_eq!(probe_texts(&store, &cache, "member", b"cn=bob").len(), 1);
}

#[test]
fn test_index_del() {
    let (mut store, cache) = setup("del");

    let g1 = group("cn=g1,ou=groups", &["cn=bob"]);
    let g2 = group("cn=g2,ou=groups", &["cn=bob"]);
    index_add(&mut store, &cache, &g1).unwrap();
    index_add(&mut store, &cache, &g2).unwrap();
    assert_eq!(probe_texts(&store, &cache, "member", b"cn=bob").len(), 2);

    index_del(&mut store, &cache, &g1).unwrap();
    assert_eq!(
        probe_texts(&store, &cache, "member", b"cn=bob"),
        vec!["cn=g2,ou=groups".to_string()]
    );

    // removing the last name collapses the record away.
    index_del(&mut store, &cache, &g2).unwrap();
    assert_eq!(probe_texts(&store, &cache, "member", b"cn=bob").len(), 0);
    assert_eq!(store.get(b"DN=@INDEX:member:cn=bob\0"), None);
}

#[test]
fn test_index_del_value() {
    let (mut store, cache) = setup("del-value");

    let g1 = group("cn=g1,ou=groups", &["cn=bob", "cn=carol"]);
    index_add(&mut store, &cache, &g1).unwrap();

    let off = g1.find_element("member").unwrap();
    index_del_value(&mut store, &cache, &g1.dn, &g1.elements[off], 0).unwrap();

    assert_eq!(probe_texts(&store, &cache, "member", b"cn=bob").len(), 0);
    assert_eq!(probe_texts(&store, &cache, "member", b"cn=carol").len(), 1);
}

#[test]
fn test_index_one() {
    let (mut store, cache) = setup("one-level");
    assert!(cache.has_one_level());

    let entry = group("cn=alice,ou=people", &[]);
    index_one(&mut store, &cache, &entry, true).unwrap();
    assert!(store.get(b"DN=@INDEX:@IDXONE:ou=people\0").is_some());

    index_one(&mut store, &cache, &entry, false).unwrap();
    assert_eq!(store.get(b"DN=@INDEX:@IDXONE:ou=people\0"), None);

    // entries without a parent are not linked.
    let entry = group("ou=people", &[]);
    index_one(&mut store, &cache, &entry, true).unwrap();
    assert_eq!(store.get(b"DN=@INDEX:@IDXONE:\0"), None);
}

#[test]
fn test_index_reindex() {
    let (mut store, cache) = setup("reindex");

    // records written behind the index manager's back.
    let g1 = group("cn=g1,ou=groups", &["cn=bob"]);
    let key = g1.dn.to_primary_key(cache.as_schema());
    store.set(key, g1.pack().unwrap(), SetFlag::Replace).unwrap();

    // stale index record, to be dropped by the rebuild.
    store
        .set(b"DN=@INDEX:member:cn=zzz\0".to_vec(), b"junk".to_vec(), SetFlag::Replace)
        .unwrap();

    assert_eq!(probe_texts(&store, &cache, "member", b"cn=bob").len(), 0);

    reindex(&mut store, &cache).unwrap();

    assert_eq!(
        probe_texts(&store, &cache, "member", b"cn=bob"),
        vec!["cn=g1,ou=groups".to_string()]
    );
    assert_eq!(store.get(b"DN=@INDEX:member:cn=zzz\0"), None);
    assert!(store.get(b"DN=@INDEX:@IDXONE:ou=groups\0").is_some());
}
