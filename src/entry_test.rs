use arbitrary::Unstructured;
use rand::{prelude::random, rngs::StdRng, Rng, SeedableRng};

use std::convert::TryFrom;

use super::*;

#[test]
fn test_entry_pack_unpack() {
    let seed: u64 = random();
    let mut rng = StdRng::seed_from_u64(seed);
    println!("test_entry_pack_unpack {}", seed);

    let dn = Dn::try_from("cn=alice,ou=people").unwrap();

    for _i in 0..100 {
        let mut entry = Entry::new(dn.clone());
        for _j in 0..rng.gen::<usize>() % 5 {
            let bytes = rng.gen::<[u8; 32]>();
            let mut uns = Unstructured::new(&bytes);
            entry.elements.push(uns.arbitrary::<Element>().unwrap());
        }

        let data = entry.pack().unwrap();
        let out = Entry::unpack(dn.clone(), &data).unwrap();
        assert_eq!(entry, out);
    }
}

#[test]
fn test_entry_unpack_corrupt() {
    let dn = Dn::try_from("cn=alice").unwrap();
    match Entry::unpack(dn, &[0xff, 0x00, 0x01]) {
        Err(Error::OperationsError(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }
}

#[test]
fn test_entry_elements() {
    let dn = Dn::try_from("cn=alice,ou=people").unwrap();
    let mut entry = Entry::new(dn);
    entry.add_value("objectClass", b"person");
    entry.add_value("objectClass", b"top");
    entry.add_value("cn", b"alice");

    assert_eq!(entry.elements.len(), 2);
    assert_eq!(entry.find_element("OBJECTCLASS"), Some(0));
    assert_eq!(entry.find_element("cn"), Some(1));
    assert_eq!(entry.find_element("mail"), None);
    assert_eq!(entry.elements[0].values.len(), 2);

    entry.set_value("cn", b"alister");
    assert_eq!(entry.attr_as_str("cn"), Some("alister"));

    entry.set_value("uidNumber", b"1001");
    assert_eq!(entry.attr_as_u64("uidNumber", 0), 1001);
    assert_eq!(entry.attr_as_u64("gidNumber", 42), 42);
}

#[test]
fn test_element_find_value() {
    let mut schema = Schema::new();
    schema.seed_wellknown();

    let el = Element::new("cn", vec![b"Alice".to_vec(), b"Bob".to_vec()]);
    assert_eq!(el.find_value(&schema, b"alice"), Some(0));
    assert_eq!(el.find_value(&schema, b"BOB"), Some(1));
    assert_eq!(el.find_value(&schema, b"carol"), None);

    // octet-string attributes compare binary.
    let el = Element::new("jpegPhoto", vec![b"Alice".to_vec()]);
    assert_eq!(el.find_value(&schema, b"alice"), None);
    assert_eq!(el.find_value(&schema, b"Alice"), Some(0));
}

#[test]
fn test_element_mod_op() {
    let el = Element::with_op("member", MOD_ADD, vec![b"cn=bob".to_vec()]);
    assert_eq!(el.to_mod_op(), MOD_ADD);

    let el = Element::with_op("member", MOD_REPLACE, vec![]);
    assert_eq!(el.to_mod_op(), MOD_REPLACE);

    let el = Element::with_op("member", MOD_DELETE, vec![]);
    assert_eq!(el.to_mod_op(), MOD_DELETE);
}
