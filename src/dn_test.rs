use super::*;

fn wellknown() -> Schema {
    let mut schema = Schema::new();
    schema.seed_wellknown();
    schema
}

#[test]
fn test_dn_parse() {
    let dn = Dn::try_from("cn=alice, ou=people").unwrap();
    match &dn {
        Dn::Rdns(rdns) => {
            assert_eq!(rdns.len(), 2);
            assert_eq!(rdns[0], Rdn::new("cn", "alice"));
            assert_eq!(rdns[1], Rdn::new("ou", "people"));
        }
        _ => panic!("unexpected {:?}", dn),
    }
    assert_eq!(dn.to_string(), "cn=alice,ou=people");

    let dn = Dn::try_from("").unwrap();
    assert_eq!(dn, Dn::Rdns(vec![]));
    assert_eq!(dn.to_string(), "");

    assert!(Dn::try_from("cn").is_err());
    assert!(Dn::try_from("=alice").is_err());
    assert!(Dn::try_from("cn=alice,,").is_err());

    // values may carry '='
    let dn = Dn::try_from("cn=a=b").unwrap();
    assert_eq!(dn, Dn::Rdns(vec![Rdn::new("cn", "a=b")]));
}

#[test]
fn test_dn_special() {
    let dn = Dn::try_from("@BASEINFO").unwrap();
    assert!(dn.is_special());
    assert!(dn.check_special(BASEINFO));
    assert!(!dn.check_special(ATTRIBUTES));
    assert_eq!(dn.to_string(), "@BASEINFO");

    let schema = wellknown();
    // special names pass through the key encoding verbatim.
    assert_eq!(dn.casefold(&schema), "@BASEINFO");
    assert_eq!(dn.to_primary_key(&schema), b"DN=@BASEINFO\0".to_vec());

    let dn = Dn::try_from("cn=alice").unwrap();
    assert!(!dn.is_special());
    assert!(!dn.check_special(BASEINFO));
}

#[test]
fn test_dn_casefold() {
    let schema = wellknown();

    let dn = Dn::try_from("CN=Alice  Smith,OU=People").unwrap();
    assert_eq!(dn.casefold(&schema), "cn=alice smith,ou=people");

    // unknown attributes default to octet-string, value is preserved.
    let dn = Dn::try_from("UID=MiXeD").unwrap();
    assert_eq!(dn.casefold(&schema), "uid=MiXeD");
}

#[test]
fn test_dn_primary_key() {
    let schema = wellknown();

    let dn = Dn::try_from("cn=Alice,ou=People").unwrap();
    assert_eq!(
        dn.to_primary_key(&schema),
        b"DN=cn=alice,ou=people\0".to_vec()
    );
}

#[test]
fn test_dn_parent() {
    let dn = Dn::try_from("cn=alice,ou=people,dc=example").unwrap();
    let parent = dn.to_parent().unwrap();
    assert_eq!(parent.to_string(), "ou=people,dc=example");

    let dn = Dn::try_from("cn=alice").unwrap();
    assert_eq!(dn.to_parent(), None);

    let dn = Dn::try_from("@BASEINFO").unwrap();
    assert_eq!(dn.to_parent(), None);
}

#[test]
fn test_dn_eq_fold() {
    let schema = wellknown();

    let a = Dn::try_from("cn=Bob,ou=People").unwrap();
    let b = Dn::try_from("CN=BOB,OU=people").unwrap();
    let c = Dn::try_from("cn=carol,ou=people").unwrap();

    assert!(a.eq_fold(&b, &schema));
    assert!(!a.eq_fold(&c, &schema));
}
