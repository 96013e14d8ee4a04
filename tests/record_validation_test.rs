use bifrost::record::{self, Record, RecordData, RecordType, validate, validate_record};

#[test]
fn test_a_record_octet_ranges() {
    for first in (1..=126).chain(128..=223) {
        let ip = format!("{}.10.20.30", first);
        assert!(
            validate(&RecordType::A, &ip, None, None, None).is_ok(),
            "{} should be accepted",
            ip
        );
    }

    for first in [0, 127, 224, 239, 240, 255] {
        let ip = format!("{}.1.1.1", first);
        assert!(
            validate(&RecordType::A, &ip, None, None, None).is_err(),
            "{} should be rejected",
            ip
        );
    }

    for malformed in ["192.0.2", "192.0.2.1.5", "192.0.2.256", "192.0.2.x", ""] {
        assert!(validate(&RecordType::A, malformed, None, None, None).is_err());
    }
}

#[test]
fn test_aaaa_records() {
    for ip in ["2001:db8::1", "::1", "fe80::1%eth0", "::ffff:192.0.2.1", "2001:db8:0:0:0:0:2:1"] {
        assert!(validate(&RecordType::AAAA, ip, None, None, None).is_ok(), "{}", ip);
    }
    for ip in ["2001:db8:::1", "192.0.2.1", "gggg::1", "1:2:3:4:5:6:7:8:9"] {
        assert!(validate(&RecordType::AAAA, ip, None, None, None).is_err(), "{}", ip);
    }
}

#[test]
fn test_mx_format_and_parse() {
    let data = RecordData {
        value: "mail.example.com.".to_string(),
        priority: Some(10),
        ..Default::default()
    };
    assert_eq!(
        record::format(&RecordType::MX, &data).unwrap(),
        "10 mail.example.com."
    );

    let parsed = record::parse(&RecordType::MX, "10 mail.example.com.").unwrap();
    assert_eq!(parsed.priority, Some(10));
    assert_eq!(parsed.value, "mail.example.com.");
    assert_eq!(parsed, data);

    // Priority is mandatory and bounded
    assert!(validate(&RecordType::MX, "mail.example.com.", None, None, None).is_err());
    assert!(validate(&RecordType::MX, "mail.example.com.", Some(65536), None, None).is_err());
    assert!(validate(&RecordType::MX, "mail.example.com.", Some(0), None, None).is_ok());
}

#[test]
fn test_srv_format_and_parse() {
    let data = RecordData {
        value: "svc.example.com.".to_string(),
        priority: Some(10),
        weight: Some(5),
        port: Some(443),
    };
    let wire = record::format(&RecordType::SRV, &data).unwrap();
    assert_eq!(wire, "10 5 443 svc.example.com.");

    let parsed = record::parse(&RecordType::SRV, &wire).unwrap();
    assert_eq!(parsed, data);

    assert!(validate(&RecordType::SRV, "svc.example.com.", Some(10), Some(5), Some(0)).is_err());
    assert!(validate(&RecordType::SRV, "svc.example.com.", Some(10), Some(5), Some(65535)).is_ok());
    assert!(validate(&RecordType::SRV, "svc.example.com.", Some(10), None, Some(443)).is_err());
}

#[test]
fn test_format_parse_stable_for_txt() {
    let data = RecordData::new("say \"hi\" to C:\\path");
    let wire = record::format(&RecordType::TXT, &data).unwrap();
    let reparsed = record::parse(&RecordType::TXT, &wire).unwrap();
    assert_eq!(reparsed.value, data.value);
    assert_eq!(record::format(&RecordType::TXT, &reparsed).unwrap(), wire);
}

#[test]
fn test_caa_records() {
    let caa = |value: &str| validate(&RecordType::CAA, value, None, None, None);

    assert!(caa("0 issue \"letsencrypt.org\"").is_ok());
    assert!(caa("0 issue \"x\"").is_ok());
    assert!(caa("128 issuewild \";\"").is_ok());
    assert!(caa("0 iodef \"mailto:security@example.com\"").is_ok());
    assert!(caa("0 iodef \"https://example.com/caa\"").is_ok());

    let err = caa("999 issue \"x\"").unwrap_err();
    assert_eq!(err.field, "flags");

    assert!(caa("0 iodef \"not-a-url-or-email\"").is_err());
    assert!(caa("0 contactemail \"a@example.com\"").is_err());
    assert!(caa("0 issue letsencrypt.org").is_err());
}

#[test]
fn test_txt_rules() {
    let txt = |value: &str| validate(&RecordType::TXT, value, None, None, None);

    assert!(txt("hello").is_ok());
    assert!(txt("").is_err());
    assert!(txt(&"x".repeat(255)).is_ok());
    assert!(txt(&"x".repeat(256)).is_err());

    assert!(txt("v=spf1 include:_spf.example.com ~all").is_ok());
    assert!(txt("v=spf1 mx -all").is_ok());
    assert!(txt("v=spf1 mx").is_err());

    assert!(txt("v=DKIM1; k=rsa; p=MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQC").is_ok());
    assert!(txt("v=DKIM1; p=MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQC").is_err());
}

#[test]
fn test_cname_at_apex_always_rejected() {
    for target in ["www.example.com.", "@", "target", "not a valid target"] {
        let record = Record::new("@", RecordType::CNAME, target, 3600);
        let err = validate_record(&record).unwrap_err();
        assert_eq!(err.field, "name");
    }

    let record = Record::new("www", RecordType::CNAME, "@", 3600);
    assert!(validate_record(&record).is_ok());
}

#[test]
fn test_domain_targets() {
    for target in ["example.com", "example.com.", "a-b.example.com", "xn--bcher-kva.example"] {
        assert!(validate(&RecordType::NS, target, None, None, None).is_ok(), "{}", target);
    }
    let too_long_label = format!("{}.example.com", "a".repeat(64));
    for target in ["-bad.example.com", "bad-.example.com", "under_score.example.com", too_long_label.as_str()] {
        assert!(validate(&RecordType::CNAME, target, None, None, None).is_err(), "{}", target);
    }
    let too_long = format!("{}.com", "a.".repeat(126));
    assert!(validate(&RecordType::PTR, &too_long, None, None, None).is_err());
}

#[test]
fn test_owner_names() {
    let a = |name: &str| Record::new(name, RecordType::A, "192.0.2.1", 300);
    assert!(validate_record(&a("@")).is_ok());
    assert!(validate_record(&a("*.apps")).is_ok());
    assert!(validate_record(&a("host.example.com.")).is_ok());

    let srv = Record::srv("_sip._tcp", 10, 5, 5060, "sip.example.com.", 3600);
    assert!(validate_record(&srv).is_ok());

    assert!(validate_record(&a("bad name")).is_err());
}

#[test]
fn test_soa_validation() {
    let soa = |value: &str| validate(&RecordType::SOA, value, None, None, None);
    assert!(soa("ns1.example.com. admin.example.com. 2024010101 3600 900 604800 86400").is_ok());
    assert!(soa("ns1.example.com. admin.example.com. 2024010101 3600 900 604800").is_err());
    let err = soa("ns1.example.com. admin.example.com. 2024010101 -5 900 604800 86400").unwrap_err();
    assert_eq!(err.field, "refresh");
}

#[test]
fn test_unmanaged_types_rejected() {
    let rtype: RecordType = "DNSKEY".parse().unwrap();
    assert!(!rtype.is_managed());
    assert!(validate(&rtype, "257 3 13 abc", None, None, None).is_err());

    assert!("TYPE65534".parse::<RecordType>().is_ok());
    assert!("NOTATYPE".parse::<RecordType>().is_err());
    assert_eq!("aaaa".parse::<RecordType>().unwrap(), RecordType::AAAA);
}

#[test]
fn test_record_json_shape() {
    let record = Record::mx("@", 10, "mail.example.com.", 3600);
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["name"], "@");
    assert_eq!(json["type"], "MX");
    assert_eq!(json["value"], "mail.example.com.");
    assert_eq!(json["priority"], 10);
    assert!(json.get("weight").is_none());

    let parsed: Record =
        serde_json::from_str(r#"{"name":"www","type":"A","value":"192.0.2.1"}"#).unwrap();
    assert_eq!(parsed.ttl, 3600);
}
