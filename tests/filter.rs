use sievefwd::{Decision, Filter, MailInfo, MailInfoStorage, filter_mail};
use std::collections::BTreeSet;

fn storage(mail: &[u8]) -> MailInfoStorage {
    MailInfoStorage {
        id: "test".to_string(),
        mail_buffer: mail.to_vec(),
    }
}

const HELLO: &[u8] = b"From: Bob <bob@example.com>\r\n\
    To: alice@example.org\r\n\
    Subject: Hello World\r\n\
    \r\n\
    Hello\r\n";

fn decide(script: &str, mail: &[u8]) -> Decision {
    let filter: Filter = script.parse().unwrap();
    filter_mail(Some(&filter), &storage(mail))
}

#[test]
fn filter_001() {
    let script = std::fs::read_to_string("tests/filter_001.sieve").unwrap();
    let filter = Filter::parse(&script).unwrap();
    let storage = MailInfoStorage {
        id: "filter_001".to_string(),
        mail_buffer: std::fs::read("tests/filter_001.eml").unwrap(),
    };
    let mail_info = MailInfo::parse(&storage).unwrap();
    assert_eq!(mail_info.get_from_address(), "bob@example.com");
    assert_eq!(mail_info.get_subject(), "Hello World");

    let decision = filter.evaluate(&mail_info).unwrap();
    assert_eq!(
        decision,
        Decision {
            keep: None,
            fileinto: Some("Lists/friends".to_string()),
            flags: BTreeSet::from([
                "$Friends".to_string(),
                "\\Answered".to_string(),
                "\\Seen".to_string(),
            ]),
        }
    );
    assert!(decision.should_keep());
    assert_eq!(filter.decide(&mail_info), decision);
}

#[test]
fn parse_is_deterministic() {
    let script = std::fs::read_to_string("tests/filter_001.sieve").unwrap();
    assert_eq!(Filter::parse(&script).unwrap(), Filter::parse(&script).unwrap());
}

#[test]
fn header_and_address_tests() {
    assert_eq!(
        decide(r#"if header :contains "subject" "hello" { keep; }"#, HELLO).keep,
        Some(true)
    );
    assert_eq!(
        decide(r#"if header :contains "subject" "bye" { keep; }"#, HELLO).keep,
        None
    );
    assert_eq!(
        decide(r#"if address :is "from" "BOB@EXAMPLE.COM" { discard; }"#, HELLO).keep,
        Some(false)
    );
    assert_eq!(
        decide(r#"if address :is "from" "eve@example.com" { discard; }"#, HELLO).keep,
        None
    );
}

#[test]
fn fileinto_then_keep() {
    assert_eq!(
        decide(r#"fileinto "Archive"; keep;"#, HELLO),
        Decision {
            keep: Some(true),
            fileinto: Some("Archive".to_string()),
            flags: BTreeSet::new(),
        }
    );
}

#[test]
fn unsupported_feature_falls_back_to_default() {
    let filter: Filter = r#"addflag "early"; if header :matches "subject" "*" { discard; }"#
        .parse()
        .unwrap();
    let storage = storage(HELLO);
    let mail_info = MailInfo::parse(&storage).unwrap();

    let err = filter.evaluate(&mail_info).unwrap_err();
    assert!(err.to_string().contains("matches"));
    assert_eq!(filter.decide(&mail_info), Decision::default());
    assert_eq!(filter_mail(Some(&filter), &storage), Decision::default());
}

#[test]
fn no_filter_keeps_everything() {
    let decision = filter_mail(None, &storage(HELLO));
    assert_eq!(decision, Decision::default());
    assert!(decision.should_keep());
    assert_eq!(decision.mailbox(), "INBOX");
}

#[test]
fn structured_headers_match_as_text() {
    let mail = std::fs::read("tests/filter_001.eml").unwrap();
    assert_eq!(
        decide(r#"if header :contains "received" "mx.example.org" { discard; }"#, &mail).keep,
        Some(false)
    );
    assert_eq!(
        decide(r#"if header :contains "content-type" "charset=utf-8" { discard; }"#, &mail).keep,
        Some(false)
    );
    assert_eq!(
        decide(r#"if header :contains "received" "mx.example.net" { discard; }"#, &mail).keep,
        None
    );
}

#[test]
fn header_names_in_message_order() {
    let storage = storage(b"Subject: a\r\nX-Tag: 1\r\nx-tag: 2\r\nFrom: b@example.com\r\n\r\nbody\r\n");
    let mail_info = MailInfo::parse(&storage).unwrap();
    assert_eq!(mail_info.header_names(), ["subject", "x-tag", "from"]);
}
