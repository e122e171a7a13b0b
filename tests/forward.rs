use sievefwd::Filter;
use sievefwd::forward::{ForwardStats, forward_unseen};
use sievefwd::maildir::{Mailbox, Maildir};
use sievefwd::store::SeenStore;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use tempfile::TempDir;

fn mail(subject: &str) -> Vec<u8> {
    format!("From: Bob <bob@example.com>\r\nSubject: {subject}\r\n\r\nbody\r\n").into_bytes()
}

fn maildir_with(dir: &Path, messages: &[(&str, &str, Vec<u8>)]) -> Maildir {
    for sub in ["tmp", "new", "cur"] {
        fs::create_dir_all(dir.join(sub)).unwrap();
    }
    for (sub, name, body) in messages {
        fs::write(dir.join(sub).join(name), body).unwrap();
    }
    Maildir::new(dir)
}

fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().into_string().unwrap())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[test]
fn maildir_unseen_and_mark_seen() {
    let tmp = TempDir::new().unwrap();
    let source = maildir_with(
        tmp.path(),
        &[
            ("new", "1.a", mail("one")),
            ("cur", "2.b:2,S", mail("two")),
            ("cur", "3.c:2,F", mail("three")),
        ],
    );
    assert_eq!(source.unseen().unwrap(), ["1.a", "3.c"]);
    assert_eq!(source.fetch("3.c").unwrap(), mail("three"));
    assert!(source.fetch("4.d").is_err());

    source.mark_seen("1.a").unwrap();
    source.mark_seen("3.c").unwrap();
    source.mark_seen("2.b").unwrap();
    assert!(source.unseen().unwrap().is_empty());
    assert_eq!(
        names(&tmp.path().join("cur")),
        ["1.a:2,S", "2.b:2,S", "3.c:2,FS"]
    );
}

#[test]
fn maildir_append() {
    let tmp = TempDir::new().unwrap();
    let dest = Maildir::new(tmp.path());
    dest.append("INBOX", b"plain", &BTreeSet::new(), None).unwrap();
    let flags = BTreeSet::from(["\\Flagged".to_string(), "$Custom".to_string(), "\\Seen".to_string()]);
    dest.append("Lists/rust", b"flagged", &flags, None).unwrap();

    let new = names(&tmp.path().join("new"));
    assert_eq!(new.len(), 1);
    assert_eq!(fs::read(tmp.path().join("new").join(&new[0])).unwrap(), b"plain");

    let cur = names(&tmp.path().join(".Lists.rust").join("cur"));
    assert_eq!(cur.len(), 1);
    assert!(cur[0].ends_with(":2,FS"), "{}", cur[0]);
    assert!(names(&tmp.path().join("tmp")).is_empty());
}

#[test]
fn forward_with_filter() {
    let tmp = TempDir::new().unwrap();
    let source = maildir_with(
        &tmp.path().join("source"),
        &[
            ("new", "1.keep", mail("hello")),
            ("new", "2.spam", mail("cheap pills")),
            ("new", "3.invoice", mail("Invoice 42")),
            ("cur", "4.old:2,S", mail("old")),
        ],
    );
    let dest = Maildir::new(tmp.path().join("dest"));
    let db = tmp.path().join("db.json");
    let filter: Filter = r#"
        if header :contains "subject" "pills" { discard; }
        elsif header :contains "subject" "invoice" { fileinto "Invoices"; addflag "\\Flagged"; }
    "#
    .parse()
    .unwrap();

    let mut store = SeenStore::load(&db).unwrap();
    let stats = forward_unseen(&mut store, &source, &dest, Some(&filter)).unwrap();
    assert_eq!(
        stats,
        ForwardStats {
            forwarded: 2,
            discarded: 1,
            duplicates: 0
        }
    );
    assert!(source.unseen().unwrap().is_empty());
    assert_eq!(names(&tmp.path().join("dest").join("new")).len(), 1);
    let invoices = names(&tmp.path().join("dest").join(".Invoices").join("cur"));
    assert_eq!(invoices.len(), 1);
    assert!(invoices[0].ends_with(":2,F"));

    let store = SeenStore::load(&db).unwrap();
    assert_eq!(store.len(), 3);
    assert!(store.contains("2.spam"));
}

#[test]
fn forward_skips_recorded_ids() {
    let tmp = TempDir::new().unwrap();
    let source = maildir_with(
        &tmp.path().join("source"),
        &[("new", "1.a", mail("one")), ("new", "2.b", mail("two"))],
    );
    let dest = Maildir::new(tmp.path().join("dest"));
    let mut store = SeenStore::load(&tmp.path().join("db.json")).unwrap();
    store.insert("1.a");

    let stats = forward_unseen(&mut store, &source, &dest, None).unwrap();
    assert_eq!(stats.forwarded, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(source.unseen().unwrap(), ["1.a"]);
    assert_eq!(names(&tmp.path().join("dest").join("new")).len(), 1);
}

#[test]
fn forward_keeps_received_date() {
    let tmp = TempDir::new().unwrap();
    let source = maildir_with(&tmp.path().join("source"), &[("new", "1.a", mail("old news"))]);
    let date = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    fs::File::options()
        .write(true)
        .open(tmp.path().join("source").join("new").join("1.a"))
        .unwrap()
        .set_modified(date)
        .unwrap();
    assert_eq!(source.received("1.a").unwrap(), date);

    let dest = Maildir::new(tmp.path().join("dest"));
    let mut store = SeenStore::load(&tmp.path().join("db.json")).unwrap();
    forward_unseen(&mut store, &source, &dest, None).unwrap();

    let new = tmp.path().join("dest").join("new");
    let delivered = names(&new);
    assert_eq!(delivered.len(), 1);
    let modified = fs::metadata(new.join(&delivered[0])).unwrap().modified().unwrap();
    assert_eq!(modified, date);
}

#[test]
fn maildir_append_encodes_folder_names() {
    let tmp = TempDir::new().unwrap();
    let dest = Maildir::new(tmp.path());
    dest.append("Entwürfe", b"draft", &BTreeSet::new(), None).unwrap();
    assert_eq!(names(&tmp.path().join(".Entw&APw-rfe").join("new")).len(), 1);
}
