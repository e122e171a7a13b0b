// Maildir++ mailbox access.
//
// https://cr.yp.to/proto/maildir.html
// https://www.courier-mta.org/imap/README.maildirquota.html

use ::maildir::Maildir as Folder;
use anyhow::{Context as _, anyhow};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The operations a forwarding pass needs from a mail store.
pub trait Mailbox {
    /// Ids of messages not yet marked seen, sorted.
    fn unseen(&self) -> anyhow::Result<Vec<String>>;
    fn fetch(&self, id: &str) -> anyhow::Result<Vec<u8>>;
    /// When the message arrived in this mailbox.
    fn received(&self, id: &str) -> anyhow::Result<SystemTime>;
    fn mark_seen(&self, id: &str) -> anyhow::Result<()>;
    /// Stores `message` in folder `mailbox` with the given flags, dated
    /// `date` if given and now otherwise.
    fn append(
        &self,
        mailbox: &str,
        message: &[u8],
        flags: &BTreeSet<String>,
        date: Option<SystemTime>,
    ) -> anyhow::Result<()>;
}

/// Maildir info letter for an IMAP system flag.
fn flag_letter(flag: &str) -> Option<char> {
    match flag.to_ascii_lowercase().as_str() {
        "\\seen" => Some('S'),
        "\\answered" => Some('R'),
        "\\flagged" => Some('F'),
        "\\deleted" => Some('T'),
        "\\draft" => Some('D'),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Maildir {
    root: PathBuf,
}

impl Maildir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Maildir { root: root.into() }
    }

    /// Directory of folder `mailbox`. `INBOX` is the root; other names are
    /// `.`-prefixed, hierarchy separated by `.` and encoded in IMAP UTF-7.
    pub fn folder(&self, mailbox: &str) -> PathBuf {
        if mailbox.eq_ignore_ascii_case("INBOX") || mailbox.is_empty() {
            self.root.clone()
        } else {
            let name = utf7_imap::encode_utf7_imap(mailbox.replace('/', "."));
            self.root.join(format!(".{name}"))
        }
    }

    fn inbox(&self) -> Folder {
        Folder::from(self.root.clone())
    }

    fn entry_path(&self, id: &str) -> anyhow::Result<PathBuf> {
        let entry = self
            .inbox()
            .find(id)
            .ok_or_else(|| anyhow!("message {id} not found in {}", self.root.display()))?;
        Ok(entry.path().clone())
    }
}

fn set_modified(path: &Path, date: SystemTime) -> anyhow::Result<()> {
    File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(date))
        .with_context(|| format!("setting date of {}", path.display()))
}

impl Mailbox for Maildir {
    fn unseen(&self) -> anyhow::Result<Vec<String>> {
        let inbox = self.inbox();
        let mut ids = Vec::new();
        for entry in inbox.list_new() {
            let entry = entry.with_context(|| format!("listing {}", self.root.display()))?;
            ids.push(entry.id().to_string());
        }
        for entry in inbox.list_cur() {
            let entry = entry.with_context(|| format!("listing {}", self.root.display()))?;
            if !entry.is_seen() {
                ids.push(entry.id().to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn fetch(&self, id: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.entry_path(id)?;
        fs::read(&path).with_context(|| format!("reading {}", path.display()))
    }

    fn received(&self, id: &str) -> anyhow::Result<SystemTime> {
        let path = self.entry_path(id)?;
        fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .with_context(|| format!("reading date of {}", path.display()))
    }

    fn mark_seen(&self, id: &str) -> anyhow::Result<()> {
        let path = self.entry_path(id)?;
        let inbox = self.inbox();
        let in_new = path.parent().and_then(Path::file_name) == Some(OsStr::new("new"));
        let res = if in_new {
            inbox.move_new_to_cur_with_flags(id, "S")
        } else {
            inbox.add_flags(id, "S")
        };
        res.with_context(|| format!("marking {} seen", path.display()))
    }

    fn append(
        &self,
        mailbox: &str,
        message: &[u8],
        flags: &BTreeSet<String>,
        date: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let dir = self.folder(mailbox);
        let folder = Folder::from(dir.clone());
        folder
            .create_dirs()
            .with_context(|| format!("creating {}", dir.display()))?;

        let mut letters = BTreeSet::new();
        for flag in flags {
            match flag_letter(flag) {
                Some(letter) => {
                    letters.insert(letter);
                }
                None => log::warn!("{}: keyword {flag:?} not representable, skipped", dir.display()),
            }
        }
        let letters: String = letters.into_iter().collect();

        let id = if letters.is_empty() {
            folder.store_new(message)
        } else {
            folder.store_cur_with_flags(message, &letters)
        }
        .with_context(|| format!("delivering to {}", dir.display()))?;

        if let Some(date) = date
            && let Some(entry) = folder.find(&id)
        {
            set_modified(entry.path(), date)?;
        }
        log::debug!("appended {id} to {}", dir.display());
        Ok(())
    }
}

#[test]
fn test_folder_names() {
    let maildir = Maildir::new("/var/mail/u");
    assert_eq!(maildir.folder("inbox"), PathBuf::from("/var/mail/u"));
    assert_eq!(maildir.folder("Archive"), PathBuf::from("/var/mail/u/.Archive"));
    assert_eq!(
        maildir.folder("Lists/rust"),
        PathBuf::from("/var/mail/u/.Lists.rust")
    );
    assert_eq!(
        maildir.folder("Entwürfe"),
        PathBuf::from("/var/mail/u/.Entw&APw-rfe")
    );
}

#[test]
fn test_flag_letters() {
    assert_eq!(flag_letter("\\Seen"), Some('S'));
    assert_eq!(flag_letter("\\FLAGGED"), Some('F'));
    assert_eq!(flag_letter("$Junk"), None);
}
