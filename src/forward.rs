use crate::maildir::Mailbox;
use crate::store::SeenStore;
use crate::{Filter, MailInfoStorage, filter_mail};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForwardStats {
    pub forwarded: usize,
    pub discarded: usize,
    pub duplicates: usize,
}

/// Copies every unseen `source` message to `dest` as the filter decides,
/// keeping its received date, then marks it seen in `source`.
///
/// Each id is recorded in `store` before it is copied, so a pass that dies
/// half way never delivers the same message twice.
pub fn forward_unseen(
    store: &mut SeenStore,
    source: &dyn Mailbox,
    dest: &dyn Mailbox,
    filter: Option<&Filter>,
) -> anyhow::Result<ForwardStats> {
    let unseen = source.unseen()?;
    log::info!("Found {} new messages", unseen.len());

    let mut stats = ForwardStats::default();
    for id in unseen {
        if store.contains(&id) {
            log::info!("{id}: duplicate message");
            stats.duplicates += 1;
            continue;
        }
        store.insert(&id);
        store.save()?;

        let date = source.received(&id)?;
        let storage = MailInfoStorage {
            mail_buffer: source.fetch(&id)?,
            id,
        };
        let decision = filter_mail(filter, &storage);
        if decision.should_keep() {
            log::info!("{}: forwarding to {}", storage.id, decision.mailbox());
            dest.append(
                decision.mailbox(),
                &storage.mail_buffer,
                &decision.flags,
                Some(date),
            )?;
            stats.forwarded += 1;
        } else {
            log::info!("{}: discarded", storage.id);
            stats.discarded += 1;
        }
        source.mark_seen(&storage.id)?;
    }
    Ok(stats)
}
