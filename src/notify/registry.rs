//! Startup recipient resolution.
//!
//! The persisted list is the durable source of truth; discovery only ever
//! adds to it. There is no removal path: an id stays until an operator
//! edits the store by hand.

use std::collections::BTreeSet;

use tracing::{info, warn};

use super::{NotificationApi, Recipient};
use crate::store::KeyValueStore;

/// Separator used in the persisted recipient list.
pub const RECIPIENT_SEPARATOR: char = ',';

/// Deduplicated set of recipients.
///
/// Ordered only so the persisted form is stable between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientSet(BTreeSet<Recipient>);

impl RecipientSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list, ignoring blanks and duplicates.
    pub fn parse(raw: &str) -> Self {
        raw.split(RECIPIENT_SEPARATOR)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(Recipient::new)
            .collect()
    }

    /// Comma-joined form for the store.
    pub fn to_persisted(&self) -> String {
        self.0
            .iter()
            .map(Recipient::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Add a recipient; returns `false` if it was already present.
    pub fn insert(&mut self, recipient: Recipient) -> bool {
        self.0.insert(recipient)
    }

    /// Set union.
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).cloned().collect())
    }

    /// Whether the recipient is present.
    pub fn contains(&self, recipient: &Recipient) -> bool {
        self.0.contains(recipient)
    }

    /// Number of recipients.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &Recipient> {
        self.0.iter()
    }
}

impl FromIterator<Recipient> for RecipientSet {
    fn from_iter<I: IntoIterator<Item = Recipient>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RecipientSet {
    type Item = &'a Recipient;
    type IntoIter = std::collections::btree_set::Iter<'a, Recipient>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Result of the startup merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The recipient set for the rest of the process lifetime.
    pub recipients: RecipientSet,
    /// Recipients found by discovery that were not yet persisted.
    pub newly_discovered: RecipientSet,
    /// Whether the store was rewritten.
    pub persisted_changed: bool,
}

/// Build the authoritative recipient set.
///
/// Merges discovered senders (when `discover` is set) with the list stored
/// under `key`, and writes the merged list back if it differs from what was
/// stored. Discovery, read and write failures are logged and degrade to
/// whatever subset is available; this never fails.
pub async fn resolve_recipients<A, S>(
    api: &A,
    store: &mut S,
    key: &str,
    discover: bool,
) -> Resolution
where
    A: NotificationApi + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let discovered: RecipientSet = if discover {
        match api.discover_recipients().await {
            Ok(found) => found.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "recipient discovery failed, continuing with stored recipients");
                RecipientSet::new()
            }
        }
    } else {
        RecipientSet::new()
    };

    let persisted = match store.get(key) {
        Ok(Some(raw)) => RecipientSet::parse(&raw),
        Ok(None) => RecipientSet::new(),
        Err(e) => {
            warn!(error = %e, key, "failed to read stored recipients");
            RecipientSet::new()
        }
    };

    let merged = persisted.union(&discovered);
    let newly_discovered: RecipientSet = merged
        .iter()
        .filter(|r| !persisted.contains(r))
        .cloned()
        .collect();

    let mut persisted_changed = false;
    if merged != persisted {
        match store.set(key, &merged.to_persisted()) {
            Ok(()) => {
                persisted_changed = true;
                info!(
                    added = newly_discovered.len(),
                    total = merged.len(),
                    "persisted updated recipient list"
                );
            }
            Err(e) => warn!(error = %e, key, "failed to persist recipient list"),
        }
    }

    info!(
        recipients = merged.len(),
        discovered = discovered.len(),
        stored = persisted.len(),
        "recipient registry resolved"
    );

    Resolution {
        recipients: merged,
        newly_discovered,
        persisted_changed,
    }
}
