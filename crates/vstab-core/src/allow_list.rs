#![forbid(unsafe_code)]

//! Lazily resolved allow-list.
//!
//! Selector entries are resolved against the host document on first use and
//! the result is cached. Nothing watches the DOM: elements added after
//! resolution are not picked up until the cache is invalidated, which only
//! happens when the stabilizer rebuilds its activation state.

use tracing::debug;

use crate::config::AllowEntry;
use crate::host::Host;

/// Allow-list entries plus their cached resolution.
#[derive(Debug, Clone)]
pub struct AllowList<E> {
    entries: Vec<AllowEntry<E>>,
    resolved: Option<Vec<E>>,
}

impl<E: Clone + PartialEq> AllowList<E> {
    #[must_use]
    pub fn new(entries: Vec<AllowEntry<E>>) -> Self {
        Self {
            entries,
            resolved: None,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[AllowEntry<E>] {
        &self.entries
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Drop the cached resolution; the next lookup re-queries the host.
    pub fn invalidate(&mut self) {
        self.resolved = None;
    }

    /// Resolved elements in first-occurrence order, without duplicates.
    pub fn resolve<H>(&mut self, host: &H) -> &[E]
    where
        H: Host<Element = E>,
    {
        let entries = &self.entries;
        self.resolved
            .get_or_insert_with(|| resolve_entries(host, entries))
            .as_slice()
    }

    /// Whether `target` is one of the resolved elements or inside one.
    pub fn contains<H>(&mut self, host: &H, target: Option<&E>) -> bool
    where
        H: Host<Element = E>,
    {
        let Some(target) = target else {
            return false;
        };
        self.resolve(host)
            .iter()
            .any(|allowed| host.contains(allowed, target))
    }
}

fn resolve_entries<H: Host>(host: &H, entries: &[AllowEntry<H::Element>]) -> Vec<H::Element> {
    let mut out: Vec<H::Element> = Vec::new();
    let mut push_unique = |el: H::Element| {
        if !out.contains(&el) {
            out.push(el);
        }
    };
    for entry in entries {
        match entry {
            AllowEntry::Selector(selector) => {
                if selector.trim().is_empty() {
                    continue;
                }
                match host.query_all(selector) {
                    Ok(found) => found.into_iter().for_each(&mut push_unique),
                    Err(err) => debug!(error = %err, "skipping allow-list selector"),
                }
            }
            AllowEntry::Element(el) => push_unique(el.clone()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;
    use pretty_assertions::assert_eq;

    fn host_with_abc() -> FakeHost {
        let host = FakeHost::new();
        let a = host.add_element(None, "a", &["zone"]);
        let _b = host.add_element(None, "b", &[]);
        let _c = host.add_element(None, "c", &["zone"]);
        host.add_element(Some(a), "a-child", &[]);
        host
    }

    #[test]
    fn resolves_in_document_order_and_dedupes() {
        let host = host_with_abc();
        let a = host.by_id("a").unwrap();
        let b = host.by_id("b").unwrap();
        let c = host.by_id("c").unwrap();
        let mut list = AllowList::new(vec![
            AllowEntry::Selector(".zone".to_owned()),
            AllowEntry::Selector("#a".to_owned()),
            AllowEntry::Element(b),
            AllowEntry::Element(c),
        ]);
        assert_eq!(list.resolve(&host), &[a, c, b]);
    }

    #[test]
    fn invalid_and_blank_selectors_are_skipped() {
        let host = host_with_abc();
        let b = host.by_id("b").unwrap();
        let mut list = AllowList::new(vec![
            AllowEntry::Selector("[[broken".to_owned()),
            AllowEntry::Selector("   ".to_owned()),
            AllowEntry::Selector("#b".to_owned()),
        ]);
        assert_eq!(list.resolve(&host), &[b]);
        assert_eq!(host.query_count(), 2);
    }

    #[test]
    fn resolution_is_cached_until_invalidated() {
        let host = host_with_abc();
        let mut list = AllowList::new(vec![AllowEntry::Selector("#a".to_owned())]);
        list.resolve(&host);
        list.resolve(&host);
        assert_eq!(host.query_count(), 1);

        // Elements added later are invisible until invalidation.
        host.add_element(None, "late", &["zone"]);
        let mut zones = AllowList::new(vec![AllowEntry::Selector(".zone".to_owned())]);
        assert_eq!(zones.resolve(&host).len(), 3);
        host.add_element(None, "later", &["zone"]);
        assert_eq!(zones.resolve(&host).len(), 3);
        zones.invalidate();
        assert!(!zones.is_resolved());
        assert_eq!(zones.resolve(&host).len(), 4);
    }

    #[test]
    fn contains_uses_inclusive_ancestry() {
        let host = host_with_abc();
        let a = host.by_id("a").unwrap();
        let child = host.by_id("a-child").unwrap();
        let c = host.by_id("c").unwrap();
        let mut list = AllowList::new(vec![AllowEntry::Selector("#a".to_owned())]);
        assert!(list.contains(&host, Some(&a)));
        assert!(list.contains(&host, Some(&child)));
        assert!(!list.contains(&host, Some(&c)));
        assert!(!list.contains(&host, None));
    }
}
