// src/reconcile.rs

//! Desired-versus-stored reconciliation
//!
//! A pass loads the stored triples of one product into a multiset of stale
//! rows. Each desired triple takes one matching copy out of that multiset
//! when there is one (`Unchanged`) and is otherwise new (`Insert`). Whatever
//! is still stale afterwards is no longer wanted (`Delete`).
//!
//! Applying the result (see [`crate::apply`]) leaves the stored set equal to
//! the desired set, whatever either side held before.

use crate::expand::OverrideTriple;
use std::collections::HashMap;
use std::fmt;

/// Id of the product a pass runs against
///
/// `Pending` only occurs in preview mode, when the product row has not been
/// inserted yet and therefore has no id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductId {
    Stored(i64),
    Pending,
}

impl ProductId {
    /// The real database id, if there is one
    pub fn stored(self) -> Option<i64> {
        match self {
            ProductId::Stored(id) => Some(id),
            ProductId::Pending => None,
        }
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductId::Stored(id) => write!(f, "{}", id),
            ProductId::Pending => f.write_str("<new product>"),
        }
    }
}

/// Multiset of override triples
#[derive(Debug, Clone, Default)]
pub struct OverrideBag {
    counts: HashMap<OverrideTriple, usize>,
    len: usize,
}

impl OverrideBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, triple: OverrideTriple) {
        *self.counts.entry(triple).or_insert(0) += 1;
        self.len += 1;
    }

    /// Remove one copy of `triple`; returns whether a copy was present
    pub fn take(&mut self, triple: &OverrideTriple) -> bool {
        match self.counts.get_mut(triple) {
            Some(count) => {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(triple);
                }
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, triple: &OverrideTriple) -> bool {
        self.counts.contains_key(triple)
    }

    /// Total number of copies held
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Distinct remaining triples, sorted
    pub fn into_sorted(self) -> Vec<OverrideTriple> {
        let mut remaining: Vec<OverrideTriple> = self.counts.into_keys().collect();
        remaining.sort();
        remaining
    }
}

impl FromIterator<OverrideTriple> for OverrideBag {
    fn from_iter<I: IntoIterator<Item = OverrideTriple>>(iter: I) -> Self {
        let mut bag = OverrideBag::new();
        for triple in iter {
            bag.insert(triple);
        }
        bag
    }
}

/// What a pass does with one triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Desired and already stored
    Unchanged,
    /// Desired and not stored yet
    Insert,
    /// Stored but no longer desired
    Delete,
}

/// A triple together with its classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub triple: OverrideTriple,
    pub action: Action,
}

/// Classification of every triple touched by one pass
///
/// Desired triples come first in their input order, followed by deletions
/// in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    entries: Vec<Classified>,
}

impl Reconciliation {
    /// Every desired triple, whether already stored or not
    pub fn desired(&self) -> impl Iterator<Item = &OverrideTriple> {
        self.entries
            .iter()
            .filter(|c| c.action != Action::Delete)
            .map(|c| &c.triple)
    }

    pub fn unchanged(&self) -> impl Iterator<Item = &OverrideTriple> {
        self.with_action(Action::Unchanged)
    }

    pub fn to_insert(&self) -> impl Iterator<Item = &OverrideTriple> {
        self.with_action(Action::Insert)
    }

    pub fn to_delete(&self) -> impl Iterator<Item = &OverrideTriple> {
        self.with_action(Action::Delete)
    }

    /// True when applying would change nothing
    pub fn is_noop(&self) -> bool {
        self.entries.iter().all(|c| c.action == Action::Unchanged)
    }

    fn with_action(&self, action: Action) -> impl Iterator<Item = &OverrideTriple> {
        self.entries
            .iter()
            .filter(move |c| c.action == action)
            .map(|c| &c.triple)
    }
}

/// Classify desired triples against the stored ones of the same product
pub fn reconcile<I>(stored: I, desired: &[OverrideTriple]) -> Reconciliation
where
    I: IntoIterator<Item = OverrideTriple>,
{
    let mut stale: OverrideBag = stored.into_iter().collect();
    let mut entries = Vec::with_capacity(desired.len() + stale.len());

    for triple in desired {
        let action = if stale.take(triple) {
            Action::Unchanged
        } else {
            Action::Insert
        };
        entries.push(Classified {
            triple: triple.clone(),
            action,
        });
    }

    entries.extend(stale.into_sorted().into_iter().map(|triple| Classified {
        triple,
        action: Action::Delete,
    }));

    Reconciliation { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn t(name: &str, pkg_arch: &str, product_arch: &str) -> OverrideTriple {
        OverrideTriple::new(name, pkg_arch, product_arch)
    }

    /// Stored set after applying a reconciliation to `stored`
    fn applied(stored: &[OverrideTriple], rec: &Reconciliation) -> BTreeSet<OverrideTriple> {
        let mut result: BTreeSet<OverrideTriple> = stored.iter().cloned().collect();
        for triple in rec.desired() {
            result.insert(triple.clone());
        }
        for triple in rec.to_delete() {
            result.remove(triple);
        }
        result
    }

    #[test]
    fn test_bag_counts_copies() {
        let mut bag: OverrideBag = vec![t("a", "x86_64", "x86_64"), t("a", "x86_64", "x86_64")]
            .into_iter()
            .collect();
        assert_eq!(bag.len(), 2);
        assert!(bag.take(&t("a", "x86_64", "x86_64")));
        assert!(bag.contains(&t("a", "x86_64", "x86_64")));
        assert!(bag.take(&t("a", "x86_64", "x86_64")));
        assert!(!bag.take(&t("a", "x86_64", "x86_64")));
        assert!(bag.is_empty());
    }

    #[test]
    fn test_all_new_when_nothing_stored() {
        let desired = vec![t("bash", "x86_64", "x86_64"), t("bash", "src", "x86_64")];
        let rec = reconcile(Vec::new(), &desired);

        assert_eq!(rec.to_insert().count(), 2);
        assert_eq!(rec.unchanged().count(), 0);
        assert_eq!(rec.to_delete().count(), 0);
        assert!(!rec.is_noop());
    }

    #[test]
    fn test_empty_desired_deletes_everything() {
        let stored = vec![t("bash", "x86_64", "x86_64"), t("bash", "src", "x86_64")];
        let rec = reconcile(stored.clone(), &[]);

        assert_eq!(rec.to_delete().count(), 2);
        assert!(applied(&stored, &rec).is_empty());
    }

    #[test]
    fn test_mixed_classification() {
        let stored = vec![
            t("xmlstarlet", "x86_64", "x86_64"),
            t("xmlstarlet", "src", "x86_64"),
            t("xmlstarlet", "aarch64", "aarch64"),
        ];
        let desired = vec![
            t("xmlstarlet", "x86_64", "x86_64"),
            t("xmlstarlet", "ia64", "ia64"),
        ];
        let rec = reconcile(stored.clone(), &desired);

        let unchanged: Vec<_> = rec.unchanged().cloned().collect();
        let inserts: Vec<_> = rec.to_insert().cloned().collect();
        let deletes: Vec<_> = rec.to_delete().cloned().collect();
        assert_eq!(unchanged, vec![t("xmlstarlet", "x86_64", "x86_64")]);
        assert_eq!(inserts, vec![t("xmlstarlet", "ia64", "ia64")]);
        assert_eq!(
            deletes,
            vec![
                t("xmlstarlet", "aarch64", "aarch64"),
                t("xmlstarlet", "src", "x86_64"),
            ]
        );

        let expected: BTreeSet<_> = desired.into_iter().collect();
        assert_eq!(applied(&stored, &rec), expected);
    }

    #[test]
    fn test_identical_sets_are_noop() {
        let stored = vec![t("cockpit", "x86_64", "x86_64"), t("cockpit", "src", "x86_64")];
        let desired = vec![t("cockpit", "src", "x86_64"), t("cockpit", "x86_64", "x86_64")];
        let rec = reconcile(stored, &desired);
        assert!(rec.is_noop());
        assert_eq!(rec.desired().count(), 2);
    }

    #[test]
    fn test_result_independent_of_order() {
        let stored = vec![
            t("a", "noarch", "x86_64"),
            t("b", "src", "s390x"),
            t("c", "ppc", "ppc64"),
        ];
        let desired = vec![t("c", "ppc", "ppc64"), t("d", "i386", "i386"), t("a", "noarch", "x86_64")];
        let mut reversed = desired.clone();
        reversed.reverse();

        let forward = reconcile(stored.clone(), &desired);
        let backward = reconcile(stored.iter().rev().cloned(), &reversed);

        assert_eq!(applied(&stored, &forward), applied(&stored, &backward));
        assert_eq!(
            forward.to_delete().collect::<Vec<_>>(),
            backward.to_delete().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_duplicate_desired_triple() {
        let stored = vec![t("a", "noarch", "x86_64")];
        let desired = vec![t("a", "noarch", "x86_64"), t("a", "noarch", "x86_64")];
        let rec = reconcile(stored.clone(), &desired);

        assert_eq!(rec.unchanged().count(), 1);
        assert_eq!(rec.to_insert().count(), 1);
        assert_eq!(rec.to_delete().count(), 0);
        assert_eq!(applied(&stored, &rec).len(), 1);
    }

    #[test]
    fn test_product_id_display() {
        assert_eq!(ProductId::Stored(42).to_string(), "42");
        assert_eq!(ProductId::Pending.to_string(), "<new product>");
        assert_eq!(ProductId::Pending.stored(), None);
    }
}
