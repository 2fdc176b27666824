//! Reconcile-by-key for child collections
//!
//! The API offers no bulk "set members" call, so attaching users, teams or
//! keys means diffing the recorded list against the desired one and issuing
//! one add or remove call per differing entry.

use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;

use tracing::debug;

/// Entries to remove and add to move from one list to another.
#[derive(Debug, Clone, PartialEq)]
pub struct Changes<T> {
    pub remove: Vec<T>,
    pub add: Vec<T>,
}

impl<T> Changes<T> {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

/// Compare two lists by `key`. Entries keyed in `current` but not in
/// `desired` are removals, the reverse are additions. Duplicate keys in
/// `desired` are added once.
pub fn diff_by_key<T, K, F>(current: &[T], desired: &[T], key: F) -> Changes<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let current_keys: HashSet<K> = current.iter().map(&key).collect();
    let desired_keys: HashSet<K> = desired.iter().map(&key).collect();

    let remove = current
        .iter()
        .filter(|item| !desired_keys.contains(&key(*item)))
        .cloned()
        .collect();

    let mut seen = HashSet::new();
    let add = desired
        .iter()
        .filter(|item| {
            let k = key(*item);
            !current_keys.contains(&k) && seen.insert(k)
        })
        .cloned()
        .collect();

    Changes { remove, add }
}

/// Apply the difference between `current` and `desired` through the given
/// callbacks, removals first.
///
/// Returns the resulting list in `desired` order. Entries that were already
/// present are taken from `current`, so fields only known remotely survive;
/// new entries are whatever `add` returned. The first failing call aborts the
/// run and nothing already applied is undone.
pub async fn reconcile_by_key<T, K, E, KF, R, RFut, A, AFut>(
    current: &[T],
    desired: &[T],
    key: KF,
    mut remove: R,
    mut add: A,
) -> Result<Vec<T>, E>
where
    T: Clone,
    K: Eq + Hash,
    KF: Fn(&T) -> K,
    R: FnMut(T) -> RFut,
    RFut: Future<Output = Result<(), E>>,
    A: FnMut(T) -> AFut,
    AFut: Future<Output = Result<T, E>>,
{
    let changes = diff_by_key(current, desired, &key);
    debug!(
        "Reconciling collection: {} to remove, {} to add",
        changes.remove.len(),
        changes.add.len()
    );

    for item in changes.remove {
        remove(item).await?;
    }

    let mut added = Vec::with_capacity(changes.add.len());
    for item in changes.add {
        let k = key(&item);
        added.push((k, add(item).await?));
    }

    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(desired.len());
    for wanted in desired {
        let k = key(wanted);
        if !seen.insert(key(wanted)) {
            continue;
        }
        if let Some(existing) = current.iter().find(|item| key(item) == k) {
            result.push(existing.clone());
        } else if let Some(pos) = added.iter().position(|(ak, _)| *ak == k) {
            result.push(added.swap_remove(pos).1);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq)]
    struct Member {
        id: &'static str,
        role: &'static str,
        name: Option<&'static str>,
    }

    fn member(id: &'static str, role: &'static str) -> Member {
        Member { id, role, name: None }
    }

    #[test]
    fn test_diff_by_key() {
        let current = vec![member("a", "admin"), member("b", "user")];
        let desired = vec![member("b", "user"), member("c", "user")];

        let changes = diff_by_key(&current, &desired, |m| m.id);
        assert_eq!(changes.remove, vec![member("a", "admin")]);
        assert_eq!(changes.add, vec![member("c", "user")]);
    }

    #[test]
    fn test_role_change_is_remove_plus_add() {
        let current = vec![member("a", "user")];
        let desired = vec![member("a", "admin")];

        let changes = diff_by_key(&current, &desired, |m| (m.id, m.role));
        assert_eq!(changes.remove, vec![member("a", "user")]);
        assert_eq!(changes.add, vec![member("a", "admin")]);
    }

    #[test]
    fn test_identical_lists_have_no_changes() {
        let list = vec![member("a", "user"), member("b", "user")];
        assert!(diff_by_key(&list, &list, |m| m.id).is_empty());
    }

    #[test]
    fn test_duplicate_desired_added_once() {
        let desired = vec![member("a", "user"), member("a", "user")];
        let current: Vec<Member> = Vec::new();
        let changes = diff_by_key(&current, &desired, |m| m.id);
        assert_eq!(changes.add.len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_removes_before_adding() {
        let calls = RefCell::new(Vec::new());
        let current = vec![member("a", "user")];
        let desired = vec![member("b", "user")];

        let result: Result<Vec<Member>, String> = reconcile_by_key(
            &current,
            &desired,
            |m| m.id,
            |m| {
                calls.borrow_mut().push(format!("remove {}", m.id));
                async { Ok(()) }
            },
            |m| {
                calls.borrow_mut().push(format!("add {}", m.id));
                async move { Ok(m) }
            },
        )
        .await;

        assert_eq!(result.unwrap(), vec![member("b", "user")]);
        assert_eq!(*calls.borrow(), vec!["remove a".to_string(), "add b".to_string()]);
    }

    #[tokio::test]
    async fn test_reconcile_keeps_existing_entries_from_current() {
        let current = vec![Member {
            id: "a",
            role: "user",
            name: Some("Ada"),
        }];
        let desired = vec![member("c", "user"), member("a", "user")];

        let result: Vec<Member> = reconcile_by_key(
            &current,
            &desired,
            |m| m.id,
            |_| async { Ok::<(), String>(()) },
            |mut m| async move {
                m.name = Some("Cy");
                Ok(m)
            },
        )
        .await
        .unwrap();

        assert_eq!(result[0].name, Some("Cy"));
        assert_eq!(result[1].name, Some("Ada"));
    }

    #[tokio::test]
    async fn test_reconcile_stops_at_first_failure() {
        let adds = RefCell::new(0);
        let current: Vec<Member> = Vec::new();
        let desired = vec![member("a", "user"), member("b", "user")];

        let result: Result<Vec<Member>, String> = reconcile_by_key(
            &current,
            &desired,
            |m| m.id,
            |_| async { Ok(()) },
            |m| {
                *adds.borrow_mut() += 1;
                async move { Err(format!("cannot add {}", m.id)) }
            },
        )
        .await;

        assert_eq!(result.unwrap_err(), "cannot add a");
        assert_eq!(*adds.borrow(), 1);
    }
}
