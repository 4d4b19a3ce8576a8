//! In-memory projection of every user's online status.
//!
//! The one piece of shared mutable state in the hub. All access goes through
//! a single mutex; callers get cloned snapshots and the lock is never held
//! across I/O.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use acre_core::ids::UserId;
use acre_core::protocol::UserStatus;

#[derive(Default)]
pub struct PresenceCache {
    inner: Mutex<HashMap<UserId, UserStatus>>,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire cached set. Readers see either the old set or the
    /// new one, never a mix.
    pub fn load_all(&self, entries: Vec<UserStatus>) {
        let map: HashMap<UserId, UserStatus> = entries
            .into_iter()
            .map(|status| (status.id.clone(), status))
            .collect();
        *self.inner.lock() = map;
    }

    /// Flip a user's active flag. Unknown users are a no-op: the cache is a
    /// projection of the store, not a source of truth for user existence.
    /// Returns whether the user was known.
    pub fn set_active(&self, user_id: &UserId, is_active: bool) -> bool {
        let mut guard = self.inner.lock();
        match guard.get_mut(user_id) {
            Some(entry) => {
                entry.is_active = is_active;
                true
            }
            None => {
                drop(guard);
                debug!(user_id = %user_id, "presence flip for unknown user ignored");
                false
            }
        }
    }

    /// Point-in-time copy of all active entries, optionally excluding one
    /// user. Sorted for deterministic payloads.
    pub fn snapshot_active(&self, exclude: Option<&UserId>) -> Vec<UserStatus> {
        let mut out: Vec<UserStatus> = {
            let guard = self.inner.lock();
            guard
                .values()
                .filter(|u| u.is_active && Some(&u.id) != exclude)
                .cloned()
                .collect()
        };
        sort_statuses(&mut out);
        out
    }

    /// Point-in-time copy of every entry with its current flag; the payload
    /// of `users_status` broadcasts.
    pub fn snapshot_all(&self) -> Vec<UserStatus> {
        let mut out: Vec<UserStatus> = {
            let guard = self.inner.lock();
            guard.values().cloned().collect()
        };
        sort_statuses(&mut out);
        out
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().values().filter(|u| u.is_active).count()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

fn sort_statuses(statuses: &mut [UserStatus]) {
    statuses.sort_by(|a, b| {
        a.display_name
            .cmp(&b.display_name)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(id: &str, name: &str, active: bool) -> UserStatus {
        UserStatus {
            id: UserId::from_raw(id),
            display_name: name.into(),
            is_active: active,
        }
    }

    fn loaded() -> PresenceCache {
        let cache = PresenceCache::new();
        cache.load_all(vec![
            status("user_a", "Ada", false),
            status("user_b", "Brendan", false),
            status("user_g", "Grace", true),
        ]);
        cache
    }

    #[test]
    fn load_all_replaces_everything() {
        let cache = loaded();
        assert_eq!(cache.len(), 3);

        cache.load_all(vec![status("user_x", "Xavier", true)]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.snapshot_all()[0].id, UserId::from_raw("user_x"));
    }

    #[test]
    fn set_active_is_idempotent() {
        let cache = loaded();
        assert!(cache.set_active(&UserId::from_raw("user_a"), true));
        let once = cache.snapshot_all();
        assert!(cache.set_active(&UserId::from_raw("user_a"), true));
        assert_eq!(cache.snapshot_all(), once);
    }

    #[test]
    fn set_active_unknown_user_is_noop() {
        let cache = loaded();
        assert!(!cache.set_active(&UserId::from_raw("user_nobody"), true));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.active_count(), 1);
    }

    #[test]
    fn snapshot_active_filters_and_excludes() {
        let cache = loaded();
        cache.set_active(&UserId::from_raw("user_a"), true);

        let all_active = cache.snapshot_active(None);
        let names: Vec<&str> = all_active.iter().map(|u| u.display_name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Grace"]);

        let without_ada = cache.snapshot_active(Some(&UserId::from_raw("user_a")));
        let names: Vec<&str> = without_ada.iter().map(|u| u.display_name.as_str()).collect();
        assert_eq!(names, vec!["Grace"]);
    }

    #[test]
    fn snapshot_all_keeps_inactive_entries() {
        let cache = loaded();
        let all = cache.snapshot_all();
        assert_eq!(all.len(), 3);
        assert!(all.iter().any(|u| !u.is_active));
    }

    #[test]
    fn snapshots_are_copies() {
        let cache = loaded();
        let before = cache.snapshot_all();
        cache.set_active(&UserId::from_raw("user_a"), true);
        // the earlier snapshot is unaffected by later mutation
        assert!(!before.iter().find(|u| u.id.as_str() == "user_a").unwrap().is_active);
    }
}
