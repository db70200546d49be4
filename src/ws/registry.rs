//! Channel registry
//!
//! Bidirectional mapping between logical subscriptions and the numeric
//! channel ids the exchange assigns when it confirms them. Both directions
//! plus the pending set live behind one mutex so a confirmation can never
//! leave the maps disagreeing. The registry survives reconnects and is
//! cleared only on explicit disconnect.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::debug;

use crate::model::SubscriptionKey;

#[derive(Default)]
struct RegistryInner {
    by_channel: HashMap<u64, SubscriptionKey>,
    by_key: HashMap<SubscriptionKey, u64>,
    pending: HashSet<SubscriptionKey>,
}

/// Subscription bookkeeping for one streaming session.
#[derive(Default)]
pub struct ChannelRegistry {
    inner: Mutex<RegistryInner>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a subscribe request went out and no confirmation has
    /// arrived yet.
    pub fn mark_pending(&self, key: SubscriptionKey) {
        self.inner.lock().pending.insert(key);
    }

    pub fn is_pending(&self, key: &SubscriptionKey) -> bool {
        self.inner.lock().pending.contains(key)
    }

    /// Promote a subscription to active under the exchange-assigned channel
    /// id. At most one channel stays mapped per key: a stale channel for the
    /// same key is evicted first.
    pub fn confirm(&self, chan_id: u64, key: SubscriptionKey) {
        let mut inner = self.inner.lock();
        if let Some(stale) = inner.by_key.insert(key.clone(), chan_id) {
            if stale != chan_id {
                debug!(%key, stale, chan_id, "replacing stale channel mapping");
                inner.by_channel.remove(&stale);
            }
        }
        inner.by_channel.insert(chan_id, key.clone());
        inner.pending.remove(&key);
    }

    /// Resolve a data-frame channel id to its subscription.
    pub fn resolve(&self, chan_id: u64) -> Option<SubscriptionKey> {
        self.inner.lock().by_channel.get(&chan_id).cloned()
    }

    /// Active channel id for a subscription, if confirmed.
    pub fn channel_for(&self, key: &SubscriptionKey) -> Option<u64> {
        self.inner.lock().by_key.get(key).copied()
    }

    /// Remove a subscription in both directions. Returns the channel id that
    /// was active, or `None` when the subscription was unknown or still
    /// pending (the pending mark is dropped either way).
    pub fn remove(&self, key: &SubscriptionKey) -> Option<u64> {
        let mut inner = self.inner.lock();
        inner.pending.remove(key);
        let chan_id = inner.by_key.remove(key)?;
        inner.by_channel.remove(&chan_id);
        Some(chan_id)
    }

    /// Number of active (confirmed) subscriptions.
    pub fn active_len(&self) -> usize {
        self.inner.lock().by_channel.len()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.by_channel.is_empty() && inner.pending.is_empty()
    }

    /// Drop all state. Called on explicit disconnect only.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_channel.clear();
        inner.by_key.clear();
        inner.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timeframe;

    #[test]
    fn confirm_promotes_pending_to_active() {
        let registry = ChannelRegistry::new();
        let key = SubscriptionKey::trades("BTCUSD");

        registry.mark_pending(key.clone());
        assert!(registry.is_pending(&key));
        assert_eq!(registry.channel_for(&key), None);

        registry.confirm(17, key.clone());
        assert!(!registry.is_pending(&key));
        assert_eq!(registry.channel_for(&key), Some(17));
        assert_eq!(registry.resolve(17), Some(key));
    }

    #[test]
    fn remove_clears_both_directions() {
        let registry = ChannelRegistry::new();
        let key = SubscriptionKey::candles("BTCUSD", Timeframe::M1);

        registry.confirm(5, key.clone());
        assert_eq!(registry.remove(&key), Some(5));
        assert_eq!(registry.resolve(5), None);
        assert_eq!(registry.channel_for(&key), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_unknown_is_none() {
        let registry = ChannelRegistry::new();
        assert_eq!(registry.remove(&SubscriptionKey::trades("ETHUSD")), None);
    }

    #[test]
    fn remove_pending_drops_the_mark_without_channel() {
        let registry = ChannelRegistry::new();
        let key = SubscriptionKey::trades("ETHUSD");
        registry.mark_pending(key.clone());

        assert_eq!(registry.remove(&key), None);
        assert!(!registry.is_pending(&key));
    }

    #[test]
    fn at_most_one_channel_per_key() {
        let registry = ChannelRegistry::new();
        let key = SubscriptionKey::trades("BTCUSD");

        registry.confirm(1, key.clone());
        registry.confirm(2, key.clone());

        assert_eq!(registry.channel_for(&key), Some(2));
        assert_eq!(registry.resolve(1), None);
        assert_eq!(registry.resolve(2), Some(key));
        assert_eq!(registry.active_len(), 1);
    }

    #[test]
    fn distinct_kinds_for_one_pair_coexist() {
        let registry = ChannelRegistry::new();
        let trades = SubscriptionKey::trades("BTCUSD");
        let candles = SubscriptionKey::candles("BTCUSD", Timeframe::M1);

        registry.confirm(1, trades.clone());
        registry.confirm(2, candles.clone());

        assert_eq!(registry.channel_for(&trades), Some(1));
        assert_eq!(registry.channel_for(&candles), Some(2));
        assert_eq!(registry.active_len(), 2);
    }

    #[test]
    fn clear_drops_everything() {
        let registry = ChannelRegistry::new();
        registry.mark_pending(SubscriptionKey::trades("A"));
        registry.confirm(9, SubscriptionKey::trades("B"));

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.resolve(9), None);
    }
}
