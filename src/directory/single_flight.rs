//! # Single Flight
//!
//! A coalescing map: key → one in-flight computation, many waiting consumers.
//!
//! The first caller to [`SingleFlight::join`] a key becomes the [`Leader`] and is
//! responsible for producing the value. Everyone joining while the leader is
//! still working becomes a follower and receives a clone of the same value.
//!
//! # Architecture Note
//! Removing the key and collecting its waiters happen under one lock, so a
//! caller either lands in the set that receives the current outcome or finds
//! the key absent and starts a new flight. Nobody is dropped and nobody is
//! answered twice. Values are sent after the lock is released.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::oneshot;

type Waiters<K, V> = Arc<Mutex<HashMap<K, Vec<oneshot::Sender<V>>>>>;

/// Result of joining a key.
pub enum Flight<K: Eq + Hash, V> {
    /// No computation was running; the caller must run it and call [`Leader::finish`].
    Leader(Leader<K, V>, oneshot::Receiver<V>),
    /// A computation is already running; wait on the receiver.
    Follower(oneshot::Receiver<V>),
}

pub struct SingleFlight<K, V> {
    waiters: Waiters<K, V>,
}

impl<K, V> Clone for SingleFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            waiters: Arc::clone(&self.waiters),
        }
    }
}

impl<K: Eq + Hash, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            waiters: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> SingleFlight<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `key`.
    pub fn join(&self, key: &K) -> Flight<K, V> {
        let (sender, receiver) = oneshot::channel();
        let mut waiters = self.waiters.lock();
        if let Some(pending) = waiters.get_mut(key) {
            pending.push(sender);
            return Flight::Follower(receiver);
        }
        waiters.insert(key.clone(), vec![sender]);
        drop(waiters);

        let leader = Leader {
            key: Some(key.clone()),
            waiters: Arc::clone(&self.waiters),
        };
        Flight::Leader(leader, receiver)
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.waiters.lock().contains_key(key)
    }

    /// Number of callers currently waiting on `key`, the leader included.
    pub fn waiting(&self, key: &K) -> usize {
        self.waiters.lock().get(key).map_or(0, Vec::len)
    }
}

/// Obligation to complete a flight.
///
/// Dropping a leader without finishing removes the key; its waiters observe a
/// closed channel instead of hanging.
pub struct Leader<K: Eq + Hash, V> {
    key: Option<K>,
    waiters: Waiters<K, V>,
}

impl<K: Eq + Hash, V: Clone> Leader<K, V> {
    /// Ends the flight and delivers `value` to every waiter, in join order.
    pub fn finish(mut self, value: V) {
        let Some(key) = self.key.take() else {
            return;
        };
        let pending = self.waiters.lock().remove(&key).unwrap_or_default();
        for waiter in pending {
            // A waiter that stopped listening simply misses the value.
            let _ = waiter.send(value.clone());
        }
    }
}

impl<K: Eq + Hash, V> Drop for Leader<K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.waiters.lock().remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_followers_share_leader_value() {
        let flights = SingleFlight::<String, u32>::new();
        let key = "A".to_string();

        let Flight::Leader(leader, first) = flights.join(&key) else {
            panic!("first join must lead");
        };
        let Flight::Follower(second) = flights.join(&key) else {
            panic!("second join must follow");
        };
        assert_eq!(flights.waiting(&key), 2);

        leader.finish(7);
        assert_eq!(first.await.unwrap(), 7);
        assert_eq!(second.await.unwrap(), 7);
        assert!(!flights.is_in_flight(&key));
    }

    #[tokio::test]
    async fn test_join_after_finish_starts_new_flight() {
        let flights = SingleFlight::<u8, u8>::new();
        if let Flight::Leader(leader, _) = flights.join(&1) {
            leader.finish(1);
        }
        assert!(matches!(flights.join(&1), Flight::Leader(..)));
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_waiters() {
        let flights = SingleFlight::<u8, u8>::new();
        let Flight::Leader(leader, _) = flights.join(&1) else {
            panic!("first join must lead");
        };
        let Flight::Follower(follower) = flights.join(&1) else {
            panic!("second join must follow");
        };
        drop(leader);
        assert!(follower.await.is_err());
        assert!(!flights.is_in_flight(&1));
    }
}
