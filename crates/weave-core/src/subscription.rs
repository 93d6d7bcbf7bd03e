//! The per-service subscription table.
//!
//! A [`NotifyList`] maps a published method name to the ordered listeners
//! that receive its result.  Order is registration order and is the
//! fan-out order used by the router.

use std::collections::BTreeMap;

use weave_types::{ListenerMap, SubscriptionListener};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifyList {
    topics: ListenerMap,
}

impl NotifyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener.  A duplicate `(topic, callback name, callback method)`
    /// is not inserted again; the existing entry is returned.
    pub fn add(&mut self, listener: SubscriptionListener) -> SubscriptionListener {
        let entries = self.topics.entry(listener.topic_method.clone()).or_default();
        if let Some(existing) = entries.iter().find(|l| {
            l.callback_name == listener.callback_name
                && l.callback_method == listener.callback_method
        }) {
            return existing.clone();
        }
        entries.push(listener.clone());
        listener
    }

    /// Remove the first matching listener.  Returns `true` when one was
    /// removed.
    pub fn remove(&mut self, topic: &str, callback_name: &str, callback_method: &str) -> bool {
        let Some(entries) = self.topics.get_mut(topic) else {
            return false;
        };
        match entries
            .iter()
            .position(|l| l.callback_name == callback_name && l.callback_method == callback_method)
        {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Listeners of `topic`, in registration order.
    pub fn listeners(&self, topic: &str) -> Vec<SubscriptionListener> {
        self.topics.get(topic).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.values().all(Vec::is_empty)
    }

    pub fn to_map(&self) -> ListenerMap {
        self.topics.clone()
    }

    /// Replace the whole table.  Topic names missing from a listener are
    /// filled from the map key.
    pub fn replace(&mut self, map: ListenerMap) {
        let mut topics = BTreeMap::new();
        for (topic, mut entries) in map {
            for l in &mut entries {
                if l.topic_method.is_empty() {
                    l.topic_method = topic.clone();
                }
            }
            topics.insert(topic, entries);
        }
        self.topics = topics;
    }
}

impl From<ListenerMap> for NotifyList {
    fn from(map: ListenerMap) -> Self {
        let mut list = Self::new();
        list.replace(map);
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(topic: &str, name: &str, method: &str) -> SubscriptionListener {
        SubscriptionListener::new(topic, name, method)
    }

    #[test]
    fn duplicate_add_returns_existing_entry() {
        let mut list = NotifyList::new();
        let first = list.add(listener("publishEpoch", "log@P1", "onEpoch"));
        let second = list.add(listener("publishEpoch", "log@P1", "onEpoch"));
        assert_eq!(first, second);
        assert_eq!(list.listeners("publishEpoch").len(), 1);
    }

    #[test]
    fn registration_order_is_kept() {
        let mut list = NotifyList::new();
        list.add(listener("ping", "a@P1", "onPing"));
        list.add(listener("ping", "b@P1", "onPing"));
        list.add(listener("ping", "c@P1", "onPing"));
        let names: Vec<_> = list
            .listeners("ping")
            .into_iter()
            .map(|l| l.callback_name)
            .collect();
        assert_eq!(names, ["a@P1", "b@P1", "c@P1"]);
    }

    #[test]
    fn remove_only_matching_triple() {
        let mut list = NotifyList::new();
        list.add(listener("ping", "a@P1", "onPing"));
        list.add(listener("ping", "a@P1", "onOther"));
        assert!(!list.remove("ping", "a@P1", "onMissing"));
        assert!(list.remove("ping", "a@P1", "onPing"));
        assert_eq!(list.listeners("ping"), vec![listener("ping", "a@P1", "onOther")]);
        assert!(!list.remove("nothing", "a@P1", "onPing"));
    }

    #[test]
    fn replace_fills_missing_topic() {
        let mut map = ListenerMap::new();
        map.insert(
            "publishText".to_string(),
            vec![listener("", "brain@P1", "onText")],
        );
        let list = NotifyList::from(map);
        assert_eq!(list.listeners("publishText")[0].topic_method, "publishText");
    }
}
