use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, info, warn};

use super::client::{BrokerClient, RequestError};
use super::config::TopicConfig;

/// Fixed set of topics the session subscribes to on every (re)connect.
///
/// Built once at startup and never mutated, so the set applied after a
/// reconnect is the set applied after the initial connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSet {
    topics: BTreeSet<String>,
}

impl SubscriptionSet {
    pub fn from_config(config: &TopicConfig) -> Self {
        let mut topics = BTreeSet::new();
        topics.insert(config.temperature.clone());
        topics.insert(config.pressure.clone());
        topics.insert(config.data.clone());
        if config.subscribe_humidity {
            topics.insert(config.humidity.clone());
        }
        topics.retain(|t| !t.is_empty());
        Self { topics }
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Queues one subscribe request per topic.
    ///
    /// A rejected topic does not stop the remaining ones; the first error is
    /// returned after all topics were attempted.
    pub fn apply<C: BrokerClient>(&self, client: &C) -> Result<(), RequestError> {
        let mut first_error = None;
        for topic in self.topics() {
            match client.subscribe_topic(topic) {
                Ok(()) => debug!("Queued subscription to {}", topic),
                Err(e) => {
                    warn!("{}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Subscribed to {} topics: {}", self.len(), self);
                Ok(())
            }
        }
    }
}

impl fmt::Display for SubscriptionSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let joined: Vec<&str> = self.topics().collect();
        write!(f, "[{}]", joined.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::client::recording::RecordingClient;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn default_topics_cover_sensor_channels() {
        let set = SubscriptionSet::from_config(&TopicConfig::default());

        assert_eq!(set.len(), 3);
        assert!(set.contains("sensors/temperature"));
        assert!(set.contains("sensors/pressure"));
        assert!(set.contains("sensors/data"));
        assert!(!set.contains("sensors/humidity"));
        assert!(!set.contains("picow/control"));
    }

    #[test]
    fn humidity_is_opt_in() {
        let config = TopicConfig {
            subscribe_humidity: true,
            ..TopicConfig::default()
        };
        let set = SubscriptionSet::from_config(&config);

        assert_eq!(set.len(), 4);
        assert!(set.contains("sensors/humidity"));
    }

    #[test]
    fn duplicate_topics_collapse() {
        let config = TopicConfig {
            pressure: "sensors/temperature".to_string(),
            ..TopicConfig::default()
        };
        let set = SubscriptionSet::from_config(&config);

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn reconnect_subscribes_to_the_same_set() {
        let set = SubscriptionSet::from_config(&TopicConfig::default());
        let client = RecordingClient::default();

        set.apply(&client).unwrap();
        let initial: HashSet<String> = client.subscriptions().into_iter().collect();
        client.clear();

        // second connect
        set.apply(&client).unwrap();
        let after_reconnect: HashSet<String> = client.subscriptions().into_iter().collect();

        assert_eq!(initial, after_reconnect);
        assert_eq!(initial.len(), set.len());
    }
}
