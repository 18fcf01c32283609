//! Seam between the bridge logic and the rumqttc client.
//!
//! Everything the bridge asks of the broker is either "subscribe to this
//! topic" or "publish this payload", both fire-and-forget at QoS 0. Requests
//! are only queued here; the session's event loop performs the network I/O.
//! Queuing never awaits, so calling these from inside the event loop cannot
//! deadlock when the request queue is full.

use rumqttc::{AsyncClient, QoS};

/// Errors raised when the client refuses to queue a request
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("Failed to queue subscription to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Failed to queue publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },
}

pub trait BrokerClient {
    fn subscribe_topic(&self, topic: &str) -> Result<(), RequestError>;

    fn publish_payload(&self, topic: &str, payload: &[u8]) -> Result<(), RequestError>;
}

impl BrokerClient for AsyncClient {
    fn subscribe_topic(&self, topic: &str) -> Result<(), RequestError> {
        self.try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| RequestError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    fn publish_payload(&self, topic: &str, payload: &[u8]) -> Result<(), RequestError> {
        self.try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| RequestError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::{BrokerClient, RequestError};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Request {
        Subscribe(String),
        Publish { topic: String, payload: Vec<u8> },
    }

    /// Test double that records every request it is asked to queue
    #[derive(Clone, Default)]
    pub struct RecordingClient {
        requests: Arc<Mutex<Vec<Request>>>,
        reject_publish: bool,
    }

    impl RecordingClient {
        pub fn rejecting_publish() -> Self {
            Self {
                reject_publish: true,
                ..Self::default()
            }
        }

        pub fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }

        pub fn subscriptions(&self) -> Vec<String> {
            self.requests()
                .into_iter()
                .filter_map(|r| match r {
                    Request::Subscribe(topic) => Some(topic),
                    _ => None,
                })
                .collect()
        }

        pub fn published(&self) -> Vec<(String, String)> {
            self.requests()
                .into_iter()
                .filter_map(|r| match r {
                    Request::Publish { topic, payload } => {
                        Some((topic, String::from_utf8(payload).unwrap()))
                    }
                    _ => None,
                })
                .collect()
        }

        pub fn clear(&self) {
            self.requests.lock().unwrap().clear();
        }
    }

    impl BrokerClient for RecordingClient {
        fn subscribe_topic(&self, topic: &str) -> Result<(), RequestError> {
            self.requests
                .lock()
                .unwrap()
                .push(Request::Subscribe(topic.to_string()));
            Ok(())
        }

        fn publish_payload(&self, topic: &str, payload: &[u8]) -> Result<(), RequestError> {
            if self.reject_publish {
                return Err(RequestError::Publish {
                    topic: topic.to_string(),
                    reason: "request queue full".to_string(),
                });
            }
            self.requests.lock().unwrap().push(Request::Publish {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            });
            Ok(())
        }
    }
}
