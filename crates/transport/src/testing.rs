//! A recording [`Transport`] double for exercising the queue, retry, and
//! pipeline crates without a real network.

use std::collections::VecDeque;

use parking_lot::Mutex;
use reportwire_model::BatchEnvelope;

use crate::{Error, Transport};
use async_trait::async_trait;

/// A transport that records every envelope it is asked to send and
/// replays a scripted sequence of outcomes.
///
/// Outcomes are consumed in order; once exhausted, `send` always
/// succeeds.
pub struct RecordingTransport {
    sent: Mutex<Vec<BatchEnvelope>>,
    outcomes: Mutex<VecDeque<Result<(), Error>>>,
}

impl RecordingTransport {
    /// Creates a transport that always succeeds.
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
        }
    }

    /// Creates a transport that replays `outcomes` in order before
    /// falling back to always-succeed.
    pub fn with_outcomes(outcomes: Vec<Result<(), Error>>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            outcomes: Mutex::new(outcomes.into()),
        }
    }

    /// The envelopes sent so far, in order.
    pub fn sent(&self) -> Vec<BatchEnvelope> {
        self.sent.lock().clone()
    }

    /// The number of envelopes sent so far.
    pub fn send_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, envelope: &BatchEnvelope) -> Result<(), Error> {
        self.sent.lock().push(envelope.clone());
        let next = self.outcomes.lock().pop_front();
        match next {
            Some(outcome) => outcome,
            None => Ok(()),
        }
    }
}
