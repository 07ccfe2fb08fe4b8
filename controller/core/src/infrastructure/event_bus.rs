// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Lifecycle Signals
//
// Provides in-memory signal streaming using tokio broadcast channels.
// Every subscriber observes every signal; nothing is consumed. Dropping a
// receiver unsubscribes it.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::ike_sa::IkeSaId;
use crate::domain::job::SignalSink;
use crate::domain::signal::Signal;

/// Event bus for publishing and subscribing to lifecycle signals
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Signal>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many signals a subscriber may fall behind
    /// before it starts missing the oldest ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1024)
    pub fn with_default_capacity() -> Self {
        Self::new(1024)
    }

    /// Publish a signal to all subscribers
    pub fn publish(&self, signal: Signal) {
        debug!(kind = %signal.kind, level = ?signal.level, "{}", signal.message);

        // send() only fails when nobody is subscribed
        if self.sender.send(signal).is_err() {
            debug!("No subscribers listening to signal");
        }
    }

    /// Subscribe to all signals
    pub fn subscribe(&self) -> SignalReceiver {
        SignalReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for a single IKE_SA
    /// Useful for front-ends following one connection
    pub fn subscribe_ike_sa(&self, ike_sa_id: IkeSaId) -> IkeSaSignalReceiver {
        IkeSaSignalReceiver {
            inner: self.subscribe(),
            ike_sa_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl SignalSink for EventBus {
    fn publish(&self, signal: Signal) {
        EventBus::publish(self, signal);
    }
}

/// Receiver for all signals. The subscription lives exactly as long as this value.
pub struct SignalReceiver {
    receiver: broadcast::Receiver<Signal>,
}

impl SignalReceiver {
    /// Receive the next signal (waits until one is available)
    pub async fn recv(&mut self) -> Result<Signal, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Signal receiver lagged by {} signals", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive a signal without waiting
    pub fn try_recv(&mut self) -> Result<Signal, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Signal receiver lagged by {} signals", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Feed every signal accepted by `predicate` to `on_signal` until it
    /// breaks, returning the break value.
    ///
    /// Waits indefinitely if no breaking signal ever arrives. Lag is logged
    /// and skipped over; only a closed bus ends the loop with an error.
    pub async fn listen<T, P, F>(&mut self, mut predicate: P, mut on_signal: F) -> Result<T, EventBusError>
    where
        P: FnMut(&Signal) -> bool,
        F: FnMut(&Signal) -> ControlFlow<T>,
    {
        loop {
            let signal = match self.recv().await {
                Ok(signal) => signal,
                Err(EventBusError::Lagged(_)) => continue,
                Err(e) => return Err(e),
            };

            if !predicate(&signal) {
                continue;
            }

            if let ControlFlow::Break(value) = on_signal(&signal) {
                return Ok(value);
            }
        }
    }
}

/// Receiver for signals concerning one IKE_SA (filtered)
pub struct IkeSaSignalReceiver {
    inner: SignalReceiver,
    ike_sa_id: IkeSaId,
}

impl IkeSaSignalReceiver {
    /// Receive the next signal for the specified IKE_SA
    /// Filters out signals for other SAs and unattributed signals
    pub async fn recv(&mut self) -> Result<Signal, EventBusError> {
        loop {
            let signal = self.inner.recv().await?;
            if signal.ike_sa_id() == Some(self.ike_sa_id) {
                return Ok(signal);
            }
        }
    }
}

/// Errors that can occur when receiving signals
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No signals available")]
    Empty,

    #[error("Receiver lagged by {0} signals (signals were dropped)")]
    Lagged(u64),
}
