//! OpcodeDispatcher: decides how to answer each inbound message.
//!
//! The dispatcher pulls one [`InboundMessageUnit`] from a connection's
//! [`BridgingQueue`] and routes it by opcode:
//!
//! | Opcode       | Action                                             |
//! |--------------|----------------------------------------------------|
//! | continuation | nothing to send; logged                            |
//! | text         | UTF-8 check, then echo as text                     |
//! | binary       | echo as binary                                     |
//! | close        | nothing to send; the session winds down            |
//! | ping         | reply with a pong carrying `"pong"`                |
//! | pong         | nothing to send; logged                            |
//! | unknown      | logged and skipped                                 |
//!
//! # Architecture
//!
//! The dispatcher depends only on the [`MessageSink`] trait and on `wt-core`.
//! The infrastructure layer injects an [`OutboundSender`] at construction
//! time; unit tests inject a recording sink instead.
//!
//! # Error policy
//!
//! Only a failed send is returned as an error, because the caller has to know
//! the reply never left.  A text frame that is not UTF-8 and an unknown
//! opcode are reported through [`DispatchOutcome`] and logged here; they never
//! escape as errors and never stop the connection.
//!
//! [`OutboundSender`]: crate::infrastructure::OutboundSender

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{trace, warn};
use wt_core::{
    BridgingQueue, CloseCode, ConsumptionSequence, InboundMessageUnit, Opcode, OutboundMessage,
    SequenceResult,
};

use crate::domain::TransportError;

/// Trait for transmitting a reply on one connection.
///
/// The infrastructure implementation hands the message to the connection's
/// writer task; test implementations record calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Transmits `message` and waits until the transport has processed it.
    async fn transmit(&self, message: OutboundMessage) -> Result<(), TransportError>;
}

/// Error type for the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("reply send failed: {0}")]
    Send(#[from] TransportError),
}

/// What one dispatch call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A reply with this opcode was sent.
    Replied(Opcode),
    /// The unit needed no reply.
    Ignored(Opcode),
    /// The peer sent a close frame.
    Closed(Option<CloseCode>),
    /// A text payload was not valid UTF-8; no reply was sent.
    DecodeFailed { valid_up_to: usize },
    /// The opcode is reserved by the protocol; the unit was skipped.
    UnknownOpcode(u8),
    /// Another unit is still being processed (non-waiting dispatch only).
    Retry,
    /// The queue had nothing to dispatch.
    Finished,
}

/// Routes inbound units to replies.
pub struct OpcodeDispatcher {
    sink: Arc<dyn MessageSink>,
}

impl OpcodeDispatcher {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    /// Dispatches at most one unit from `queue`, waiting for its turn if
    /// another dispatch is still holding the queue.
    ///
    /// The claim on the unit (and with it the queue's single-flight marker)
    /// is held until the reply has been sent, so replies leave in the order
    /// the units were fed.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Send`] if the reply could not be sent.
    pub async fn dispatch_next(
        &self,
        queue: &Arc<BridgingQueue<InboundMessageUnit>>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut sequence = ConsumptionSequence::new(Arc::clone(queue));
        match sequence.next().await {
            Some(claim) => self.dispatch_unit(&claim).await,
            None => {
                trace!("dispatch found an empty queue");
                Ok(DispatchOutcome::Finished)
            }
        }
    }

    /// Like [`dispatch_next`](Self::dispatch_next) but returns
    /// [`DispatchOutcome::Retry`] instead of waiting when the queue is busy.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Send`] if the reply could not be sent.
    pub async fn try_dispatch_next(
        &self,
        queue: &Arc<BridgingQueue<InboundMessageUnit>>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut sequence = ConsumptionSequence::new(Arc::clone(queue));
        match sequence.step() {
            SequenceResult::Success(claim) => self.dispatch_unit(&claim).await,
            SequenceResult::Retry => {
                trace!("queue busy; will retry");
                Ok(DispatchOutcome::Retry)
            }
            SequenceResult::Finished => Ok(DispatchOutcome::Finished),
        }
    }

    /// Routes a single unit by opcode.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Send`] if the reply could not be sent.
    pub async fn dispatch_unit(
        &self,
        unit: &InboundMessageUnit,
    ) -> Result<DispatchOutcome, DispatchError> {
        let source = unit.source();
        let payload = unit.payload().unwrap_or_default();

        match unit.opcode() {
            Opcode::Continuation => {
                trace!(connection = %source, "received continuation frame");
                Ok(DispatchOutcome::Ignored(Opcode::Continuation))
            }
            Opcode::Text => {
                trace!(connection = %source, bytes = payload.len(), "received text frame");
                let text = match std::str::from_utf8(payload) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(connection = %source, "dropping text frame: {e}");
                        return Ok(DispatchOutcome::DecodeFailed {
                            valid_up_to: e.valid_up_to(),
                        });
                    }
                };
                self.sink.transmit(OutboundMessage::text(text)).await?;
                Ok(DispatchOutcome::Replied(Opcode::Text))
            }
            Opcode::Binary => {
                trace!(connection = %source, bytes = payload.len(), "received binary frame");
                self.sink
                    .transmit(OutboundMessage::binary(payload.to_vec()))
                    .await?;
                Ok(DispatchOutcome::Replied(Opcode::Binary))
            }
            Opcode::Close => {
                trace!(connection = %source, code = ?unit.close_code(), "received close frame");
                Ok(DispatchOutcome::Closed(unit.close_code()))
            }
            Opcode::Ping => {
                trace!(connection = %source, "received ping frame");
                self.sink.transmit(OutboundMessage::pong()).await?;
                Ok(DispatchOutcome::Replied(Opcode::Pong))
            }
            Opcode::Pong => {
                trace!(connection = %source, "received pong frame");
                Ok(DispatchOutcome::Ignored(Opcode::Pong))
            }
            Opcode::Unknown(value) => {
                warn!(connection = %source, "ignoring frame with unknown opcode 0x{value:X}");
                Ok(DispatchOutcome::UnknownOpcode(value))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
