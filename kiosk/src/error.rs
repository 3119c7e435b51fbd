//! Error types for queue operations.
//!
//! Every error here is a local, recoverable condition caused by operator or
//! customer input. None of them are retried; they are surfaced as messages.

use crate::types::{ServiceId, TicketStatus, TicketTransition, WindowId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by Queue Manager operations.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueError {
    /// Ticket requested for a service that is not configured
    #[error("unknown service: {0}")]
    InvalidService(ServiceId),

    /// No waiting ticket is eligible for the window
    #[error("no tickets available for window {0}")]
    NoTicketAvailable(WindowId),

    /// Repeat or complete attempted on an idle window
    #[error("window {0} has no current call")]
    NoCurrentCall(WindowId),

    /// Window id not present in configuration
    #[error("unknown window: {0}")]
    UnknownWindow(WindowId),

    /// Ticket id or display code not present in the queue
    #[error("unknown ticket: {0}")]
    UnknownTicket(String),

    /// The service has used every sequence number
    #[error("service {0} has no sequence numbers left")]
    SequenceExhausted(ServiceId),

    /// Status change outside waiting → called → completed
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

impl QueueError {
    /// Short, stable label used for metrics and logs.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidService(_) => "invalid_service",
            Self::NoTicketAvailable(_) => "no_ticket_available",
            Self::NoCurrentCall(_) => "no_current_call",
            Self::UnknownWindow(_) => "unknown_window",
            Self::UnknownTicket(_) => "unknown_ticket",
            Self::SequenceExhausted(_) => "sequence_exhausted",
            Self::IllegalTransition(_) => "illegal_transition",
        }
    }
}

/// A ticket status change the state machine does not allow.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[error("cannot {transition} a ticket that is {from}")]
pub struct IllegalTransition {
    /// Status the ticket was in
    pub from: TicketStatus,
    /// Transition that was attempted
    pub transition: TicketTransition,
}

/// Text that is not a `PREFIX` + digits display code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid display code: {0:?}")]
pub struct InvalidDisplayCode(pub String);
