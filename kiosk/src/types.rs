//! Domain types for the queue kiosk.
//!
//! Tickets move through a three-state machine (waiting → called → completed).
//! The only way to change a ticket's status is [`Ticket::call`] or
//! [`Ticket::complete`], both of which go through [`TicketStatus::apply`].

use crate::error::{IllegalTransition, InvalidDisplayCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a configured service (e.g. `general`)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    /// Creates a `ServiceId`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a service window ("ventanilla")
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(String);

impl WindowId {
    /// Creates a `WindowId`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WindowId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creation-ordered ticket identity
///
/// Ids start at 1 and increase by one per issued ticket, so comparing ids
/// compares creation order. This is not the number shown to customers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(u64);

impl TicketId {
    /// Creates a `TicketId`
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ticket lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Issued, not yet called
    Waiting,
    /// Called to a window
    Called,
    /// Served
    Completed,
}

/// A requested status change
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketTransition {
    /// waiting → called
    Call,
    /// called → completed
    Complete,
}

impl TicketStatus {
    /// Applies a transition, rejecting anything outside the state machine.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] unless the move is waiting → called or
    /// called → completed.
    pub const fn apply(self, transition: TicketTransition) -> Result<Self, IllegalTransition> {
        match (self, transition) {
            (Self::Waiting, TicketTransition::Call) => Ok(Self::Called),
            (Self::Called, TicketTransition::Complete) => Ok(Self::Completed),
            (from, transition) => Err(IllegalTransition { from, transition }),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::Called => "called",
            Self::Completed => "completed",
        })
    }
}

impl fmt::Display for TicketTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Call => "call",
            Self::Complete => "complete",
        })
    }
}

/// A queue ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Creation-ordered identity
    pub id: TicketId,
    /// Service the ticket was issued for
    pub service_id: ServiceId,
    /// Per-service number, starting at 1
    pub sequence_number: u32,
    /// Customer-facing code, e.g. `C007`
    pub display_code: String,
    /// Lifecycle status
    pub status: TicketStatus,
    /// When the ticket was issued
    pub created_at: DateTime<Utc>,
    /// When the ticket was first called
    pub called_at: Option<DateTime<Utc>>,
    /// Window the ticket was called to; kept after completion
    pub assigned_window: Option<WindowId>,
}

impl Ticket {
    /// Creates a waiting ticket
    #[must_use]
    pub const fn new(
        id: TicketId,
        service_id: ServiceId,
        sequence_number: u32,
        display_code: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            service_id,
            sequence_number,
            display_code,
            status: TicketStatus::Waiting,
            created_at,
            called_at: None,
            assigned_window: None,
        }
    }

    /// Calls the ticket to a window.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] if the ticket is not waiting.
    pub fn call(&mut self, window_id: WindowId, at: DateTime<Utc>) -> Result<(), IllegalTransition> {
        self.status = self.status.apply(TicketTransition::Call)?;
        self.assigned_window = Some(window_id);
        self.called_at.get_or_insert(at);
        Ok(())
    }

    /// Marks the ticket as served. The assigned window is retained.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] if the ticket is not called.
    pub fn complete(&mut self) -> Result<(), IllegalTransition> {
        self.status = self.status.apply(TicketTransition::Complete)?;
        Ok(())
    }

    /// Whether the ticket is waiting to be called
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.status == TicketStatus::Waiting
    }
}

/// Prefix plus sequence number, the structure behind a display code
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DisplayCode {
    /// Service prefix, uppercase ASCII letters
    pub prefix: String,
    /// Sequence number within the service
    pub number: u32,
}

impl DisplayCode {
    /// Creates a display code
    #[must_use]
    pub fn new(prefix: impl Into<String>, number: u32) -> Self {
        Self {
            prefix: prefix.into(),
            number,
        }
    }

    /// Renders the code, zero-padding the number to `width` digits.
    ///
    /// Numbers wider than `width` are written in full.
    ///
    /// ```
    /// use kiosk::types::DisplayCode;
    ///
    /// assert_eq!(DisplayCode::new("C", 7).render(3), "C007");
    /// assert_eq!(DisplayCode::new("F", 1234).render(3), "F1234");
    /// ```
    #[must_use]
    pub fn render(&self, width: usize) -> String {
        format!("{}{:0width$}", self.prefix, self.number)
    }

    /// Parses `PREFIX` + digits, e.g. `C007`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDisplayCode`] if the text is not one or more
    /// uppercase ASCII letters followed by one or more ASCII digits, or if
    /// the number does not fit in a `u32`.
    pub fn parse(text: &str) -> Result<Self, InvalidDisplayCode> {
        let invalid = || InvalidDisplayCode(text.to_string());

        let split = text
            .find(|c: char| !c.is_ascii_uppercase())
            .ok_or_else(invalid)?;
        let (prefix, digits) = text.split_at(split);

        if prefix.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let number = digits.parse().map_err(|_| invalid())?;
        Ok(Self::new(prefix, number))
    }
}

impl FromStr for DisplayCode {
    type Err = InvalidDisplayCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One entry of the call-history ring
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Ticket as it was when called
    pub ticket: Ticket,
    /// Window it was called to
    pub window_id: WindowId,
    /// When the call happened
    pub called_at: DateTime<Utc>,
}

/// Per-service ticket counts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatistics {
    /// Service the counts belong to
    pub service_id: ServiceId,
    /// All tickets issued for the service
    pub total: usize,
    /// Waiting tickets
    pub waiting: usize,
    /// Called tickets
    pub called: usize,
    /// Completed tickets
    pub completed: usize,
}

/// Aggregate counts over the whole queue, recomputed on demand
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// All tickets issued
    pub total: usize,
    /// Waiting tickets
    pub waiting: usize,
    /// Called tickets
    pub called: usize,
    /// Completed tickets
    pub completed: usize,
    /// Windows that currently hold a call
    pub currently_serving: usize,
    /// Per-service breakdown, in configuration order
    pub by_service: Vec<ServiceStatistics>,
}

impl ServiceStatistics {
    pub(crate) const fn empty(service_id: ServiceId) -> Self {
        Self {
            service_id,
            total: 0,
            waiting: 0,
            called: 0,
            completed: 0,
        }
    }

    pub(crate) const fn count(&mut self, status: TicketStatus) {
        self.total += 1;
        match status {
            TicketStatus::Waiting => self.waiting += 1,
            TicketStatus::Called => self.called += 1,
            TicketStatus::Completed => self.completed += 1,
        }
    }
}
