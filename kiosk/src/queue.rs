//! The Queue Manager.
//!
//! [`QueueState`] owns the ticket list, the per-service sequence counters,
//! the per-window current-call slots and the bounded call history. All
//! operations are synchronous; the reducer calls them while the store holds
//! the write lock, so two windows can never claim the same waiting ticket.

use crate::config::KioskConfig;
use crate::error::QueueError;
use crate::types::{
    CallRecord, DisplayCode, ServiceId, ServiceStatistics, Statistics, Ticket, TicketId,
    TicketStatus, WindowId,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// In-memory queue state
#[derive(Clone, Debug)]
pub struct QueueState {
    config: Arc<KioskConfig>,
    /// All tickets in creation order; `tickets[i].id == i + 1`
    tickets: Vec<Ticket>,
    sequences: HashMap<ServiceId, u32>,
    current_calls: BTreeMap<WindowId, TicketId>,
    history: VecDeque<CallRecord>,
    last_issued: Option<TicketId>,
    /// Error from the most recent rejected command, cleared on success
    pub last_error: Option<QueueError>,
}

impl QueueState {
    /// Creates an empty queue for the given configuration
    #[must_use]
    pub fn new(config: Arc<KioskConfig>) -> Self {
        let history = VecDeque::with_capacity(config.history_size);
        Self {
            config,
            tickets: Vec::new(),
            sequences: HashMap::new(),
            current_calls: BTreeMap::new(),
            history,
            last_issued: None,
            last_error: None,
        }
    }

    /// Configuration the queue was created with
    #[must_use]
    pub fn config(&self) -> &KioskConfig {
        &self.config
    }

    /// Issues a new waiting ticket for a service.
    ///
    /// The sequence number is one more than the highest number issued for
    /// the service so far, starting at 1. Numbers are never reused.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidService`] if the service is not configured
    /// - [`QueueError::SequenceExhausted`] once `u32::MAX` tickets were
    ///   issued for the service; state is left unchanged
    pub fn issue_ticket(
        &mut self,
        service_id: &ServiceId,
        now: DateTime<Utc>,
    ) -> Result<Ticket, QueueError> {
        let prefix = self
            .config
            .service(service_id)
            .map(|service| service.prefix.clone())
            .ok_or_else(|| QueueError::InvalidService(service_id.clone()))?;

        let sequence = {
            let last = self.sequences.entry(service_id.clone()).or_insert(0);
            *last = last
                .checked_add(1)
                .ok_or_else(|| QueueError::SequenceExhausted(service_id.clone()))?;
            *last
        };
        let code = DisplayCode::new(prefix, sequence).render(self.config.padding_width);

        let id = TicketId::new(self.next_id());
        let ticket = Ticket::new(id, service_id.clone(), sequence, code, now);
        self.tickets.push(ticket.clone());
        self.last_issued = Some(id);

        tracing::debug!(ticket_id = %id, code = %ticket.display_code, "Ticket issued");
        Ok(ticket)
    }

    /// Oldest waiting ticket among the services the window may call.
    ///
    /// FIFO is per eligible pool: tickets of other services are ignored no
    /// matter how old they are. `Ok(None)` means nothing is waiting.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownWindow`] if the window is not configured.
    pub fn next_eligible_ticket(&self, window_id: &WindowId) -> Result<Option<&Ticket>, QueueError> {
        self.ensure_window(window_id)?;
        let allowed = self.config.allowed_services(window_id);

        Ok(self
            .tickets
            .iter()
            .filter(|t| t.is_waiting() && allowed.contains(&t.service_id))
            .min_by_key(|t| (t.created_at, t.id)))
    }

    /// Calls the next eligible ticket to a window.
    ///
    /// A ticket already in the window's slot is replaced without changing
    /// its status; it stays `called` with its assigned window intact.
    ///
    /// # Errors
    ///
    /// - [`QueueError::UnknownWindow`] if the window is not configured
    /// - [`QueueError::NoTicketAvailable`] if no eligible ticket is waiting;
    ///   state is left unchanged
    pub fn call_next(&mut self, window_id: &WindowId, now: DateTime<Utc>) -> Result<Ticket, QueueError> {
        let id = self
            .next_eligible_ticket(window_id)?
            .map(|t| t.id)
            .ok_or_else(|| QueueError::NoTicketAvailable(window_id.clone()))?;

        let ticket = self.ticket_mut(id)?;
        ticket.call(window_id.clone(), now)?;
        let snapshot = ticket.clone();

        if let Some(previous) = self.current_calls.insert(window_id.clone(), id) {
            tracing::debug!(window = %window_id, replaced = %previous, "Window slot reassigned");
        }

        self.history.push_front(CallRecord {
            ticket: snapshot.clone(),
            window_id: window_id.clone(),
            called_at: now,
        });
        self.history.truncate(self.config.history_size);

        Ok(snapshot)
    }

    /// Ticket to announce again for a window. Nothing is mutated.
    ///
    /// # Errors
    ///
    /// - [`QueueError::UnknownWindow`] if the window is not configured
    /// - [`QueueError::NoCurrentCall`] if the window is idle
    pub fn repeat_call(&self, window_id: &WindowId) -> Result<&Ticket, QueueError> {
        self.ensure_window(window_id)?;
        self.current_call(window_id)
            .ok_or_else(|| QueueError::NoCurrentCall(window_id.clone()))
    }

    /// Completes the window's current ticket and frees the window.
    ///
    /// # Errors
    ///
    /// - [`QueueError::UnknownWindow`] if the window is not configured
    /// - [`QueueError::NoCurrentCall`] if the window is idle
    pub fn complete_ticket(&mut self, window_id: &WindowId) -> Result<Ticket, QueueError> {
        self.ensure_window(window_id)?;
        let id = self
            .current_calls
            .get(window_id)
            .copied()
            .ok_or_else(|| QueueError::NoCurrentCall(window_id.clone()))?;

        let ticket = self.ticket_mut(id)?;
        ticket.complete()?;
        let snapshot = ticket.clone();
        self.current_calls.remove(window_id);

        Ok(snapshot)
    }

    /// Ticket currently assigned to a window's slot
    #[must_use]
    pub fn current_call(&self, window_id: &WindowId) -> Option<&Ticket> {
        self.current_calls
            .get(window_id)
            .and_then(|id| self.ticket(*id))
    }

    /// Waiting tickets for a service
    #[must_use]
    pub fn waiting_count(&self, service_id: &ServiceId) -> usize {
        self.tickets
            .iter()
            .filter(|t| t.is_waiting() && &t.service_id == service_id)
            .count()
    }

    /// Waiting tickets across all services
    #[must_use]
    pub fn total_waiting(&self) -> usize {
        self.tickets.iter().filter(|t| t.is_waiting()).count()
    }

    /// Aggregate counts, recomputed from the ticket list
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        let mut by_service: Vec<ServiceStatistics> = self
            .config
            .services
            .iter()
            .map(|s| ServiceStatistics::empty(s.id.clone()))
            .collect();

        let mut stats = Statistics {
            total: self.tickets.len(),
            currently_serving: self.current_calls.len(),
            ..Statistics::default()
        };

        for ticket in &self.tickets {
            match ticket.status {
                TicketStatus::Waiting => stats.waiting += 1,
                TicketStatus::Called => stats.called += 1,
                TicketStatus::Completed => stats.completed += 1,
            }
            if let Some(entry) = by_service.iter_mut().find(|s| s.service_id == ticket.service_id) {
                entry.count(ticket.status);
            }
        }

        stats.by_service = by_service;
        stats
    }

    /// Waiting tickets, of any service, issued before the given ticket
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownTicket`] if the ticket does not exist.
    pub fn waiting_before(&self, ticket_id: TicketId) -> Result<usize, QueueError> {
        let ticket = self
            .ticket(ticket_id)
            .ok_or_else(|| QueueError::UnknownTicket(ticket_id.to_string()))?;

        Ok(self
            .tickets
            .iter()
            .take_while(|t| t.id < ticket.id)
            .filter(|t| t.is_waiting())
            .count())
    }

    /// Rough wait: tickets ahead times the average service time
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownTicket`] if the ticket does not exist.
    pub fn estimated_wait(&self, ticket_id: TicketId) -> Result<Duration, QueueError> {
        let ahead = i64::try_from(self.waiting_before(ticket_id)?).unwrap_or(i64::MAX);
        let minutes = ahead.saturating_mul(i64::from(self.config.average_service_minutes));
        Ok(Duration::try_minutes(minutes).unwrap_or(Duration::MAX))
    }

    /// First `limit` waiting tickets of a service, oldest first
    #[must_use]
    pub fn upcoming(&self, service_id: &ServiceId, limit: usize) -> Vec<&Ticket> {
        self.tickets
            .iter()
            .filter(|t| t.is_waiting() && &t.service_id == service_id)
            .take(limit)
            .collect()
    }

    /// Finds a ticket by its display code, e.g. `C007`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::UnknownTicket`] if the code is malformed, the
    /// prefix belongs to no service, or no such ticket was issued.
    pub fn resolve_code(&self, code: &str) -> Result<&Ticket, QueueError> {
        let unknown = || QueueError::UnknownTicket(code.to_string());
        let parsed = DisplayCode::parse(code.trim()).map_err(|_| unknown())?;
        let service = self
            .config
            .service_by_prefix(&parsed.prefix)
            .ok_or_else(unknown)?;

        self.tickets
            .iter()
            .find(|t| t.service_id == service.id && t.sequence_number == parsed.number)
            .ok_or_else(unknown)
    }

    /// Looks up a ticket by id
    #[must_use]
    pub fn ticket(&self, id: TicketId) -> Option<&Ticket> {
        Self::index_of(id).and_then(|i| self.tickets.get(i))
    }

    /// All tickets in creation order
    #[must_use]
    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    /// Call history, newest first
    pub fn history(&self) -> impl Iterator<Item = &CallRecord> {
        self.history.iter()
    }

    /// Most recently issued ticket
    #[must_use]
    pub fn last_issued(&self) -> Option<&Ticket> {
        self.last_issued.and_then(|id| self.ticket(id))
    }

    fn ensure_window(&self, window_id: &WindowId) -> Result<(), QueueError> {
        self.config
            .window(window_id)
            .map(|_| ())
            .ok_or_else(|| QueueError::UnknownWindow(window_id.clone()))
    }

    fn ticket_mut(&mut self, id: TicketId) -> Result<&mut Ticket, QueueError> {
        Self::index_of(id)
            .and_then(|i| self.tickets.get_mut(i))
            .ok_or_else(|| QueueError::UnknownTicket(id.to_string()))
    }

    fn index_of(id: TicketId) -> Option<usize> {
        usize::try_from(id.get()).ok()?.checked_sub(1)
    }

    fn next_id(&self) -> u64 {
        self.tickets.last().map_or(1, |t| t.id.get() + 1)
    }
}
