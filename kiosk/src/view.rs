//! Read-only snapshots for the presentation layer.
//!
//! Each view is built from a `&QueueState` in one pass, so it is always
//! consistent with a single point between mutations. The `Display` impls are
//! the text rendition used by the operator console.

use crate::queue::QueueState;
use crate::types::{ServiceId, Statistics, WindowId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Tickets shown per service on the staff panel
pub const UPCOMING_LIMIT: usize = 3;

/// A call as shown on a screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallView {
    /// Display code
    pub code: String,
    /// Service name
    pub service_name: String,
    /// Window name
    pub window_name: String,
    /// When it was called
    pub called_at: Option<DateTime<Utc>>,
}

/// Waiting count for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceWaiting {
    /// Service id
    pub service_id: ServiceId,
    /// Service name
    pub service_name: String,
    /// Waiting tickets
    pub waiting: usize,
}

/// One window on the public board
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowSlot {
    /// Window id
    pub window_id: WindowId,
    /// Window name
    pub window_name: String,
    /// Current call, if any
    pub current: Option<CallView>,
}

/// Public display board
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayBoard {
    /// Windows in configuration order
    pub windows: Vec<WindowSlot>,
    /// Recent calls, newest first
    pub history: Vec<CallView>,
    /// Waiting counts per service
    pub waiting: Vec<ServiceWaiting>,
}

/// One window on the staff panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffWindow {
    /// Window id
    pub window_id: WindowId,
    /// Window name
    pub window_name: String,
    /// Code currently called to the window
    pub current: Option<String>,
    /// Whether an eligible ticket is waiting
    pub can_call: bool,
}

/// One service on the staff panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceQueue {
    /// Service id
    pub service_id: ServiceId,
    /// Service name
    pub service_name: String,
    /// Waiting tickets
    pub waiting: usize,
    /// Next codes in line
    pub upcoming: Vec<String>,
}

/// Staff control panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffPanel {
    /// Windows in configuration order
    pub windows: Vec<StaffWindow>,
    /// Services in configuration order
    pub services: Vec<ServiceQueue>,
    /// Aggregate counts
    pub statistics: Statistics,
}

/// The ticket a customer just took
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedView {
    /// Display code
    pub code: String,
    /// Service name
    pub service_name: String,
    /// Waiting tickets ahead
    pub waiting_before: usize,
    /// Estimated wait in minutes
    pub estimated_wait_minutes: i64,
}

/// Customer-facing kiosk screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerPanel {
    /// Services to choose from
    pub services: Vec<ServiceWaiting>,
    /// Last issued ticket
    pub last_issued: Option<IssuedView>,
}

fn service_name(state: &QueueState, id: &ServiceId) -> String {
    state
        .config()
        .service(id)
        .map_or_else(|| id.to_string(), |s| s.name.clone())
}

fn window_name(state: &QueueState, id: &WindowId) -> String {
    state
        .config()
        .window(id)
        .map_or_else(|| id.to_string(), |w| w.name.clone())
}

fn waiting_counts(state: &QueueState) -> Vec<ServiceWaiting> {
    state
        .config()
        .services
        .iter()
        .map(|s| ServiceWaiting {
            service_id: s.id.clone(),
            service_name: s.name.clone(),
            waiting: state.waiting_count(&s.id),
        })
        .collect()
}

impl DisplayBoard {
    /// Builds the board from the current state
    #[must_use]
    pub fn from_state(state: &QueueState) -> Self {
        let windows = state
            .config()
            .windows
            .iter()
            .map(|w| WindowSlot {
                window_id: w.id.clone(),
                window_name: w.name.clone(),
                current: state.current_call(&w.id).map(|t| CallView {
                    code: t.display_code.clone(),
                    service_name: service_name(state, &t.service_id),
                    window_name: w.name.clone(),
                    called_at: t.called_at,
                }),
            })
            .collect();

        let history = state
            .history()
            .map(|r| CallView {
                code: r.ticket.display_code.clone(),
                service_name: service_name(state, &r.ticket.service_id),
                window_name: window_name(state, &r.window_id),
                called_at: Some(r.called_at),
            })
            .collect();

        Self {
            windows,
            history,
            waiting: waiting_counts(state),
        }
    }
}

impl StaffPanel {
    /// Builds the panel from the current state
    #[must_use]
    pub fn from_state(state: &QueueState) -> Self {
        let windows = state
            .config()
            .windows
            .iter()
            .map(|w| StaffWindow {
                window_id: w.id.clone(),
                window_name: w.name.clone(),
                current: state.current_call(&w.id).map(|t| t.display_code.clone()),
                can_call: matches!(state.next_eligible_ticket(&w.id), Ok(Some(_))),
            })
            .collect();

        let services = state
            .config()
            .services
            .iter()
            .map(|s| ServiceQueue {
                service_id: s.id.clone(),
                service_name: s.name.clone(),
                waiting: state.waiting_count(&s.id),
                upcoming: state
                    .upcoming(&s.id, UPCOMING_LIMIT)
                    .into_iter()
                    .map(|t| t.display_code.clone())
                    .collect(),
            })
            .collect();

        Self {
            windows,
            services,
            statistics: state.statistics(),
        }
    }
}

impl CustomerPanel {
    /// Builds the panel from the current state
    #[must_use]
    pub fn from_state(state: &QueueState) -> Self {
        let last_issued = state.last_issued().map(|t| IssuedView {
            code: t.display_code.clone(),
            service_name: service_name(state, &t.service_id),
            waiting_before: state.waiting_before(t.id).unwrap_or_default(),
            estimated_wait_minutes: state
                .estimated_wait(t.id)
                .map(|d| d.num_minutes())
                .unwrap_or_default(),
        });

        Self {
            services: waiting_counts(state),
            last_issued,
        }
    }
}

impl fmt::Display for DisplayBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== TURNOS ===")?;
        for slot in &self.windows {
            match &slot.current {
                Some(call) => writeln!(f, "{:<14} {:>6}  {}", slot.window_name, call.code, call.service_name)?,
                None => writeln!(f, "{:<14} {:>6}", slot.window_name, "---")?,
            }
        }
        if !self.history.is_empty() {
            writeln!(f, "--- Últimos llamados ---")?;
            for call in &self.history {
                let time = call.called_at.map(|t| t.format("%H:%M").to_string()).unwrap_or_default();
                writeln!(f, "{:>6} → {:<14} {time}", call.code, call.window_name)?;
            }
        }
        writeln!(f, "--- En espera ---")?;
        for service in &self.waiting {
            writeln!(f, "{:<16} {}", service.service_name, service.waiting)?;
        }
        Ok(())
    }
}

impl fmt::Display for StaffPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Panel de personal ===")?;
        for window in &self.windows {
            let current = window.current.as_deref().unwrap_or("Sin turno asignado");
            let action = if window.can_call { "llamar disponible" } else { "sin turnos" };
            writeln!(f, "{} [{}]: {current} ({action})", window.window_name, window.window_id)?;
        }
        for service in &self.services {
            writeln!(
                f,
                "{} [{}]: {} en espera; próximos: {}",
                service.service_name,
                service.service_id,
                service.waiting,
                if service.upcoming.is_empty() { "-".to_string() } else { service.upcoming.join(", ") }
            )?;
        }
        let s = &self.statistics;
        writeln!(
            f,
            "Total {} | en espera {} | llamados {} | atendidos {} | atendiendo {}",
            s.total, s.waiting, s.called, s.completed, s.currently_serving
        )
    }
}

impl fmt::Display for CustomerPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for service in &self.services {
            writeln!(
                f,
                "{} [{}] En espera: {}",
                service.service_name, service.service_id, service.waiting
            )?;
        }
        if let Some(issued) = &self.last_issued {
            writeln!(
                f,
                "Su turno: {} ({}), {} antes de usted, ~{} min",
                issued.code, issued.service_name, issued.waiting_before, issued.estimated_wait_minutes
            )?;
        }
        Ok(())
    }
}
