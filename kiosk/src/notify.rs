//! Notification layer: voice announcements and ticket printing.
//!
//! The reducer never waits on a notifier. Announcements and receipts are
//! handed over inside `Effect::Future`s; a failure is logged at `warn` and
//! counted, but never retried and never rolls back the queue change that
//! triggered it.

use crate::types::{TicketId, WindowId};
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Errors reported by a notifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Speech output is missing or failed
    #[error("announcement failed: {0}")]
    Announce(String),
    /// Printer is missing or failed
    #[error("printing failed: {0}")]
    Print(String),
}

/// A voice announcement for a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Display code being called
    pub code: String,
    /// Window the ticket should go to
    pub window_id: WindowId,
    /// Window name as spoken
    pub window_name: String,
    /// Full text to speak
    pub text: String,
}

/// Contents of a printed ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketReceipt {
    /// Ticket being printed
    pub ticket_id: TicketId,
    /// Heading
    pub clinic_name: String,
    /// Display code, e.g. `C007`
    pub display_code: String,
    /// Service name
    pub service_name: String,
    /// When the ticket was issued
    pub issued_at: DateTime<Utc>,
    /// Waiting tickets issued earlier
    pub waiting_before: usize,
    /// Rough wait estimate
    pub estimated_wait: Duration,
}

impl TicketReceipt {
    /// Plain-text rendition for a receipt printer.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "DIGITURNOS");
        let _ = writeln!(out, "{}", self.clinic_name.to_uppercase());
        let _ = writeln!(out);
        let _ = writeln!(out, "    {}", self.display_code);
        let _ = writeln!(out);
        let _ = writeln!(out, "Servicio: {}", self.service_name);
        let _ = writeln!(out, "Fecha: {}", self.issued_at.format("%d/%m/%Y"));
        let _ = writeln!(out, "Hora: {}", self.issued_at.format("%H:%M:%S"));
        let _ = writeln!(out, "En espera: {} turnos", self.waiting_before);
        let _ = writeln!(
            out,
            "Tiempo estimado: {} min",
            self.estimated_wait.num_minutes()
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "Por favor manténgase atento a las pantallas");
        let _ = write!(out, "y al llamado por voz de su turno.");
        out
    }
}

/// Voice and print output, invoked fire-and-forget by the reducer.
pub trait Notifier: Send + Sync {
    /// Speak an announcement
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Announce`] if speech output fails.
    fn announce(&self, announcement: Announcement) -> BoxFuture<'static, Result<(), NotifyError>>;

    /// Print a ticket receipt
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Print`] if printing fails.
    fn print(&self, receipt: TicketReceipt) -> BoxFuture<'static, Result<(), NotifyError>>;
}

/// Notifier that writes announcements and receipts to the log
///
/// Stands in for speech synthesis and a receipt printer on a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<dyn Notifier> {
        Arc::new(Self)
    }
}

impl Notifier for LogNotifier {
    fn announce(&self, announcement: Announcement) -> BoxFuture<'static, Result<(), NotifyError>> {
        Box::pin(async move {
            tracing::info!(
                code = %announcement.code,
                window = %announcement.window_id,
                "🔊 {}",
                announcement.text
            );
            Ok(())
        })
    }

    fn print(&self, receipt: TicketReceipt) -> BoxFuture<'static, Result<(), NotifyError>> {
        Box::pin(async move {
            tracing::info!(
                code = %receipt.display_code,
                waiting_before = receipt.waiting_before,
                "Printing ticket\n{}",
                receipt.render_text()
            );
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
struct Recorded {
    announcements: Vec<Announcement>,
    receipts: Vec<TicketReceipt>,
}

/// Notifier that records what it was asked to do
///
/// Can be told to fail or to take a while, to check that neither affects
/// the queue.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    recorded: Arc<Mutex<Recorded>>,
    fail: bool,
    delay: Option<std::time::Duration>,
}

impl RecordingNotifier {
    /// Creates a notifier that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a notifier whose announcements and prints always fail
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Wait this long before recording each request
    #[must_use]
    pub const fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Announcements recorded so far
    #[must_use]
    pub fn announcements(&self) -> Vec<Announcement> {
        self.lock().announcements.clone()
    }

    /// Receipts recorded so far
    #[must_use]
    pub fn receipts(&self) -> Vec<TicketReceipt> {
        self.lock().receipts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for RecordingNotifier {
    fn announce(&self, announcement: Announcement) -> BoxFuture<'static, Result<(), NotifyError>> {
        let this = self.clone();
        Box::pin(async move {
            if let Some(delay) = this.delay {
                tokio::time::sleep(delay).await;
            }
            this.lock().announcements.push(announcement);
            if this.fail {
                return Err(NotifyError::Announce("speech synthesis unavailable".to_string()));
            }
            Ok(())
        })
    }

    fn print(&self, receipt: TicketReceipt) -> BoxFuture<'static, Result<(), NotifyError>> {
        let this = self.clone();
        Box::pin(async move {
            if let Some(delay) = this.delay {
                tokio::time::sleep(delay).await;
            }
            this.lock().receipts.push(receipt);
            if this.fail {
                return Err(NotifyError::Print("printer offline".to_string()));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn receipt() -> TicketReceipt {
        TicketReceipt {
            ticket_id: TicketId::new(3),
            clinic_name: "Clínica Torcoroma".to_string(),
            display_code: "C003".to_string(),
            service_name: "Citas Médicas".to_string(),
            issued_at: DateTime::<Utc>::from_timestamp(1_735_729_200, 0).unwrap(),
            waiting_before: 2,
            estimated_wait: Duration::minutes(30),
        }
    }

    #[test]
    fn test_receipt_text() {
        let text = receipt().render_text();
        assert!(text.contains("CLÍNICA TORCOROMA"));
        assert!(text.contains("C003"));
        assert!(text.contains("Servicio: Citas Médicas"));
        assert!(text.contains("Fecha: 01/01/2025"));
        assert!(text.contains("Hora: 11:00:00"));
        assert!(text.contains("En espera: 2 turnos"));
        assert!(text.contains("Tiempo estimado: 30 min"));
    }

    #[tokio::test]
    async fn test_recording_notifier_records_even_when_failing() {
        let notifier = RecordingNotifier::failing();
        let result = notifier.print(receipt()).await;

        assert_eq!(result, Err(NotifyError::Print("printer offline".to_string())));
        assert_eq!(notifier.receipts().len(), 1);
        assert!(notifier.announcements().is_empty());
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        let notifier = LogNotifier::shared();
        let announcement = Announcement {
            code: "C001".to_string(),
            window_id: WindowId::from("w1"),
            window_name: "ventanilla número 1".to_string(),
            text: "Turno C001, favor dirigirse a ventanilla número 1".to_string(),
        };
        assert!(notifier.announce(announcement).await.is_ok());
        assert!(notifier.print(receipt()).await.is_ok());
    }
}
