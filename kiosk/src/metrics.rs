//! Business metrics for the kiosk.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `kiosk_tickets_issued_total{service}` - Tickets issued per service
//! - `kiosk_tickets_called_total{window}` - Calls per window
//! - `kiosk_tickets_completed_total` - Tickets served
//! - `kiosk_commands_rejected_total{reason}` - Rejected commands by error kind
//! - `kiosk_announcements_failed_total` - Failed announcements
//! - `kiosk_prints_failed_total` - Failed receipt prints
//!
//! ## Gauges
//! - `kiosk_tickets_waiting` - Waiting tickets across all services

use metrics::{describe_counter, describe_gauge};

/// Register descriptions for all business metrics.
///
/// Call once at startup, after the recorder is installed.
pub fn register_business_metrics() {
    describe_counter!(
        "kiosk_tickets_issued_total",
        "Total number of tickets issued, by service"
    );
    describe_counter!(
        "kiosk_tickets_called_total",
        "Total number of tickets called, by window"
    );
    describe_counter!(
        "kiosk_tickets_completed_total",
        "Total number of tickets completed"
    );
    describe_counter!(
        "kiosk_commands_rejected_total",
        "Commands rejected by the queue, by reason"
    );
    describe_counter!(
        "kiosk_announcements_failed_total",
        "Voice announcements that failed"
    );
    describe_counter!(
        "kiosk_prints_failed_total",
        "Ticket receipts that failed to print"
    );
    describe_gauge!(
        "kiosk_tickets_waiting",
        "Current number of waiting tickets"
    );

    tracing::info!("Business metrics registered");
}

/// Record an issued ticket.
pub fn record_ticket_issued(service: &str, waiting: usize) {
    metrics::counter!("kiosk_tickets_issued_total", "service" => service.to_string()).increment(1);
    record_waiting(waiting);
}

/// Record a call to a window.
pub fn record_ticket_called(window: &str, waiting: usize) {
    metrics::counter!("kiosk_tickets_called_total", "window" => window.to_string()).increment(1);
    record_waiting(waiting);
}

/// Record a served ticket.
pub fn record_ticket_completed() {
    metrics::counter!("kiosk_tickets_completed_total").increment(1);
}

/// Record a rejected command.
pub fn record_rejected(reason: &'static str) {
    metrics::counter!("kiosk_commands_rejected_total", "reason" => reason).increment(1);
}

/// Record a failed announcement.
pub fn record_announcement_failed() {
    metrics::counter!("kiosk_announcements_failed_total").increment(1);
}

/// Record a failed print.
pub fn record_print_failed() {
    metrics::counter!("kiosk_prints_failed_total").increment(1);
}

#[allow(clippy::cast_precision_loss)] // queue sizes are far below 2^52
fn record_waiting(waiting: usize) {
    metrics::gauge!("kiosk_tickets_waiting").set(waiting as f64);
}
