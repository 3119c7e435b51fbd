//! Reducer for the queue.
//!
//! Commands run the matching [`QueueState`] operation synchronously. On
//! success the reducer returns the resulting event as an effect, so the store
//! broadcasts it to observers, plus any announcement or print effect. On
//! failure it records the error in `last_error` and broadcasts `Rejected`.
//!
//! Events that come back through the store are already reflected in state
//! and reduce to nothing.

use crate::config::WindowConfig;
use crate::error::QueueError;
use crate::metrics;
use crate::notify::{Announcement, Notifier, TicketReceipt};
use crate::queue::QueueState;
use crate::types::{ServiceId, Ticket, TicketId, WindowId};
use kiosk_core::{effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type Effects = SmallVec<[Effect<QueueAction>; 4]>;

/// Commands and events for the queue
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueAction {
    // ========== Commands ==========
    /// Command: issue a ticket for a service
    IssueTicket {
        /// Requested service
        service_id: ServiceId,
    },

    /// Command: call the next eligible ticket to a window
    CallNext {
        /// Calling window
        window_id: WindowId,
    },

    /// Command: announce the window's current ticket again
    RepeatCall {
        /// Window to repeat
        window_id: WindowId,
    },

    /// Command: complete the window's current ticket
    CompleteTicket {
        /// Window being freed
        window_id: WindowId,
    },

    /// Command: print (or reprint) a ticket receipt
    PrintTicket {
        /// Ticket to print
        ticket_id: TicketId,
    },

    /// Command: reprint the most recently issued ticket
    PrintLastTicket,

    // ========== Events ==========
    /// Event: a ticket was issued
    TicketIssued {
        /// The new ticket
        ticket: Ticket,
    },

    /// Event: a ticket was called to a window
    TicketCalled {
        /// Ticket after the call
        ticket: Ticket,
        /// Window it was called to
        window_id: WindowId,
    },

    /// Event: a call was announced again
    CallRepeated {
        /// Ticket being announced
        ticket: Ticket,
        /// Window it is called to
        window_id: WindowId,
    },

    /// Event: a ticket was served and its window freed
    TicketCompleted {
        /// Ticket after completion
        ticket: Ticket,
        /// Window that served it
        window_id: WindowId,
    },

    /// Event: a receipt was handed to the printer
    PrintRequested {
        /// Ticket being printed
        ticket: Ticket,
    },

    /// Event: a command was rejected
    Rejected {
        /// The command that failed
        command: Box<QueueAction>,
        /// Why it failed
        error: QueueError,
    },
}

impl QueueAction {
    /// Whether this action is a command
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::IssueTicket { .. }
                | Self::CallNext { .. }
                | Self::RepeatCall { .. }
                | Self::CompleteTicket { .. }
                | Self::PrintTicket { .. }
                | Self::PrintLastTicket
        )
    }

    /// Whether this action is an event
    #[must_use]
    pub const fn is_event(&self) -> bool {
        !self.is_command()
    }

    /// Whether this event is the outcome of `command`
    ///
    /// Used with `Store::send_and_wait_for` to wait for the result of a
    /// command. Two identical commands in flight at once cannot be told
    /// apart; each caller gets the first matching outcome.
    #[must_use]
    pub fn answers(&self, command: &Self) -> bool {
        match (self, command) {
            (Self::Rejected { command: failed, .. }, _) => failed.as_ref() == command,
            (Self::TicketIssued { ticket }, Self::IssueTicket { service_id }) => {
                &ticket.service_id == service_id
            },
            (Self::TicketCalled { window_id, .. }, Self::CallNext { window_id: w })
            | (Self::CallRepeated { window_id, .. }, Self::RepeatCall { window_id: w })
            | (Self::TicketCompleted { window_id, .. }, Self::CompleteTicket { window_id: w }) => {
                window_id == w
            },
            (Self::PrintRequested { ticket }, Self::PrintTicket { ticket_id }) => {
                &ticket.id == ticket_id
            },
            (Self::PrintRequested { .. }, Self::PrintLastTicket) => true,
            _ => false,
        }
    }
}

/// Environment dependencies for the queue reducer
#[derive(Clone)]
pub struct QueueEnvironment {
    /// Clock for ticket timestamps
    pub clock: Arc<dyn Clock>,
    /// Voice and print output
    pub notifier: Arc<dyn Notifier>,
}

impl QueueEnvironment {
    /// Creates a new `QueueEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self { clock, notifier }
    }
}

/// Reducer for the queue
#[derive(Clone, Debug, Default)]
pub struct QueueReducer;

impl QueueReducer {
    /// Creates a new `QueueReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn issue(
        state: &mut QueueState,
        service_id: &ServiceId,
        env: &QueueEnvironment,
    ) -> Result<Effects, QueueError> {
        let ticket = state.issue_ticket(service_id, env.clock.now())?;
        metrics::record_ticket_issued(service_id.as_str(), state.total_waiting());

        let mut effects: Effects = smallvec![Effect::emit(QueueAction::TicketIssued {
            ticket: ticket.clone()
        })];
        if state.config().print_on_issue {
            effects.push(Self::print_effect(state, &ticket, env)?);
        }
        Ok(effects)
    }

    fn call(
        state: &mut QueueState,
        window_id: &WindowId,
        env: &QueueEnvironment,
    ) -> Result<Effects, QueueError> {
        let ticket = state.call_next(window_id, env.clock.now())?;
        metrics::record_ticket_called(window_id.as_str(), state.total_waiting());

        Ok(smallvec![
            Self::announce_effect(state, &ticket, window_id, env),
            Effect::emit(QueueAction::TicketCalled {
                ticket,
                window_id: window_id.clone(),
            }),
        ])
    }

    fn repeat(
        state: &QueueState,
        window_id: &WindowId,
        env: &QueueEnvironment,
    ) -> Result<Effects, QueueError> {
        let ticket = state.repeat_call(window_id)?.clone();

        Ok(smallvec![
            Self::announce_effect(state, &ticket, window_id, env),
            Effect::emit(QueueAction::CallRepeated {
                ticket,
                window_id: window_id.clone(),
            }),
        ])
    }

    fn complete(state: &mut QueueState, window_id: &WindowId) -> Result<Effects, QueueError> {
        let ticket = state.complete_ticket(window_id)?;
        metrics::record_ticket_completed();

        Ok(smallvec![Effect::emit(QueueAction::TicketCompleted {
            ticket,
            window_id: window_id.clone(),
        })])
    }

    fn print(
        state: &QueueState,
        ticket: Option<&Ticket>,
        missing: String,
        env: &QueueEnvironment,
    ) -> Result<Effects, QueueError> {
        let ticket = ticket.cloned().ok_or(QueueError::UnknownTicket(missing))?;

        Ok(smallvec![
            Self::print_effect(state, &ticket, env)?,
            Effect::emit(QueueAction::PrintRequested { ticket }),
        ])
    }

    /// Fire-and-forget announcement; failures are logged, never retried
    fn announce_effect(
        state: &QueueState,
        ticket: &Ticket,
        window_id: &WindowId,
        env: &QueueEnvironment,
    ) -> Effect<QueueAction> {
        let config = state.config();
        let window_name = config
            .window(window_id)
            .map_or(window_id.as_str(), WindowConfig::announced_name)
            .to_string();
        let announcement = Announcement {
            code: ticket.display_code.clone(),
            window_id: window_id.clone(),
            text: config.announcement_text(&ticket.display_code, &window_name),
            window_name,
        };

        let notifier = Arc::clone(&env.notifier);
        Effect::Future(Box::pin(async move {
            let code = announcement.code.clone();
            if let Err(error) = notifier.announce(announcement).await {
                tracing::warn!(%code, %error, "Announcement failed");
                metrics::record_announcement_failed();
            }
            None
        }))
    }

    /// Fire-and-forget receipt print; failures are logged, never retried
    fn print_effect(
        state: &QueueState,
        ticket: &Ticket,
        env: &QueueEnvironment,
    ) -> Result<Effect<QueueAction>, QueueError> {
        let config = state.config();
        let service_name = config
            .service(&ticket.service_id)
            .map_or_else(|| ticket.service_id.to_string(), |s| s.name.clone());
        let receipt = TicketReceipt {
            ticket_id: ticket.id,
            clinic_name: config.clinic_name.clone(),
            display_code: ticket.display_code.clone(),
            service_name,
            issued_at: ticket.created_at,
            waiting_before: state.waiting_before(ticket.id)?,
            estimated_wait: state.estimated_wait(ticket.id)?,
        };

        let notifier = Arc::clone(&env.notifier);
        Ok(Effect::Future(Box::pin(async move {
            let code = receipt.display_code.clone();
            if let Err(error) = notifier.print(receipt).await {
                tracing::warn!(%code, %error, "Printing failed");
                metrics::record_print_failed();
            }
            None
        })))
    }

    fn reject(state: &mut QueueState, command: QueueAction, error: QueueError) -> Effects {
        tracing::debug!(reason = error.reason(), %error, "Command rejected");
        metrics::record_rejected(error.reason());
        state.last_error = Some(error.clone());

        smallvec![Effect::emit(QueueAction::Rejected {
            command: Box::new(command),
            error,
        })]
    }
}

impl Reducer for QueueReducer {
    type State = QueueState;
    type Action = QueueAction;
    type Environment = QueueEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let result = match &action {
            // ========== Commands ==========
            QueueAction::IssueTicket { service_id } => Self::issue(state, service_id, env),
            QueueAction::CallNext { window_id } => Self::call(state, window_id, env),
            QueueAction::RepeatCall { window_id } => Self::repeat(state, window_id, env),
            QueueAction::CompleteTicket { window_id } => Self::complete(state, window_id),
            QueueAction::PrintTicket { ticket_id } => {
                Self::print(state, state.ticket(*ticket_id), ticket_id.to_string(), env)
            },
            QueueAction::PrintLastTicket => {
                Self::print(state, state.last_issued(), "last issued".to_string(), env)
            },

            // ========== Events ==========
            // Already reflected in state
            QueueAction::TicketIssued { .. }
            | QueueAction::TicketCalled { .. }
            | QueueAction::CallRepeated { .. }
            | QueueAction::TicketCompleted { .. }
            | QueueAction::PrintRequested { .. }
            | QueueAction::Rejected { .. } => return SmallVec::new(),
        };

        match result {
            Ok(effects) => {
                state.last_error = None;
                effects
            },
            Err(error) => Self::reject(state, action, error),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::config::KioskConfig;
    use crate::notify::RecordingNotifier;
    use crate::types::TicketStatus;
    use kiosk_testing::{
        assertions::{assert_effects_count, assert_has_future_effect, assert_no_effects, drain_effects},
        test_clock, ReducerTest,
    };

    fn config(print_on_issue: bool) -> Arc<KioskConfig> {
        Arc::new(KioskConfig {
            print_on_issue,
            ..KioskConfig::default()
        })
    }

    fn env(notifier: &RecordingNotifier) -> QueueEnvironment {
        QueueEnvironment::new(Arc::new(test_clock()), Arc::new(notifier.clone()))
    }

    fn issue(service: &str) -> QueueAction {
        QueueAction::IssueTicket {
            service_id: ServiceId::from(service),
        }
    }

    fn call(window: &str) -> QueueAction {
        QueueAction::CallNext {
            window_id: WindowId::from(window),
        }
    }

    #[test]
    fn test_issue_ticket() {
        let notifier = RecordingNotifier::new();
        ReducerTest::new(QueueReducer::new())
            .with_env(env(&notifier))
            .given_state(QueueState::new(config(false)))
            .when_action(issue("general"))
            .then_state(|state| {
                assert_eq!(state.tickets().len(), 1);
                assert_eq!(state.tickets()[0].display_code, "C001");
                assert_eq!(state.tickets()[0].created_at, test_clock().now());
                assert!(state.last_error.is_none());
            })
            .then_effects(|effects| {
                assert_effects_count(effects, 1);
                assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_issue_prints_when_configured() {
        let notifier = RecordingNotifier::new();
        ReducerTest::new(QueueReducer::new())
            .with_env(env(&notifier))
            .given_state(QueueState::new(config(true)))
            .when_action(issue("general"))
            .then_effects(|effects| assert_effects_count(effects, 2))
            .run();
    }

    #[test]
    fn test_invalid_service_sets_last_error() {
        let notifier = RecordingNotifier::new();
        ReducerTest::new(QueueReducer::new())
            .with_env(env(&notifier))
            .given_state(QueueState::new(config(false)))
            .when_action(issue("dentistry"))
            .then_state(|state| {
                assert!(state.tickets().is_empty());
                assert_eq!(
                    state.last_error,
                    Some(QueueError::InvalidService(ServiceId::from("dentistry")))
                );
            })
            .run();
    }

    #[test]
    fn test_success_clears_last_error() {
        let notifier = RecordingNotifier::new();
        ReducerTest::new(QueueReducer::new())
            .with_env(env(&notifier))
            .given_state(QueueState::new(config(false)))
            .given_actions([call("w1")])
            .when_action(issue("general"))
            .then_state(|state| assert!(state.last_error.is_none()))
            .run();
    }

    #[test]
    fn test_events_are_no_ops() {
        let notifier = RecordingNotifier::new();
        let mut ghost = QueueState::new(config(false));
        let ticket = ghost.issue_ticket(&ServiceId::from("general"), test_clock().now()).unwrap();

        ReducerTest::new(QueueReducer::new())
            .with_env(env(&notifier))
            .given_state(QueueState::new(config(false)))
            .when_action(QueueAction::TicketIssued { ticket })
            .then_state(|state| assert!(state.tickets().is_empty()))
            .then_effects(|effects| assert_no_effects(effects))
            .run();
    }

    #[tokio::test]
    async fn test_call_announces_and_emits() {
        let notifier = RecordingNotifier::new();
        let effects = ReducerTest::new(QueueReducer::new())
            .with_env(env(&notifier))
            .given_state(QueueState::new(config(false)))
            .given_actions([issue("general")])
            .when_action(call("w1"))
            .then_state(|state| {
                let current = state.current_call(&WindowId::from("w1")).unwrap();
                assert_eq!(current.status, TicketStatus::Called);
            })
            .run_with_effects();

        let produced = drain_effects(effects).await;
        assert_eq!(produced.len(), 1);
        assert!(produced[0].answers(&call("w1")));

        let announcements = notifier.announcements();
        assert_eq!(announcements.len(), 1);
        assert_eq!(
            announcements[0].text,
            "Turno C001, favor dirigirse a ventanilla número 1"
        );
    }

    #[tokio::test]
    async fn test_empty_pool_rejects() {
        let notifier = RecordingNotifier::new();
        let effects = ReducerTest::new(QueueReducer::new())
            .with_env(env(&notifier))
            .given_state(QueueState::new(config(false)))
            .given_actions([issue("specialist")])
            .when_action(call("w1"))
            .then_state(|state| {
                assert_eq!(
                    state.last_error,
                    Some(QueueError::NoTicketAvailable(WindowId::from("w1")))
                );
                assert_eq!(state.total_waiting(), 1);
            })
            .run_with_effects();

        match drain_effects(effects).await.as_slice() {
            [QueueAction::Rejected { command, error }] => {
                assert_eq!(**command, call("w1"));
                assert_eq!(error.reason(), "no_ticket_available");
            },
            other => panic!("unexpected {other:?}"),
        }
        assert!(notifier.announcements().is_empty());
    }

    #[tokio::test]
    async fn test_failed_announcement_does_not_surface() {
        let notifier = RecordingNotifier::failing();
        let effects = ReducerTest::new(QueueReducer::new())
            .with_env(env(&notifier))
            .given_state(QueueState::new(config(false)))
            .given_actions([issue("general"), call("w1")])
            .when_action(QueueAction::RepeatCall {
                window_id: WindowId::from("w1"),
            })
            .then_state(|state| assert!(state.last_error.is_none()))
            .run_with_effects();

        let produced = drain_effects(effects).await;
        assert!(matches!(produced.as_slice(), [QueueAction::CallRepeated { .. }]));
        assert_eq!(notifier.announcements().len(), 1);
    }

    #[tokio::test]
    async fn test_print_last_ticket() {
        let notifier = RecordingNotifier::new();
        let effects = ReducerTest::new(QueueReducer::new())
            .with_env(env(&notifier))
            .given_state(QueueState::new(config(false)))
            .given_actions([issue("general"), issue("general")])
            .when_action(QueueAction::PrintLastTicket)
            .run_with_effects();

        let produced = drain_effects(effects).await;
        assert!(produced[0].answers(&QueueAction::PrintLastTicket));

        let receipts = notifier.receipts();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].display_code, "C002");
        assert_eq!(receipts[0].waiting_before, 1);
        assert_eq!(receipts[0].service_name, "Citas Médicas");
    }

    #[test]
    fn test_print_unknown_ticket() {
        let notifier = RecordingNotifier::new();
        ReducerTest::new(QueueReducer::new())
            .with_env(env(&notifier))
            .given_state(QueueState::new(config(false)))
            .when_action(QueueAction::PrintTicket {
                ticket_id: TicketId::new(7),
            })
            .then_state(|state| {
                assert!(matches!(state.last_error, Some(QueueError::UnknownTicket(_))));
            })
            .run();
    }

    #[test]
    fn test_answers_correlation() {
        let w1 = WindowId::from("w1");
        let rejected = QueueAction::Rejected {
            command: Box::new(call("w1")),
            error: QueueError::NoTicketAvailable(w1),
        };
        assert!(rejected.answers(&call("w1")));
        assert!(!rejected.answers(&call("w2")));
        assert!(!rejected.answers(&issue("general")));
        assert!(call("w1").is_command());
        assert!(rejected.is_event());
    }
}
