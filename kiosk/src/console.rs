//! Line-oriented operator console.
//!
//! Parses one command per line and runs it against the store. Queue
//! commands wait for their outcome event so the operator sees what happened,
//! including rejections such as "no tickets available".

use crate::reducer::QueueAction;
use crate::types::{ServiceId, WindowId};
use crate::view::{CustomerPanel, DisplayBoard, StaffPanel};
use crate::KioskStore;
use kiosk_runtime::metrics::PrometheusMetrics;
use kiosk_runtime::StoreError;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Console help text
pub const HELP: &str = "\
Commands:
  issue <service>     take a ticket for a service
  call <window>       call the next ticket to a window
  repeat <window>     announce the window's ticket again
  complete <window>   complete the window's ticket
  print [code]        print a ticket (default: last issued)
  board               public display board
  staff               staff panel
  customer            customer screen
  stats               queue statistics
  metrics             Prometheus metrics
  help                this text
  quit                shut down";

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `issue <service>`
    Issue(ServiceId),
    /// `call <window>`
    Call(WindowId),
    /// `repeat <window>`
    Repeat(WindowId),
    /// `complete <window>`
    Complete(WindowId),
    /// `print [code]`
    Print(Option<String>),
    /// `board`
    Board,
    /// `staff`
    Staff,
    /// `customer`
    Customer,
    /// `stats`
    Stats,
    /// `metrics`
    Metrics,
    /// `help`
    Help,
    /// `quit` / `exit`
    Quit,
}

/// A line that is not a valid command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseCommandError {
    /// Blank line
    #[error("empty command")]
    Empty,
    /// Unrecognized verb
    #[error("unknown command {0:?}, type `help`")]
    Unknown(String),
    /// Verb needs an argument
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(ParseCommandError::Empty)?;
        let arg = words.next();

        let required = |name: &'static str| arg.ok_or(ParseCommandError::MissingArgument(name));

        Ok(match verb.to_ascii_lowercase().as_str() {
            "issue" => Self::Issue(ServiceId::from(required("issue")?)),
            "call" => Self::Call(WindowId::from(required("call")?)),
            "repeat" => Self::Repeat(WindowId::from(required("repeat")?)),
            "complete" => Self::Complete(WindowId::from(required("complete")?)),
            "print" => Self::Print(arg.map(str::to_ascii_uppercase)),
            "board" => Self::Board,
            "staff" => Self::Staff,
            "customer" => Self::Customer,
            "stats" => Self::Stats,
            "metrics" => Self::Metrics,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(ParseCommandError::Unknown(other.to_string())),
        })
    }
}

/// What the console loop should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Print the text and keep reading
    Continue(String),
    /// Stop reading and shut down
    Quit,
}

/// Operator console bound to a store
pub struct Console {
    store: Arc<KioskStore>,
    metrics: PrometheusMetrics,
    timeout: Duration,
}

impl Console {
    /// Creates a console
    #[must_use]
    pub const fn new(store: Arc<KioskStore>, metrics: PrometheusMetrics) -> Self {
        Self {
            store,
            metrics,
            timeout: Duration::from_secs(2),
        }
    }

    /// How long to wait for a command's outcome
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parses and runs one input line
    pub async fn handle_line(&self, line: &str) -> Reply {
        match line.parse::<Command>() {
            Ok(command) => self.execute(command).await,
            Err(ParseCommandError::Empty) => Reply::Continue(String::new()),
            Err(error) => Reply::Continue(error.to_string()),
        }
    }

    /// Runs a parsed command
    pub async fn execute(&self, command: Command) -> Reply {
        let text = match command {
            Command::Issue(service_id) => self.dispatch(QueueAction::IssueTicket { service_id }).await,
            Command::Call(window_id) => self.dispatch(QueueAction::CallNext { window_id }).await,
            Command::Repeat(window_id) => self.dispatch(QueueAction::RepeatCall { window_id }).await,
            Command::Complete(window_id) => {
                self.dispatch(QueueAction::CompleteTicket { window_id }).await
            },
            Command::Print(None) => self.dispatch(QueueAction::PrintLastTicket).await,
            Command::Print(Some(code)) => {
                match self.store.state(|s| s.resolve_code(&code).map(|t| t.id)).await {
                    Ok(ticket_id) => self.dispatch(QueueAction::PrintTicket { ticket_id }).await,
                    Err(error) => error.to_string(),
                }
            },
            Command::Board => self.store.state(|s| DisplayBoard::from_state(s).to_string()).await,
            Command::Staff => self.store.state(|s| StaffPanel::from_state(s).to_string()).await,
            Command::Customer => self.store.state(|s| CustomerPanel::from_state(s).to_string()).await,
            Command::Stats => {
                let stats = self.store.state(crate::QueueState::statistics).await;
                serde_json::to_string_pretty(&stats).unwrap_or_else(|e| e.to_string())
            },
            Command::Metrics => self
                .metrics
                .render()
                .unwrap_or_else(|| "metrics recorder not installed".to_string()),
            Command::Help => HELP.to_string(),
            Command::Quit => return Reply::Quit,
        };
        Reply::Continue(text)
    }

    async fn dispatch(&self, command: QueueAction) -> String {
        let expected = command.clone();
        let outcome = self
            .store
            .send_and_wait_for(command, move |a| a.answers(&expected), self.timeout)
            .await;

        match outcome {
            Ok(event) => describe(&event),
            Err(StoreError::Timeout) => "timed out waiting for the queue".to_string(),
            Err(error) => error.to_string(),
        }
    }
}

/// One-line description of an event for the operator
#[must_use]
pub fn describe(event: &QueueAction) -> String {
    match event {
        QueueAction::TicketIssued { ticket } => {
            format!("issued {} ({})", ticket.display_code, ticket.service_id)
        },
        QueueAction::TicketCalled { ticket, window_id } => {
            format!("calling {} to {window_id}", ticket.display_code)
        },
        QueueAction::CallRepeated { ticket, window_id } => {
            format!("repeated {} at {window_id}", ticket.display_code)
        },
        QueueAction::TicketCompleted { ticket, window_id } => {
            format!("completed {} at {window_id}", ticket.display_code)
        },
        QueueAction::PrintRequested { ticket } => format!("printing {}", ticket.display_code),
        QueueAction::Rejected { error, .. } => error.to_string(),
        command => format!("{command:?}"),
    }
}
