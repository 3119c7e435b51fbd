//! # Queue Kiosk
//!
//! Single-location queue ticketing: customers take a ticket for a service,
//! staff call tickets to windows, and a public board shows the current calls.
//!
//! The queue is driven through a [`kiosk_runtime::Store`]:
//!
//! - [`QueueState`] is the Queue Manager (tickets, window slots, history)
//! - [`QueueReducer`] turns [`QueueAction`] commands into state changes and
//!   events, plus fire-and-forget announcement and print effects
//! - [`QueueEnvironment`] injects the clock and the [`Notifier`]
//! - [`view`] builds read-only snapshots for screens
//!
//! ## Example
//!
//! ```no_run
//! use kiosk::{build_store, KioskConfig, LogNotifier, QueueAction, QueueEnvironment};
//! use kiosk::types::ServiceId;
//! use kiosk_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), kiosk_runtime::StoreError> {
//! let env = QueueEnvironment::new(Arc::new(SystemClock), LogNotifier::shared());
//! let store = build_store(KioskConfig::default(), env);
//!
//! store
//!     .send(QueueAction::IssueTicket { service_id: ServiceId::from("general") })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod reducer;
pub mod types;
pub mod view;

pub use config::{ConfigError, KioskConfig};
pub use error::QueueError;
pub use notify::{LogNotifier, Notifier, NotifyError, RecordingNotifier};
pub use queue::QueueState;
pub use reducer::{QueueAction, QueueEnvironment, QueueReducer};

use kiosk_runtime::Store;
use std::sync::Arc;

/// The kiosk store type
pub type KioskStore = Store<QueueState, QueueAction, QueueEnvironment, QueueReducer>;

/// Creates a store with an empty queue for `config`
#[must_use]
pub fn build_store(config: KioskConfig, env: QueueEnvironment) -> KioskStore {
    Store::new(QueueState::new(Arc::new(config)), QueueReducer::new(), env)
}
