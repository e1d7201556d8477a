//! Activity notification fan-out.
//!
//! This crate provides:
//! - `ActivityNotification` kinds registered per activity type
//! - Recipient resolution with per-provider strategies
//! - Context building, description rendering and avatar markup
//! - Email (lettre + minijinja) and Slack (reqwest) providers
//! - A dispatcher that fans one activity out across every provider with
//!   bounded concurrency and isolated failures

pub mod activity;
pub mod avatar;
pub mod context;
pub mod description;
pub mod dispatcher;
pub mod email;
pub mod links;
pub mod participants;
pub mod slack;
pub mod sources;
pub mod templating;
pub mod traits;

#[cfg(test)]
mod testing;

pub use activity::{ActivityNotification, NotificationRegistry};
pub use dispatcher::{Dispatcher, SendOutcome};
pub use participants::{Recipient, RecipientMap, RecipientResolver};
pub use sources::{InMemoryStore, NotifyServices};
pub use traits::{DispatchResult, Destination, Envelope, NotificationProvider, NotifyError};
