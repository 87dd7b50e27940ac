//! Per-user change notifications
//!
//! Mutating to-do handlers publish a [`ChangeEvent`](crate::protocol::ChangeEvent)
//! for the acting user; every open stream registered for that user receives it.

mod hub;

pub use hub::{ChangeNotificationHub, Observer, ObserverId, Subscription};
