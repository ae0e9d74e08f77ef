//! In-process event dispatch (publish/subscribe mechanics only).
//!
//! The concrete message taxonomy lives with its producers (see
//! `pantry-client::wire`); this crate only knows how to route a message to the
//! handlers registered for its kind.

pub mod bus;
pub mod subscription;

pub use bus::{Delivery, DispatchBus, Routable};
pub use subscription::Subscription;
