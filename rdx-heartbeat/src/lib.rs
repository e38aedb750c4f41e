//! # Heartbeat
//!
//! A callback registry and periodic pulse engine for Rust.
//!
//! Heartbeat provides two small building blocks for change notification:
//!
//! - **CallbackRegistry**: an ordered collection of callbacks executed in
//!   bulk. Every execution pass builds one [`change::ChangeDescriptor`]
//!   describing what changed and hands it to each callback in registration
//!   order, isolating failures so one broken subscriber never starves the
//!   rest.
//! - **Heartbeat**: a pulse driver that owns one registry and executes it on
//!   a wall-clock interval, with runtime pace changes, beat skipping, and a
//!   stop that reliably cancels an in-flight tick.
//!
//! Change descriptors link into a causal chain: each one can point back at
//! the descriptor that triggered it, and forward at the one it triggered,
//! with the two links kept symmetric automatically.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use heartbeat::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut heartbeat = Heartbeat::new();
//!
//!     // Register a callback; it runs once per beat.
//!     heartbeat.register(|descriptor| {
//!         println!("beat at {}", descriptor.created_at());
//!         Ok(())
//!     });
//!
//!     // Watch the event stream.
//!     let mut events = heartbeat.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("event: {:?}", event);
//!         }
//!     });
//!
//!     heartbeat.start(Some(Duration::from_secs(1)));
//!     heartbeat.skip(2, true); // suppress the next two beats
//!     tokio::signal::ctrl_c().await?;
//!     heartbeat.stop();
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Heartbeat Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod change;
pub(crate) mod common;
pub mod config;
pub mod events;
pub mod heartbeat;
pub mod registry;

/// A prelude module for easy importing of the most common types.
pub mod prelude {
    pub use crate::change::{ChangeDescriptor, ChangedObject};
    pub use crate::config::HeartbeatConfig;
    pub use crate::events::HeartbeatEvent;
    pub use crate::heartbeat::{Heartbeat, HeartbeatState};
    pub use crate::registry::{CallbackRegistry, ChangeCallback};
}
