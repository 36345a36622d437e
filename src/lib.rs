//! Huginn - Typed client SDK for a real-time chat platform
//!
//! This crate keeps a local, bounded, in-memory mirror of server-side
//! entities (servers, channels, messages, members, forum topics, ...) in
//! sync with a pushed event stream, and falls back to REST when something
//! is not cached.
//!
//! # Example
//!
//! ```rust,no_run
//! use huginn::{Event, Huginn, Change, EntityKind};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let client = Huginn::builder()
//!         .token("your-bot-token")
//!         .max_cache(EntityKind::Message, Some(200))
//!         .build()?;
//!
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             if let Event::Message(Change::Created(message)) = event {
//!                 println!("{:?}: {:?}", message.created_by, message.content);
//!             }
//!         }
//!     });
//!
//!     client.login().await
//! }
//! ```
//!
//! # Collecting Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use huginn::CollectorOptions;
//!
//! # async fn run(client: huginn::Client) {
//! let collector = client.message_collector(
//!     "channel-id",
//!     CollectorOptions::default().max(3).time(Duration::from_secs(30)),
//!     |message| message.content.as_deref() == Some("yes"),
//! );
//! let votes = collector.wait().await;
//! println!("{} votes", votes.len());
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod models;
pub mod rest;
pub mod sync;
pub mod telemetry;
pub mod version;
pub mod ws;

// Re-export main types at crate root
pub use cache::BoundedCache;
pub use client::{Client, ClientBuilder, Huginn};
pub use collector::{Collected, Collector, CollectorEvent, CollectorOptions, EndReason};
pub use config::{CachePolicy, ClientOptions, ReconnectConfig};
pub use error::{HuginnError, Result};
pub use events::{Change, Collectable, Event, EventBus, MemberRolesUpdate, Subscription};
pub use manager::{
    Creatable, Deletable, EntityManager, FetchOptions, Listable, ManagerRegistry, Resource,
    Updatable,
};
pub use rest::{
    HttpTransport, Method, Rest, RestRequest, RestTransport, RetryConfig, RetryingTransport,
};
pub use sync::Pipeline;
pub use ws::{StreamEvent, WebSocketTransport};

#[cfg(feature = "config")]
pub use config::FileConfig;

// Re-export all models
pub use models::*;
