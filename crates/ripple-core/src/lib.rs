//! # ripple-core
//!
//! Real-time event distribution for long-poll clients.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **EventQueue** - per-client event log with type-aware compaction
//! - **ClientDescriptor** - one registered session: queue + delivery filters
//! - **Registry** - process-wide queue table with allocation and idle sweep
//! - **Dispatcher** - fan-out from domain actions to recipient queues
//! - **poll** - the long-poll primitive: immediate-or-wait event reads
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐
//! │ Domain      │────▶│ Dispatcher  │────▶│ ClientDescriptor│
//! │ action      │     └─────────────┘     │  └─ EventQueue  │
//! └─────────────┘            │            └─────────────────┘
//!                            ▼                     ▲
//!                     ┌─────────────┐       ┌───────────┐
//!                     │  Registry   │◀──────│   poll    │
//!                     └─────────────┘       └───────────┘
//! ```
//!
//! Queues are independent: dispatch to one never blocks delivery on
//! another, and a suspended poll holds no lock anywhere.

pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod metrics;
pub mod poll;
pub mod queue;
pub mod registry;

pub use config::CoreConfig;
pub use descriptor::{now_ms, ClientDescriptor, ClientSpec};
pub use dispatch::{Dispatcher, SenderEcho};
pub use poll::{poll, PollParams};
pub use queue::{CollapsePolicy, EventQueue};
pub use registry::{spawn_sweeper, Registry, RegistryError, RegistryStats};
