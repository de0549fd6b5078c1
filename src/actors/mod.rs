//! Actor-based monitoring core
//!
//! Each actor runs as an independent async task communicating via Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!                 ┌──────────────────┐
//!   HTTP layer ──►│ Registry         │──── DashboardSnapshot ───► broadcast (dashboard)
//!     (Report)    │ (single writer)  │
//!                 └────────┬─────────┘
//!                          │ routes by machine
//!            ┌─────────────┼─────────────┐
//!            │             │             │
//!     ┌──────▼──────┐      │      ┌──────▼──────┐
//!     │ ProbeWorker │      │      │ ProbeWorker │
//!     │ (web1)      │      │      │ (dbN)       │
//!     └──────┬──────┘      │      └──────┬──────┘
//!            └─────────────┼─────────────┘
//!                          │ notify
//!                 ┌────────▼─────────┐
//!                 │ AlertDispatcher  │──► low / high provider
//!                 └──────────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **Registry**: owns the identity → probe mapping, creates and deletes probe workers
//! - **ProbeWorker**: escalation state machine and service history of one machine
//!
//! ## Communication Patterns
//!
//! 1. **Ingress**: bounded mpsc queue of reports into the registry
//! 2. **Mailboxes**: one bounded mpsc channel per probe worker
//! 3. **Request/Response**: oneshot channels for snapshots and state queries
//! 4. **Fan-out**: broadcast channel for dashboard snapshots

pub mod messages;
pub mod probe;
pub mod registry;
