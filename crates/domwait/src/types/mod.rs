/*! Core types for domwait.

Regenerate TypeScript types: `cargo test -p domwait export_bindings`
*/

#![allow(missing_docs)]

mod error;
mod event;
mod ids;
mod mutation;

pub use error::{DomError, DomResult, SelectorError, SelectorResult, WaitError, WaitResult};
pub use event::Event;
pub use ids::{NodeId, SubscriptionId, TimerId};
pub use mutation::{ChangeBatch, MutationKind, MutationRecord, NodeKind, ObserveOptions};
