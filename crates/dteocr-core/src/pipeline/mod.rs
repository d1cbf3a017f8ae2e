//! Document processing pipeline.
//!
//! A document moves `pending -> processing -> done | error`. The
//! [`Orchestrator`] owns that state machine for one document; the
//! [`Worker`] polls the store and feeds documents to it.

mod orchestrator;
mod worker;

pub use orchestrator::{DocumentOutcome, Orchestrator};
pub use worker::{BatchReport, Worker};
