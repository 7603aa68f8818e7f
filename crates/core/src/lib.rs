//! `shiftmatch-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the worker and job
//! aggregates (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod scope;
pub mod slot;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult, Rejection};
pub use id::{AggregateId, JobId, WorkerId};
pub use scope::OrganizationScope;
pub use slot::{Shift, ShiftSlot, SlotParseError};
pub use value_object::ValueObject;
