//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. In this
/// workspace that covers [`crate::ShiftSlot`] (two slots with the same day and
/// shift are the same slot, whoever owns them) and
/// [`crate::OrganizationScope`].
///
/// ## Value Object vs Aggregate
///
/// - **Value Object**: no identity (`{2024-06-01, Morning}` is just a value)
/// - **Aggregate**: has identity (`Worker { id: WorkerId(...) }` stays the same
///   worker while its availability changes)
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
