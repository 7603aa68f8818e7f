/// Execute an aggregate command in place (no IO, no persistence).
///
/// 1. **Decide**: `aggregate.handle(command)` (pure)
/// 2. **Evolve**: `aggregate.apply(event)` for each decided event
///
/// Used by the aggregate unit tests and property tests. Production paths go
/// through the infra `CommandDispatcher`, which adds persistence, optimistic
/// concurrency and publication around the same two steps.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: shiftmatch_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
