// MATCH ERROR
// ================================================================================================

/// Non-verdict outcomes of a match.
///
/// Failure to match is not an error; the entry points report it as a value. These are the two
/// outcomes that mean the match could not be run to a verdict at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// A deferred pattern reference resolved an unset cell.
    #[error("uninitialized pattern")]
    UninitializedPattern,
    /// The engine observed an impossible state; unreachable unless an invariant of the node
    /// graph or the history stack has been violated.
    #[error("internal logic error in pattern match: {0}")]
    Logic(&'static str),
}
