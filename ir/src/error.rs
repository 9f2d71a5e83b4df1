use snafu::Snafu;
use tessera_dtype::DType;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// DType mismatch in a binary expression.
    #[snafu(display("dtype mismatch: cannot combine {lhs:?} and {rhs:?}"))]
    DTypeMismatch { lhs: DType, rhs: DType },

    /// Load/store indices must be integers.
    #[snafu(display("access index must have an integer dtype, got {actual:?}"))]
    IndexTypeMismatch { actual: DType },

    /// A reducer must produce one result per source expression.
    #[snafu(display("reducer arity mismatch: {results} results for {sources} sources"))]
    ReducerArityMismatch { results: usize, sources: usize },
}
