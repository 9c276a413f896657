use crate::node::Id;
use thiserror::Error;

/// SymdiffError
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymdiffError {
    /// Operand shapes are incompatible
    #[error("ShapeError: {0}")]
    ShapeError(Box<str>),
    /// Evaluated graph depends on placeholder without bound value
    #[error("Placeholder {label} ({id}) has no bound value")]
    UnboundPlaceholder {
        /// Placeholder id
        id: Id,
        /// Placeholder label
        label: Box<str>,
    },
    /// Requested gradient target is not connected to differentiated output
    #[error("Gradient target {label} ({id}) is not reachable from the differentiated output")]
    UnreachableTarget {
        /// Target id
        id: Id,
        /// Target label
        label: Box<str>,
    },
    /// Operator was invoked with wrong number of operands
    #[error("{op} expects {expected} operands, but got {found}")]
    ArityError {
        /// Operator name
        op: &'static str,
        /// Declared arity
        expected: usize,
        /// Number of passed operands
        found: usize,
    },
    /// Id does not belong to this graph
    #[error("Node {0} does not exist in this graph")]
    UnknownNode(Id),
    /// Value was bound to node that is computed by the graph
    #[error("Node {label} ({id}) is not a placeholder and can not be bound")]
    NotAPlaceholder {
        /// Node id
        id: Id,
        /// Node label
        label: Box<str>,
    },
    /// Error returned by backend
    #[error("BackendError: {0}")]
    BackendError(Box<str>),
}

impl SymdiffError {
    /// Shape error
    pub fn shape_error(e: impl Into<Box<str>>) -> Self {
        Self::ShapeError(e.into())
    }

    /// Backend error
    pub fn backend_error(e: impl Into<Box<str>>) -> Self {
        Self::BackendError(e.into())
    }
}
