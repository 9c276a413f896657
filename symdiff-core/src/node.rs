use crate::error::SymdiffError;
use crate::shape::Shape;
use core::fmt::Formatter;

/// Id of node, a stable handle into [Graph](crate::graph::Graph).
/// Two ids are equal only if they point to the same node.
#[derive(Clone, Copy, PartialOrd, PartialEq, Ord, Eq, Hash, Debug)]
pub struct Id(usize);

/// Create new id.
pub const fn id(id: usize) -> Id {
    Id(id)
}

impl Id {
    /// Convert id to usize
    pub const fn i(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

/// Operator that produced a node, with its operands
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// Input whose value is supplied at evaluation time
    Placeholder,
    /// Elementwise addition with broadcasting
    Add(Id, Id),
    /// Addition of a constant
    AddConst(Id, f32),
    /// Elementwise multiplication with broadcasting
    Mul(Id, Id),
    /// Multiplication by a constant
    MulConst(Id, f32),
    /// Zeros with shape of operand
    ZerosLike(Id),
    /// Ones with shape of operand
    OnesLike(Id),
    /// Sum over leading axis, rank 1 operands reduce to `(1,)`
    ReduceSumAxisZero(Id),
    /// Broadcast first operand to broadcasted shape of both operands.
    /// Value of second operand is never read.
    BroadcastTo(Id, Id),
    /// Matrix multiply of optionally transposed rank 2 operands
    MatMul {
        /// Left operand
        a: Id,
        /// Right operand
        b: Id,
        /// Transpose left operand before multiplying
        transpose_a: bool,
        /// Transpose right operand before multiplying
        transpose_b: bool,
    },
    /// Rectified linear unit
    ReLU(Id),
    /// Passes second operand where first operand is positive, zero elsewhere
    ReLUGrad(Id, Id),
}

/// Iterator over parameters of node which does not allocate on heap.
pub struct NodeParametersIterator {
    parameters: [Id; 2],
    len: u8,
    idx: u8,
}

impl Iterator for NodeParametersIterator {
    type Item = Id;
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx == self.len {
            return None;
        }
        let idx = self.idx;
        self.idx += 1;
        Some(self.parameters[idx as usize])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.len - self.idx) as usize;
        (n, Some(n))
    }
}

impl DoubleEndedIterator for NodeParametersIterator {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.idx == self.len {
            return None;
        }
        self.len -= 1;
        Some(self.parameters[self.len as usize])
    }
}

impl ExactSizeIterator for NodeParametersIterator {}

impl Op {
    /// Name of operator
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Op::Placeholder => "Placeholder",
            Op::Add(..) => "Add",
            Op::AddConst(..) => "AddConst",
            Op::Mul(..) => "Mul",
            Op::MulConst(..) => "MulConst",
            Op::ZerosLike(..) => "ZerosLike",
            Op::OnesLike(..) => "OnesLike",
            Op::ReduceSumAxisZero(..) => "ReduceSumAxisZero",
            Op::BroadcastTo(..) => "BroadcastTo",
            Op::MatMul { .. } => "MatMul",
            Op::ReLU(..) => "ReLU",
            Op::ReLUGrad(..) => "ReLUGrad",
        }
    }

    /// Get number of parameters of self. This method does not allocate.
    #[must_use]
    pub const fn arity(&self) -> usize {
        match self {
            Op::Placeholder => 0,
            Op::AddConst(..)
            | Op::MulConst(..)
            | Op::ZerosLike(..)
            | Op::OnesLike(..)
            | Op::ReduceSumAxisZero(..)
            | Op::ReLU(..) => 1,
            Op::Add(..)
            | Op::Mul(..)
            | Op::BroadcastTo(..)
            | Op::MatMul { .. }
            | Op::ReLUGrad(..) => 2,
        }
    }

    /// Get all parameters of self in declared order. This method does not allocate.
    #[must_use]
    pub const fn parameters(&self) -> NodeParametersIterator {
        let zero = id(0);
        match *self {
            Op::Placeholder => NodeParametersIterator { parameters: [zero; 2], len: 0, idx: 0 },
            Op::AddConst(x, _)
            | Op::MulConst(x, _)
            | Op::ZerosLike(x)
            | Op::OnesLike(x)
            | Op::ReduceSumAxisZero(x)
            | Op::ReLU(x) => NodeParametersIterator { parameters: [x, zero], len: 1, idx: 0 },
            Op::Add(x, y)
            | Op::Mul(x, y)
            | Op::BroadcastTo(x, y)
            | Op::MatMul { a: x, b: y, .. }
            | Op::ReLUGrad(x, y) => NodeParametersIterator { parameters: [x, y], len: 2, idx: 0 },
        }
    }

    /// Constant operand, if the operator combines node with a literal
    #[must_use]
    pub const fn constant(&self) -> Option<f32> {
        match *self {
            Op::AddConst(_, k) | Op::MulConst(_, k) => Some(k),
            _ => None,
        }
    }

    /// Infer output shape from shapes of parameters, given in declared order.
    ///
    /// Placeholders have no inferable shape, their shape comes from bound values.
    pub fn infer_shape(&self, shapes: &[&Shape]) -> Result<Shape, SymdiffError> {
        if shapes.len() != self.arity() {
            return Err(SymdiffError::ArityError {
                op: self.name(),
                expected: self.arity(),
                found: shapes.len(),
            });
        }
        match *self {
            Op::Placeholder => Err(SymdiffError::shape_error(
                "shape of placeholder is only known from its bound value",
            )),
            Op::Add(..) | Op::Mul(..) | Op::BroadcastTo(..) | Op::ReLUGrad(..) => {
                shapes[0].broadcast(shapes[1])
            }
            Op::AddConst(..) | Op::MulConst(..) => shapes[0].broadcast(&Shape::from(1)),
            Op::ZerosLike(..) | Op::OnesLike(..) | Op::ReLU(..) => Ok(shapes[0].clone()),
            Op::ReduceSumAxisZero(..) => shapes[0].reduce_axis_zero(),
            Op::MatMul {
                transpose_a,
                transpose_b,
                ..
            } => shapes[0].matmul(shapes[1], transpose_a, transpose_b),
        }
    }
}

/// Vertex of expression graph.
/// Node is immutable once pushed into graph.
#[derive(Clone, Debug)]
pub struct Node {
    op: Op,
    label: Box<str>,
}

impl Node {
    pub(crate) fn new(op: Op, label: impl Into<Box<str>>) -> Self {
        Self {
            op,
            label: label.into(),
        }
    }

    /// Operator which produced this node
    #[must_use]
    pub const fn op(&self) -> &Op {
        &self.op
    }

    /// Human readable description, only for debugging
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Parameters (inputs) of this node in declared order
    #[must_use]
    pub const fn parameters(&self) -> NodeParametersIterator {
        self.op.parameters()
    }

    /// Is this node a placeholder?
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self.op, Op::Placeholder)
    }
}

impl core::fmt::Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::{id, Op};
    use crate::error::SymdiffError;
    use crate::shape::Shape;

    #[test]
    fn parameters_follow_declared_order() {
        let op = Op::MatMul {
            a: id(3),
            b: id(1),
            transpose_a: true,
            transpose_b: false,
        };
        assert_eq!(op.parameters().collect::<Vec<_>>(), [id(3), id(1)]);
        assert_eq!(op.parameters().rev().collect::<Vec<_>>(), [id(1), id(3)]);
        assert_eq!(Op::Placeholder.parameters().count(), 0);
        assert_eq!(Op::MulConst(id(2), 5.).parameters().collect::<Vec<_>>(), [id(2)]);
    }

    #[test]
    fn arity_matches_parameters() {
        let ops = [
            Op::Placeholder,
            Op::Add(id(0), id(1)),
            Op::AddConst(id(0), 1.),
            Op::Mul(id(0), id(1)),
            Op::MulConst(id(0), 1.),
            Op::ZerosLike(id(0)),
            Op::OnesLike(id(0)),
            Op::ReduceSumAxisZero(id(0)),
            Op::BroadcastTo(id(0), id(1)),
            Op::MatMul { a: id(0), b: id(1), transpose_a: false, transpose_b: false },
            Op::ReLU(id(0)),
            Op::ReLUGrad(id(0), id(1)),
        ];
        for op in ops {
            assert_eq!(op.arity(), op.parameters().len(), "{}", op.name());
        }
    }

    #[test]
    fn infer_shapes() -> Result<(), SymdiffError> {
        let a = Shape::from([4, 3]);
        let b = Shape::from([3]);
        let x = id(0);
        assert_eq!(Op::Add(x, x).infer_shape(&[&a, &b])?, a);
        assert_eq!(Op::MulConst(x, 5.).infer_shape(&[&b])?, b);
        assert_eq!(Op::ReduceSumAxisZero(x).infer_shape(&[&a])?, b);
        assert_eq!(Op::ReduceSumAxisZero(x).infer_shape(&[&b])?, Shape::from([1]));
        assert_eq!(Op::BroadcastTo(x, x).infer_shape(&[&b, &a])?, a);
        assert_eq!(Op::OnesLike(x).infer_shape(&[&a])?, a);
        Ok(())
    }

    #[test]
    fn infer_shape_errors() {
        let a = Shape::from([4, 3]);
        let c = Shape::from([5]);
        let x = id(0);
        assert!(matches!(
            Op::Mul(x, x).infer_shape(&[&a, &c]),
            Err(SymdiffError::ShapeError(_))
        ));
        assert!(matches!(
            Op::Add(x, x).infer_shape(&[&a]),
            Err(SymdiffError::ArityError { expected: 2, found: 1, .. })
        ));
        let mm = Op::MatMul { a: x, b: x, transpose_a: false, transpose_b: false };
        assert!(matches!(mm.infer_shape(&[&a, &c]), Err(SymdiffError::ShapeError(_))));
    }
}
