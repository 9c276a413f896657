//! Graph of expression nodes.

use crate::error::SymdiffError;
use crate::node::{id, Id, Node, Op};
use crate::shape::Shape;
use crate::utils;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Operand labels longer than this are referred to by id.
const MAX_OPERAND_LABEL: usize = 64;

/// Append-only arena of nodes.
///
/// Every construction call pushes a new node, so structurally equal
/// expressions built twice are two different nodes. Construction never
/// evaluates anything, shape errors surface during inference or evaluation.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    /// Create empty graph
    #[must_use]
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Number of nodes in graph
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Is graph empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get node x
    pub fn node(&self, x: Id) -> Result<&Node, SymdiffError> {
        self.nodes.get(x.i()).ok_or(SymdiffError::UnknownNode(x))
    }

    /// Get label of node x
    pub fn label(&self, x: Id) -> Result<&str, SymdiffError> {
        Ok(self.node(x)?.label())
    }

    /// Label of x as it appears inside labels of its users
    fn operand(&self, x: Id) -> Result<Cow<'_, str>, SymdiffError> {
        let label = self.label(x)?;
        Ok(if label.len() > MAX_OPERAND_LABEL {
            Cow::Owned(format!("#{x}"))
        } else {
            Cow::Borrowed(label)
        })
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn push(&mut self, op: Op, label: String) -> Result<Id, SymdiffError> {
        for nid in op.parameters() {
            self.node(nid)?;
        }
        let nid = id(self.nodes.len());
        self.nodes.push(Node::new(op, label));
        Ok(nid)
    }

    /// Create new placeholder, its value is bound at evaluation time.
    pub fn placeholder(&mut self, name: &str) -> Id {
        let nid = id(self.nodes.len());
        self.nodes.push(Node::new(Op::Placeholder, name));
        nid
    }

    /// Build `x + y`
    pub fn add(&mut self, x: Id, y: Id) -> Result<Id, SymdiffError> {
        let label = format!("({} + {})", self.operand(x)?, self.operand(y)?);
        self.push(Op::Add(x, y), label)
    }

    /// Build `x + k`
    pub fn add_const(&mut self, x: Id, k: f32) -> Result<Id, SymdiffError> {
        let label = format!("({} + {k})", self.operand(x)?);
        self.push(Op::AddConst(x, k), label)
    }

    /// Build elementwise `x * y`
    pub fn mul(&mut self, x: Id, y: Id) -> Result<Id, SymdiffError> {
        let label = format!("({} * {})", self.operand(x)?, self.operand(y)?);
        self.push(Op::Mul(x, y), label)
    }

    /// Build `x * k`
    pub fn mul_const(&mut self, x: Id, k: f32) -> Result<Id, SymdiffError> {
        let label = format!("({} * {k})", self.operand(x)?);
        self.push(Op::MulConst(x, k), label)
    }

    /// Build zeros with shape of x
    pub fn zeros_like(&mut self, x: Id) -> Result<Id, SymdiffError> {
        let label = format!("ZerosLike({})", self.operand(x)?);
        self.push(Op::ZerosLike(x), label)
    }

    /// Build ones with shape of x
    pub fn ones_like(&mut self, x: Id) -> Result<Id, SymdiffError> {
        let label = format!("OnesLike({})", self.operand(x)?);
        self.push(Op::OnesLike(x), label)
    }

    /// Build sum of x over axis 0
    pub fn reduce_sum_axis_zero(&mut self, x: Id) -> Result<Id, SymdiffError> {
        let label = format!("ReduceSumAxisZero({})", self.operand(x)?);
        self.push(Op::ReduceSumAxisZero(x), label)
    }

    /// Build x broadcasted to broadcasted shape of x and y.
    /// Only shape of y is used.
    pub fn broadcast_to(&mut self, x: Id, y: Id) -> Result<Id, SymdiffError> {
        let label = format!("BroadcastTo({}, {})", self.operand(x)?, self.operand(y)?);
        self.push(Op::BroadcastTo(x, y), label)
    }

    /// Build matrix multiply `op(a) @ op(b)`, where op transposes
    /// its operand if requested.
    pub fn matmul(
        &mut self,
        a: Id,
        b: Id,
        transpose_a: bool,
        transpose_b: bool,
    ) -> Result<Id, SymdiffError> {
        let label = format!(
            "MatMul({}, {}, {}, {})",
            self.operand(a)?,
            self.operand(b)?,
            flag(transpose_a),
            flag(transpose_b)
        );
        self.push(
            Op::MatMul {
                a,
                b,
                transpose_a,
                transpose_b,
            },
            label,
        )
    }

    /// Build `max(x, 0)`
    pub fn relu(&mut self, x: Id) -> Result<Id, SymdiffError> {
        let label = format!("ReLU({})", self.operand(x)?);
        self.push(Op::ReLU(x), label)
    }

    /// Build gradient of relu: grad where x is positive, zero elsewhere
    pub fn relu_grad(&mut self, x: Id, grad: Id) -> Result<Id, SymdiffError> {
        let label = format!("ReLUGrad({}, {})", self.operand(x)?, self.operand(grad)?);
        self.push(Op::ReLUGrad(x, grad), label)
    }

    /// Sum nodes left to right with chain of additions.
    /// Single node is returned as is.
    pub fn sum_nodes(&mut self, nodes: &[Id]) -> Result<Id, SymdiffError> {
        let Some((&first, rest)) = nodes.split_first() else {
            return Err(SymdiffError::ArityError {
                op: "Add",
                expected: 1,
                found: 0,
            });
        };
        let mut sum = first;
        for &x in rest {
            sum = self.add(sum, x)?;
        }
        Ok(sum)
    }

    /// Topological order of all nodes reachable from roots.
    /// Every node comes after all of its parameters and appears once.
    pub fn topological_sort(&self, roots: &[Id]) -> Result<Vec<Id>, SymdiffError> {
        for &x in roots {
            self.node(x)?;
        }
        Ok(utils::topological_sort(&self.nodes, roots))
    }

    /// Infer shapes of all nodes in order, starting from shapes of placeholders.
    /// Order must be topological.
    pub fn infer_shapes(
        &self,
        order: &[Id],
        placeholders: &BTreeMap<Id, Shape>,
    ) -> Result<BTreeMap<Id, Shape>, SymdiffError> {
        let mut shapes: BTreeMap<Id, Shape> = BTreeMap::new();
        for &nid in order {
            let node = self.node(nid)?;
            let shape = if node.is_placeholder() {
                placeholders
                    .get(&nid)
                    .cloned()
                    .ok_or_else(|| SymdiffError::UnboundPlaceholder {
                        id: nid,
                        label: node.label().into(),
                    })?
            } else {
                let mut params = Vec::with_capacity(2);
                for p in node.parameters() {
                    params.push(shapes.get(&p).ok_or(SymdiffError::UnknownNode(p))?);
                }
                node.op().infer_shape(&params).map_err(|e| match e {
                    SymdiffError::ShapeError(e) => {
                        SymdiffError::shape_error(format!("{e}, in node {}", node.label()))
                    }
                    e => e,
                })?
            };
            shapes.insert(nid, shape);
        }
        Ok(shapes)
    }

    /// Plot dot graph in dot format between given nodes
    pub fn plot_dot_graph(&self, roots: &[Id]) -> Result<String, SymdiffError> {
        let order = self.topological_sort(roots)?;
        Ok(utils::plot_graph_dot(&order, &self.nodes))
    }
}

const fn flag(transpose: bool) -> &'static str {
    if transpose {
        "T"
    } else {
        "F"
    }
}

/// Unchecked node access.
///
/// # Panics
/// Panics if index is not a node of this graph, use [`Graph::node`]
/// for access that returns [`SymdiffError::UnknownNode`] instead.
impl core::ops::Index<Id> for Graph {
    type Output = Node;
    fn index(&self, index: Id) -> &Self::Output {
        &self.nodes[index.i()]
    }
}
