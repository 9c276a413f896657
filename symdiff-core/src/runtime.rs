use crate::config::Config;
use crate::error::SymdiffError;
use crate::graph::Graph;
use crate::node::{Id, Node};
use crate::shape::Shape;
use crate::utils::plot_graph_dot;
use log::{debug, trace};
use std::collections::BTreeMap;

/// RuntimeBackend is a good plug in point for backend developers.
/// Backend owns the value representation and executes forward
/// computation of single nodes, ordering is done by [Executor].
pub trait RuntimeBackend {
    /// Value of evaluated node
    type Buffer: Clone;

    /// Shape of buffer
    fn shape(&self, x: &Self::Buffer) -> Shape;

    /// Prepare kernel for node nid with inferred output shape.
    ///
    /// Called once per node each time shapes of bound inputs of an [Executor] change.
    /// Executors sharing one backend do not see each other's compilations,
    /// so this is only a hint and must not be relied on in [`RuntimeBackend::evaluate`].
    fn compile(&mut self, nid: Id, node: &Node, shape: &Shape) -> Result<(), SymdiffError> {
        let _ = (nid, node, shape);
        Ok(())
    }

    /// Compute value of node nid from values of its parameters, given in declared order.
    /// This is never called for placeholders.
    ///
    /// Shape is the output shape inferred for this run, it is None when
    /// executor runs without shape inference.
    fn evaluate(
        &mut self,
        nid: Id,
        node: &Node,
        parameters: &[&Self::Buffer],
        shape: Option<&Shape>,
    ) -> Result<Self::Buffer, SymdiffError>;
}

/// Values bound to placeholders
pub type Bindings<B> = BTreeMap<Id, <B as RuntimeBackend>::Buffer>;

/// Evaluates fixed set of output nodes.
///
/// Topological order is computed once, when executor is created.
/// With [`Config::infer_shapes`] shapes of all nodes are inferred before
/// evaluation and kernels are compiled, this is repeated only if shapes
/// of bound placeholders change between runs.
#[derive(Debug, Clone)]
pub struct Executor {
    outputs: Vec<Id>,
    order: Vec<Id>,
    config: Config,
    // Shapes of placeholders kernels were compiled for
    compiled_for: Option<BTreeMap<Id, Shape>>,
    // Inferred shapes of all nodes, empty without shape inference
    shapes: BTreeMap<Id, Shape>,
}

impl Executor {
    /// Create executor for outputs, configured from environment.
    ///
    /// Reads `SYMDIFF_INFER_SHAPES` and `SYMDIFF_DEBUG`, see [`Config::from_env`].
    /// Use [`Executor::with_config`] for behaviour independent of the process environment.
    pub fn new(graph: &Graph, outputs: &[Id]) -> Result<Self, SymdiffError> {
        Self::with_config(graph, outputs, Config::from_env())
    }

    /// Create executor for outputs with given config
    pub fn with_config(graph: &Graph, outputs: &[Id], config: Config) -> Result<Self, SymdiffError> {
        let order = graph.topological_sort(outputs)?;
        if config.debug_order() {
            debug!("Evaluation order: {order:?}");
        }
        if config.debug_dot() {
            debug!("{}", plot_graph_dot(&order, graph.nodes()));
        }
        Ok(Self {
            outputs: outputs.into(),
            order,
            config,
            compiled_for: None,
            shapes: BTreeMap::new(),
        })
    }

    /// Requested output nodes
    #[must_use]
    pub fn outputs(&self) -> &[Id] {
        &self.outputs
    }

    /// Order in which nodes are evaluated
    #[must_use]
    pub fn order(&self) -> &[Id] {
        &self.order
    }

    /// Evaluate outputs with given bindings of placeholders.
    ///
    /// Returns values of outputs in the order they were requested.
    /// All bindings are checked before anything is computed, so either
    /// all outputs are returned or nothing is.
    pub fn run<B: RuntimeBackend>(
        &mut self,
        graph: &Graph,
        backend: &mut B,
        bindings: &Bindings<B>,
    ) -> Result<Vec<B::Buffer>, SymdiffError> {
        for &nid in bindings.keys() {
            let node = graph.node(nid)?;
            if !node.is_placeholder() {
                return Err(SymdiffError::NotAPlaceholder {
                    id: nid,
                    label: node.label().into(),
                });
            }
        }
        for &nid in &self.order {
            let node = graph.node(nid)?;
            if node.is_placeholder() && !bindings.contains_key(&nid) {
                return Err(SymdiffError::UnboundPlaceholder {
                    id: nid,
                    label: node.label().into(),
                });
            }
        }

        if self.config.infer_shapes {
            self.compile(graph, backend, bindings)?;
        }

        let mut values: BTreeMap<Id, B::Buffer> = BTreeMap::new();
        for &nid in &self.order {
            let node = &graph[nid];
            if node.is_placeholder() {
                continue;
            }
            let value = {
                let mut parameters = Vec::with_capacity(2);
                for p in node.parameters() {
                    parameters.push(lookup(bindings, &values, p)?);
                }
                trace!("Evaluating {nid}: {}", node.op().name());
                backend.evaluate(nid, node, &parameters, self.shapes.get(&nid))?
            };
            values.insert(nid, value);
        }

        self.outputs
            .iter()
            .map(|&x| lookup(bindings, &values, x).cloned())
            .collect()
    }

    fn compile<B: RuntimeBackend>(
        &mut self,
        graph: &Graph,
        backend: &mut B,
        bindings: &Bindings<B>,
    ) -> Result<(), SymdiffError> {
        let placeholders: BTreeMap<Id, Shape> = self
            .order
            .iter()
            .filter_map(|nid| bindings.get(nid).map(|x| (*nid, backend.shape(x))))
            .collect();
        if self.compiled_for.as_ref() == Some(&placeholders) {
            return Ok(());
        }
        // Invalidate first, so that failed compilation is retried next run
        self.compiled_for = None;
        self.shapes.clear();
        let shapes = graph.infer_shapes(&self.order, &placeholders)?;
        debug!(
            "Compiling {} nodes for input shapes {:?}",
            self.order.len(),
            placeholders.values().map(ToString::to_string).collect::<Vec<_>>()
        );
        for &nid in &self.order {
            let node = &graph[nid];
            if node.is_placeholder() {
                continue;
            }
            if self.config.debug_shapes() {
                debug!("{nid} {} -> {}", node.label(), shapes[&nid]);
            }
            backend.compile(nid, node, &shapes[&nid])?;
        }
        self.compiled_for = Some(placeholders);
        self.shapes = shapes;
        Ok(())
    }
}

fn lookup<'a, T>(
    bindings: &'a BTreeMap<Id, T>,
    values: &'a BTreeMap<Id, T>,
    x: Id,
) -> Result<&'a T, SymdiffError> {
    bindings
        .get(&x)
        .or_else(|| values.get(&x))
        .ok_or(SymdiffError::UnknownNode(x))
}

/// Evaluate outputs once, see [`Executor::run`].
///
/// Configuration is read from the process environment like in [`Executor::new`],
/// so `SYMDIFF_INFER_SHAPES=0` turns shape inference off for this call.
pub fn evaluate<B: RuntimeBackend>(
    graph: &Graph,
    backend: &mut B,
    outputs: &[Id],
    bindings: &Bindings<B>,
) -> Result<Vec<B::Buffer>, SymdiffError> {
    Executor::new(graph, outputs)?.run(graph, backend, bindings)
}

#[cfg(test)]
mod tests {
    use super::{Executor, RuntimeBackend};
    use crate::config::Config;
    use crate::error::SymdiffError;
    use crate::graph::Graph;
    use crate::node::{Id, Node, Op};
    use crate::shape::Shape;
    use std::collections::BTreeMap;

    fn setup_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Scalar backend counting kernel compilations
    #[derive(Default)]
    struct Scalars {
        compiled: usize,
        evaluated: Vec<Id>,
        shapes: Vec<Option<Shape>>,
    }

    impl RuntimeBackend for Scalars {
        type Buffer = f32;

        fn shape(&self, _: &f32) -> Shape {
            Shape::from(1)
        }

        fn compile(&mut self, _: Id, _: &Node, _: &Shape) -> Result<(), SymdiffError> {
            self.compiled += 1;
            Ok(())
        }

        fn evaluate(
            &mut self,
            nid: Id,
            node: &Node,
            p: &[&f32],
            shape: Option<&Shape>,
        ) -> Result<f32, SymdiffError> {
            self.evaluated.push(nid);
            self.shapes.push(shape.cloned());
            Ok(match *node.op() {
                Op::Add(..) => p[0] + p[1],
                Op::AddConst(_, k) => p[0] + k,
                Op::Mul(..) => p[0] * p[1],
                Op::MulConst(_, k) => p[0] * k,
                Op::ZerosLike(..) => 0.,
                Op::OnesLike(..) => 1.,
                _ => return Err(SymdiffError::backend_error("unsupported")),
            })
        }
    }

    #[test]
    fn evaluates_in_topological_order() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let y = g.placeholder("y");
        let xy = g.mul(x, y)?;
        let z = g.add_const(xy, 1.)?;
        let mut backend = Scalars::default();
        let mut ex = Executor::with_config(&g, &[z, xy], Config::default())?;
        let values = ex.run(&g, &mut backend, &BTreeMap::from([(x, 3.), (y, 4.)]))?;
        assert_eq!(values, [13., 12.]);
        assert_eq!(backend.evaluated, [xy, z]);
        Ok(())
    }

    #[test]
    fn output_can_be_placeholder() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let mut backend = Scalars::default();
        let values = super::evaluate(&g, &mut backend, &[x], &BTreeMap::from([(x, 2.)]))?;
        assert_eq!(values, [2.]);
        assert!(backend.evaluated.is_empty());
        Ok(())
    }

    #[test]
    fn recompiles_only_on_shape_change() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let z = g.mul_const(x, 2.)?;
        let mut backend = Scalars::default();
        let mut ex = Executor::with_config(&g, &[z], Config::default())?;
        ex.run(&g, &mut backend, &BTreeMap::from([(x, 1.)]))?;
        ex.run(&g, &mut backend, &BTreeMap::from([(x, 5.)]))?;
        assert_eq!(backend.compiled, 1);

        let config = Config { infer_shapes: false, debug: 0 };
        let mut ex = Executor::with_config(&g, &[z], config)?;
        ex.run(&g, &mut backend, &BTreeMap::from([(x, 1.)]))?;
        assert_eq!(backend.compiled, 1);
        Ok(())
    }

    #[test]
    fn inferred_shapes_are_passed_to_backend() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let z = g.mul_const(x, 2.)?;
        let mut backend = Scalars::default();
        let mut ex = Executor::with_config(&g, &[z], Config::default())?;
        ex.run(&g, &mut backend, &BTreeMap::from([(x, 1.)]))?;
        // Cached compilation still passes shapes
        ex.run(&g, &mut backend, &BTreeMap::from([(x, 2.)]))?;

        let config = Config { infer_shapes: false, debug: 0 };
        let mut ex = Executor::with_config(&g, &[z], config)?;
        ex.run(&g, &mut backend, &BTreeMap::from([(x, 1.)]))?;
        assert_eq!(
            backend.shapes,
            [Some(Shape::from(1)), Some(Shape::from(1)), None]
        );
        Ok(())
    }

    #[test]
    fn unbound_placeholder() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let y = g.placeholder("y");
        let z = g.add(x, y)?;
        let mut backend = Scalars::default();
        let mut ex = Executor::with_config(&g, &[z], Config::default())?;
        let res = ex.run(&g, &mut backend, &BTreeMap::from([(x, 1.)]));
        assert_eq!(res, Err(SymdiffError::UnboundPlaceholder { id: y, label: "y".into() }));
        assert!(backend.evaluated.is_empty());
        Ok(())
    }

    #[test]
    fn binding_computed_node() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let z = g.ones_like(x)?;
        let mut backend = Scalars::default();
        let mut ex = Executor::with_config(&g, &[z], Config::default())?;
        let res = ex.run(&g, &mut backend, &BTreeMap::from([(x, 1.), (z, 2.)]));
        assert!(matches!(res, Err(SymdiffError::NotAPlaceholder { .. })));
        Ok(())
    }
}
