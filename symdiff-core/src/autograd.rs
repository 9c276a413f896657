use crate::error::SymdiffError;
use crate::graph::Graph;
use crate::node::{Id, Op};
use crate::utils::topological_sort;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

impl Graph {
    /// Build gradients of y with respect to each of sources.
    ///
    /// Returned gradients are new nodes in this graph, one per source in
    /// given order, so they can be evaluated or differentiated again.
    /// Gradient of y with respect to itself is `OnesLike(y)`.
    /// Fails with [`SymdiffError::UnreachableTarget`] if some source
    /// is not an ancestor of y.
    pub fn gradients(&mut self, y: Id, sources: &[Id]) -> Result<Vec<Id>, SymdiffError> {
        self.node(y)?;
        for &x in sources {
            self.node(x)?;
        }
        let topo = topological_sort(self.nodes(), &[y]);

        // Only nodes that have some source among their ancestors need gradient
        let mut req_grad: BTreeSet<Id> = sources.iter().copied().collect();
        for &nid in &topo {
            if self[nid].parameters().any(|p| req_grad.contains(&p)) {
                req_grad.insert(nid);
            }
        }

        // Node -> gradient contributions, in order of arrival
        let mut contributions: BTreeMap<Id, Vec<Id>> = BTreeMap::new();
        // Node -> summed gradient
        let mut grads: BTreeMap<Id, Id> = BTreeMap::new();
        if req_grad.contains(&y) {
            let seed = self.ones_like(y)?;
            contributions.insert(y, vec![seed]);
        }

        for nid in topo.into_iter().rev() {
            if !req_grad.contains(&nid) {
                continue;
            }
            let Some(parts) = contributions.remove(&nid) else {
                continue;
            };
            let grad = self.sum_nodes(&parts)?;
            grads.insert(nid, grad);
            let parameters: Vec<Id> = self[nid].parameters().collect();
            let local = self.local_gradients(nid, grad, &req_grad)?;
            for (p, p_grad) in parameters.into_iter().zip(local) {
                if let Some(p_grad) = p_grad {
                    contributions.entry(p).or_default().push(p_grad);
                }
            }
        }
        debug!(
            "Built gradients of {} for {} sources, graph has {} nodes",
            y,
            sources.len(),
            self.len()
        );

        sources
            .iter()
            .map(|&x| {
                grads.get(&x).copied().ok_or_else(|| SymdiffError::UnreachableTarget {
                    id: x,
                    label: self[x].label().into(),
                })
            })
            .collect()
    }

    /// Gradient contributions of nid to each of its parameters, given gradient of nid.
    /// Contributions are only built for parameters in req_grad.
    fn local_gradients(
        &mut self,
        nid: Id,
        grad: Id,
        req_grad: &BTreeSet<Id>,
    ) -> Result<Vec<Option<Id>>, SymdiffError> {
        let req = |x: Id| req_grad.contains(&x);
        let op = self[nid].op().clone();
        Ok(match op {
            Op::Placeholder => Vec::new(),
            // The same gradient node flows into both parameters
            Op::Add(x, y) => vec![req(x).then_some(grad), req(y).then_some(grad)],
            Op::AddConst(x, _) => vec![req(x).then_some(grad)],
            Op::Mul(x, y) => {
                let x_grad = if req(x) { Some(self.mul(y, grad)?) } else { None };
                let y_grad = if req(y) { Some(self.mul(x, grad)?) } else { None };
                vec![x_grad, y_grad]
            }
            Op::MulConst(x, k) => {
                vec![if req(x) { Some(self.mul_const(grad, k)?) } else { None }]
            }
            Op::ZerosLike(x) | Op::OnesLike(x) => {
                vec![if req(x) { Some(self.zeros_like(x)?) } else { None }]
            }
            Op::ReduceSumAxisZero(x) => {
                vec![if req(x) { Some(self.broadcast_to(grad, x)?) } else { None }]
            }
            Op::BroadcastTo(x, y) => {
                let x_grad = if req(x) { Some(self.reduce_sum_axis_zero(grad)?) } else { None };
                let y_grad = if req(y) { Some(self.zeros_like(y)?) } else { None };
                vec![x_grad, y_grad]
            }
            Op::MatMul {
                a,
                b,
                transpose_a,
                transpose_b,
            } => {
                let a_grad = if req(a) {
                    Some(match (transpose_a, transpose_b) {
                        // C = A B, dA = G B^T
                        (false, false) => self.matmul(grad, b, false, true)?,
                        // C = A^T B, dA = B G^T
                        (true, false) => self.matmul(b, grad, false, true)?,
                        // C = A B^T, dA = G B
                        (false, true) => self.matmul(grad, b, false, false)?,
                        // C = A^T B^T, dA = B^T G^T
                        (true, true) => self.matmul(b, grad, true, true)?,
                    })
                } else {
                    None
                };
                let b_grad = if req(b) {
                    Some(match (transpose_a, transpose_b) {
                        // dB = A^T G
                        (false, false) => self.matmul(a, grad, true, false)?,
                        // dB = A G
                        (true, false) => self.matmul(a, grad, false, false)?,
                        // dB = G^T A
                        (false, true) => self.matmul(grad, a, true, false)?,
                        // dB = G^T A^T
                        (true, true) => self.matmul(grad, a, true, true)?,
                    })
                } else {
                    None
                };
                vec![a_grad, b_grad]
            }
            Op::ReLU(x) => vec![if req(x) { Some(self.relu_grad(x, grad)?) } else { None }],
            Op::ReLUGrad(x, g) => {
                let x_grad = if req(x) { Some(self.zeros_like(x)?) } else { None };
                let g_grad = if req(g) { Some(self.relu_grad(x, grad)?) } else { None };
                vec![x_grad, g_grad]
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::SymdiffError;
    use crate::graph::Graph;
    use crate::node::Op;

    fn setup_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn gradient_of_identity_is_ones_like() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let grads = g.gradients(x, &[x])?;
        assert_eq!(*g[grads[0]].op(), Op::OnesLike(x));
        Ok(())
    }

    #[test]
    fn add_shares_gradient_node() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let y = g.placeholder("y");
        let z = g.add(x, y)?;
        let grads = g.gradients(z, &[x, y])?;
        assert_eq!(grads[0], grads[1]);
        assert_eq!(*g[grads[0]].op(), Op::OnesLike(z));
        Ok(())
    }

    #[test]
    fn product_rule_uses_other_operand() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let y = g.placeholder("y");
        let z = g.mul(x, y)?;
        let grads = g.gradients(z, &[x, y])?;
        let Op::Mul(other, _) = *g[grads[0]].op() else {
            panic!("expected multiplication");
        };
        assert_eq!(other, y);
        let Op::Mul(other, _) = *g[grads[1]].op() else {
            panic!("expected multiplication");
        };
        assert_eq!(other, x);
        Ok(())
    }

    #[test]
    fn contributions_are_summed() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let xx = g.mul(x, x)?;
        let grads = g.gradients(xx, &[x])?;
        assert!(matches!(g[grads[0]].op(), Op::Add(..)));
        Ok(())
    }

    #[test]
    fn unreachable_target() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let y = g.placeholder("y");
        let z = g.mul_const(x, 3.)?;
        assert_eq!(
            g.gradients(z, &[x, y]),
            Err(SymdiffError::UnreachableTarget { id: y, label: "y".into() })
        );
        Ok(())
    }

    #[test]
    fn pruned_branches_are_not_built() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let c = g.placeholder("c");
        let cc = g.mul(c, c)?;
        let z = g.mul(x, cc)?;
        let before = g.len();
        g.gradients(z, &[x])?;
        // OnesLike(z) and Mul(cc, ones)
        assert_eq!(g.len(), before + 2);
        Ok(())
    }

    #[test]
    fn unary_gradients_are_pruned() -> Result<(), SymdiffError> {
        setup_logger();
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let m = g.mul_const(x, 2.)?;
        let before = g.len();
        assert_eq!(g.gradients(m, &[m])?.len(), 1);
        // Only OnesLike(m), nothing flows into x
        assert_eq!(g.len(), before + 1);

        let a = g.add_const(x, 1.)?;
        let s = g.reduce_sum_axis_zero(a)?;
        let r = g.relu(s)?;
        let o = g.ones_like(r)?;
        let z = g.mul_const(o, 3.)?;
        let before = g.len();
        let grads = g.gradients(z, &[r])?;
        // OnesLike(z), MulConst(ones, 3) and ZerosLike(r)
        assert_eq!(g.len(), before + 3);
        assert!(matches!(g[grads[0]].op(), Op::ZerosLike(p) if *p == r));
        Ok(())
    }

    #[test]
    fn matmul_gradient_shapes() -> Result<(), SymdiffError> {
        setup_logger();
        use crate::shape::Shape;
        use std::collections::BTreeMap;
        for (ta, tb) in [(false, false), (true, false), (false, true), (true, true)] {
            let mut g = Graph::new();
            let a = g.placeholder("a");
            let b = g.placeholder("b");
            let c = g.matmul(a, b, ta, tb)?;
            let grads = g.gradients(c, &[a, b])?;
            let a_shape = if ta { Shape::from([2, 3]) } else { Shape::from([3, 2]) };
            let b_shape = if tb { Shape::from([4, 2]) } else { Shape::from([2, 4]) };
            let order = g.topological_sort(&grads)?;
            let shapes = g.infer_shapes(
                &order,
                &BTreeMap::from([(a, a_shape.clone()), (b, b_shape.clone())]),
            )?;
            assert_eq!(shapes[&grads[0]], a_shape, "transpose flags {ta} {tb}");
            assert_eq!(shapes[&grads[1]], b_shape, "transpose flags {ta} {tb}");
        }
        Ok(())
    }
}
