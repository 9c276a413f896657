use crate::node::{Id, Node};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Depth first topological sort of nodes reachable from roots.
///
/// Parameters are visited in declared order and roots in given order,
/// each node is emitted after all of its parameters and exactly once.
/// Uses explicit stack, so deep graphs do not overflow.
/// All ids reachable from roots must be in nodes,
/// [`crate::graph::Graph::topological_sort`] is the checked version.
pub(crate) fn topological_sort(nodes: &[Node], roots: &[Id]) -> Vec<Id> {
    let mut visited: BTreeSet<Id> = BTreeSet::new();
    let mut order = Vec::new();
    // (node, parameters already pushed)
    let mut stack: Vec<(Id, bool)> = Vec::with_capacity(32);
    for &root in roots {
        stack.push((root, false));
        while let Some((nid, expanded)) = stack.pop() {
            if expanded {
                order.push(nid);
                continue;
            }
            if !visited.insert(nid) {
                continue;
            }
            stack.push((nid, true));
            // reversed, so that first parameter is popped first
            stack.extend(
                nodes[nid.i()]
                    .parameters()
                    .rev()
                    .filter(|p| !visited.contains(p))
                    .map(|p| (p, false)),
            );
        }
    }
    order
}

/// Puts graph of nodes into dot language for visualization
pub(crate) fn plot_graph_dot(order: &[Id], nodes: &[Node]) -> String {
    let mut res = String::from("strict digraph {\n  ordering=in\n  rank=source\n  rankdir=LR\n");
    let mut edges = String::new();
    for &nid in order {
        let node = &nodes[nid.i()];
        let shape = if node.is_placeholder() { "box" } else { "oval" };
        let label = node.label().replace('"', "\\\"");
        // Writing into String can not fail
        let _ = writeln!(
            res,
            "  {nid}[label=\"{nid}: {}\\n{label}\", shape={shape}]",
            node.op().name()
        );
        for param in node.parameters() {
            let _ = writeln!(edges, "  {param} -> {nid}");
        }
    }
    res.push_str(&edges);
    res.push('}');
    res
}

#[cfg(test)]
mod tests {
    use super::topological_sort;
    use crate::error::SymdiffError;
    use crate::graph::Graph;
    use crate::node::Id;

    fn position(order: &[Id], x: Id) -> usize {
        order.iter().position(|&n| n == x).unwrap()
    }

    fn assert_topological(g: &Graph, order: &[Id]) {
        for (i, &nid) in order.iter().enumerate() {
            assert_eq!(position(order, nid), i, "node {nid} appears twice");
            for p in g[nid].parameters() {
                assert!(position(order, p) < i, "parameter {p} of {nid} comes after it");
            }
        }
    }

    #[test]
    fn diamond_is_visited_once() -> Result<(), SymdiffError> {
        let mut g = Graph::new();
        let a = g.placeholder("a");
        let b = g.placeholder("b");
        let c = g.placeholder("c");
        let ab = g.add(a, b)?;
        let ac = g.add(a, c)?;
        let abac = g.add(ab, ac)?;
        let order = g.topological_sort(&[abac])?;
        assert_eq!(order, [a, b, ab, c, ac, abac]);
        assert_topological(&g, &order);
        Ok(())
    }

    #[test]
    fn multiple_roots_share_nodes() -> Result<(), SymdiffError> {
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let y = g.placeholder("y");
        let xy = g.mul(x, y)?;
        let z = g.add_const(xy, 1.)?;
        let w = g.mul(xy, x)?;
        let order = g.topological_sort(&[w, z, xy])?;
        assert_eq!(order, [x, y, xy, w, z]);
        assert_topological(&g, &order);
        Ok(())
    }

    #[test]
    fn same_parameter_twice() -> Result<(), SymdiffError> {
        let mut g = Graph::new();
        let x = g.placeholder("x");
        let xx = g.mul(x, x)?;
        let order = g.topological_sort(&[xx, x])?;
        assert_eq!(order, [x, xx]);
        Ok(())
    }

    #[test]
    fn deep_chain() -> Result<(), SymdiffError> {
        let mut g = Graph::new();
        let mut x = g.placeholder("x");
        let first = x;
        for _ in 0..100_000 {
            x = g.mul_const(x, 1.)?;
        }
        let order = topological_sort(g.nodes(), &[x]);
        assert_eq!(order.len(), 100_001);
        assert_eq!(order[0], first);
        assert_eq!(order[100_000], x);
        Ok(())
    }
}
