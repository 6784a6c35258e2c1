use super::part::PartIndex;

/// Orders the nodes of a dependency graph so that every node comes after
/// all of its dependencies.
///
/// `dependencies[i]` lists the nodes `i` depends on. Depth first: a node is
/// appended only after everything it depends on has been appended, and that
/// post-order is the execution order. The graph must be acyclic.
pub fn topological_order(dependencies: &[Vec<PartIndex>]) -> Vec<PartIndex> {
    let mut visited = vec![false; dependencies.len()];
    let mut order = Vec::with_capacity(dependencies.len());
    for root in 0..dependencies.len() {
        if visited[root] {
            continue;
        }
        // explicit stack of (node, next dependency to look at)
        let mut stack = vec![(root, 0usize)];
        visited[root] = true;
        while let Some((node, next)) = stack.last_mut() {
            if let Some(&dep) = dependencies[*node].get(*next) {
                *next += 1;
                if !visited[dep] {
                    visited[dep] = true;
                    stack.push((dep, 0));
                }
            } else {
                order.push(*node);
                stack.pop();
            }
        }
    }
    order
}
