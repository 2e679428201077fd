/// Forward and inverse template references, indexed by definition position.
///
/// Both directions are built together from the same edge list and are never
/// mutated afterwards, so `depended_on_by` is always the transpose of
/// `depends_on`. Neighbour lists are sorted by definition order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    depends_on: Vec<Vec<usize>>,
    depended_on_by: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub(crate) fn from_edges(edges: Vec<Vec<usize>>) -> Self {
        let mut depended_on_by = vec![Vec::new(); edges.len()];
        let mut depends_on = Vec::with_capacity(edges.len());
        for (from, mut targets) in edges.into_iter().enumerate() {
            targets.sort_unstable();
            targets.dedup();
            for &to in &targets {
                depended_on_by[to].push(from);
            }
            depends_on.push(targets);
        }
        Self {
            depends_on,
            depended_on_by,
        }
    }

    pub fn depends_on(&self, idx: usize) -> &[usize] {
        self.depends_on.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn depended_on_by(&self, idx: usize) -> &[usize] {
        self.depended_on_by.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.depends_on.iter().map(Vec::len).sum()
    }

    /// Dependency-first order: a depth-first walk over `depends_on`, roots in
    /// definition order, each position emitted once. Inside a cycle the node
    /// reached last is emitted first.
    pub fn evaluation_order(&self) -> Vec<usize> {
        let len = self.depends_on.len();
        let mut seen = vec![false; len];
        let mut order = Vec::with_capacity(len);
        for root in 0..len {
            if seen[root] {
                continue;
            }
            seen[root] = true;
            let mut stack = vec![(root, 0usize)];
            while let Some(top) = stack.last_mut() {
                let (node, cursor) = *top;
                match self.depends_on[node].get(cursor) {
                    Some(&dependency) => {
                        top.1 += 1;
                        if !seen[dependency] {
                            seen[dependency] = true;
                            stack.push((dependency, 0));
                        }
                    }
                    None => {
                        order.push(node);
                        stack.pop();
                    }
                }
            }
        }
        order
    }

    /// True when following references from `idx` leads back to `idx`.
    pub fn in_cycle(&self, idx: usize) -> bool {
        let mut seen = vec![false; self.depends_on.len()];
        let mut stack = self.depends_on(idx).to_vec();
        while let Some(next) = stack.pop() {
            if next == idx {
                return true;
            }
            if std::mem::replace(&mut seen[next], true) {
                continue;
            }
            stack.extend_from_slice(self.depends_on(next));
        }
        false
    }
}
