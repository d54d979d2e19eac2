//! Bidirectional dependency graph between tracked files

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tsincr_lexer::Span;

use crate::preprocess::ReferenceKind;

/// A resolved reference from one file to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Specifier as written in the referencing file
    pub original: String,
    /// Absolute path the specifier resolved to
    pub resolved: PathBuf,
    /// Span of the specifier in the referencing file
    pub span: Span,
    pub kind: ReferenceKind,
}

/// Forward (file -> imports) and reverse (file -> dependents) views of the
/// same edge set. Both views are always updated together.
#[derive(Debug, Default)]
pub struct DepGraph {
    forward: HashMap<PathBuf, Vec<DependencyEdge>>,
    reverse: HashMap<PathBuf, HashSet<PathBuf>>,
}

impl DepGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `from` references `edge.resolved`
    pub fn add_edge(&mut self, from: &Path, edge: DependencyEdge) {
        self.reverse
            .entry(edge.resolved.clone())
            .or_default()
            .insert(from.to_path_buf());
        self.forward.entry(from.to_path_buf()).or_default().push(edge);
    }

    /// Replace every forward edge of `from`
    pub fn set_edges(&mut self, from: &Path, edges: Vec<DependencyEdge>) {
        self.clear_forward(from);
        for edge in edges {
            self.add_edge(from, edge);
        }
    }

    /// Drop `file` from the graph: its own edges and every edge pointing at it
    pub fn remove_file(&mut self, file: &Path) {
        self.clear_forward(file);
        if let Some(dependents) = self.reverse.remove(file) {
            for dependent in dependents {
                if let Some(edges) = self.forward.get_mut(&dependent) {
                    edges.retain(|edge| edge.resolved != file);
                    if edges.is_empty() {
                        self.forward.remove(&dependent);
                    }
                }
            }
        }
    }

    fn clear_forward(&mut self, from: &Path) {
        let Some(edges) = self.forward.remove(from) else {
            return;
        };
        for edge in edges {
            if let Some(dependents) = self.reverse.get_mut(&edge.resolved) {
                dependents.remove(from);
                if dependents.is_empty() {
                    self.reverse.remove(&edge.resolved);
                }
            }
        }
    }

    /// Direct dependencies of `file`, in reference order
    pub fn dependencies(&self, file: &Path) -> &[DependencyEdge] {
        self.forward.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Files that directly reference `file`
    pub fn dependents(&self, file: &Path) -> BTreeSet<PathBuf> {
        self.reverse
            .get(file)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every file that depends on `file`, directly or not
    ///
    /// `file` itself is only included when it sits on a cycle.
    pub fn transitive_dependents(&self, file: &Path) -> BTreeSet<PathBuf> {
        self.closure(file, |path| {
            self.reverse
                .get(path)
                .into_iter()
                .flatten()
                .cloned()
                .collect()
        })
    }

    /// Every file `file` depends on, directly or not
    ///
    /// `file` itself is only included when it sits on a cycle.
    pub fn transitive_dependencies(&self, file: &Path) -> BTreeSet<PathBuf> {
        self.closure(file, |path| {
            self.dependencies(path)
                .iter()
                .map(|edge| edge.resolved.clone())
                .collect()
        })
    }

    /// Breadth-first work-list closure over `next`
    fn closure<F>(&self, start: &Path, next: F) -> BTreeSet<PathBuf>
    where
        F: Fn(&Path) -> Vec<PathBuf>,
    {
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<PathBuf> = next(start).into();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            queue.extend(next(&current).into_iter().filter(|p| !visited.contains(p)));
        }

        visited
    }

    /// Find one dependency cycle, if any
    ///
    /// Returns the files on the cycle in reference order, starting and
    /// ending with the same file.
    pub fn find_cycle(&self) -> Option<Vec<PathBuf>> {
        let mut done: HashSet<&Path> = HashSet::new();
        let mut roots: Vec<&PathBuf> = self.forward.keys().collect();
        roots.sort();

        for root in roots {
            if done.contains(root.as_path()) {
                continue;
            }
            // Explicit DFS stack of (node, next edge index)
            let mut stack: Vec<(&Path, usize)> = vec![(root.as_path(), 0)];
            let mut on_stack: HashSet<&Path> = HashSet::from([root.as_path()]);

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                let edges = self.dependencies(node);
                if top.1 >= edges.len() {
                    done.insert(node);
                    on_stack.remove(node);
                    stack.pop();
                    continue;
                }
                let target = edges[top.1].resolved.as_path();
                top.1 += 1;

                if on_stack.contains(target) {
                    let begin = stack.iter().position(|(n, _)| *n == target).unwrap_or(0);
                    let mut cycle: Vec<PathBuf> =
                        stack[begin..].iter().map(|(n, _)| n.to_path_buf()).collect();
                    cycle.push(target.to_path_buf());
                    return Some(cycle);
                }
                if !done.contains(target) {
                    on_stack.insert(target);
                    stack.push((target, 0));
                }
            }
        }

        None
    }

    /// Check that the forward and reverse views describe the same edges
    pub fn is_consistent(&self) -> bool {
        let forward_ok = self.forward.iter().all(|(from, edges)| {
            edges.iter().all(|edge| {
                self.reverse
                    .get(&edge.resolved)
                    .is_some_and(|dependents| dependents.contains(from))
            })
        });
        let reverse_ok = self.reverse.iter().all(|(to, dependents)| {
            !dependents.is_empty()
                && dependents.iter().all(|from| {
                    self.dependencies(from)
                        .iter()
                        .any(|edge| &edge.resolved == to)
                })
        });
        forward_ok && reverse_ok
    }

    /// Number of files with at least one outgoing edge
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
