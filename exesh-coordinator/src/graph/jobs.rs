//! Job graph
//!
//! A DAG over the jobs of one stage. Edges follow artifact inputs: a job
//! consuming the output of job X depends on X.

use exesh_core::domain::{Job, JobId};
use std::collections::{HashMap, HashSet};

use super::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Visited,
}

/// Dependency graph of a set of jobs with a readiness cursor
#[derive(Debug)]
pub struct JobGraph {
    jobs: Vec<Job>,
    index: HashMap<JobId, usize>,
    successors: Vec<Vec<usize>>,
    /// Unfinished in-graph dependencies per job
    pending: Vec<usize>,
    order: Vec<usize>,
    cursor: usize,
    done: Vec<bool>,
    done_count: usize,
}

impl JobGraph {
    /// Builds the graph of `jobs`
    ///
    /// Dependencies found in `external` are jobs of prerequisite stages; they
    /// are already done when this graph is consulted and do not count. Any
    /// other dependency missing from `jobs` is an error. Repeated jobs with the
    /// same id are merged since identical work yields identical ids.
    pub fn build(jobs: Vec<Job>, external: &HashSet<JobId>) -> Result<Self, GraphError> {
        let mut unique: Vec<Job> = Vec::with_capacity(jobs.len());
        let mut index: HashMap<JobId, usize> = HashMap::new();
        for job in jobs {
            match index.get(job.id()) {
                Some(&existing) if unique[existing] == job => continue,
                Some(_) => return Err(GraphError::DuplicateJob(job.id().clone())),
                None => {
                    index.insert(job.id().clone(), unique.len());
                    unique.push(job);
                }
            }
        }

        let count = unique.len();
        let mut successors = vec![Vec::new(); count];
        let mut pending = vec![0; count];

        for (pos, job) in unique.iter().enumerate().rev() {
            for dep in job.dependencies() {
                match index.get(dep) {
                    Some(&dep_pos) => {
                        if dep_pos == pos {
                            return Err(GraphError::Cycle(dep.clone()));
                        }
                        successors[dep_pos].push(pos);
                        pending[pos] += 1;
                    }
                    None if external.contains(dep) => {}
                    None => {
                        return Err(GraphError::UnknownDependency {
                            job: job.id().clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
        }

        let order = topological_order(&unique, &successors)?;

        Ok(Self {
            jobs: unique,
            index,
            successors,
            pending,
            order,
            cursor: 0,
            done: vec![false; count],
            done_count: 0,
        })
    }

    /// Returns the jobs that became runnable since the last call
    ///
    /// Walks the topological order from the cursor and stops at the first job
    /// with an unfinished dependency, so each job is returned exactly once and
    /// only after all of its dependencies were marked done.
    pub fn pick_ready(&mut self) -> Vec<Job> {
        let mut ready = Vec::new();
        while let Some(&pos) = self.order.get(self.cursor) {
            if self.pending[pos] > 0 {
                break;
            }
            ready.push(self.jobs[pos].clone());
            self.cursor += 1;
        }
        ready
    }

    /// Records completion of `job_id`; returns false when the job is unknown
    /// or already done
    pub fn mark_done(&mut self, job_id: &JobId) -> bool {
        let Some(&pos) = self.index.get(job_id) else {
            return false;
        };
        if self.done[pos] {
            return false;
        }

        self.done[pos] = true;
        self.done_count += 1;
        for &next in &self.successors[pos] {
            self.pending[next] -= 1;
        }
        true
    }

    pub fn is_done(&self) -> bool {
        self.done_count == self.jobs.len()
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.index.contains_key(job_id)
    }

    pub fn job(&self, job_id: &JobId) -> Option<&Job> {
        self.index.get(job_id).map(|&pos| &self.jobs[pos])
    }

    pub fn job_ids(&self) -> impl Iterator<Item = &JobId> {
        self.jobs.iter().map(|job| job.id())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Reverse DFS postorder over successor edges
///
/// Roots are visited in reverse declaration order so that, once reversed,
/// unrelated jobs keep their declaration order.
fn topological_order(jobs: &[Job], successors: &[Vec<usize>]) -> Result<Vec<usize>, GraphError> {
    let mut marks = vec![Mark::Unvisited; jobs.len()];
    let mut postorder = Vec::with_capacity(jobs.len());

    for root in (0..jobs.len()).rev() {
        if marks[root] != Mark::Unvisited {
            continue;
        }

        // explicit stack of (node, next successor to visit)
        let mut stack = vec![(root, 0usize)];
        marks[root] = Mark::InProgress;

        while let Some((node, next)) = stack.last_mut() {
            let node = *node;
            if let Some(&succ) = successors[node].get(*next) {
                *next += 1;
                match marks[succ] {
                    Mark::Unvisited => {
                        marks[succ] = Mark::InProgress;
                        stack.push((succ, 0));
                    }
                    Mark::InProgress => return Err(GraphError::Cycle(jobs[succ].id().clone())),
                    Mark::Visited => {}
                }
            } else {
                marks[node] = Mark::Visited;
                postorder.push(node);
                stack.pop();
            }
        }
    }

    postorder.reverse();
    Ok(postorder)
}
