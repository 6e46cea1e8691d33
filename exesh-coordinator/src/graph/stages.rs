//! Stage graph
//!
//! Gates whole job graphs behind stage dependencies and applies the
//! short-circuit policy: a job finishing with anything other than its
//! declared success status stops the execution.

use exesh_core::domain::{Job, JobId, JobStatus, Stage};
use std::collections::{HashMap, HashSet, VecDeque};

use super::{GraphError, JobGraph};

#[derive(Debug)]
pub struct StageGraph {
    names: Vec<String>,
    graphs: Vec<JobGraph>,
    /// Prerequisite stages not complete yet
    remaining: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    active: Vec<usize>,
    failed: bool,
}

impl StageGraph {
    pub fn build(stages: Vec<Stage>) -> Result<Self, GraphError> {
        let mut index: HashMap<String, usize> = HashMap::new();
        for (pos, stage) in stages.iter().enumerate() {
            if index.insert(stage.name.clone(), pos).is_some() {
                return Err(GraphError::DuplicateStage(stage.name.clone()));
            }
        }

        let count = stages.len();
        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (pos, stage) in stages.iter().enumerate() {
            for dep in &stage.deps {
                let &dep_pos = index.get(dep).ok_or_else(|| GraphError::UnknownStage {
                    stage: stage.name.clone(),
                    dependency: dep.clone(),
                })?;
                if !deps[pos].contains(&dep_pos) {
                    deps[pos].push(dep_pos);
                    dependents[dep_pos].push(pos);
                }
            }
        }

        let order = stage_order(&deps, &dependents).map_err(|pos| {
            GraphError::StageCycle(stages[pos].name.clone())
        })?;

        // transitive prerequisites, filled in dependency order
        let mut prerequisites: Vec<HashSet<usize>> = vec![HashSet::new(); count];
        for &pos in &order {
            let mut all = HashSet::new();
            for &dep in &deps[pos] {
                all.insert(dep);
                all.extend(prerequisites[dep].iter().copied());
            }
            prerequisites[pos] = all;
        }

        let stage_jobs: Vec<HashSet<JobId>> = stages
            .iter()
            .map(|stage| stage.jobs.iter().map(|job| job.id().clone()).collect())
            .collect();

        let mut names = Vec::with_capacity(count);
        let mut graphs = Vec::with_capacity(count);
        for (pos, stage) in stages.into_iter().enumerate() {
            let external: HashSet<JobId> = prerequisites[pos]
                .iter()
                .flat_map(|&dep| stage_jobs[dep].iter().cloned())
                .collect();
            graphs.push(JobGraph::build(stage.jobs, &external)?);
            names.push(stage.name);
        }

        let remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
        let active = (0..count).filter(|&pos| remaining[pos] == 0).collect();

        let mut graph = Self {
            names,
            graphs,
            remaining,
            dependents,
            active,
            failed: false,
        };
        graph.settle();
        Ok(graph)
    }

    /// Jobs of active stages that became runnable since the last call
    pub fn pick_ready(&mut self) -> Vec<Job> {
        let mut ready = Vec::new();
        for &pos in &self.active {
            ready.extend(self.graphs[pos].pick_ready());
        }
        ready
    }

    /// Records the outcome of `job_id` in every active stage containing it
    ///
    /// Returns false when no active stage knows the job, e.g. after the
    /// execution already failed.
    pub fn mark_done(&mut self, job_id: &JobId, status: JobStatus) -> bool {
        let mut expected = None;
        for &pos in &self.active {
            let graph = &mut self.graphs[pos];
            let Some(success) = graph.job(job_id).map(Job::success_status) else {
                continue;
            };
            if graph.mark_done(job_id) {
                expected = Some(success);
            }
        }

        let Some(success) = expected else {
            return false;
        };

        if status != success {
            tracing::debug!(
                "Job {} finished with {} instead of {}, stopping",
                job_id,
                status,
                success
            );
            self.failed = true;
            self.active.clear();
            return true;
        }

        self.settle();
        true
    }

    /// True when every stage completed or the graph short-circuited
    pub fn is_done(&self) -> bool {
        self.active.is_empty()
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn stage_names(&self) -> &[String] {
        &self.names
    }

    /// Retires completed active stages and activates the stages they unblock
    fn settle(&mut self) {
        loop {
            let Some(idx) = self
                .active
                .iter()
                .position(|&pos| self.graphs[pos].is_done())
            else {
                break;
            };

            let pos = self.active.remove(idx);
            tracing::debug!("Stage {} complete", self.names[pos]);

            for &next in &self.dependents[pos] {
                self.remaining[next] -= 1;
                if self.remaining[next] == 0 {
                    self.active.push(next);
                }
            }
        }
    }
}

/// Kahn's algorithm; on a cycle returns a stage that is part of it or behind it
fn stage_order(deps: &[Vec<usize>], dependents: &[Vec<usize>]) -> Result<Vec<usize>, usize> {
    let mut indegree: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> = (0..deps.len()).filter(|&pos| indegree[pos] == 0).collect();
    let mut order = Vec::with_capacity(deps.len());

    while let Some(pos) = queue.pop_front() {
        order.push(pos);
        for &next in &dependents[pos] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() < deps.len() {
        let stuck = (0..deps.len()).find(|&pos| indegree[pos] > 0).unwrap_or(0);
        return Err(stuck);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::jobs::tests::{artifact, check, compile, inline, run};

    fn stage(name: &str, deps: &[&str], jobs: Vec<Job>) -> Stage {
        Stage {
            name: name.to_string(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            jobs,
        }
    }

    fn ids(jobs: &[Job]) -> Vec<String> {
        jobs.iter().map(|job| job.id().to_string()).collect()
    }

    fn two_stages() -> Vec<Stage> {
        vec![
            stage(
                "build",
                &[],
                vec![compile("solution"), compile("checker")],
            ),
            stage(
                "test",
                &["build"],
                vec![
                    run("run", artifact("solution"), inline("in")),
                    check("check", artifact("checker"), inline("ans"), artifact("run")),
                ],
            ),
        ]
    }

    #[test]
    fn test_stage_waits_for_prerequisites() {
        let mut graph = StageGraph::build(two_stages()).unwrap();

        assert_eq!(ids(&graph.pick_ready()), vec!["solution", "checker"]);

        graph.mark_done(&JobId::new("solution"), JobStatus::OK);
        assert!(graph.pick_ready().is_empty());

        graph.mark_done(&JobId::new("checker"), JobStatus::OK);
        assert_eq!(ids(&graph.pick_ready()), vec!["run"]);

        graph.mark_done(&JobId::new("run"), JobStatus::OK);
        assert_eq!(ids(&graph.pick_ready()), vec!["check"]);

        assert!(!graph.is_done());
        graph.mark_done(&JobId::new("check"), JobStatus::OK);
        assert!(graph.is_done());
        assert!(!graph.failed());
    }

    #[test]
    fn test_failure_short_circuits_dependent_stages() {
        let mut graph = StageGraph::build(two_stages()).unwrap();
        graph.pick_ready();

        graph.mark_done(&JobId::new("solution"), JobStatus::CE);
        assert!(graph.failed());
        assert!(graph.is_done());

        // the rest of the first stage is ignored too
        assert!(!graph.mark_done(&JobId::new("checker"), JobStatus::OK));
        assert!(graph.pick_ready().is_empty());
    }

    #[test]
    fn test_declared_success_status_is_not_a_failure() {
        let mut expect_wa = check("check", inline("checker"), inline("ans"), inline("out"));
        if let Job::CheckCpp(job) = &mut expect_wa {
            job.success_status = JobStatus::WA;
        }
        let stages = vec![
            stage("negative", &[], vec![expect_wa]),
            stage("after", &["negative"], vec![compile("next")]),
        ];
        let mut graph = StageGraph::build(stages).unwrap();

        assert_eq!(ids(&graph.pick_ready()), vec!["check"]);
        graph.mark_done(&JobId::new("check"), JobStatus::WA);
        assert!(!graph.failed());
        assert_eq!(ids(&graph.pick_ready()), vec!["next"]);
    }

    #[test]
    fn test_jobs_may_use_transitive_prerequisites() {
        let stages = vec![
            stage("a", &[], vec![compile("bin")]),
            stage("b", &["a"], vec![compile("other")]),
            stage("c", &["b"], vec![run("run", artifact("bin"), inline("in"))]),
        ];
        assert!(StageGraph::build(stages).is_ok());
    }

    #[test]
    fn test_jobs_may_not_use_unrelated_stages() {
        let stages = vec![
            stage("a", &[], vec![compile("bin")]),
            stage("b", &[], vec![run("run", artifact("bin"), inline("in"))]),
        ];
        let err = StageGraph::build(stages).unwrap_err();
        assert!(matches!(err, GraphError::UnknownDependency { .. }));
    }

    #[test]
    fn test_stage_cycle_is_rejected() {
        let stages = vec![
            stage("a", &["c"], vec![compile("x")]),
            stage("b", &["a"], vec![compile("y")]),
            stage("c", &["b"], vec![compile("z")]),
        ];
        let err = StageGraph::build(stages).unwrap_err();
        assert!(matches!(err, GraphError::StageCycle(_)));
    }

    #[test]
    fn test_unknown_and_duplicate_stages_are_rejected() {
        let unknown = vec![stage("a", &["missing"], Vec::new())];
        assert_eq!(
            StageGraph::build(unknown).unwrap_err(),
            GraphError::UnknownStage {
                stage: "a".to_string(),
                dependency: "missing".to_string(),
            }
        );

        let duplicate = vec![stage("a", &[], Vec::new()), stage("a", &[], Vec::new())];
        assert_eq!(
            StageGraph::build(duplicate).unwrap_err(),
            GraphError::DuplicateStage("a".to_string())
        );
    }

    #[test]
    fn test_empty_stages_complete_immediately() {
        let stages = vec![
            stage("empty", &[], Vec::new()),
            stage("work", &["empty"], vec![compile("x")]),
        ];
        let mut graph = StageGraph::build(stages).unwrap();
        assert_eq!(ids(&graph.pick_ready()), vec!["x"]);

        let nothing = StageGraph::build(Vec::new()).unwrap();
        assert!(nothing.is_done());
    }
}
