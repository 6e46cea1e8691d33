//! Execution Factory
//!
//! Resolves submitted stage and source definitions into [`Job`]s with
//! content derived identities. A job's id hashes its kind, success status,
//! attributes, output name and, for every input, either the id of the source
//! content or the id and file of the producing job. Identical work on
//! identical inputs therefore always gets the same id.

use exesh_core::domain::id::IdHasher;
use exesh_core::domain::job::{CheckJob, CompileJob, RunJob};
use exesh_core::domain::{
    BucketId, Input, InputDefinition, Job, JobDefinition, JobId, JobKind, JobStatus, Output,
    Source, SourceDefinition, SourceId, Stage, StageDefinition,
};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactoryError {
    #[error("unknown source {0}")]
    UnknownSource(String),

    #[error("source {0} is defined more than once")]
    DuplicateSource(String),

    #[error("source {name} cannot be used as {expected} input")]
    SourceKindMismatch {
        name: String,
        expected: &'static str,
    },

    #[error("unknown job {0}; artifacts must come from a job defined earlier")]
    UnknownJob(String),

    #[error("job {0} is defined more than once")]
    DuplicateJob(String),

    #[error("job {0} has no output to consume")]
    NoOutput(String),
}

/// Resolved form of an execution
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub stages: Vec<Stage>,
    sources: HashMap<SourceId, Source>,
    names: HashMap<JobId, Vec<String>>,
}

impl ExecutionPlan {
    /// Definition names that resolved to `job_id`
    pub fn job_names(&self, job_id: &JobId) -> &[String] {
        self.names.get(job_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn source(&self, source_id: &SourceId) -> Option<&Source> {
        self.sources.get(source_id)
    }

    pub fn job_count(&self) -> usize {
        self.names.len()
    }
}

struct Resolver<'a> {
    definitions: HashMap<&'a str, &'a SourceDefinition>,
    sources: HashMap<SourceId, Source>,
    /// job name -> (id, output)
    jobs: HashMap<String, (JobId, Option<Output>)>,
    names: HashMap<JobId, Vec<String>>,
}

/// Resolves `stages` against `sources`
pub fn plan(
    sources: &[SourceDefinition],
    stages: &[StageDefinition],
) -> Result<ExecutionPlan, FactoryError> {
    let mut definitions = HashMap::new();
    for source in sources {
        if definitions.insert(source.name(), source).is_some() {
            return Err(FactoryError::DuplicateSource(source.name().to_string()));
        }
    }

    let mut resolver = Resolver {
        definitions,
        sources: HashMap::new(),
        jobs: HashMap::new(),
        names: HashMap::new(),
    };

    let mut resolved = Vec::with_capacity(stages.len());
    for stage in stages {
        let mut jobs = Vec::with_capacity(stage.jobs.len());
        for definition in &stage.jobs {
            jobs.push(resolver.job(definition)?);
        }
        resolved.push(Stage {
            name: stage.name.clone(),
            deps: stage.deps.clone(),
            jobs,
        });
    }

    Ok(ExecutionPlan {
        stages: resolved,
        sources: resolver.sources,
        names: resolver.names,
    })
}

impl<'a> Resolver<'a> {
    fn job(&mut self, definition: &JobDefinition) -> Result<Job, FactoryError> {
        let name = definition.name();
        if self.jobs.contains_key(name) {
            return Err(FactoryError::DuplicateJob(name.to_string()));
        }

        let kind = definition.kind();
        let job = match definition {
            JobDefinition::CompileCpp(def) | JobDefinition::CompileGo(def) => {
                let code = self.input(&def.code)?;
                let compiled_code = Output::new(&def.compiled_code);

                let mut hasher = job_hasher(kind, def.success_status);
                hash_input(&mut hasher, &code);
                hasher.field(&compiled_code.file);

                let job = CompileJob {
                    id: JobId::from_hasher(hasher),
                    success_status: def.success_status,
                    code,
                    compiled_code,
                };
                match kind {
                    JobKind::CompileGo => Job::CompileGo(job),
                    _ => Job::CompileCpp(job),
                }
            }
            JobDefinition::RunCpp(def) | JobDefinition::RunPy(def) | JobDefinition::RunGo(def) => {
                let program = self.input(&def.program)?;
                let run_input = self.input(&def.run_input)?;
                let run_output = Output::new(&def.run_output);

                let mut hasher = job_hasher(kind, def.success_status);
                hash_input(&mut hasher, &program);
                hash_input(&mut hasher, &run_input);
                hasher.field(&run_output.file);
                hasher.field(def.time_limit.to_le_bytes());
                hasher.field(def.memory_limit.to_le_bytes());
                hasher.field([def.show_output as u8]);

                let job = RunJob {
                    id: JobId::from_hasher(hasher),
                    success_status: def.success_status,
                    program,
                    run_input,
                    run_output,
                    time_limit: def.time_limit,
                    memory_limit: def.memory_limit,
                    show_output: def.show_output,
                };
                match kind {
                    JobKind::RunPy => Job::RunPy(job),
                    JobKind::RunGo => Job::RunGo(job),
                    _ => Job::RunCpp(job),
                }
            }
            JobDefinition::CheckCpp(def) => {
                let compiled_checker = self.input(&def.compiled_checker)?;
                let correct_output = self.input(&def.correct_output)?;
                let suspect_output = self.input(&def.suspect_output)?;

                let mut hasher = job_hasher(kind, def.success_status);
                hash_input(&mut hasher, &compiled_checker);
                hash_input(&mut hasher, &correct_output);
                hash_input(&mut hasher, &suspect_output);

                Job::CheckCpp(CheckJob {
                    id: JobId::from_hasher(hasher),
                    success_status: def.success_status,
                    compiled_checker,
                    correct_output,
                    suspect_output,
                })
            }
        };

        self.jobs.insert(
            name.to_string(),
            (job.id().clone(), job.output().cloned()),
        );
        self.names
            .entry(job.id().clone())
            .or_default()
            .push(name.to_string());

        Ok(job)
    }

    fn input(&mut self, definition: &InputDefinition) -> Result<Input, FactoryError> {
        match definition {
            InputDefinition::Artifact { job } => {
                let (job_id, output) = self
                    .jobs
                    .get(job)
                    .ok_or_else(|| FactoryError::UnknownJob(job.clone()))?;
                let output = output
                    .clone()
                    .ok_or_else(|| FactoryError::NoOutput(job.clone()))?;
                Ok(output.into_input(job_id.clone()))
            }
            InputDefinition::Inline { source } => match self.definition(source)? {
                SourceDefinition::Inline { content, .. } => {
                    let id = SourceId::for_inline(content);
                    self.sources.insert(
                        id.clone(),
                        Source::Inline {
                            id: id.clone(),
                            content: content.clone(),
                        },
                    );
                    Ok(Input::Inline { source_id: id })
                }
                _ => Err(FactoryError::SourceKindMismatch {
                    name: source.clone(),
                    expected: "inline",
                }),
            },
            InputDefinition::FilestorageBucket { source, file } => {
                match self.definition(source)? {
                    SourceDefinition::FilestorageBucket {
                        bucket_id,
                        download_endpoint,
                        ..
                    } => {
                        let (bucket_id, endpoint) = (bucket_id.clone(), download_endpoint.clone());
                        Ok(self.bucket_file(bucket_id, file.clone(), endpoint))
                    }
                    _ => Err(FactoryError::SourceKindMismatch {
                        name: source.clone(),
                        expected: "filestorage_bucket",
                    }),
                }
            }
            InputDefinition::FilestorageBucketFile { source } => {
                match self.definition(source)? {
                    SourceDefinition::FilestorageBucketFile {
                        bucket_id,
                        file,
                        download_endpoint,
                        ..
                    } => {
                        let (bucket_id, file, endpoint) =
                            (bucket_id.clone(), file.clone(), download_endpoint.clone());
                        Ok(self.bucket_file(bucket_id, file, endpoint))
                    }
                    _ => Err(FactoryError::SourceKindMismatch {
                        name: source.clone(),
                        expected: "filestorage_bucket_file",
                    }),
                }
            }
        }
    }

    fn definition(&self, name: &str) -> Result<&'a SourceDefinition, FactoryError> {
        self.definitions
            .get(name)
            .copied()
            .ok_or_else(|| FactoryError::UnknownSource(name.to_string()))
    }

    fn bucket_file(
        &mut self,
        bucket_id: BucketId,
        file: String,
        download_endpoint: String,
    ) -> Input {
        let id = SourceId::for_bucket_file(&bucket_id, &file);
        self.sources.insert(
            id.clone(),
            Source::FilestorageBucketFile {
                id: id.clone(),
                bucket_id,
                file,
                download_endpoint,
            },
        );
        Input::FilestorageBucketFile { source_id: id }
    }
}

fn job_hasher(kind: JobKind, success_status: JobStatus) -> IdHasher {
    let mut hasher = IdHasher::new("job");
    hasher.field(kind.as_str());
    hasher.field(success_status.to_string());
    hasher
}

fn hash_input(hasher: &mut IdHasher, input: &Input) {
    match input {
        Input::Artifact { job_id, file } => {
            hasher.field("artifact").field(job_id.as_str()).field(file);
        }
        Input::Inline { source_id } => {
            hasher.field("inline").field(source_id.as_str());
        }
        Input::FilestorageBucketFile { source_id } => {
            hasher
                .field("filestorage_bucket_file")
                .field(source_id.as_str());
        }
    }
}
