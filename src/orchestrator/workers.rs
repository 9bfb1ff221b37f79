use super::manager::OrchestratorHandle;
use crate::artifact::{
    AnalyzedArtifact, DownloadedArtifact, FailedArtifact, FailedProject, IdentifiesArtifact,
    ResolvedArtifact, ResolvedProject, StageFailure,
};
use crate::collaborators::{Collaborators, ProjectSource};
use crate::core::config::AnalysisConfig;
use crate::core::errors::{DepwallError, Result};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Runs one collaborator call, turning its error or a timeout into a stage failure
async fn call<T, F>(stage: &str, timeout: Option<Duration>, future: F) -> std::result::Result<T, StageFailure>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let timed_out = DepwallError::timeout(stage, limit.as_millis() as u64);
                return Err(StageFailure::from(&timed_out));
            }
        },
        None => future.await,
    };
    outcome.map_err(|e| StageFailure::from_error(&e))
}

/// Ends a worker loop: a closed channel is the normal way out, anything else is logged
fn stop(worker: &str, error: DepwallError) {
    if error.is_shutdown() {
        debug!(worker, "Worker stopping");
    } else {
        error!(worker, error = %error, "Worker stopping on error");
    }
}

/// The tokio tasks working the stage channels of one orchestrator
pub struct WorkerPool {
    handle: OrchestratorHandle,
    workers: Vec<(String, JoinHandle<()>)>,
}

impl WorkerPool {
    /// Spawns `config.workers` tasks per stage; each loops take, call, report until its channel closes
    pub fn spawn(handle: OrchestratorHandle, collaborators: Collaborators, config: &AnalysisConfig) -> Self {
        let mut pool = Self {
            handle,
            workers: Vec::new(),
        };
        let timeout = config.stage_timeout;
        let counts = &config.workers;

        for id in 0..counts.version_resolution {
            let handle = pool.handle.clone();
            let resolver = collaborators.version_resolver.clone();
            let name = format!("version-resolution-{}", id);
            let worker = name.clone();
            pool.push(name, async move {
                loop {
                    let project = match handle.get_next_version_resolution().await {
                        Ok(project) => project,
                        Err(e) => return stop(&worker, e),
                    };
                    let outcome = call("version resolution", timeout, resolver.resolve_versions(&project)).await;
                    let reported = match outcome {
                        Ok(versions) => {
                            handle
                                .report_version_resolution_success(ResolvedProject { project, versions })
                                .await
                        }
                        Err(failure) => {
                            handle
                                .report_version_resolution_failure(FailedProject { project, failure })
                                .await
                        }
                    };
                    if let Err(e) = reported {
                        return stop(&worker, e);
                    }
                }
            });
        }

        for id in 0..counts.download {
            let handle = pool.handle.clone();
            let downloader = collaborators.downloader.clone();
            let name = format!("download-{}", id);
            let worker = name.clone();
            pool.push(name, async move {
                loop {
                    let artifact = match handle.get_next_download().await {
                        Ok(artifact) => artifact,
                        Err(e) => return stop(&worker, e),
                    };
                    let outcome = call("download", timeout, downloader.download(&artifact)).await;
                    let reported = match outcome {
                        Ok(path) => {
                            handle
                                .report_download_success(DownloadedArtifact { artifact, path })
                                .await
                        }
                        Err(failure) => {
                            handle
                                .report_download_failure(FailedArtifact::new(artifact, failure))
                                .await
                        }
                    };
                    if let Err(e) = reported {
                        return stop(&worker, e);
                    }
                }
            });
        }

        for id in 0..counts.analysis {
            let handle = pool.handle.clone();
            let analyzer = collaborators.analyzer.clone();
            let name = format!("analysis-{}", id);
            let worker = name.clone();
            pool.push(name, async move {
                loop {
                    let downloaded = match handle.get_next_analysis().await {
                        Ok(downloaded) => downloaded,
                        Err(e) => return stop(&worker, e),
                    };
                    let outcome = call("analysis", timeout, analyzer.analyze(&downloaded)).await;
                    let artifact = downloaded.artifact;
                    let reported = match outcome {
                        Ok(violations) => {
                            handle
                                .report_analysis_success(AnalyzedArtifact { artifact, violations })
                                .await
                        }
                        Err(failure) => {
                            handle
                                .report_analysis_failure(FailedArtifact::new(artifact, failure))
                                .await
                        }
                    };
                    if let Err(e) = reported {
                        return stop(&worker, e);
                    }
                }
            });
        }

        for id in 0..counts.dependency_resolution {
            let handle = pool.handle.clone();
            let resolver = collaborators.dependency_resolver.clone();
            let name = format!("dependency-resolution-{}", id);
            let worker = name.clone();
            pool.push(name, async move {
                loop {
                    let artifact = match handle.get_next_dependency_resolution().await {
                        Ok(artifact) => artifact,
                        Err(e) => return stop(&worker, e),
                    };
                    let outcome = call(
                        "dependency resolution",
                        timeout,
                        resolver.resolve_direct_dependencies(&artifact),
                    )
                    .await;
                    let reported = match outcome {
                        Ok(dependees) => {
                            handle
                                .report_dependency_resolution_success(ResolvedArtifact { artifact, dependees })
                                .await
                        }
                        Err(failure) => {
                            handle
                                .report_dependency_resolution_failure(FailedArtifact::new(artifact, failure))
                                .await
                        }
                    };
                    if let Err(e) = reported {
                        return stop(&worker, e);
                    }
                }
            });
        }

        for id in 0..counts.output {
            let handle = pool.handle.clone();
            let sink = collaborators.output.clone();
            let name = format!("output-{}", id);
            let worker = name.clone();
            pool.push(name, async move {
                loop {
                    let record = match handle.get_next_output().await {
                        Ok(record) => record,
                        Err(e) => return stop(&worker, e),
                    };
                    let artifact = record.coordinates().clone();
                    // Sink failures are reported once and never retried
                    let outcome = call("output", timeout, sink.accept(record)).await;
                    let reported = match outcome {
                        Ok(()) => handle.report_output_success(artifact).await,
                        Err(failure) => {
                            handle
                                .report_output_failure(FailedArtifact::new(artifact, failure))
                                .await
                        }
                    };
                    if let Err(e) = reported {
                        return stop(&worker, e);
                    }
                }
            });
        }

        info!(workers = pool.workers.len(), "Worker pool started");
        pool
    }

    /// Feeds every project of `source` into the orchestrator, once
    pub fn spawn_discovery(&mut self, source: Arc<dyn ProjectSource>) {
        let handle = self.handle.clone();
        self.push("project-discovery".to_string(), async move {
            let reported = match source.projects().await {
                Ok(projects) => {
                    info!(projects = projects.len(), "Discovered projects");
                    let mut reported = Ok(());
                    for project in projects {
                        reported = handle.add_project(project).await;
                        if reported.is_err() {
                            break;
                        }
                    }
                    reported
                }
                Err(e) => {
                    warn!(error = %format!("{:#}", e), "Project discovery failed");
                    handle.project_discovery_failed(StageFailure::from_error(&e)).await
                }
            };
            if let Err(e) = reported {
                stop("project-discovery", e);
            }
        });
    }

    fn push<F>(&mut self, name: String, worker: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.workers.push((name, tokio::spawn(worker)));
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Closes the channels and waits for every worker to finish its current call
    pub async fn shutdown(self) -> Result<()> {
        self.handle.close();
        self.join().await
    }

    /// Waits for every worker; they end once the orchestrator closed the channels
    pub async fn join(self) -> Result<()> {
        let (names, workers): (Vec<String>, Vec<JoinHandle<()>>) = self.workers.into_iter().unzip();
        let mut panicked = Vec::new();
        for (name, joined) in names.into_iter().zip(join_all(workers).await) {
            if let Err(e) = joined {
                error!(worker = %name, error = %e, "Worker panicked");
                panicked.push(name);
            }
        }
        if panicked.is_empty() {
            info!("Worker pool stopped");
            Ok(())
        } else {
            Err(DepwallError::internal(format!("workers panicked: {}", panicked.join(", "))))
        }
    }
}
