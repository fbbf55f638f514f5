use crate::error::ImportError;
use crate::mapper::Mapper;
use crate::model::{Project, RemoteProject};
use crate::paging::{Page, walk_pages};
use crate::provider::{BackendClient, DEFAULT_REF, GitLabFetcher};
use crate::report::{ImportReport, Record};
use crate::request::ImportIntent;
use tracing::{Span, debug, error, info, info_span, warn};

/// Runs import operations for one caller against one GitLab and one backend.
///
/// Operations are strictly sequential: one page, one project and one branch at a time.
pub struct Importer<'a> {
    gitlab: &'a dyn GitLabFetcher,
    backend: &'a dyn BackendClient,
    mapper: Mapper,
    span: Span,
}

impl<'a> Importer<'a> {
    pub fn new(
        gitlab: &'a dyn GitLabFetcher,
        backend: &'a dyn BackendClient,
        mapper: Mapper,
    ) -> Self {
        let span = info_span!(
            "import",
            token_id = mapper.token_id(),
            provider_id = mapper.provider_id()
        );
        Self {
            gitlab,
            backend,
            mapper,
            span,
        }
    }

    pub fn run(&self, intent: &ImportIntent) -> Result<ImportReport, ImportError> {
        match intent {
            ImportIntent::Refresh { project_id } => self.refresh_project(*project_id),
            ImportIntent::Project { group, project } => self.import_project(group, project),
            ImportIntent::Group { group } => self.import_group(group),
            ImportIntent::All => self.import_all(),
        }
    }

    /// Imports one project and its branches. Failing to resolve or store the
    /// project aborts; branch failures are collected.
    pub fn import_project(&self, group: &str, project: &str) -> Result<ImportReport, ImportError> {
        let _entered = self.span.enter();
        info!(group, project, "importing project");
        let remote = self
            .gitlab
            .get_project(group, project)
            .map_err(ImportError::GitLab)?;
        let stored = self.put_project(&remote).inspect_err(|err| {
            error!(error = %err, project_id = remote.id, "failed to put project");
        })?;

        let mut report = ImportReport {
            projects: 1,
            ..ImportReport::default()
        };
        self.import_branches(&stored, &remote, &mut report)?;
        finish(report)
    }

    pub fn import_group(&self, group: &str) -> Result<ImportReport, ImportError> {
        let _entered = self.span.enter();
        info!(group, "importing group");
        self.import_paginated_projects(|page| {
            self.gitlab
                .list_projects_from_group(group, page)
                .map_err(ImportError::GitLab)
        })
    }

    pub fn import_all(&self) -> Result<ImportReport, ImportError> {
        let _entered = self.span.enter();
        info!("importing all projects");
        self.import_paginated_projects(|page| {
            self.gitlab.list_projects(page).map_err(ImportError::GitLab)
        })
    }

    /// Re-reads a project the backend already knows from GitLab, updates it
    /// and replaces its whole branch list.
    pub fn refresh_project(&self, project_id: u64) -> Result<ImportReport, ImportError> {
        let _entered = self.span.enter();
        info!(project_id, "refreshing project");
        let existing = self
            .backend
            .get_project(project_id)
            .map_err(ImportError::Backend)
            .inspect_err(|err| error!(error = %err, project_id, "failed to get project"))?;
        let remote = self
            .gitlab
            .get_project(&existing.group_name, &existing.name)
            .map_err(ImportError::GitLab)?;
        let build_definition = self.build_definition(&remote)?;
        let update = self.mapper.map_project(&remote, build_definition);
        self.backend
            .update_project(project_id, &update)
            .map_err(ImportError::Backend)?;

        let mut branches = Vec::new();
        walk_pages(
            |page| {
                self.gitlab
                    .get_branches(remote.id, page)
                    .map_err(ImportError::GitLab)
            },
            |page| {
                branches.extend(self.mapper.map_branches(&page));
                Ok(())
            },
        )?;
        let replaced = self
            .backend
            .update_project_branch_list(project_id, &branches)
            .map_err(ImportError::Backend)?;
        info!(project_id, branches = replaced.len(), "refreshed project");
        Ok(ImportReport {
            projects: 1,
            branches: replaced.len(),
            failures: Vec::new(),
        })
    }

    fn import_paginated_projects(
        &self,
        fetch: impl FnMut(i64) -> Result<Page<RemoteProject>, ImportError>,
    ) -> Result<ImportReport, ImportError> {
        let mut report = ImportReport::default();
        walk_pages(fetch, |projects| self.import_projects(projects, &mut report))
            .inspect_err(|err| error!(error = %err, "failed to get projects"))?;
        finish(report)
    }

    /// Imports one page of projects. Only credential rejections stop the page.
    fn import_projects(
        &self,
        projects: Vec<RemoteProject>,
        report: &mut ImportReport,
    ) -> Result<(), ImportError> {
        for remote in projects {
            let stored = match self.put_project(&remote) {
                Ok(stored) => stored,
                Err(err) if err.is_unauthorized() => return Err(err),
                Err(err) => {
                    error!(error = %err, project_id = remote.id, "failed to put project");
                    report.record_failure(Record::project(&remote), err);
                    continue;
                }
            };
            report.projects += 1;

            match self.import_branches(&stored, &remote, report) {
                Ok(()) => {}
                Err(err) if err.is_unauthorized() => return Err(err),
                Err(err) => {
                    error!(error = %err, project_id = remote.id, "unable to import branches");
                    report.record_failure(Record::project(&remote), err);
                }
            }
        }
        Ok(())
    }

    fn put_project(&self, remote: &RemoteProject) -> Result<Project, ImportError> {
        let build_definition = self.build_definition(remote)?;
        let project = self.mapper.map_project(remote, build_definition);
        let stored = self
            .backend
            .create_project(&project)
            .map_err(ImportError::Backend)?;
        debug!(
            project_id = stored.project_id,
            remote_project_id = remote.id,
            name = %stored.name,
            "stored project"
        );
        Ok(stored)
    }

    fn build_definition(&self, remote: &RemoteProject) -> Result<String, ImportError> {
        let branch = remote
            .default_branch
            .as_deref()
            .filter(|branch| !branch.is_empty())
            .unwrap_or(DEFAULT_REF);
        self.gitlab
            .get_build_definition_if_exists(remote.id, branch)
            .map_err(ImportError::GitLab)
    }

    /// Creates every branch of `remote` under `stored`. Listing failures are
    /// returned; per-branch failures land in `report`.
    fn import_branches(
        &self,
        stored: &Project,
        remote: &RemoteProject,
        report: &mut ImportReport,
    ) -> Result<(), ImportError> {
        walk_pages(
            |page| {
                self.gitlab
                    .get_branches(remote.id, page)
                    .map_err(ImportError::GitLab)
            },
            |branches| {
                for branch in &branches {
                    let mapped = self.mapper.map_branch(branch);
                    match self.backend.create_project_branch(stored.project_id, &mapped) {
                        Ok(_) => report.branches += 1,
                        Err(err) if err.is_unauthorized() => {
                            return Err(ImportError::Backend(err));
                        }
                        Err(err) => {
                            warn!(
                                error = %err,
                                project_id = stored.project_id,
                                branch = %branch.name,
                                "unable to put branch"
                            );
                            report.record_failure(Record::branch(remote, branch), err);
                        }
                    }
                }
                Ok(())
            },
        )
    }
}

fn finish(report: ImportReport) -> Result<ImportReport, ImportError> {
    if report.is_clean() {
        info!(
            projects = report.projects,
            branches = report.branches,
            "import finished"
        );
    } else {
        warn!(
            projects = report.projects,
            branches = report.branches,
            failures = report.failures.len(),
            "import finished with failures"
        );
    }
    report.into_result()
}
