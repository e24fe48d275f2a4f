//! Operation façade over the Linear GraphQL API
//!
//! Each method maps one logical operation onto GraphQL requests and
//! normalizes the response. Round trips per call:
//! - one for every method, including batch create/update/delete
//! - two for `create_project_with_issues`
//! - zero for batches with nothing in them
//!
//! Nothing is retried. Callers repeating a batch create will create duplicates.

use super::filter::FilterExpression;
use super::queries;
use super::transport::{GraphqlRequest, GraphqlTransport, HttpTransport};
use super::types::{
    BatchResult, Issue, IssueInput, IssueOrder, IssuePatch, PageResult, PartialCompletionWarning,
    Project, ProjectInput, ProjectWithIssues, SearchCriteria, Team, User,
};
use crate::auth::ApiCredential;
use crate::config::Config;
use crate::error::{LinearError, LinearResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Page size used when neither the caller nor the config gives one
pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Deserialize)]
struct IssuePayload {
    success: bool,
    issue: Option<Issue>,
}

#[derive(Deserialize)]
struct IssueBatchPayload {
    success: bool,
    #[serde(default)]
    issues: Vec<Issue>,
}

#[derive(Deserialize)]
struct ProjectPayload {
    success: bool,
    project: Option<Project>,
}

#[derive(Deserialize)]
struct DeletePayload {
    success: bool,
}

#[derive(Deserialize)]
struct Connection<T> {
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueConnection {
    nodes: Vec<Issue>,
    page_info: PageInfo,
}

/// Translates logical tracker operations into GraphQL requests
pub struct LinearFacade {
    transport: Arc<dyn GraphqlTransport>,
    default_page_size: u32,
}

impl LinearFacade {
    pub fn new(transport: Arc<dyn GraphqlTransport>) -> Self {
        Self {
            transport,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(HttpTransport::new(config.api.graphql_url.clone())))
            .with_default_page_size(config.api.default_page_size)
    }

    pub fn with_default_page_size(mut self, page_size: u32) -> Self {
        if page_size > 0 {
            self.default_page_size = page_size;
        }
        self
    }

    async fn send(
        &self,
        credential: &ApiCredential,
        operation: &str,
        query: impl Into<String>,
        variables: Value,
    ) -> LinearResult<Value> {
        self.transport
            .execute(credential, GraphqlRequest::new(operation, query, variables))
            .await
    }

    pub async fn create_issue(
        &self,
        credential: &ApiCredential,
        input: &IssueInput,
    ) -> LinearResult<Issue> {
        let data = self
            .send(
                credential,
                "IssueCreate",
                queries::create_issue(),
                json!({ "input": input }),
            )
            .await?;
        let payload: IssuePayload = take(data, "issueCreate")?;

        match payload {
            IssuePayload {
                success: true,
                issue: Some(issue),
            } => {
                tracing::info!(identifier = %issue.identifier, "Created issue");
                Ok(issue)
            }
            _ => Err(LinearError::RemoteOperation(
                "issueCreate reported failure".to_string(),
            )),
        }
    }

    /// Create several issues in one request
    ///
    /// Not atomic on the service side: if it reports `success: false` the
    /// whole call fails even though some issues may exist.
    pub async fn create_issues(
        &self,
        credential: &ApiCredential,
        inputs: &[IssueInput],
    ) -> LinearResult<BatchResult<Issue>> {
        if inputs.is_empty() {
            return Ok(BatchResult::empty());
        }

        let data = self
            .send(
                credential,
                "IssueBatchCreate",
                queries::create_issues(),
                json!({ "input": { "issues": inputs } }),
            )
            .await?;
        let payload: IssueBatchPayload = take(data, "issueBatchCreate")?;

        let batch = BatchResult {
            success: payload.success,
            items: payload.issues,
        }
        .ensure_success("issueBatchCreate", inputs.len())?;
        tracing::info!(count = batch.len(), "Created issues");
        Ok(batch)
    }

    /// Apply the same patch to every issue in `ids`
    pub async fn update_issues(
        &self,
        credential: &ApiCredential,
        ids: &[String],
        patch: &IssuePatch,
    ) -> LinearResult<BatchResult<Issue>> {
        if ids.is_empty() {
            return Ok(BatchResult::empty());
        }

        let data = self
            .send(
                credential,
                "IssueBatchUpdate",
                queries::update_issues(),
                json!({ "ids": ids, "input": patch }),
            )
            .await?;
        let payload: IssueBatchPayload = take(data, "issueBatchUpdate")?;

        let batch = BatchResult {
            success: payload.success,
            items: payload.issues,
        }
        .ensure_success("issueBatchUpdate", ids.len())?;
        tracing::info!(count = batch.len(), "Updated issues");
        Ok(batch)
    }

    pub async fn delete_issue(&self, credential: &ApiCredential, id: &str) -> LinearResult<()> {
        let data = self
            .send(
                credential,
                "IssueDelete",
                queries::DELETE_ISSUE,
                json!({ "id": id }),
            )
            .await?;
        let payload: DeletePayload = take(data, "issueDelete")?;

        if !payload.success {
            return Err(LinearError::RemoteOperation(format!(
                "issueDelete reported failure for {}",
                id
            )));
        }
        tracing::info!(id, "Deleted issue");
        Ok(())
    }

    /// Delete every issue in `ids` in one request, failing closed
    ///
    /// Any id the service does not delete fails the whole call. The returned
    /// items are the deleted ids.
    pub async fn delete_issues(
        &self,
        credential: &ApiCredential,
        ids: &[String],
    ) -> LinearResult<BatchResult<String>> {
        if ids.is_empty() {
            return Ok(BatchResult::empty());
        }

        let variables: Map<String, Value> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (format!("id{}", i), Value::from(id.as_str())))
            .collect();
        let data = self
            .send(
                credential,
                "IssueBatchDelete",
                queries::delete_issues(ids.len()),
                Value::Object(variables),
            )
            .await?;

        let failed: Vec<&str> = ids
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                !data
                    .get(format!("d{}", i))
                    .and_then(|payload| payload.get("success"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
            })
            .map(|(_, id)| id.as_str())
            .collect();

        if !failed.is_empty() {
            return Err(LinearError::RemoteOperation(format!(
                "Failed to delete {} of {} issue(s): {}",
                failed.len(),
                ids.len(),
                failed.join(", ")
            )));
        }

        tracing::info!(count = ids.len(), "Deleted issues");
        Ok(BatchResult {
            success: true,
            items: ids.to_vec(),
        })
    }

    pub async fn create_project(
        &self,
        credential: &ApiCredential,
        input: &ProjectInput,
    ) -> LinearResult<Project> {
        let data = self
            .send(
                credential,
                "ProjectCreate",
                queries::create_project(),
                json!({ "input": input }),
            )
            .await?;
        let payload: ProjectPayload = take(data, "projectCreate")?;

        match payload {
            ProjectPayload {
                success: true,
                project: Some(project),
            } => {
                tracing::info!(project = %project.name, "Created project");
                Ok(project)
            }
            _ => Err(LinearError::RemoteOperation(
                "projectCreate reported failure".to_string(),
            )),
        }
    }

    /// Create a project, then its issues scoped to it
    ///
    /// A failed project creation stops before any issue is sent. If the
    /// issues fail afterwards the project is still reported as created,
    /// with a warning attached; nothing is rolled back.
    pub async fn create_project_with_issues(
        &self,
        credential: &ApiCredential,
        project: &ProjectInput,
        issues: &[IssueInput],
    ) -> LinearResult<ProjectWithIssues> {
        let project = self.create_project(credential, project).await?;

        let scoped: Vec<IssueInput> = issues
            .iter()
            .cloned()
            .map(|mut issue| {
                issue.project_id = Some(project.id.clone());
                issue
            })
            .collect();

        match self.create_issues(credential, &scoped).await {
            Ok(batch) => Ok(ProjectWithIssues {
                project,
                issues: batch.items,
                warning: None,
            }),
            Err(e) => {
                tracing::warn!(
                    project = %project.name,
                    "Project created but its issues were not: {}",
                    e
                );
                Ok(ProjectWithIssues {
                    project,
                    issues: Vec::new(),
                    warning: Some(PartialCompletionWarning {
                        message: e.to_string(),
                        requested_issues: scoped.len(),
                    }),
                })
            }
        }
    }

    /// Fetch one page of issues matching `criteria`
    pub async fn search_issues(
        &self,
        credential: &ApiCredential,
        criteria: &SearchCriteria,
        page_size: Option<u32>,
        cursor: Option<&str>,
        order: IssueOrder,
    ) -> LinearResult<PageResult<Issue>> {
        let filter = FilterExpression::from(criteria);
        let first = page_size.unwrap_or(self.default_page_size);

        let mut variables = json!({ "first": first, "orderBy": order });
        if let Some(filter) = filter.to_variable() {
            variables["filter"] = filter;
        }
        if let Some(cursor) = cursor {
            variables["after"] = Value::from(cursor);
        }

        let data = self
            .send(
                credential,
                "SearchIssues",
                queries::search_issues(),
                variables,
            )
            .await?;
        let connection: IssueConnection = take(data, "issues")?;

        tracing::debug!(count = connection.nodes.len(), "Fetched issue page");
        Ok(PageResult {
            items: connection.nodes,
            cursor: connection.page_info.end_cursor,
            has_more: connection.page_info.has_next_page,
        })
    }

    pub async fn get_teams(&self, credential: &ApiCredential) -> LinearResult<Vec<Team>> {
        let data = self
            .send(credential, "Teams", queries::TEAMS, json!({}))
            .await?;
        let teams: Connection<Team> = take(data, "teams")?;
        Ok(teams.nodes)
    }

    pub async fn get_current_user(&self, credential: &ApiCredential) -> LinearResult<User> {
        let data = self
            .send(credential, "Viewer", queries::VIEWER, json!({}))
            .await?;
        take(data, "viewer")
    }

    pub async fn get_project(&self, credential: &ApiCredential, id: &str) -> LinearResult<Project> {
        let data = self
            .send(credential, "Project", queries::project(), json!({ "id": id }))
            .await?;
        let project: Option<Project> = take(data, "project")?;
        project.ok_or_else(|| LinearError::RemoteOperation(format!("Project not found: {}", id)))
    }

    /// Projects whose name equals `name` exactly
    pub async fn search_projects(
        &self,
        credential: &ApiCredential,
        name: &str,
    ) -> LinearResult<Vec<Project>> {
        let filter = FilterExpression::new().equals("name", name);
        let data = self
            .send(
                credential,
                "SearchProjects",
                queries::search_projects(),
                json!({ "filter": filter }),
            )
            .await?;
        let projects: Connection<Project> = take(data, "projects")?;
        Ok(projects.nodes)
    }
}

/// Deserialize the `key` field of a `data` object
fn take<T: DeserializeOwned>(mut data: Value, key: &str) -> LinearResult<T> {
    let value = data
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| LinearError::RemoteOperation(format!("Response is missing `{}`", key)))?;
    serde_json::from_value(value).map_err(|e| {
        LinearError::RemoteOperation(format!("Unexpected `{}` response shape: {}", key, e))
    })
}
