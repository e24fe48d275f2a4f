//! Routes tool calls to the auth session and the operation façade

use super::{find_tool, DispatchError, ToolDefinition};
use crate::auth::{ApiCredential, AuthParams, AuthSession, OAuthClientParams};
use crate::config::Config;
use crate::error::{LinearError, LinearResult};
use crate::linear::{
    IssueInput, IssueOrder, IssuePatch, LinearFacade, ProjectInput, SearchCriteria,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallbackArgs {
    code: String,
}

#[derive(Deserialize)]
struct CreateIssuesArgs {
    issues: Vec<IssueInput>,
}

#[derive(Deserialize)]
struct ProjectWithIssuesArgs {
    project: ProjectInput,
    issues: Vec<IssueInput>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkUpdateArgs {
    issue_ids: Vec<String>,
    update: IssuePatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchIssuesArgs {
    #[serde(flatten)]
    criteria: SearchCriteria,
    #[serde(default)]
    first: Option<u32>,
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    order_by: Option<String>,
}

#[derive(Deserialize)]
struct IdArgs {
    id: String,
}

#[derive(Deserialize)]
struct IdsArgs {
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct NameArgs {
    name: String,
}

/// Owns the session and the façade for one process
pub struct Dispatcher {
    session: AuthSession,
    facade: LinearFacade,
}

impl Dispatcher {
    pub fn new(session: AuthSession, facade: LinearFacade) -> Self {
        Self { session, facade }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            AuthSession::from_config(config)?,
            LinearFacade::from_config(config),
        ))
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut AuthSession {
        &mut self.session
    }

    /// Run one tool call and return its result as JSON
    pub async fn call(&mut self, name: &str, args: Value) -> Result<Value, DispatchError> {
        let tool = find_tool(name).ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;
        let args = check_required(tool, args)?;
        tracing::debug!(tool = tool.name, "Dispatching tool call");

        if !tool.requires_auth {
            return self.call_auth_tool(tool, args).await;
        }

        let credential = self.authorized().await?;
        let facade = &self.facade;

        let result = match tool.name {
            super::CREATE_ISSUE => {
                let input: IssueInput = parse(tool, args)?;
                to_json(tool, facade.create_issue(&credential, &input).await?)?
            }
            super::CREATE_ISSUES => {
                let args: CreateIssuesArgs = parse(tool, args)?;
                to_json(tool, facade.create_issues(&credential, &args.issues).await?)?
            }
            super::CREATE_PROJECT_WITH_ISSUES => {
                let args: ProjectWithIssuesArgs = parse(tool, args)?;
                to_json(
                    tool,
                    facade
                        .create_project_with_issues(&credential, &args.project, &args.issues)
                        .await?,
                )?
            }
            super::BULK_UPDATE_ISSUES => {
                let args: BulkUpdateArgs = parse(tool, args)?;
                to_json(
                    tool,
                    facade
                        .update_issues(&credential, &args.issue_ids, &args.update)
                        .await?,
                )?
            }
            super::SEARCH_ISSUES => {
                let args: SearchIssuesArgs = parse(tool, args)?;
                let order = match args.order_by.as_deref() {
                    Some(field) => field.parse::<IssueOrder>()?,
                    None => IssueOrder::default(),
                };
                to_json(
                    tool,
                    facade
                        .search_issues(
                            &credential,
                            &args.criteria,
                            args.first,
                            args.after.as_deref(),
                            order,
                        )
                        .await?,
                )?
            }
            super::GET_TEAMS => to_json(tool, facade.get_teams(&credential).await?)?,
            super::GET_USER => to_json(tool, facade.get_current_user(&credential).await?)?,
            super::DELETE_ISSUE => {
                let args: IdArgs = parse(tool, args)?;
                facade.delete_issue(&credential, &args.id).await?;
                json!({ "success": true, "id": args.id })
            }
            super::DELETE_ISSUES => {
                let args: IdsArgs = parse(tool, args)?;
                to_json(tool, facade.delete_issues(&credential, &args.ids).await?)?
            }
            super::GET_PROJECT => {
                let args: IdArgs = parse(tool, args)?;
                to_json(tool, facade.get_project(&credential, &args.id).await?)?
            }
            super::SEARCH_PROJECTS => {
                let args: NameArgs = parse(tool, args)?;
                to_json(tool, facade.search_projects(&credential, &args.name).await?)?
            }
            other => return Err(DispatchError::UnknownTool(other.to_string())),
        };
        Ok(result)
    }

    async fn call_auth_tool(
        &mut self,
        tool: &ToolDefinition,
        args: Value,
    ) -> Result<Value, DispatchError> {
        match tool.name {
            super::AUTH => {
                let client: OAuthClientParams = parse(tool, args)?;
                self.session.initialize(AuthParams::OAuth(client))?;
                let url = self.session.authorization_url()?;
                Ok(json!({ "authorizationUrl": url }))
            }
            super::AUTH_CALLBACK => {
                let args: CallbackArgs = parse(tool, args)?;
                self.session.handle_callback(&args.code).await?;
                Ok(json!({ "authenticated": true }))
            }
            other => Err(DispatchError::UnknownTool(other.to_string())),
        }
    }

    /// Credential for the next request, refreshing an expiring OAuth token first
    async fn authorized(&mut self) -> LinearResult<ApiCredential> {
        if !self.session.is_authenticated() {
            return Err(LinearError::State(
                "Not authenticated; set LINEAR_ACCESS_TOKEN or complete the OAuth flow with linear_auth"
                    .to_string(),
            ));
        }
        if self.session.needs_token_refresh() {
            tracing::debug!("Access token is about to expire, refreshing");
            self.session.refresh_access_token().await?;
        }
        self.session.client()
    }
}

/// Shallow check that every required key is present and non-null
fn check_required(tool: &ToolDefinition, args: Value) -> Result<Value, DispatchError> {
    let args = match args {
        Value::Null => json!({}),
        Value::Object(_) => args,
        _ => {
            return Err(DispatchError::InvalidArguments {
                tool: tool.name.to_string(),
                message: "arguments must be a JSON object".to_string(),
            })
        }
    };

    let missing: Vec<&str> = tool
        .required
        .iter()
        .copied()
        .filter(|key| args.get(key).map_or(true, Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(DispatchError::InvalidArguments {
            tool: tool.name.to_string(),
            message: format!("missing required argument(s): {}", missing.join(", ")),
        });
    }
    Ok(args)
}

fn parse<T: DeserializeOwned>(tool: &ToolDefinition, args: Value) -> Result<T, DispatchError> {
    serde_json::from_value(args).map_err(|e| DispatchError::InvalidArguments {
        tool: tool.name.to_string(),
        message: e.to_string(),
    })
}

fn to_json<T: serde::Serialize>(
    tool: &ToolDefinition,
    value: T,
) -> Result<Value, DispatchError> {
    serde_json::to_value(value).map_err(|e| DispatchError::Encode {
        tool: tool.name.to_string(),
        message: e.to_string(),
    })
}
