//! Tool catalogue and dispatch
//!
//! Tools are named operations with a JSON argument object. The dispatcher
//! checks required keys, makes sure the session is usable, then runs exactly
//! one façade operation.

mod dispatch;

pub use dispatch::Dispatcher;

use crate::error::LinearError;
use once_cell::sync::Lazy;
use serde::Serialize;
use thiserror::Error;

/// Declaration of one callable tool
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    /// Argument keys that must be present and non-null
    pub required: &'static [&'static str],
    /// Whether the tool needs an authenticated session
    pub requires_auth: bool,
}

const fn tool(
    name: &'static str,
    description: &'static str,
    required: &'static [&'static str],
    requires_auth: bool,
) -> ToolDefinition {
    ToolDefinition {
        name,
        description,
        required,
        requires_auth,
    }
}

pub const AUTH: &str = "linear_auth";
pub const AUTH_CALLBACK: &str = "linear_auth_callback";
pub const CREATE_ISSUE: &str = "linear_create_issue";
pub const CREATE_ISSUES: &str = "linear_create_issues";
pub const CREATE_PROJECT_WITH_ISSUES: &str = "linear_create_project_with_issues";
pub const BULK_UPDATE_ISSUES: &str = "linear_bulk_update_issues";
pub const SEARCH_ISSUES: &str = "linear_search_issues";
pub const GET_TEAMS: &str = "linear_get_teams";
pub const GET_USER: &str = "linear_get_user";
pub const DELETE_ISSUE: &str = "linear_delete_issue";
pub const DELETE_ISSUES: &str = "linear_delete_issues";
pub const GET_PROJECT: &str = "linear_get_project";
pub const SEARCH_PROJECTS: &str = "linear_search_projects";

static CATALOGUE: Lazy<Vec<ToolDefinition>> = Lazy::new(|| {
    vec![
        tool(
            AUTH,
            "Start the OAuth flow and return the authorization URL",
            &["clientId", "clientSecret", "redirectUri"],
            false,
        ),
        tool(
            AUTH_CALLBACK,
            "Complete the OAuth flow with the authorization code",
            &["code"],
            false,
        ),
        tool(
            CREATE_ISSUE,
            "Create a single issue",
            &["title", "teamId"],
            true,
        ),
        tool(
            CREATE_ISSUES,
            "Create several issues in one request",
            &["issues"],
            true,
        ),
        tool(
            CREATE_PROJECT_WITH_ISSUES,
            "Create a project, then create issues inside it",
            &["project", "issues"],
            true,
        ),
        tool(
            BULK_UPDATE_ISSUES,
            "Apply the same state, assignee or priority change to several issues",
            &["issueIds", "update"],
            true,
        ),
        tool(
            SEARCH_ISSUES,
            "Search issues by text, team, assignee, state or priority (one page per call)",
            &[],
            true,
        ),
        tool(GET_TEAMS, "List teams", &[], true),
        tool(GET_USER, "Get the authenticated user", &[], true),
        tool(DELETE_ISSUE, "Delete one issue", &["id"], true),
        tool(
            DELETE_ISSUES,
            "Delete several issues; fails if any of them cannot be deleted",
            &["ids"],
            true,
        ),
        tool(GET_PROJECT, "Get a project by id", &["id"], true),
        tool(
            SEARCH_PROJECTS,
            "Find projects whose name matches exactly",
            &["name"],
            true,
        ),
    ]
});

/// All tools in declaration order
pub fn catalogue() -> &'static [ToolDefinition] {
    &CATALOGUE
}

pub fn find_tool(name: &str) -> Option<&'static ToolDefinition> {
    CATALOGUE.iter().find(|tool| tool.name == name)
}

/// Errors produced while dispatching a tool call
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Failed to encode result of {tool}: {message}")]
    Encode { tool: String, message: String },

    #[error(transparent)]
    Linear(#[from] LinearError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalogue_names_unique() {
        let names: HashSet<_> = catalogue().iter().map(|t| t.name).collect();
        assert_eq!(names.len(), catalogue().len());
    }

    #[test]
    fn test_find_tool() {
        let tool = find_tool(CREATE_ISSUE).unwrap();
        assert_eq!(tool.required, &["title", "teamId"]);
        assert!(tool.requires_auth);

        assert!(!find_tool(AUTH).unwrap().requires_auth);
        assert!(find_tool("linear_unknown").is_none());
    }

    #[test]
    fn test_definition_serialization() {
        let value = serde_json::to_value(find_tool(GET_TEAMS).unwrap()).unwrap();
        assert_eq!(value["name"], "linear_get_teams");
        assert_eq!(value["requiresAuth"], true);
    }
}
