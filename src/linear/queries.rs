//! GraphQL documents sent to Linear

pub const ISSUE_FIELDS: &str = r#"
    id
    identifier
    title
    description
    url
    priority
    state { id name }
    assignee { id name }
    team { id name key }
    project { id name }
"#;

pub const PROJECT_FIELDS: &str = r#"
    id
    name
    description
    url
    state
"#;

pub fn create_issue() -> String {
    format!(
        "mutation IssueCreate($input: IssueCreateInput!) {{
  issueCreate(input: $input) {{ success issue {{ {ISSUE_FIELDS} }} }}
}}"
    )
}

pub fn create_issues() -> String {
    format!(
        "mutation IssueBatchCreate($input: IssueBatchCreateInput!) {{
  issueBatchCreate(input: $input) {{ success issues {{ {ISSUE_FIELDS} }} }}
}}"
    )
}

pub fn update_issues() -> String {
    format!(
        "mutation IssueBatchUpdate($ids: [UUID!]!, $input: IssueUpdateInput!) {{
  issueBatchUpdate(ids: $ids, input: $input) {{ success issues {{ {ISSUE_FIELDS} }} }}
}}"
    )
}

pub const DELETE_ISSUE: &str = "mutation IssueDelete($id: String!) {
  issueDelete(id: $id) { success }
}";

/// One document deleting `count` issues through aliased `issueDelete` fields
/// `d0..dN`, with variables `id0..idN`
pub fn delete_issues(count: usize) -> String {
    let params: Vec<String> = (0..count).map(|i| format!("$id{i}: String!")).collect();
    let fields: Vec<String> = (0..count)
        .map(|i| format!("  d{i}: issueDelete(id: $id{i}) {{ success }}"))
        .collect();
    format!(
        "mutation IssueBatchDelete({}) {{\n{}\n}}",
        params.join(", "),
        fields.join("\n")
    )
}

pub fn create_project() -> String {
    format!(
        "mutation ProjectCreate($input: ProjectCreateInput!) {{
  projectCreate(input: $input) {{ success project {{ {PROJECT_FIELDS} }} }}
}}"
    )
}

pub fn search_issues() -> String {
    format!(
        "query SearchIssues($filter: IssueFilter, $first: Int, $after: String, $orderBy: PaginationOrderBy) {{
  issues(filter: $filter, first: $first, after: $after, orderBy: $orderBy) {{
    nodes {{ {ISSUE_FIELDS} }}
    pageInfo {{ hasNextPage endCursor }}
  }}
}}"
    )
}

pub const TEAMS: &str = "query Teams {
  teams { nodes { id name key } }
}";

pub const VIEWER: &str = "query Viewer {
  viewer { id name email displayName }
}";

pub fn project() -> String {
    format!(
        "query Project($id: String!) {{
  project(id: $id) {{ {PROJECT_FIELDS} }}
}}"
    )
}

pub fn search_projects() -> String {
    format!(
        "query SearchProjects($filter: ProjectFilter) {{
  projects(filter: $filter) {{ nodes {{ {PROJECT_FIELDS} }} }}
}}"
    )
}
