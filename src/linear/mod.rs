//! Linear GraphQL operations
//!
//! `LinearFacade` is the only entry point; it takes an `ApiCredential` per
//! call and never touches session state.

mod facade;
pub mod filter;
mod queries;
mod transport;
pub mod types;

pub use facade::{LinearFacade, DEFAULT_PAGE_SIZE};
pub use filter::{Comparator, FilterExpression, FilterNode};
pub use transport::{GraphqlRequest, GraphqlTransport, HttpTransport};
pub use types::{
    BatchResult, Issue, IssueInput, IssueOrder, IssuePatch, PageResult, PartialCompletionWarning,
    Project, ProjectInput, ProjectWithIssues, Reference, SearchCriteria, Team, User,
    WorkflowState,
};

#[cfg(test)]
pub(crate) use transport::testing;
