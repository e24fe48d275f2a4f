//! Filter expressions for Linear queries
//!
//! An expression maps field names to a comparison (`{"eq": ..}`,
//! `{"in": [..]}`, `{"containsIgnoreCase": ..}`) or to a nested expression
//! for relation fields such as `team.id`. An empty expression matches
//! everything and is sent as no filter at all.

use super::types::SearchCriteria;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Comparator {
    #[serde(rename = "eq")]
    Eq(Value),
    #[serde(rename = "in")]
    In(Vec<Value>),
    #[serde(rename = "containsIgnoreCase")]
    ContainsIgnoreCase(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterNode {
    Compare(Comparator),
    Nested(FilterExpression),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterExpression(BTreeMap<String, FilterNode>);

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&FilterNode> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: &str, node: FilterNode) {
        self.0.insert(field.to_string(), node);
    }

    /// Exact match on `field`
    pub fn equals(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.insert(field, FilterNode::Compare(Comparator::Eq(value.into())));
        self
    }

    /// Match any of `values`; a single value becomes `eq`, none adds nothing
    pub fn any_of(mut self, field: &str, values: &[String]) -> Self {
        if let Some(node) = any_of_node(values) {
            self.insert(field, node);
        }
        self
    }

    /// Match any of `values` on `relation.field`
    pub fn relation_any_of(mut self, relation: &str, field: &str, values: &[String]) -> Self {
        if let Some(node) = any_of_node(values) {
            let mut nested = FilterExpression::new();
            nested.insert(field, node);
            self.insert(relation, FilterNode::Nested(nested));
        }
        self
    }

    /// Case-insensitive substring match; blank text adds nothing
    pub fn contains(mut self, field: &str, text: &str) -> Self {
        let text = text.trim();
        if !text.is_empty() {
            self.insert(
                field,
                FilterNode::Compare(Comparator::ContainsIgnoreCase(text.to_string())),
            );
        }
        self
    }

    /// JSON value for the `filter` variable, `None` when the expression is empty
    pub fn to_variable(&self) -> Option<Value> {
        if self.is_empty() {
            None
        } else {
            serde_json::to_value(self).ok()
        }
    }
}

fn any_of_node(values: &[String]) -> Option<FilterNode> {
    match values {
        [] => None,
        [single] => Some(FilterNode::Compare(Comparator::Eq(Value::from(
            single.as_str(),
        )))),
        many => Some(FilterNode::Compare(Comparator::In(
            many.iter().map(|v| Value::from(v.as_str())).collect(),
        ))),
    }
}

impl From<&SearchCriteria> for FilterExpression {
    fn from(criteria: &SearchCriteria) -> Self {
        let mut filter = FilterExpression::new()
            .relation_any_of("team", "id", &criteria.team_ids)
            .relation_any_of("assignee", "id", &criteria.assignee_ids)
            .relation_any_of("state", "name", &criteria.states);

        if let Some(query) = &criteria.query {
            filter = filter.contains("title", query);
        }
        if let Some(priority) = criteria.priority {
            filter = filter.equals("priority", priority);
        }
        filter
    }
}
