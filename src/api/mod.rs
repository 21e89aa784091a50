pub mod jira;
pub mod slack;
