use serde::{ Deserialize, Serialize };

use crate::gitlab::GitLabClient;
use crate::gitlab::types::{ Group, Project };
use super::{ describe_failure, non_empty };

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Internal,
    Public,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectInput {
    pub name: String,
    pub namespace_id: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectInput {
    pub project_id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteProjectInput {
    pub project_id: u64,
}

#[derive(Serialize)]
struct NewProject<'a> {
    name: &'a str,
    namespace_id: u64,
    visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Serialize, Default)]
struct ProjectChanges<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility: Option<Visibility>,
}

impl ProjectChanges<'_> {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.visibility.is_none()
    }
}

fn or_default<'a>(value: &'a Option<String>, fallback: &'a str) -> &'a str {
    non_empty(value).unwrap_or(fallback)
}

pub(crate) fn format_projects(projects: &[Project]) -> String {
    if projects.is_empty() {
        return "No projects found.".to_string();
    }
    let mut lines = vec![format!("Total projects retrieved: {}", projects.len())];
    for project in projects {
        let topics = match project.tag_list.as_deref() {
            Some(tags) if !tags.is_empty() => tags.join(", "),
            _ => "No topics".to_string(),
        };
        let namespace = project.namespace
            .as_ref()
            .and_then(|ns| non_empty(&ns.name))
            .unwrap_or("Unknown namespace");
        let creator = project.creator_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        lines.push(
            format!(
                "{}:{} ({}) by creator {}, description: {}, topics: {}",
                project.id,
                project.name,
                namespace,
                creator,
                or_default(&project.description, "No description"),
                topics
            )
        );
    }
    lines.join("\n")
}

pub(crate) fn format_groups(groups: &[Group]) -> String {
    if groups.is_empty() {
        return "No groups found.".to_string();
    }
    let mut lines = vec![format!("Total groups retrieved: {}", groups.len())];
    for group in groups {
        let members = group.member_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        lines.push(
            format!(
                "group_id: {}, group name: {} (path: {}), description: {}, visibility: {}, members: {}",
                group.id,
                group.name,
                or_default(&group.path, "Unknown"),
                or_default(&group.description, "No description"),
                or_default(&group.visibility, "Unknown"),
                members
            )
        );
    }
    lines.join("\n")
}

pub(super) async fn list_all_projects(client: &GitLabClient) -> String {
    match client.list_projects().await {
        Ok(projects) => format_projects(&projects),
        Err(e) => describe_failure("listing projects", &e),
    }
}

pub(super) async fn list_all_groups(client: &GitLabClient) -> String {
    match client.list_groups().await {
        Ok(groups) => format_groups(&groups),
        Err(e) => describe_failure("listing groups", &e),
    }
}

pub(super) async fn create_project(client: &GitLabClient, input: &CreateProjectInput) -> String {
    let body = NewProject {
        name: &input.name,
        namespace_id: input.namespace_id,
        visibility: input.visibility,
        description: non_empty(&input.description),
    };
    match client.create_project(&body).await {
        Ok(project) => project.to_string(),
        Err(e) => describe_failure("creating project", &e),
    }
}

pub(super) async fn update_project(client: &GitLabClient, input: &UpdateProjectInput) -> String {
    let changes = ProjectChanges {
        name: non_empty(&input.name),
        description: non_empty(&input.description),
        visibility: input.visibility,
    };
    if changes.is_empty() {
        return "No updates provided.".to_string();
    }
    match client.update_project(input.project_id, &changes).await {
        Ok(project) => project.to_string(),
        Err(e) => describe_failure("updating project", &e),
    }
}

pub(super) async fn delete_project(client: &GitLabClient, input: &DeleteProjectInput) -> String {
    match client.delete_project(input.project_id).await {
        Ok(()) => format!("Project {} deleted successfully.", input.project_id),
        Err(e) => describe_failure("deleting project", &e),
    }
}
