use serde::Deserialize;

use crate::gitlab::GitLabClient;
use crate::gitlab::types::{ FileWrite, FileWriteOutcome };
use super::{ describe_failure, CREATE_README, UPDATE_README };

const README_PATH: &str = "README.md";

fn default_branch() -> String {
    "main".to_string()
}

fn default_create_message() -> String {
    "Create README.md".to_string()
}

fn default_update_message() -> String {
    "Update README.md".to_string()
}

fn default_delete_message() -> String {
    "Delete README.md".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetReadmeInput {
    pub project_id: u64,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReadmeInput {
    pub project_id: u64,
    pub content: String,
    #[serde(default = "default_create_message")]
    pub commit_message: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReadmeInput {
    pub project_id: u64,
    pub content: String,
    #[serde(default = "default_update_message")]
    pub commit_message: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReadmeInput {
    pub project_id: u64,
    #[serde(default = "default_delete_message")]
    pub commit_message: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

pub(super) async fn get_readme(client: &GitLabClient, input: &GetReadmeInput) -> String {
    match client.get_file(input.project_id, README_PATH, &input.branch).await {
        Ok(Some(content)) => content,
        Ok(None) => "README.md does not exist in this project.".to_string(),
        Err(e) => describe_failure("retrieving README.md", &e),
    }
}

pub(super) async fn create_readme(client: &GitLabClient, input: &CreateReadmeInput) -> String {
    let write = FileWrite {
        branch: &input.branch,
        content: Some(&input.content),
        commit_message: &input.commit_message,
    };
    match client.create_file(input.project_id, README_PATH, &write).await {
        Ok(FileWriteOutcome::AlreadyExists) => {
            format!("README.md already exists. Use {} instead.", UPDATE_README)
        }
        Ok(_) => format!("README.md created successfully in project {}.", input.project_id),
        Err(e) => describe_failure("creating README.md", &e),
    }
}

pub(super) async fn update_readme(client: &GitLabClient, input: &UpdateReadmeInput) -> String {
    let write = FileWrite {
        branch: &input.branch,
        content: Some(&input.content),
        commit_message: &input.commit_message,
    };
    match client.update_file(input.project_id, README_PATH, &write).await {
        Ok(FileWriteOutcome::Missing) => {
            format!("README.md does not exist. Use {} instead.", CREATE_README)
        }
        Ok(_) => format!("README.md updated successfully in project {}.", input.project_id),
        Err(e) => describe_failure("updating README.md", &e),
    }
}

pub(super) async fn delete_readme(client: &GitLabClient, input: &DeleteReadmeInput) -> String {
    let write = FileWrite {
        branch: &input.branch,
        content: None,
        commit_message: &input.commit_message,
    };
    match client.delete_file(input.project_id, README_PATH, &write).await {
        Ok(FileWriteOutcome::Missing) => "README.md does not exist.".to_string(),
        Ok(_) => format!("README.md deleted successfully from project {}.", input.project_id),
        Err(e) => describe_failure("deleting README.md", &e),
    }
}
