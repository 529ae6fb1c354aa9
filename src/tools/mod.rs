//! Tools the model may call during a turn.
//!
//! Every tool is a variant of [`ToolCall`] carrying its own typed input, so
//! arguments are parsed and defaulted by serde before a handler ever runs.
//! The JSON schemas advertised to the model live in [`TOOL_DEFINITIONS`].

mod project;
mod readme;

use log::{ info, warn };
use once_cell::sync::Lazy;
use serde::{ Deserialize, Serialize };
use serde_json::{ json, Value as JsonValue };
use thiserror::Error;

use crate::gitlab::{ GitLabClient, GitLabError };
use crate::models::chat::ToolCallRecord;

pub use self::project::{ CreateProjectInput, DeleteProjectInput, UpdateProjectInput, Visibility };
pub use self::readme::{ CreateReadmeInput, DeleteReadmeInput, GetReadmeInput, UpdateReadmeInput };

pub const LIST_ALL_PROJECTS: &str = "listAllProjects";
pub const CREATE_PROJECT: &str = "createProject";
pub const UPDATE_PROJECT: &str = "updateProject";
pub const DELETE_PROJECT: &str = "deleteProject";
pub const GET_README_CONTENT: &str = "getReadmeContent";
pub const CREATE_README: &str = "createReadme";
pub const UPDATE_README: &str = "updateReadme";
pub const DELETE_README: &str = "deleteReadme";
pub const LIST_ALL_GROUPS: &str = "listAllGroups";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
    #[error("Invalid arguments for tool '{tool}': {source}")]
    InvalidArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

/// What the model is told about a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: JsonValue,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NoInput {}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ListAllProjects,
    CreateProject(CreateProjectInput),
    UpdateProject(UpdateProjectInput),
    DeleteProject(DeleteProjectInput),
    GetReadmeContent(GetReadmeInput),
    CreateReadme(CreateReadmeInput),
    UpdateReadme(UpdateReadmeInput),
    DeleteReadme(DeleteReadmeInput),
    ListAllGroups,
}

fn parse_input<T: serde::de::DeserializeOwned>(tool: &str, input: JsonValue) -> Result<T, ToolError> {
    let input = if input.is_null() { json!({}) } else { input };
    serde_json::from_value(input).map_err(|source| ToolError::InvalidArguments {
        tool: tool.to_string(),
        source,
    })
}

impl ToolCall {
    pub fn parse(name: &str, input: JsonValue) -> Result<Self, ToolError> {
        let call = match name {
            LIST_ALL_PROJECTS => {
                parse_input::<NoInput>(name, input)?;
                ToolCall::ListAllProjects
            }
            CREATE_PROJECT => ToolCall::CreateProject(parse_input(name, input)?),
            UPDATE_PROJECT => ToolCall::UpdateProject(parse_input(name, input)?),
            DELETE_PROJECT => ToolCall::DeleteProject(parse_input(name, input)?),
            GET_README_CONTENT => ToolCall::GetReadmeContent(parse_input(name, input)?),
            CREATE_README => ToolCall::CreateReadme(parse_input(name, input)?),
            UPDATE_README => ToolCall::UpdateReadme(parse_input(name, input)?),
            DELETE_README => ToolCall::DeleteReadme(parse_input(name, input)?),
            LIST_ALL_GROUPS => {
                parse_input::<NoInput>(name, input)?;
                ToolCall::ListAllGroups
            }
            other => {
                return Err(ToolError::UnknownTool(other.to_string()));
            }
        };
        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ListAllProjects => LIST_ALL_PROJECTS,
            ToolCall::CreateProject(_) => CREATE_PROJECT,
            ToolCall::UpdateProject(_) => UPDATE_PROJECT,
            ToolCall::DeleteProject(_) => DELETE_PROJECT,
            ToolCall::GetReadmeContent(_) => GET_README_CONTENT,
            ToolCall::CreateReadme(_) => CREATE_README,
            ToolCall::UpdateReadme(_) => UPDATE_README,
            ToolCall::DeleteReadme(_) => DELETE_README,
            ToolCall::ListAllGroups => LIST_ALL_GROUPS,
        }
    }

    pub async fn execute(&self, client: &GitLabClient) -> String {
        match self {
            ToolCall::ListAllProjects => project::list_all_projects(client).await,
            ToolCall::CreateProject(input) => project::create_project(client, input).await,
            ToolCall::UpdateProject(input) => project::update_project(client, input).await,
            ToolCall::DeleteProject(input) => project::delete_project(client, input).await,
            ToolCall::GetReadmeContent(input) => readme::get_readme(client, input).await,
            ToolCall::CreateReadme(input) => readme::create_readme(client, input).await,
            ToolCall::UpdateReadme(input) => readme::update_readme(client, input).await,
            ToolCall::DeleteReadme(input) => readme::delete_readme(client, input).await,
            ToolCall::ListAllGroups => project::list_all_groups(client).await,
        }
    }
}

/// Renders a failed GitLab call as text for the model.
pub(crate) fn describe_failure(action: &str, err: &GitLabError) -> String {
    if err.is_config() {
        format!("Configuration error: {}", err)
    } else {
        format!("Error {}: {}", action, err)
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn project_id_schema() -> JsonValue {
    json!({ "type": "integer", "description": "The ID of the project. Must be an integer." })
}

fn branch_schema(action: &str) -> JsonValue {
    json!({
        "type": "string",
        "default": "main",
        "description": format!("The branch to {} README.md {}.", action, if action == "fetch" { "from" } else { "on" })
    })
}

fn commit_message_schema(default: &str) -> JsonValue {
    json!({ "type": "string", "default": default, "description": "The commit message." })
}

pub static TOOL_DEFINITIONS: Lazy<Vec<ToolDefinition>> = Lazy::new(|| {
    let visibility = json!({
        "type": "string",
        "enum": ["private", "internal", "public"]
    });
    vec![
        ToolDefinition {
            name: LIST_ALL_PROJECTS,
            description: "List all projects accessible to the authenticated user in the GitLab instance.",
            parameters: json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: CREATE_PROJECT,
            description: "Create a new project in a GitLab group.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "The name of the new project." },
                    "namespaceId": {
                        "type": "integer",
                        "description": "The ID of the GitLab group to create the project under. Must be an integer."
                    },
                    "description": { "type": "string", "description": "Optional description for the project." },
                    "visibility": {
                        "type": "string",
                        "enum": ["private", "internal", "public"],
                        "default": "private",
                        "description": "Visibility level: private, internal, or public. Defaults to private."
                    }
                },
                "required": ["name", "namespaceId"]
            }),
        },
        ToolDefinition {
            name: UPDATE_PROJECT,
            description: "Update an existing project in a GitLab group.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "integer", "description": "The ID of the project to update. Must be an integer." },
                    "name": { "type": "string", "description": "Optional new name for the project." },
                    "description": { "type": "string", "description": "Optional new description for the project." },
                    "visibility": visibility
                },
                "required": ["projectId"]
            }),
        },
        ToolDefinition {
            name: DELETE_PROJECT,
            description: "Delete a project from a GitLab group.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "projectId": { "type": "integer", "description": "The ID of the project to delete. Must be an integer." }
                },
                "required": ["projectId"]
            }),
        },
        ToolDefinition {
            name: GET_README_CONTENT,
            description: "Retrieve the content of README.md from a GitLab project.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "projectId": project_id_schema(),
                    "branch": branch_schema("fetch")
                },
                "required": ["projectId"]
            }),
        },
        ToolDefinition {
            name: CREATE_README,
            description: "Create a new README.md file in a GitLab project with user input for content.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "projectId": project_id_schema(),
                    "content": { "type": "string", "description": "The Markdown content for the new README.md." },
                    "commitMessage": commit_message_schema("Create README.md"),
                    "branch": branch_schema("create")
                },
                "required": ["projectId", "content"]
            }),
        },
        ToolDefinition {
            name: UPDATE_README,
            description: "Update the content of README.md in a GitLab project.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "projectId": project_id_schema(),
                    "content": { "type": "string", "description": "The new Markdown content for README.md." },
                    "commitMessage": commit_message_schema("Update README.md"),
                    "branch": branch_schema("update")
                },
                "required": ["projectId", "content"]
            }),
        },
        ToolDefinition {
            name: DELETE_README,
            description: "Delete README.md from a GitLab project.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "projectId": project_id_schema(),
                    "commitMessage": commit_message_schema("Delete README.md"),
                    "branch": branch_schema("delete")
                },
                "required": ["projectId"]
            }),
        },
        ToolDefinition {
            name: LIST_ALL_GROUPS,
            description: "List all groups accessible to the authenticated user in the GitLab instance.",
            parameters: json!({ "type": "object", "properties": {} }),
        }
    ]
});

/// Outcome of one model-requested tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Parsed arguments, or the raw text when it was not JSON.
    pub input: JsonValue,
    pub output: String,
    /// `false` when the name or arguments were rejected before execution.
    pub accepted: bool,
}

fn parse_arguments(raw: &str) -> Result<JsonValue, serde_json::Error> {
    if raw.trim().is_empty() {
        Ok(json!({}))
    } else {
        serde_json::from_str(raw)
    }
}

/// Immutable set of tools bound to one GitLab client.
#[derive(Clone)]
pub struct ToolRegistry {
    client: GitLabClient,
}

impl ToolRegistry {
    pub fn new(client: GitLabClient) -> Self {
        Self { client }
    }

    pub fn definitions(&self) -> &'static [ToolDefinition] {
        TOOL_DEFINITIONS.as_slice()
    }

    /// Runs a tool requested by the model. Bad names or arguments come back as text.
    pub async fn invoke(&self, name: &str, raw_arguments: &str) -> ToolInvocation {
        let input = match parse_arguments(raw_arguments) {
            Ok(input) => input,
            Err(source) => {
                let err = ToolError::InvalidArguments { tool: name.to_string(), source };
                warn!("Rejected tool call: {}", err);
                return ToolInvocation {
                    input: JsonValue::String(raw_arguments.to_string()),
                    output: err.to_string(),
                    accepted: false,
                };
            }
        };

        match ToolCall::parse(name, input.clone()) {
            Ok(call) => {
                info!("Executing tool '{}'", call.name());
                ToolInvocation {
                    input,
                    output: call.execute(&self.client).await,
                    accepted: true,
                }
            }
            Err(e) => {
                warn!("Rejected tool call: {}", e);
                ToolInvocation {
                    input,
                    output: e.to_string(),
                    accepted: false,
                }
            }
        }
    }

    /// Checks a stored tool-call record against the current tool schemas.
    pub fn validate_record(&self, record: &ToolCallRecord) -> Result<ToolCall, ToolError> {
        ToolCall::parse(&record.name, record.input.clone())
    }
}
