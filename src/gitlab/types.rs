use serde::{ Deserialize, Serialize };

#[derive(Debug, Clone, Deserialize)]
pub struct Namespace {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub namespace: Option<Namespace>,
    #[serde(default)]
    pub creator_id: Option<u64>,
    #[serde(default)]
    pub tag_list: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub member_count: Option<u64>,
}

/// Body of `GET projects/:id/repository/files/:path`; only the payload is needed.
#[derive(Debug, Clone, Deserialize)]
pub struct FileContent {
    pub content: String,
}

/// Body for creating, updating or deleting a repository file.
#[derive(Debug, Clone, Serialize)]
pub struct FileWrite<'a> {
    pub branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<&'a str>,
    pub commit_message: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileWriteOutcome {
    Done,
    /// Create refused: the file is already there.
    AlreadyExists,
    /// Update or delete target: the file is not there.
    Missing,
}
