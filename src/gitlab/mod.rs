pub mod types;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, Method, RequestBuilder, Response, StatusCode };
use reqwest::header::{ AUTHORIZATION, CONTENT_TYPE };
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

use crate::cli::Args;
use self::types::{ FileContent, FileWrite, FileWriteOutcome, Group, Project };

pub const PER_PAGE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 50;

#[derive(Debug, Error)]
pub enum GitLabError {
    #[error("GITLAB_TOKEN environment variable is not set.")]
    MissingToken,
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP error! status: {}", .status.as_u16())]
    Status {
        status: StatusCode,
        body: String,
    },
    #[error("Invalid GitLab URL: {0}")]
    Url(String),
    #[error("Failed to decode file content: {0}")]
    Decode(String),
}

impl GitLabError {
    pub fn is_config(&self) -> bool {
        matches!(self, GitLabError::MissingToken)
    }
}

#[derive(Debug, Clone)]
pub struct GitLabConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub max_pages: u32,
}

impl GitLabConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            base_url: args.gitlab_url.clone(),
            token: args.gitlab_token.clone().filter(|t| !t.trim().is_empty()),
            max_pages: args.gitlab_max_pages,
        }
    }
}

/// Thin REST client for the subset of the GitLab API the assistant's tools use.
#[derive(Clone)]
pub struct GitLabClient {
    http: HttpClient,
    base_url: String,
    token: Option<String>,
    max_pages: u32,
}

impl GitLabClient {
    pub fn new(config: GitLabConfig) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: config.base_url,
            token: config.token,
            max_pages: config.max_pages.max(1),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GitLabError> {
        let mut url = Url::parse(&self.base_url).map_err(|e|
            GitLabError::Url(format!("{}: {}", self.base_url, e))
        )?;
        url.path_segments_mut()
            .map_err(|_| GitLabError::Url(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, GitLabError> {
        let token = self.token.as_deref().ok_or(GitLabError::MissingToken)?;
        Ok(
            self.http
                .request(method, url)
                .header(AUTHORIZATION, format!("Bearer {}", token))
                .header(CONTENT_TYPE, "application/json")
        )
    }

    async fn ensure_success(resp: Response) -> Result<Response, GitLabError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(GitLabError::Status { status, body })
    }

    /// Walks `page=1,2,...` until an empty page comes back or `max_pages` is reached.
    async fn list_all<T: DeserializeOwned>(&self, resource: &str) -> Result<Vec<T>, GitLabError> {
        let url = self.endpoint(&[resource])?;
        let mut items = Vec::new();

        for page in 1..=self.max_pages {
            let per_page = PER_PAGE.to_string();
            let page_str = page.to_string();
            let resp = self
                .request(Method::GET, url.clone())?
                .query(
                    &[
                        ("order_by", "id"),
                        ("sort", "asc"),
                        ("per_page", per_page.as_str()),
                        ("page", page_str.as_str()),
                    ]
                )
                .send().await?;
            let batch: Vec<T> = Self::ensure_success(resp).await?.json().await?;
            debug!("Fetched {} {} from page {}", batch.len(), resource, page);
            if batch.is_empty() {
                return Ok(items);
            }
            items.extend(batch);
        }

        warn!(
            "Stopped listing {} after {} pages ({} items); results may be incomplete",
            resource,
            self.max_pages,
            items.len()
        );
        Ok(items)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, GitLabError> {
        self.list_all("projects").await
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>, GitLabError> {
        self.list_all("groups").await
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B
    ) -> Result<JsonValue, GitLabError> {
        let resp = self.request(method, url)?.json(body).send().await?;
        Ok(Self::ensure_success(resp).await?.json().await?)
    }

    pub async fn create_project<B: Serialize + ?Sized>(
        &self,
        body: &B
    ) -> Result<JsonValue, GitLabError> {
        let url = self.endpoint(&["projects"])?;
        self.send_json(Method::POST, url, body).await
    }

    pub async fn update_project<B: Serialize + ?Sized>(
        &self,
        project_id: u64,
        body: &B
    ) -> Result<JsonValue, GitLabError> {
        let url = self.endpoint(&["projects", &project_id.to_string()])?;
        self.send_json(Method::PUT, url, body).await
    }

    pub async fn delete_project(&self, project_id: u64) -> Result<(), GitLabError> {
        let url = self.endpoint(&["projects", &project_id.to_string()])?;
        let resp = self.request(Method::DELETE, url)?.send().await?;
        Self::ensure_success(resp).await?;
        Ok(())
    }

    fn file_url(&self, project_id: u64, file_path: &str) -> Result<Url, GitLabError> {
        self.endpoint(&["projects", &project_id.to_string(), "repository", "files", file_path])
    }

    /// Reads a repository file. `None` when the file does not exist on that ref.
    pub async fn get_file(
        &self,
        project_id: u64,
        file_path: &str,
        git_ref: &str
    ) -> Result<Option<String>, GitLabError> {
        let url = self.file_url(project_id, file_path)?;
        let resp = self.request(Method::GET, url)?.query(&[("ref", git_ref)]).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let file: FileContent = Self::ensure_success(resp).await?.json().await?;
        decode_file_content(&file.content).map(Some)
    }

    pub async fn create_file(
        &self,
        project_id: u64,
        file_path: &str,
        write: &FileWrite<'_>
    ) -> Result<FileWriteOutcome, GitLabError> {
        let url = self.file_url(project_id, file_path)?;
        let resp = self.request(Method::POST, url)?.json(write).send().await?;
        match Self::ensure_success(resp).await {
            Ok(_) => Ok(FileWriteOutcome::Done),
            Err(GitLabError::Status { status, body }) if
                status == StatusCode::BAD_REQUEST && body.contains("already exists")
            => Ok(FileWriteOutcome::AlreadyExists),
            Err(e) => Err(e),
        }
    }

    pub async fn update_file(
        &self,
        project_id: u64,
        file_path: &str,
        write: &FileWrite<'_>
    ) -> Result<FileWriteOutcome, GitLabError> {
        let url = self.file_url(project_id, file_path)?;
        let resp = self.request(Method::PUT, url)?.json(write).send().await?;
        Self::file_outcome(resp).await
    }

    pub async fn delete_file(
        &self,
        project_id: u64,
        file_path: &str,
        write: &FileWrite<'_>
    ) -> Result<FileWriteOutcome, GitLabError> {
        let url = self.file_url(project_id, file_path)?;
        let resp = self.request(Method::DELETE, url)?.json(write).send().await?;
        Self::file_outcome(resp).await
    }

    async fn file_outcome(resp: Response) -> Result<FileWriteOutcome, GitLabError> {
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(FileWriteOutcome::Missing);
        }
        Self::ensure_success(resp).await?;
        Ok(FileWriteOutcome::Done)
    }
}

/// GitLab wraps base64 payloads at 60 columns, so whitespace is stripped first.
pub fn decode_file_content(encoded: &str) -> Result<String, GitLabError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64.decode(compact.as_bytes()).map_err(|e| GitLabError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| GitLabError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> GitLabClient {
        GitLabClient::new(GitLabConfig {
            base_url: base_url.to_string(),
            token: Some("t".into()),
            max_pages: DEFAULT_MAX_PAGES,
        })
    }

    #[test]
    fn file_path_is_a_single_encoded_segment() {
        let url = client("https://gitlab.example.com/api/v4")
            .file_url(7, "docs/README.md")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://gitlab.example.com/api/v4/projects/7/repository/files/docs%2FREADME.md"
        );
    }

    #[test]
    fn trailing_slash_in_base_url_is_tolerated() {
        let url = client("https://gitlab.example.com/api/v4/").endpoint(&["groups"]).unwrap();
        assert_eq!(url.as_str(), "https://gitlab.example.com/api/v4/groups");
    }

    #[test]
    fn decodes_wrapped_base64() {
        let encoded = "IyBUaXRs\nZQo=";
        assert_eq!(decode_file_content(encoded).unwrap(), "# Title\n");
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(decode_file_content("***"), Err(GitLabError::Decode(_))));
    }

    #[test]
    fn status_error_message() {
        let err = GitLabError::Status { status: StatusCode::FORBIDDEN, body: String::new() };
        assert_eq!(err.to_string(), "HTTP error! status: 403");
    }
}
