//! GitHub API Client
//!
//! Module for managing interactions with the GitHub API

use async_trait::async_trait;
use octocrab::service::middleware::retry::RetryConfig;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{LabelSpec, MilestoneSpec, RepoContext};
use crate::error::{Error, Result};

/// Error code GitHub reports when an entity with the same identity exists
pub const ALREADY_EXISTS_CODE: &str = "already_exists";

/// Failure of a single create call
#[derive(Error, Debug)]
pub enum CreateError {
    /// The entity is already present in the repository
    #[error("already exists")]
    AlreadyExists,

    /// Any other failure
    #[error(transparent)]
    Other(#[from] Error),
}

impl From<octocrab::Error> for CreateError {
    fn from(err: octocrab::Error) -> Self {
        let already_exists = matches!(
            &err,
            octocrab::Error::GitHub { source, .. } if is_already_exists(source.errors.as_deref())
        );

        if already_exists {
            CreateError::AlreadyExists
        } else {
            CreateError::Other(Error::GitHubApi(err))
        }
    }
}

/// Whether the first structured error detail carries the `already_exists` code
fn is_already_exists(errors: Option<&[serde_json::Value]>) -> bool {
    errors
        .and_then(|errors| errors.first())
        .and_then(|detail| detail.get("code"))
        .and_then(|code| code.as_str())
        == Some(ALREADY_EXISTS_CODE)
}

/// Entity returned by a successful create call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreatedEntity {
    /// Entity ID
    pub id: u64,

    /// API URL of the entity
    #[serde(default)]
    pub url: Option<String>,
}

/// Issue-tracker operations the reconciler needs
#[async_trait]
pub trait IssueService {
    /// Create a label
    async fn create_label(&self, label: &LabelSpec) -> std::result::Result<CreatedEntity, CreateError>;

    /// Create a milestone
    async fn create_milestone(
        &self,
        milestone: &MilestoneSpec,
    ) -> std::result::Result<CreatedEntity, CreateError>;
}

#[derive(Serialize)]
struct CreateLabelRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl<'a> From<&'a LabelSpec> for CreateLabelRequest<'a> {
    fn from(label: &'a LabelSpec) -> Self {
        Self {
            name: &label.name,
            color: label.normalized_color(),
            description: label.description.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct CreateMilestoneRequest<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_on: Option<String>,
}

impl<'a> From<&'a MilestoneSpec> for CreateMilestoneRequest<'a> {
    fn from(milestone: &'a MilestoneSpec) -> Self {
        Self {
            title: &milestone.title,
            state: milestone.state.as_deref(),
            description: milestone.description.as_deref(),
            due_on: milestone
                .due_on
                .map(|due| due.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
        }
    }
}

/// GitHub API Client
///
/// Client responsible for interactions with the GitHub API
pub struct GitHubClient {
    octocrab: Octocrab,
    repo: RepoContext,
}

impl GitHubClient {
    /// Create a new GitHub client
    ///
    /// # Arguments
    /// - `access_token`: Bearer token
    /// - `api_url`: REST API base URL
    /// - `repo`: Target repository
    ///
    /// # Errors
    /// Returns `Error::ClientSetup` if the base URL is invalid or client initialization fails
    pub fn new(access_token: &str, api_url: &str, repo: RepoContext) -> Result<Self> {
        // A create call is sent exactly once; a repeated POST could create twice
        let mut builder = Octocrab::builder();
        builder.add_retry_config(RetryConfig::None);

        let octocrab = builder
            .personal_token(access_token.to_string())
            .base_uri(api_url)
            .and_then(|builder| builder.build())
            .map_err(|e| Error::ClientSetup(e.to_string()))?;

        Ok(Self { octocrab, repo })
    }

    /// Target repository
    pub fn repo(&self) -> &RepoContext {
        &self.repo
    }

    fn route(&self, collection: &str) -> String {
        format!(
            "/repos/{}/{}/{}",
            self.repo.owner, self.repo.name, collection
        )
    }
}

#[async_trait]
impl IssueService for GitHubClient {
    async fn create_label(&self, label: &LabelSpec) -> std::result::Result<CreatedEntity, CreateError> {
        let body = CreateLabelRequest::from(label);
        let created: CreatedEntity = self.octocrab.post(self.route("labels"), Some(&body)).await?;
        Ok(created)
    }

    async fn create_milestone(
        &self,
        milestone: &MilestoneSpec,
    ) -> std::result::Result<CreatedEntity, CreateError> {
        let body = CreateMilestoneRequest::from(milestone);
        let created: CreatedEntity = self
            .octocrab
            .post(self.route("milestones"), Some(&body))
            .await?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo() -> RepoContext {
        RepoContext {
            owner: "octo".to_string(),
            name: "hello".to_string(),
        }
    }

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new("test-token", &server.uri(), repo()).unwrap()
    }

    fn validation_failed(code: &str) -> ResponseTemplate {
        ResponseTemplate::new(422).set_body_json(json!({
            "message": "Validation Failed",
            "errors": [{ "resource": "Label", "code": code, "field": "name" }],
            "documentation_url": "https://docs.github.com/rest/issues/labels#create-a-label"
        }))
    }

    #[test]
    fn test_is_already_exists_checks_first_detail_only() {
        let exists = [json!({ "code": "already_exists" })];
        assert!(is_already_exists(Some(&exists[..])));

        let second = [json!({ "code": "invalid" }), json!({ "code": "already_exists" })];
        assert!(!is_already_exists(Some(&second[..])));

        let message_only = [json!({ "message": "already_exists" })];
        assert!(!is_already_exists(Some(&message_only[..])));

        assert!(!is_already_exists(Some(&[][..])));
        assert!(!is_already_exists(None));
    }

    #[test]
    fn test_label_request_body() {
        let label = LabelSpec {
            name: "bug".to_string(),
            color: Some("#D73A4A".to_string()),
            description: Some("Something isn't working".to_string()),
        };
        let body = serde_json::to_value(CreateLabelRequest::from(&label)).unwrap();
        assert_eq!(
            body,
            json!({ "name": "bug", "color": "d73a4a", "description": "Something isn't working" })
        );

        let bare = serde_json::to_value(CreateLabelRequest::from(&LabelSpec::new("bug"))).unwrap();
        assert_eq!(bare, json!({ "name": "bug" }));
    }

    #[test]
    fn test_milestone_request_body() {
        let milestone = MilestoneSpec {
            title: "v1.0".to_string(),
            description: None,
            due_on: Some(crate::config::parse_due_on("2024-06-30").unwrap()),
            state: Some("open".to_string()),
        };
        let body = serde_json::to_value(CreateMilestoneRequest::from(&milestone)).unwrap();
        assert_eq!(
            body,
            json!({ "title": "v1.0", "state": "open", "due_on": "2024-06-30T00:00:00Z" })
        );
    }

    #[tokio::test]
    async fn test_create_label_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/hello/labels"))
            .and(body_json(json!({ "name": "bug", "color": "ff0000" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 208045946,
                "url": "https://api.github.com/repos/octo/hello/labels/bug",
                "name": "bug",
                "color": "ff0000",
                "default": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let label = LabelSpec {
            color: Some("#ff0000".to_string()),
            ..LabelSpec::new("bug")
        };
        let created = client(&server).create_label(&label).await.unwrap();
        assert_eq!(created.id, 208045946);
        assert_eq!(
            created.url.as_deref(),
            Some("https://api.github.com/repos/octo/hello/labels/bug")
        );
    }

    #[tokio::test]
    async fn test_create_label_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/hello/labels"))
            .respond_with(validation_failed("already_exists"))
            .mount(&server)
            .await;

        let result = client(&server).create_label(&LabelSpec::new("bug")).await;
        assert!(matches!(result, Err(CreateError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_create_label_other_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/hello/labels"))
            .respond_with(validation_failed("invalid"))
            .mount(&server)
            .await;

        let result = client(&server).create_label(&LabelSpec::new("bug")).await;
        assert!(matches!(
            result,
            Err(CreateError::Other(Error::GitHubApi(_)))
        ));
    }

    #[tokio::test]
    async fn test_create_milestone_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/hello/milestones"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "message": "Resource not accessible by integration",
                "documentation_url": "https://docs.github.com/rest"
            })))
            .mount(&server)
            .await;

        let result = client(&server)
            .create_milestone(&MilestoneSpec::new("v1.0"))
            .await;
        match result {
            Err(CreateError::Other(err)) => {
                assert!(err.to_string().contains("GitHub API error"));
            }
            other => panic!("expected a fatal error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_milestone_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/hello/milestones"))
            .and(body_json(json!({ "title": "v1.0", "description": "First release" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 1002604,
                "number": 1,
                "url": "https://api.github.com/repos/octo/hello/milestones/1",
                "title": "v1.0",
                "state": "open"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let milestone = MilestoneSpec {
            description: Some("First release".to_string()),
            ..MilestoneSpec::new("v1.0")
        };
        let created = client(&server).create_milestone(&milestone).await.unwrap();
        assert_eq!(created.id, 1002604);
    }
    #[tokio::test]
    async fn test_create_label_server_error_is_sent_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/hello/labels"))
            .respond_with(ResponseTemplate::new(502).set_body_json(json!({
                "message": "Bad Gateway"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).create_label(&LabelSpec::new("bug")).await;

        assert!(matches!(result, Err(CreateError::Other(_))));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_api_url() {
        match GitHubClient::new("test-token", "not a valid uri", repo()) {
            Err(err) => {
                assert!(matches!(err, Error::ClientSetup(_)));
                assert!(err.is_preflight());
            }
            Ok(_) => panic!("expected an invalid API URL to be rejected"),
        }
    }
}
