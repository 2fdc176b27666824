//! REST client for the Corellium API
//!
//! One method per endpoint the provider uses. Every call carries the bearer
//! token from [`ClientConfig`]; nothing is read from globals.

use std::borrow::Cow;
use std::path::Path;

use reqwest::{multipart, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::types::*;

/// Percent-encode an id or name for use as one URL path segment
fn segment(raw: &str) -> Cow<'_, str> {
    urlencoding::encode(raw)
}

/// Client wrapper for the Corellium REST API
#[derive(Clone)]
pub struct CorelliumClient {
    client: Client,
    base_url: String,
    token: String,
}

impl CorelliumClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!("{} {}", method, path);
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    /// Send a request and map non-2xx statuses onto [`Error`].
    async fn send(&self, builder: RequestBuilder, kind: &str, id: &str) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => Error::not_found(kind, id),
            StatusCode::FORBIDDEN => Error::Forbidden { message },
            StatusCode::UNAUTHORIZED => Error::Unauthorized { message },
            _ => Error::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, kind: &str, id: &str) -> Result<T> {
        let response = self.send(self.request(Method::GET, path), kind, id).await?;
        Self::decode(response).await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        kind: &str,
        id: &str,
    ) -> Result<T> {
        let builder = self.request(method, path).json(body);
        let response = self.send(builder, kind, id).await?;
        Self::decode(response).await
    }

    /// Send a request whose response body, if any, is ignored.
    async fn send_empty(&self, method: Method, path: &str, kind: &str, id: &str) -> Result<()> {
        self.send(self.request(method, path), kind, id).await?;
        Ok(())
    }

    // Status

    pub async fn ready(&self) -> Result<ReadyStatus> {
        self.get("/v1/ready", "status", "ready").await
    }

    // Projects

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.get("/v1/projects", "projects", "").await
    }

    pub async fn get_project(&self, id: &str) -> Result<Project> {
        self.get(&format!("/v1/projects/{}", segment(id)), "project", id).await
    }

    pub async fn create_project(&self, project: &ProjectRequest) -> Result<Project> {
        self.send_json(Method::POST, "/v1/projects", project, "project", &project.name)
            .await
    }

    pub async fn update_project(&self, id: &str, project: &ProjectRequest) -> Result<()> {
        let builder = self.request(Method::PATCH, &format!("/v1/projects/{}", segment(id))).json(project);
        self.send(builder, "project", id).await?;
        Ok(())
    }

    pub async fn delete_project(&self, id: &str) -> Result<()> {
        self.send_empty(Method::DELETE, &format!("/v1/projects/{}", segment(id)), "project", id)
            .await
    }

    pub async fn list_project_keys(&self, project: &str) -> Result<Vec<ProjectKey>> {
        self.get(&format!("/v1/projects/{}/keys", segment(project)), "project", project)
            .await
    }

    pub async fn add_project_key(&self, project: &str, key: &ProjectKeyRequest) -> Result<ProjectKey> {
        self.send_json(
            Method::POST,
            &format!("/v1/projects/{}/keys", segment(project)),
            key,
            "project",
            project,
        )
        .await
    }

    pub async fn remove_project_key(&self, project: &str, key_id: &str) -> Result<()> {
        self.send_empty(
            Method::DELETE,
            &format!("/v1/projects/{}/keys/{}", segment(project), segment(key_id)),
            "project key",
            key_id,
        )
        .await
    }

    // Teams

    pub async fn list_teams(&self) -> Result<Vec<Team>> {
        self.get("/v1/teams", "teams", "").await
    }

    pub async fn create_team(&self, label: &str) -> Result<Team> {
        let body = TeamRequest {
            label: label.to_string(),
        };
        self.send_json(Method::POST, "/v1/teams", &body, "team", label).await
    }

    pub async fn update_team(&self, id: &str, label: &str) -> Result<()> {
        let body = TeamRequest {
            label: label.to_string(),
        };
        let builder = self.request(Method::PATCH, &format!("/v1/teams/{}", segment(id))).json(&body);
        self.send(builder, "team", id).await?;
        Ok(())
    }

    pub async fn delete_team(&self, id: &str) -> Result<()> {
        self.send_empty(Method::DELETE, &format!("/v1/teams/{}", segment(id)), "team", id)
            .await
    }

    pub async fn add_user_to_team(&self, team: &str, user: &str) -> Result<()> {
        self.send_empty(Method::PUT, &format!("/v1/teams/{}/users/{}", segment(team), segment(user)), "team", team)
            .await
    }

    pub async fn remove_user_from_team(&self, team: &str, user: &str) -> Result<()> {
        self.send_empty(
            Method::DELETE,
            &format!("/v1/teams/{}/users/{}", segment(team), segment(user)),
            "team member",
            user,
        )
        .await
    }

    /// Find a team by id in the team listing; there is no single-team GET.
    pub async fn find_team(&self, id: &str) -> Result<Team> {
        self.list_teams()
            .await?
            .into_iter()
            .find(|team| team.id == id)
            .ok_or_else(|| Error::not_found("team", id))
    }

    /// The built-in team every user belongs to.
    pub async fn all_users(&self) -> Result<Vec<User>> {
        Ok(self.find_team("all-users").await?.users)
    }

    // Roles

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        self.get("/v1/roles", "roles", "").await
    }

    pub async fn add_user_role(&self, project: &str, user: &str, role: &str) -> Result<()> {
        self.send_empty(
            Method::PUT,
            &format!("/v1/roles/projects/{}/users/{}/roles/{}", segment(project), segment(user), segment(role)),
            "user",
            user,
        )
        .await
    }

    pub async fn remove_user_role(&self, project: &str, user: &str, role: &str) -> Result<()> {
        self.send_empty(
            Method::DELETE,
            &format!("/v1/roles/projects/{}/users/{}/roles/{}", segment(project), segment(user), segment(role)),
            "user",
            user,
        )
        .await
    }

    pub async fn add_team_role(&self, project: &str, team: &str, role: &str) -> Result<()> {
        self.send_empty(
            Method::PUT,
            &format!("/v1/roles/projects/{}/teams/{}/roles/{}", segment(project), segment(team), segment(role)),
            "team",
            team,
        )
        .await
    }

    pub async fn remove_team_role(&self, project: &str, team: &str, role: &str) -> Result<()> {
        self.send_empty(
            Method::DELETE,
            &format!("/v1/roles/projects/{}/teams/{}/roles/{}", segment(project), segment(team), segment(role)),
            "team",
            team,
        )
        .await
    }

    // Users

    pub async fn create_user(&self, user: &UserRequest) -> Result<Created> {
        self.send_json(Method::POST, "/v1/users", user, "user", &user.email)
            .await
    }

    pub async fn update_user(&self, id: &str, user: &UserRequest) -> Result<()> {
        let builder = self.request(Method::PATCH, &format!("/v1/users/{}", segment(id))).json(user);
        self.send(builder, "user", id).await?;
        Ok(())
    }

    pub async fn delete_user(&self, id: &str) -> Result<()> {
        self.send_empty(Method::DELETE, &format!("/v1/users/{}", segment(id)), "user", id)
            .await
    }

    // Instances

    pub async fn list_instances(&self) -> Result<Vec<Instance>> {
        self.get("/v1/instances", "instances", "").await
    }

    pub async fn get_instance(&self, id: &str) -> Result<Instance> {
        self.get(&format!("/v1/instances/{}", segment(id)), "instance", id).await
    }

    pub async fn create_instance(&self, options: &InstanceCreateOptions) -> Result<Created> {
        self.send_json(Method::POST, "/v1/instances", options, "instance", &options.flavor)
            .await
    }

    pub async fn update_instance(&self, id: &str, update: &InstanceUpdate) -> Result<()> {
        let builder = self.request(Method::PATCH, &format!("/v1/instances/{}", segment(id))).json(update);
        self.send(builder, "instance", id).await?;
        Ok(())
    }

    pub async fn delete_instance(&self, id: &str) -> Result<()> {
        self.send_empty(Method::DELETE, &format!("/v1/instances/{}", segment(id)), "instance", id)
            .await
    }

    pub async fn instance_action(&self, id: &str, action: InstanceAction) -> Result<()> {
        let builder = self
            .request(Method::POST, &format!("/v1/instances/{}/{}", segment(id), action.path()))
            .json(&serde_json::json!({}));
        self.send(builder, "instance", id).await?;
        Ok(())
    }

    // Snapshots

    pub async fn create_snapshot(&self, instance: &str, name: &str) -> Result<Snapshot> {
        let body = SnapshotRequest {
            name: name.to_string(),
        };
        self.send_json(
            Method::POST,
            &format!("/v1/instances/{}/snapshots", segment(instance)),
            &body,
            "instance",
            instance,
        )
        .await
    }

    pub async fn get_snapshot(&self, id: &str) -> Result<Snapshot> {
        self.get(&format!("/v1/snapshots/{}", segment(id)), "snapshot", id).await
    }

    pub async fn rename_snapshot(&self, id: &str, name: &str) -> Result<Snapshot> {
        let body = SnapshotRequest {
            name: name.to_string(),
        };
        self.send_json(Method::PATCH, &format!("/v1/snapshots/{}", segment(id)), &body, "snapshot", id)
            .await
    }

    pub async fn delete_snapshot(&self, id: &str) -> Result<()> {
        self.send_empty(Method::DELETE, &format!("/v1/snapshots/{}", segment(id)), "snapshot", id)
            .await
    }

    // Images

    /// Upload an image file as a multipart form.
    pub async fn create_image(&self, upload: &ImageUpload, file: &Path) -> Result<Image> {
        let bytes = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| upload.name.clone());

        let form = multipart::Form::new()
            .text("encoding", "plain")
            .text("name", upload.name.clone())
            .text("type", upload.kind.clone())
            .text("encapsulated", upload.encapsulated.to_string())
            .text("project", upload.project.clone())
            .part("file", multipart::Part::bytes(bytes).file_name(file_name));

        let builder = self.request(Method::POST, "/v1/images").multipart(form);
        let response = self.send(builder, "image", &upload.name).await?;
        Self::decode(response).await
    }

    pub async fn get_image(&self, id: &str) -> Result<Image> {
        self.get(&format!("/v1/images/{}", segment(id)), "image", id).await
    }

    pub async fn delete_image(&self, id: &str) -> Result<()> {
        self.send_empty(Method::DELETE, &format!("/v1/images/{}", segment(id)), "image", id)
            .await
    }

    // Models

    pub async fn list_models(&self) -> Result<Vec<Model>> {
        self.get("/v1/models", "models", "").await
    }

    pub async fn list_model_software(&self, model: &str) -> Result<Vec<Firmware>> {
        self.get(&format!("/v1/models/{}/software", segment(model)), "model", model)
            .await
    }

    // Web player

    pub async fn create_webplayer_session(
        &self,
        request: &WebPlayerSessionRequest,
    ) -> Result<WebPlayerSession> {
        self.send_json(
            Method::POST,
            "/v1/webplayer",
            request,
            "instance",
            &request.instance_id,
        )
        .await
    }

    /// The API answers with a list; an empty one means the session is gone.
    pub async fn get_webplayer_session(&self, id: &str) -> Result<WebPlayerSession> {
        let sessions: Vec<WebPlayerSession> = self
            .get(&format!("/v1/webplayer/{}", segment(id)), "web player session", id)
            .await?;
        sessions
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found("web player session", id))
    }

    pub async fn delete_webplayer_session(&self, id: &str) -> Result<()> {
        self.send_empty(
            Method::DELETE,
            &format!("/v1/webplayer/{}", segment(id)),
            "web player session",
            id,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CorelliumClient {
        let config = ClientConfig::new(server.uri(), "test-token");
        CorelliumClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_ready_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/ready"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let status = client_for(&server).ready().await.unwrap();
        assert_eq!(status.status, "ok");
    }

    #[tokio::test]
    async fn test_forbidden_maps_to_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects"))
            .respond_with(ResponseTemplate::new(403).set_body_string("not an admin"))
            .mount(&server)
            .await;

        let request = ProjectRequest {
            name: "lab".to_string(),
            settings: ProjectSettings::default(),
            quotas: ProjectQuota::default(),
        };
        let err = client_for(&server).create_project(&request).await.unwrap_err();
        assert!(err.is_forbidden());
        assert_eq!(err.body(), Some("not an admin"));
    }

    #[tokio::test]
    async fn test_not_found_and_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/instances/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/instances/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.get_instance("missing").await.unwrap_err().is_not_found());

        match client.get_instance("broken").await.unwrap_err() {
            Error::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).list_projects().await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_project_key_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/projects/p1/keys"))
            .and(body_json(json!({"kind": "ssh", "label": "ci", "key": "ssh-ed25519 AAAA"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "identifier": "k1",
                "kind": "ssh",
                "label": "ci",
                "key": "ssh-ed25519 AAAA",
                "fingerprint": "aa:bb"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/projects/p1/keys/k1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let key = client
            .add_project_key(
                "p1",
                &ProjectKeyRequest {
                    kind: "ssh".to_string(),
                    label: "ci".to_string(),
                    key: "ssh-ed25519 AAAA".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(key.identifier.as_deref(), Some("k1"));
        assert_eq!(key.fingerprint.as_deref(), Some("aa:bb"));

        client.remove_project_key("p1", "k1").await.unwrap();
    }

    #[tokio::test]
    async fn test_image_upload_is_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/images"))
            .and(body_string_contains("name=\"encoding\""))
            .and(body_string_contains("fwpackage"))
            .and(body_string_contains("firmware-bytes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "img-1",
                "status": "active",
                "name": "fw",
                "type": "fwpackage",
                "size": 14
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"firmware-bytes").unwrap();

        let upload = ImageUpload {
            name: "fw".to_string(),
            kind: "fwpackage".to_string(),
            encapsulated: false,
            project: "p1".to_string(),
        };
        let image = client_for(&server).create_image(&upload, file.path()).await.unwrap();
        assert_eq!(image.id, "img-1");
        assert_eq!(image.size, Some(14.0));
    }

    #[tokio::test]
    async fn test_empty_webplayer_listing_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/webplayer/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let err = client_for(&server).get_webplayer_session("s1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_all_users_reads_builtin_team() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "t1", "label": "ops", "users": []},
                {"id": "all-users", "label": "All Users", "users": [
                    {"id": "u1", "label": "Ada", "name": "ada", "email": "ada@example.com"}
                ]}
            ])))
            .mount(&server)
            .await;

        let users = client_for(&server).all_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_path_segments_are_percent_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/instances/a%2Fb%3Fc"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/projects/p%201/keys/k%23"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.get_instance("a/b?c").await.unwrap_err().is_not_found());
        client.remove_project_key("p 1", "k#").await.unwrap();
    }
}
