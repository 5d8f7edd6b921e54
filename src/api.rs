use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::ApiError;
use crate::models::{NewTask, Task, TaskId, TaskPatch};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/v1/";
const TASKS_PATH: &str = "tasks/";

/// The remote task resource. Each call is a single attempt; retrying is the
/// caller's business.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn list(&self) -> Result<Vec<Task>, ApiError>;
    async fn create(&self, task: &NewTask) -> Result<Task, ApiError>;
    async fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ApiError>;
    async fn delete(&self, id: TaskId) -> Result<(), ApiError>;
}

pub struct HttpTaskApi {
    client: Client,
    tasks_url: Url,
}

impl HttpTaskApi {
    /// `base_url` is the API root, e.g. `http://localhost:8000/v1/`.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            tasks_url: tasks_url(base_url)?,
        })
    }

    fn detail_url(&self, id: TaskId) -> Result<Url, url::ParseError> {
        self.tasks_url.join(&format!("{}/", id))
    }
}

fn tasks_url(base_url: &str) -> Result<Url, url::ParseError> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)?.join(TASKS_PATH)
}

async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status { status, body })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = check(response).await?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn list(&self) -> Result<Vec<Task>, ApiError> {
        log::debug!("GET {}", self.tasks_url);
        let response = self.client.get(self.tasks_url.clone()).send().await?;
        decode(response).await
    }

    async fn create(&self, task: &NewTask) -> Result<Task, ApiError> {
        log::debug!("POST {} title={:?}", self.tasks_url, task.title);
        let response = self
            .client
            .post(self.tasks_url.clone())
            .json(task)
            .send()
            .await?;
        decode(response).await
    }

    async fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ApiError> {
        let url = self.detail_url(id).map_err(|e| invalid_id(id, e))?;
        log::debug!("PATCH {} {:?}", url, patch);
        let response = self.client.patch(url).json(patch).send().await?;
        decode(response).await
    }

    async fn delete(&self, id: TaskId) -> Result<(), ApiError> {
        let url = self.detail_url(id).map_err(|e| invalid_id(id, e))?;
        log::debug!("DELETE {}", url);
        let response = self.client.delete(url).send().await?;
        check(response).await?;
        Ok(())
    }
}

// Ids are plain integers, so joining them onto a valid base cannot really
// fail; surface it as a client-side 400 if it ever does.
fn invalid_id(id: TaskId, err: url::ParseError) -> ApiError {
    ApiError::Status {
        status: reqwest::StatusCode::BAD_REQUEST,
        body: format!("invalid task id {}: {}", id, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_url_tolerates_missing_trailing_slash() {
        assert_eq!(
            tasks_url("http://localhost:8000/v1").unwrap().as_str(),
            "http://localhost:8000/v1/tasks/"
        );
        assert_eq!(
            tasks_url(DEFAULT_API_URL).unwrap().as_str(),
            "http://localhost:8000/v1/tasks/"
        );
    }

    #[test]
    fn detail_url_has_trailing_slash() {
        let api = HttpTaskApi::new(DEFAULT_API_URL, Duration::from_secs(5)).unwrap();
        assert_eq!(
            api.detail_url(TaskId(12)).unwrap().as_str(),
            "http://localhost:8000/v1/tasks/12/"
        );
    }

    #[test]
    fn rejects_unparseable_base() {
        assert!(HttpTaskApi::new("not a url", Duration::from_secs(5)).is_err());
    }
}
