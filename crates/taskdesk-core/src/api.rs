use std::future::Future;
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use reqwest::Url;
use taskdesk_shared::{
  TaskListResponse,
  TaskPatch
};
use tracing::{
  debug,
  instrument,
  warn
};

const ERROR_BODY_LIMIT: usize = 200;

/// The remote task service.
///
/// Futures are `Send` so the live view can run updates on spawned
/// tasks while it keeps ticking.
pub trait TaskApi {
  fn get_my_tasks(
    &self
  ) -> impl Future<
    Output = anyhow::Result<TaskListResponse>
  > + Send;

  fn update_task(
    &self,
    id: &str,
    patch: &TaskPatch
  ) -> impl Future<Output = anyhow::Result<()>>
  + Send;
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
  pub base_url: String,
  pub token:    Option<String>,
  pub timeout:  Duration
}

#[derive(Debug, Clone)]
pub struct HttpTaskApi {
  client:   reqwest::Client,
  base_url: Url,
  token:    Option<String>
}

impl HttpTaskApi {
  pub fn new(
    settings: &ApiSettings
  ) -> anyhow::Result<Self> {
    Self::with_builder(
      settings,
      reqwest::Client::builder()
    )
  }

  fn with_builder(
    settings: &ApiSettings,
    builder: reqwest::ClientBuilder
  ) -> anyhow::Result<Self> {
    let base_url =
      Url::parse(settings.base_url.trim())
        .with_context(|| {
          format!(
            "invalid api.url: {}",
            settings.base_url
          )
        })?;
    if base_url.cannot_be_a_base() {
      return Err(anyhow!(
        "api.url cannot be used as a \
         base URL: {base_url}"
      ));
    }

    let client =
      builder
        .timeout(settings.timeout)
        .build()
        .context(
          "failed building HTTP client \
           for task API"
        )?;

    Ok(Self {
      client,
      base_url,
      token: settings
        .token
        .clone()
        .filter(|t| !t.trim().is_empty())
    })
  }

  pub fn endpoint(
    &self,
    segments: &[&str]
  ) -> anyhow::Result<Url> {
    let mut url = self.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|()| {
        anyhow!(
          "api.url cannot be used as a \
           base URL"
        )
      })?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn authorize(
    &self,
    request: reqwest::RequestBuilder
  ) -> reqwest::RequestBuilder {
    match self.token.as_deref() {
      | Some(token) => request.header(
        reqwest::header::AUTHORIZATION,
        format!("Bearer {token}")
      ),
      | None => request
    }
  }
}

impl TaskApi for HttpTaskApi {
  #[instrument(skip(self))]
  async fn get_my_tasks(
    &self
  ) -> anyhow::Result<TaskListResponse> {
    let url =
      self.endpoint(&["tasks", "my"])?;
    debug!(url = %url, "fetching my tasks");

    let response = self
      .authorize(self.client.get(url.clone()))
      .header(
        reqwest::header::ACCEPT,
        "application/json"
      )
      .send()
      .await
      .with_context(|| {
        format!("failed requesting {url}")
      })?;

    let body =
      read_success_body(response, &url)
        .await?;
    serde_json::from_str(&body)
      .with_context(|| {
        format!(
          "unexpected task list shape \
           from {url}"
        )
      })
  }

  #[instrument(skip(self, patch))]
  async fn update_task(
    &self,
    id: &str,
    patch: &TaskPatch
  ) -> anyhow::Result<()> {
    let url =
      self.endpoint(&["tasks", id])?;
    let payload =
      serde_json::to_vec(patch).context(
        "failed encoding task patch"
      )?;
    debug!(url = %url, ?patch, "updating task");

    let response = self
      .authorize(
        self.client.patch(url.clone())
      )
      .header(
        reqwest::header::CONTENT_TYPE,
        "application/json"
      )
      .body(payload)
      .send()
      .await
      .with_context(|| {
        format!("failed requesting {url}")
      })?;

    read_success_body(response, &url)
      .await?;
    Ok(())
  }
}

async fn read_success_body(
  response: reqwest::Response,
  url: &Url
) -> anyhow::Result<String> {
  let status = response.status();
  let body =
    response.text().await.with_context(
      || {
        format!(
          "failed reading response body \
           from {url}"
        )
      }
    )?;

  if status.is_success() {
    return Ok(body);
  }

  warn!(
    url = %url,
    status = %status,
    "task API returned an error status"
  );
  Err(anyhow!(
    "{url} returned {status}: {}",
    truncate_body(&body)
  ))
}

fn truncate_body(body: &str) -> String {
  let trimmed = body.trim();
  if trimmed.chars().count()
    <= ERROR_BODY_LIMIT
  {
    return trimmed.to_string();
  }
  let mut out: String = trimmed
    .chars()
    .take(ERROR_BODY_LIMIT)
    .collect();
  out.push('…');
  out
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use taskdesk_shared::{
    TaskPatch,
    TaskStatus
  };
  use tokio::io::{
    AsyncReadExt,
    AsyncWriteExt
  };
  use tokio::net::TcpListener;
  use tokio::task::JoinHandle;

  use super::{
    ApiSettings,
    HttpTaskApi,
    TaskApi,
    truncate_body
  };

  /// Answers a single request with a canned response and returns the
  /// raw request text.
  async fn serve_once(
    status: &'static str,
    body: &'static str
  ) -> (String, JoinHandle<String>) {
    let listener =
      TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr =
      listener.local_addr().expect("addr");

    let handle = tokio::spawn(async move {
      let (mut socket, _) = listener
        .accept()
        .await
        .expect("accept");
      let mut raw = Vec::new();
      let mut buf = [0u8; 1024];
      while !request_complete(&raw) {
        let n = socket
          .read(&mut buf)
          .await
          .expect("read request");
        if n == 0 {
          break;
        }
        raw.extend_from_slice(&buf[..n]);
      }

      let response = format!(
        "HTTP/1.1 {status}\r\n\
         content-type: application/json\r\n\
         content-length: {}\r\n\
         connection: close\r\n\r\n{body}",
        body.len()
      );
      socket
        .write_all(response.as_bytes())
        .await
        .expect("write response");
      let _ = socket.shutdown().await;
      String::from_utf8(raw)
        .expect("utf8 request")
    });

    (format!("http://{addr}/api"), handle)
  }

  fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some((head, body)) =
      text.split_once("\r\n\r\n")
    else {
      return false;
    };
    let length = head
      .lines()
      .find_map(|line| {
        let (name, value) =
          line.split_once(':')?;
        if name.eq_ignore_ascii_case(
          "content-length"
        ) {
          value.trim().parse::<usize>().ok()
        } else {
          None
        }
      })
      .unwrap_or(0);
    body.len() >= length
  }

  fn local_api(
    base: &str,
    token: Option<&str>
  ) -> HttpTaskApi {
    HttpTaskApi::with_builder(
      &ApiSettings {
        base_url: base.to_string(),
        token:    token.map(str::to_string),
        timeout:  Duration::from_secs(5)
      },
      reqwest::Client::builder().no_proxy()
    )
    .expect("valid settings")
  }

  fn request_body(raw: &str) -> serde_json::Value {
    let (_, body) = raw
      .split_once("\r\n\r\n")
      .expect("request body");
    serde_json::from_str(body)
      .expect("json body")
  }

  fn api(base: &str) -> HttpTaskApi {
    HttpTaskApi::new(&ApiSettings {
      base_url: base.to_string(),
      token:    Some("  ".to_string()),
      timeout:  Duration::from_secs(5)
    })
    .expect("valid settings")
  }

  #[test]
  fn endpoint_joins_segments_and_escapes_ids()
   {
    let api = api("http://localhost:8080/api/");
    assert_eq!(
      api
        .endpoint(&["tasks", "my"])
        .expect("url")
        .as_str(),
      "http://localhost:8080/api/tasks/my"
    );
    assert_eq!(
      api
        .endpoint(&["tasks", "a b/c"])
        .expect("url")
        .as_str(),
      "http://localhost:8080/api/tasks/a%20b%2Fc"
    );
  }

  #[test]
  fn blank_token_is_ignored() {
    assert!(
      api("http://localhost/api")
        .token
        .is_none()
    );
  }

  #[test]
  fn rejects_non_base_urls() {
    let result =
      HttpTaskApi::new(&ApiSettings {
        base_url: "mailto:ops@example.com"
          .to_string(),
        token:    None,
        timeout:  Duration::from_secs(5)
      });
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn fetch_sends_bearer_token_and_reads_envelope()
   {
    let (base, server) = serve_once(
      "200 OK",
      r#"{"data":[{"id":7,"title":"Pour slab","status":"pending"}]}"#
    )
    .await;

    let tasks =
      local_api(&base, Some("crew-token"))
        .get_my_tasks()
        .await
        .expect("fetch")
        .into_tasks();
    let raw = server.await.expect("server");

    assert!(
      raw.starts_with("GET /api/tasks/my "),
      "{raw}"
    );
    assert!(
      raw
        .to_ascii_lowercase()
        .contains(
          "authorization: bearer crew-token"
        ),
      "{raw}"
    );
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, "7");
  }

  #[tokio::test]
  async fn fetch_reads_bare_array_without_token()
   {
    let (base, server) = serve_once(
      "200 OK",
      r#"[{"id":"a","title":"Strip forms","status":"in_progress"}]"#
    )
    .await;

    let tasks = local_api(&base, None)
      .get_my_tasks()
      .await
      .expect("fetch")
      .into_tasks();
    let raw = server.await.expect("server");

    assert!(
      !raw
        .to_ascii_lowercase()
        .contains("authorization:")
    );
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, "in_progress");
  }

  #[tokio::test]
  async fn update_patches_task_with_camel_case_body()
   {
    let (base, server) =
      serve_once("204 No Content", "")
        .await;
    let patch = TaskPatch {
      status:       Some(TaskStatus::InProgress),
      started_at:   Some(
        "2026-10-19T09:00:00.000Z"
          .to_string()
      ),
      actual_hours: None
    };

    local_api(&base, Some("crew-token"))
      .update_task("t-1", &patch)
      .await
      .expect("update");
    let raw = server.await.expect("server");

    assert!(
      raw.starts_with("PATCH /api/tasks/t-1 "),
      "{raw}"
    );
    assert_eq!(
      request_body(&raw),
      serde_json::json!({
        "status": "in_progress",
        "startedAt": "2026-10-19T09:00:00.000Z"
      })
    );
  }

  #[tokio::test]
  async fn error_status_is_reported_with_body()
  {
    let (base, server) = serve_once(
      "500 Internal Server Error",
      "database unavailable"
    )
    .await;

    let err = local_api(&base, None)
      .update_task(
        "t-1",
        &TaskPatch {
          status:       Some(
            TaskStatus::Completed
          ),
          started_at:   None,
          actual_hours: Some(2.5)
        }
      )
      .await
      .expect_err("server error");
    let raw = server.await.expect("server");

    let text = format!("{err:#}");
    assert!(text.contains("500"), "{text}");
    assert!(
      text.contains("database unavailable"),
      "{text}"
    );
    assert_eq!(
      request_body(&raw)["actualHours"],
      serde_json::json!(2.5)
    );
  }

  #[test]
  fn long_error_bodies_are_truncated() {
    let body = "x".repeat(500);
    let truncated = truncate_body(&body);
    assert_eq!(
      truncated.chars().count(),
      201
    );
    assert!(truncated.ends_with('…'));
  }
}
