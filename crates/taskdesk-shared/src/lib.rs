use serde::{
  Deserialize,
  Deserializer,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  Pending,
  InProgress,
  Completed
}

impl TaskStatus {
  pub fn as_wire(self) -> &'static str {
    match self {
      | Self::Pending => "pending",
      | Self::InProgress => "in_progress",
      | Self::Completed => "completed"
    }
  }

  pub fn from_wire(
    raw: &str
  ) -> Option<Self> {
    match raw.trim() {
      | "pending" => Some(Self::Pending),
      | "in_progress" => {
        Some(Self::InProgress)
      }
      | "completed" => {
        Some(Self::Completed)
      }
      | _ => None
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
  Low,
  Medium,
  High
}

impl TaskPriority {
  pub fn from_wire(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "low" => Some(Self::Low),
      | "medium" => Some(Self::Medium),
      | "high" => Some(Self::High),
      | _ => None
    }
  }
}

/// Work site a task belongs to.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct SiteDto {
  #[serde(default)]
  pub code: String,
  #[serde(default)]
  pub name: Option<String>
}

/// A task exactly as the API sends it.
///
/// `status` and `priority` stay strings here so one malformed task
/// does not reject the whole list; the core crate validates them.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
  #[serde(
    deserialize_with = "string_or_number"
  )]
  pub id:              String,
  #[serde(default)]
  pub title:           String,
  pub status:          String,
  #[serde(default)]
  pub priority:        Option<String>,
  #[serde(default)]
  pub due_date:        Option<String>,
  #[serde(default)]
  pub deadline:        Option<String>,
  #[serde(default)]
  pub estimated_hours: Option<f64>,
  #[serde(default)]
  pub actual_hours:    Option<f64>,
  #[serde(default)]
  pub started_at:      Option<String>,
  #[serde(default, alias = "work")]
  pub site:            Option<SiteDto>
}

/// Body of the "my tasks" endpoint. Older deployments return a bare
/// array, newer ones wrap it in `{ "data": [...] }`.
#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(untagged)]
pub enum TaskListResponse {
  Bare(Vec<TaskDto>),
  Envelope { data: Vec<TaskDto> }
}

impl TaskListResponse {
  pub fn into_tasks(
    self
  ) -> Vec<TaskDto> {
    match self {
      | Self::Bare(tasks) => tasks,
      | Self::Envelope { data } => data
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub status:       Option<TaskStatus>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub started_at:   Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub actual_hours: Option<f64>
}

fn string_or_number<'de, D>(
  deserializer: D
) -> Result<String, D::Error>
where
  D: Deserializer<'de>
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum RawId {
    Text(String),
    Int(i64)
  }

  match RawId::deserialize(deserializer)?
  {
    | RawId::Text(text) => Ok(text),
    | RawId::Int(n) => Ok(n.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::{
    TaskListResponse,
    TaskPatch,
    TaskStatus
  };

  #[test]
  fn list_accepts_bare_array_and_envelope()
  {
    let bare = r#"[{"id":"a","title":"Pour slab","status":"pending"}]"#;
    let envelope = r#"{"data":[{"id":7,"title":"Rebar","status":"in_progress"}]}"#;

    let bare: TaskListResponse =
      serde_json::from_str(bare)
        .expect("bare array");
    let envelope: TaskListResponse =
      serde_json::from_str(envelope)
        .expect("envelope");

    let bare = bare.into_tasks();
    let envelope = envelope.into_tasks();
    assert_eq!(bare.len(), 1);
    assert_eq!(bare[0].id, "a");
    assert_eq!(envelope.len(), 1);
    assert_eq!(envelope[0].id, "7");
    assert_eq!(
      envelope[0].status,
      "in_progress"
    );
  }

  #[test]
  fn task_reads_camel_case_fields_and_site_alias()
   {
    let raw = r#"{
      "id": "t-1",
      "title": "Formwork",
      "status": "in_progress",
      "priority": "high",
      "deadline": "2026-10-21",
      "estimatedHours": 4,
      "actualHours": 0.5,
      "startedAt": "2026-10-19T08:00:00.000Z",
      "work": { "code": "OB-12" },
      "somethingElse": true
    }"#;

    let tasks: TaskListResponse =
      serde_json::from_str(&format!(
        "[{raw}]"
      ))
      .expect("decode task");
    let task = &tasks.into_tasks()[0];

    assert_eq!(
      task.priority.as_deref(),
      Some("high")
    );
    assert_eq!(task.due_date, None);
    assert_eq!(
      task.deadline.as_deref(),
      Some("2026-10-21")
    );
    assert_eq!(
      task.estimated_hours,
      Some(4.0)
    );
    assert_eq!(
      task.actual_hours,
      Some(0.5)
    );
    assert_eq!(
      task
        .site
        .as_ref()
        .map(|site| site.code.as_str()),
      Some("OB-12")
    );
  }

  #[test]
  fn patch_only_serializes_set_fields() {
    let patch = TaskPatch {
      status: Some(
        TaskStatus::Completed
      ),
      actual_hours: Some(2.5),
      ..TaskPatch::default()
    };

    let value =
      serde_json::to_value(&patch)
        .expect("encode patch");
    assert_eq!(
      value,
      serde_json::json!({
        "status": "completed",
        "actualHours": 2.5
      })
    );
  }

  #[test]
  fn status_wire_names() {
    assert_eq!(
      TaskStatus::from_wire(
        "in_progress"
      ),
      Some(TaskStatus::InProgress)
    );
    assert_eq!(
      TaskStatus::from_wire("done"),
      None
    );
    assert_eq!(
      TaskStatus::Pending.as_wire(),
      "pending"
    );
  }
}
