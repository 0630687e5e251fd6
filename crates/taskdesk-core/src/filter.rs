use crate::task::Task;

/// Case-insensitive title substring search. An empty search matches
/// every task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
  raw:    String,
  needle: String
}

impl SearchFilter {
  pub fn new(
    raw: impl Into<String>
  ) -> Self {
    let raw = raw.into();
    let needle = raw.to_lowercase();
    Self { raw, needle }
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  pub fn is_empty(&self) -> bool {
    self.needle.is_empty()
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    self.needle.is_empty()
      || task
        .title
        .to_lowercase()
        .contains(&self.needle)
  }

  pub fn apply<'a>(
    &self,
    tasks: &'a [Task]
  ) -> Vec<&'a Task> {
    tasks
      .iter()
      .filter(|task| self.matches(task))
      .collect()
  }
}
