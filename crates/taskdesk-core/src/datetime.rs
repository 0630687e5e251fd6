use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  SecondsFormat,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "taskdesk-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "TASKDESK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "TASKDESK_TIME_CONFIG";

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Timezone used to print dates and to anchor date-only due dates.
pub fn display_timezone() -> &'static Tz
{
  static DISPLAY_TZ: OnceLock<Tz> =
    OnceLock::new();
  DISPLAY_TZ.get_or_init(
    resolve_display_timezone
  )
}

#[must_use]
pub fn format_display_date(
  dt: DateTime<Utc>
) -> String {
  dt.with_timezone(display_timezone())
    .format("%Y-%m-%d")
    .to_string()
}

/// ISO-8601 with millisecond precision and a `Z` suffix, the shape the
/// API expects for `startedAt`.
#[must_use]
pub fn format_iso_millis(
  dt: DateTime<Utc>
) -> String {
  dt.to_rfc3339_opts(
    SecondsFormat::Millis,
    true
  )
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.fff]` (read as UTC)
/// or a bare `YYYY-MM-DD` (midnight in the display timezone).
pub fn parse_timestamp(
  raw: &str
) -> anyhow::Result<DateTime<Utc>> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Err(anyhow!(
      "timestamp is empty"
    ));
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(trimmed)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(naive) =
    NaiveDateTime::parse_from_str(
      trimmed,
      "%Y-%m-%dT%H:%M:%S%.f"
    )
  {
    return Ok(naive.and_utc());
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      trimmed, "%Y-%m-%d"
    )
  {
    let midnight = date
      .and_hms_opt(0, 0, 0)
      .ok_or_else(|| {
        anyhow!(
          "invalid midnight for \
           {trimmed}"
        )
      })?;
    return to_utc_from_display_local(
      midnight, trimmed
    );
  }

  Err(anyhow!(
    "unrecognized timestamp: \
     {trimmed}"
  ))
}

/// `None` for non-finite hours or hours beyond what a `Duration` can
/// hold.
#[must_use]
pub fn hours_to_duration(
  hours: f64
) -> Option<Duration> {
  let millis =
    (hours * MILLIS_PER_HOUR).round();
  if !millis.is_finite()
    || millis.abs() >= i64::MAX as f64
  {
    return None;
  }
  Duration::try_milliseconds(
    millis as i64
  )
}

#[must_use]
pub fn duration_to_hours(
  duration: Duration
) -> f64 {
  duration.num_milliseconds() as f64
    / MILLIS_PER_HOUR
}

/// Rounds to two decimals, the precision stored for worked hours.
#[must_use]
pub fn round_hours(hours: f64) -> f64 {
  (hours * 100.0).round() / 100.0
}

fn resolve_display_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  chrono_tz::UTC
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn to_utc_from_display_local(
  local_naive: NaiveDateTime,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match display_timezone()
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not \
         exist in configured \
         timezone: {context}"
      ))
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };

  use super::{
    duration_to_hours,
    format_iso_millis,
    hours_to_duration,
    parse_timestamp,
    round_hours
  };

  #[test]
  fn parses_rfc3339_with_offset() {
    let parsed = parse_timestamp(
      "2026-10-19T10:00:00.250+02:00"
    )
    .expect("parse rfc3339");
    let expected = Utc
      .with_ymd_and_hms(
        2026, 10, 19, 8, 0, 0
      )
      .single()
      .expect("valid instant")
      + Duration::milliseconds(250);
    assert_eq!(parsed, expected);
  }

  #[test]
  fn parses_naive_datetime_as_utc() {
    let parsed = parse_timestamp(
      "2026-10-19T08:30:00"
    )
    .expect("parse naive");
    assert_eq!(
      parsed,
      Utc
        .with_ymd_and_hms(
          2026, 10, 19, 8, 30, 0
        )
        .single()
        .expect("valid instant")
    );
  }

  #[test]
  fn rejects_garbage() {
    assert!(
      parse_timestamp("next week")
        .is_err()
    );
    assert!(
      parse_timestamp("  ").is_err()
    );
  }

  #[test]
  fn iso_output_uses_millis_and_z() {
    let dt = Utc
      .with_ymd_and_hms(
        2026, 10, 19, 8, 0, 5
      )
      .single()
      .expect("valid instant");
    assert_eq!(
      format_iso_millis(dt),
      "2026-10-19T08:00:05.000Z"
    );
  }

  #[test]
  fn hour_conversions() {
    assert_eq!(
      hours_to_duration(0.5),
      Some(Duration::minutes(30))
    );
    assert_eq!(
      hours_to_duration(-1e20),
      None
    );
    assert_eq!(
      hours_to_duration(f64::NAN),
      None
    );
    assert!(
      (duration_to_hours(
        Duration::minutes(90)
      ) - 1.5)
        .abs()
        < f64::EPSILON
    );
    assert_eq!(
      round_hours(2.499_9),
      2.5
    );
    assert_eq!(
      round_hours(0.004),
      0.0
    );
  }
}
