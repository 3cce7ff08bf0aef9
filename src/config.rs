//! Runtime configuration, read from the process environment.
//! A `.env` file can seed the environment first; see `load_env_file`.

use crate::client::TimeWindow;
use crate::models::dap::{ContextId, DeviceAggregationId, ProfileId, ScenarioId};
use crate::services::export::{DEFAULT_WORKING_DIR, DeviceSelector, ExportRequest};
use crate::utils::parse_timestamp;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

pub const TOKEN_FILE: &str = "token.txt";

#[derive(Debug, Clone)]
pub struct Config {
    /// DAP root, e.g. `https://dap.example.org` (the `/api/v1` prefix is added per request).
    pub base_url: String,
    pub private_token: String,
    /// Off by default; the platform serves self-signed certificates.
    pub verify_tls: bool,
    pub request: ExportRequest,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok(), Path::new(TOKEN_FILE))
    }

    /// Build from an arbitrary variable source. `token_file` is read only when
    /// `DAP_PRIVATE_TOKEN` is unset or blank.
    pub fn from_lookup<F>(lookup: F, token_file: &Path) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = var("DAP_BASE_URL").ok_or_else(|| "Missing DAP_BASE_URL".to_string())?;

        let private_token = match var("DAP_PRIVATE_TOKEN") {
            Some(v) => v,
            None => match fs::read_to_string(token_file) {
                Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
                _ => {
                    return Err(format!(
                        "Missing private token: set DAP_PRIVATE_TOKEN or provide {} in working directory",
                        token_file.display()
                    ));
                }
            },
        };

        let verify_tls = var("DAP_VERIFY_TLS")
            .map(|s| matches!(s.as_str(), "1" | "true" | "TRUE"))
            .unwrap_or(false);

        let context_id = ContextId(parse_id("CONTEXT_ID", var("CONTEXT_ID"))?.ok_or("Missing CONTEXT_ID")?);
        let scenario_id = parse_id("SCENARIO_ID", var("SCENARIO_ID"))?.map(ScenarioId);

        let devices = match (var("DEVICE_AGGREGATION_IDS"), parse_id("PROFILE_ID", var("PROFILE_ID"))?) {
            (Some(list), _) => DeviceSelector::Aggregations(parse_id_list("DEVICE_AGGREGATION_IDS", &list)?),
            (None, Some(profile)) => DeviceSelector::Profile(ProfileId(profile)),
            (None, None) => return Err("Missing PROFILE_ID (or DEVICE_AGGREGATION_IDS)".to_string()),
        };

        let window = TimeWindow {
            from: parse_bound("TIME_FROM", var("TIME_FROM"))?,
            to: parse_bound("TIME_TO", var("TIME_TO"))?,
        };
        if let (Some(from), Some(to)) = (window.from, window.to)
            && from > to
        {
            return Err(format!("TIME_FROM ({}) is after TIME_TO ({})", from, to));
        }

        let mut request = ExportRequest::new(context_id, scenario_id, devices);
        request.window = window;
        // Prefix is taken verbatim; whitespace may be intentional.
        request.file_name_prefix = lookup("FILE_NAME_PREFIX").unwrap_or_default();
        request.working_dir = PathBuf::from(var("WORKING_DIR").unwrap_or_else(|| DEFAULT_WORKING_DIR.to_string()));

        Ok(Config {
            base_url,
            private_token,
            verify_tls,
            request,
        })
    }
}

fn parse_id(key: &str, raw: Option<String>) -> Result<Option<i64>, String> {
    raw.map(|s| s.parse::<i64>().map_err(|_| format!("{} must be an integer id, got {:?}", key, s)))
        .transpose()
}

fn parse_id_list(key: &str, raw: &str) -> Result<Vec<DeviceAggregationId>, String> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map(DeviceAggregationId)
                .map_err(|_| format!("{} must be comma-separated integer ids, got {:?}", key, s))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        return Err(format!("{} is set but lists no ids", key));
    }
    Ok(ids)
}

fn parse_bound(key: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>, String> {
    raw.map(|s| parse_timestamp(&s).map_err(|_| format!("{} must be RFC 3339 or YYYY-MM-DD, got {:?}", key, s)))
        .transpose()
}

/// Load `KEY=VALUE` lines into the process environment.
///
/// Variables already present in the environment are left alone. Supports `export` prefixes,
/// `#` comments and single- or double-quoted values.
pub fn load_env_file(path: &Path) -> Result<usize, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let mut applied = 0;
    for (index, line) in content.lines().enumerate() {
        let parsed = parse_env_line(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?;
        if let Some((key, value)) = parsed
            && std::env::var_os(&key).is_none()
        {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
            applied += 1;
        }
    }
    Ok(applied)
}

fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let (key, raw) = line.split_once('=').ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(format!("invalid variable name {:?}", key));
    }

    let raw = raw.trim();
    let (value, trailing) = if let Some(rest) = raw.strip_prefix('"') {
        unquote_double(rest)?
    } else if let Some(rest) = raw.strip_prefix('\'') {
        let end = rest.find('\'').ok_or_else(|| "unterminated single quote".to_string())?;
        (rest[..end].to_string(), &rest[end + 1..])
    } else {
        let value = raw.split('#').next().unwrap_or_default().trim_end().to_string();
        (value, "")
    };

    let trailing = trailing.trim();
    if !trailing.is_empty() && !trailing.starts_with('#') {
        return Err("unexpected characters after closing quote".to_string());
    }
    Ok(Some((key.to_string(), value)))
}

/// Read a double-quoted value up to its closing quote, resolving `\n \r \t \\ \"` escapes.
/// Returns the value and whatever follows the closing quote.
fn unquote_double(input: &str) -> Result<(String, &str), String> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' => {
                let (_, escaped) = chars
                    .next()
                    .ok_or_else(|| "unterminated escape sequence in double-quoted value".to_string())?;
                value.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            '"' => return Ok((value, &input[i + 1..])),
            other => value.push(other),
        }
    }
    Err("unterminated double quote".to_string())
}
