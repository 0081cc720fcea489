//! Application identity: name derivation, reachable URLs, and the
//! environment handed to every started instance.

use std::collections::HashMap;

use crate::domain::error::AppNameError;

/// Environment marker injected into every started instance.
pub const APP_ENV_VALUE: &str = "prod";

/// Derive the application name from its repository URL.
///
/// Strips one trailing path separator, then a case-insensitive `.git`
/// suffix, then takes the segment after the last `/` or `\`.
///
/// # Errors
///
/// Returns an error when the URL yields an empty name.
pub fn name_from_url(repo_url: &str) -> Result<String, AppNameError> {
    let trimmed = repo_url.strip_suffix(['/', '\\']).unwrap_or(repo_url);
    let trimmed = match trimmed.len().checked_sub(4).and_then(|i| trimmed.get(i..)) {
        Some(tail) if tail.eq_ignore_ascii_case(".git") => &trimmed[..trimmed.len() - 4],
        _ => trimmed,
    };
    let start = trimmed.rfind(['/', '\\']).map_or(0, |i| i + 1);
    let name = &trimmed[start..];
    if name.is_empty() {
        return Err(AppNameError::Empty {
            url: repo_url.to_owned(),
        });
    }
    Ok(name.to_owned())
}

/// The URL the application answers on once a deployment completes.
#[must_use]
pub fn reachable_url(host: &str, port: u16, name: &str) -> String {
    format!("http://{host}:{port}/{name}")
}

/// Environment for a new instance: the full inherited process environment
/// overridden with the allocated port, the application name, and the fixed
/// environment marker.
#[must_use]
pub fn app_env_vars(port: u16, name: &str) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    env.insert("APP_PORT".to_owned(), port.to_string());
    env.insert("APP_NAME".to_owned(), name.to_owned());
    env.insert("APP_ENV".to_owned(), APP_ENV_VALUE.to_owned());
    env
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn name_strips_git_suffix() {
        assert_eq!(
            name_from_url("https://example.com/org/my-app.git").unwrap(),
            "my-app"
        );
    }

    #[test]
    fn name_strips_trailing_separator() {
        assert_eq!(
            name_from_url("https://example.com/org/my-app/").unwrap(),
            "my-app"
        );
    }

    #[test]
    fn name_from_windows_path() {
        assert_eq!(name_from_url("C:\\repos\\my-app").unwrap(), "my-app");
    }

    #[test]
    fn name_strips_git_suffix_case_insensitively() {
        assert_eq!(name_from_url("git@host:team/Thing.GIT").unwrap(), "Thing");
    }

    #[test]
    fn bare_name_passes_through() {
        assert_eq!(name_from_url("my-app").unwrap(), "my-app");
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = name_from_url("https://example.com/").expect_err("expected Err");
        assert!(err.to_string().contains("https://example.com/"));
    }

    #[test]
    fn reachable_url_shape() {
        assert_eq!(
            reachable_url("localhost", 8080, "my-app"),
            "http://localhost:8080/my-app"
        );
    }

    #[test]
    fn env_vars_override_and_inherit() {
        let env = app_env_vars(9001, "my-app");
        assert_eq!(env.get("APP_PORT").map(String::as_str), Some("9001"));
        assert_eq!(env.get("APP_NAME").map(String::as_str), Some("my-app"));
        assert_eq!(env.get("APP_ENV").map(String::as_str), Some("prod"));
        // The rest of the process environment rides along untouched.
        let inherited: usize = std::env::vars()
            .filter(|(k, _)| !matches!(k.as_str(), "APP_PORT" | "APP_NAME" | "APP_ENV"))
            .filter(|(k, v)| env.get(k).is_some_and(|have| have == v))
            .count();
        assert!(inherited > 0, "expected inherited environment entries");
    }
}
