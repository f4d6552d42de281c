//! TOML parser with helpful error messages

use std::path::Path;

use super::schema::DepotConfig;
use crate::error::{DepotError, Result};

/// Parse depot.toml from disk
pub fn parse_depot_toml(path: &Path) -> Result<DepotConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DepotError::io(format!("read config file {}", path.display()), e))?;

    parse_depot_toml_str(&content).map_err(|e| match e {
        DepotError::Config(message) => {
            DepotError::Config(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

/// Parse depot.toml content and validate it
pub fn parse_depot_toml_str(content: &str) -> Result<DepotConfig> {
    let config: DepotConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;
    config.validate()?;
    Ok(config)
}

/// Serialize a configuration to a TOML string
pub fn to_toml(config: &DepotConfig) -> Result<String> {
    toml::to_string_pretty(config)
        .map_err(|e| DepotError::Config(format!("failed to serialize configuration: {e}")))
}

fn enhance_toml_error(error: toml::de::Error, content: &str) -> DepotError {
    let message = error.message().to_string();
    let line = error
        .span()
        .map(|span| content[..span.start.min(content.len())].matches('\n').count() + 1);

    match line {
        Some(line_num) => DepotError::Config(format!(
            "TOML parsing error at line {line_num}:\n{}\n\nError: {message}",
            line_context(content, line_num)
        )),
        None => DepotError::Config(format!("TOML parsing error: {message}")),
    }
}

fn line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{marker} {num:4} | {line}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_all_sections() {
        let toml = r#"
[deployment]
target_dir = "/srv/www"
service_name = "shop"
local_archive = "/tmp/site.zip"
backup_dir = "/srv/backups"
service_command = "/usr/bin/systemctl"
service_args = ["{action}", "{name}.service"]

[artifact_api]
base_url = "https://artifacts.example.com"
terminal_id = "T1"
tag = "v1.2"
timeout_secs = 60
required = true

[server]
bind = "0.0.0.0:9000"
store_root = "/srv/artifacts"
"#;

        let config = parse_depot_toml_str(toml).unwrap();
        assert_eq!(config.deployment.target_dir, PathBuf::from("/srv/www"));
        assert_eq!(config.deployment.service_args[1], "{name}.service");
        assert_eq!(config.artifact_api.timeout_secs, 60);
        assert!(config.artifact_api.required);
        assert_eq!(config.server.bind_addr().unwrap().port(), 9000);
        // Unset keys in a present section keep their defaults.
        assert_eq!(
            config.deployment.default_archive,
            PathBuf::from("artifacts/packages/site.zip")
        );
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(parse_depot_toml_str("").unwrap(), DepotConfig::default());
    }

    #[test]
    fn syntax_error_reports_line() {
        let toml = "[deployment]\ntarget_dir = \"/srv\"\nservice_name = [unclosed\n";
        let err = parse_depot_toml_str(toml).unwrap_err().to_string();
        assert!(err.contains("TOML parsing error"), "{err}");
        assert!(err.contains(">>>"), "{err}");
    }

    #[test]
    fn error_points_at_offending_line() {
        let err = parse_depot_toml_str("[deployment]\nbogus = 1\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("at line 2"), "{err}");
        assert!(err.contains(">>>    2 | bogus = 1"), "{err}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_depot_toml_str("[deployment]\ntarget = \"/srv\"\n").unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn validation_runs_after_parse() {
        let err = parse_depot_toml_str("[artifact_api]\nterminal_id = \"a b\"\n").unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = DepotConfig::new();
        config.artifact_api.base_url = Some("http://localhost:8080/".to_string());
        config.server.store_root = Some(PathBuf::from("/srv/artifacts"));

        let text = to_toml(&config).unwrap();
        assert_eq!(parse_depot_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn file_errors_carry_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind = \"not an address\"").unwrap();

        let err = parse_depot_toml(file.path()).unwrap_err().to_string();
        assert!(err.contains(&file.path().display().to_string()), "{err}");

        let missing = parse_depot_toml(Path::new("/nonexistent/depot.toml")).unwrap_err();
        assert!(missing.is_not_found());
    }
}
