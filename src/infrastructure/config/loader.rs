use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{
    AuthMethod, ReportMethod, ScanConfig, SessionMode,
};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is missing, provided value was empty")]
    EmptyField(&'static str),

    #[error("scanner.port cannot be 0")]
    InvalidPort,

    #[error("scanner.startup_timeout_secs must be positive")]
    InvalidStartupTimeout,

    #[error("phases.poll_interval_secs must be positive")]
    InvalidPollInterval,

    #[error("scanner needs an install_dir, an install_env_var, or auto_install with a tool_name")]
    NoInstallSource,

    #[error("auto_install tool '{0}' is not in the tools registry")]
    UnknownTool(String),

    #[error("{field} still contains an unexpanded placeholder: [ {value} ]")]
    UnexpandedPlaceholder { field: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. The YAML file at `path`
    /// 3. Environment variables (ZAPDRIVER_* prefix, highest priority)
    ///
    /// After merging, `${VAR}` placeholders are expanded from the
    /// environment and the result is validated.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<ScanConfig> {
        let mut config: ScanConfig = Figment::new()
            .merge(Serialized::defaults(ScanConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("ZAPDRIVER_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::expand(&mut config, |name| std::env::var(name).ok())?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Expand `${VAR}` placeholders in every user-facing string field.
    ///
    /// A placeholder whose variable the lookup cannot resolve is left in
    /// place and reported as an error, naming the field.
    pub fn expand<F>(config: &mut ScanConfig, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut fields: Vec<(String, &mut String)> = vec![
            ("scanner.host".into(), &mut config.scanner.host),
            ("target_url".into(), &mut config.target_url),
            ("context.name".into(), &mut config.context.name),
            ("context.include_urls".into(), &mut config.context.include_urls),
            ("context.exclude_urls".into(), &mut config.context.exclude_urls),
        ];
        if let Some(dir) = config.scanner.install_dir.as_mut() {
            fields.push(("scanner.install_dir".into(), dir));
        }
        if let Some(dir) = config.scanner.settings_dir.as_mut() {
            fields.push(("scanner.settings_dir".into(), dir));
        }
        for (i, arg) in config.scanner.extra_args.iter_mut().enumerate() {
            fields.push((format!("scanner.extra_args[{i}].value"), &mut arg.value));
        }
        for (key, value) in &mut config.scanner.env {
            fields.push((format!("scanner.env.{key}"), value));
        }
        match &mut config.session {
            SessionMode::Load { path } => fields.push(("session.path".into(), path)),
            SessionMode::Persist {
                filename,
                internal_sites,
                ..
            } => {
                fields.push(("session.filename".into(), filename));
                fields.push(("session.internal_sites".into(), internal_sites));
            }
        }
        if let Some(auth) = config.auth.as_mut() {
            fields.push(("auth.username".into(), &mut auth.username));
            fields.push(("auth.password".into(), &mut auth.password));
            match &mut auth.method {
                AuthMethod::FormBased { login_url, .. } => {
                    fields.push(("auth.method.login_url".into(), login_url));
                }
                AuthMethod::ScriptBased { params, .. } => {
                    for (i, p) in params.iter_mut().enumerate() {
                        fields.push((format!("auth.method.params[{i}].value"), &mut p.value));
                    }
                }
            }
        }
        if let Some(reports) = config.reports.as_mut() {
            fields.push(("reports.filename".into(), &mut reports.filename));
        }
        if let Some(tracker) = config.tracker.as_mut() {
            fields.push(("tracker.base_url".into(), &mut tracker.base_url));
            fields.push(("tracker.username".into(), &mut tracker.username));
            fields.push(("tracker.password".into(), &mut tracker.password));
            fields.push(("tracker.project_key".into(), &mut tracker.project_key));
            fields.push(("tracker.assignee".into(), &mut tracker.assignee));
        }

        for (name, value) in fields {
            let expanded = expand_str(value, &lookup);
            if let Some(start) = expanded.find("${") {
                let tail = &expanded[start..];
                return Err(ConfigError::UnexpandedPlaceholder {
                    field: name,
                    value: tail.split_whitespace().next().unwrap_or(tail).to_string(),
                });
            }
            *value = expanded;
        }
        Ok(())
    }

    /// Validate configuration after loading and expansion
    pub fn validate(config: &ScanConfig) -> Result<(), ConfigError> {
        if config.scanner.host.trim().is_empty() {
            return Err(ConfigError::EmptyField("scanner.host"));
        }
        if config.scanner.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if config.scanner.startup_timeout_secs == 0 {
            return Err(ConfigError::InvalidStartupTimeout);
        }
        if config.phases.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }

        let s = &config.scanner;
        if s.install_dir.is_none() && s.install_env_var.is_none() && !s.auto_install {
            return Err(ConfigError::NoInstallSource);
        }
        if s.auto_install {
            let tool = s
                .tool_name
                .as_deref()
                .ok_or(ConfigError::EmptyField("scanner.tool_name"))?;
            if !config.tools.contains_key(tool) {
                return Err(ConfigError::UnknownTool(tool.to_string()));
            }
        }

        if config.context.name.trim().is_empty() {
            return Err(ConfigError::EmptyField("context.name"));
        }

        let any_phase = config.phases.spider.is_some()
            || config.phases.ajax_spider.is_some()
            || config.phases.active_scan.is_some();
        if any_phase && config.target_url.trim().is_empty() {
            return Err(ConfigError::EmptyField("target_url"));
        }

        match &config.session {
            SessionMode::Load { path } if path.trim().is_empty() => {
                return Err(ConfigError::EmptyField("session.path"));
            }
            SessionMode::Persist { filename, .. } if filename.trim().is_empty() => {
                return Err(ConfigError::EmptyField("session.filename"));
            }
            _ => {}
        }

        if let Some(auth) = &config.auth {
            if auth.username.trim().is_empty() {
                return Err(ConfigError::EmptyField("auth.username"));
            }
            if auth.password.is_empty() {
                return Err(ConfigError::EmptyField("auth.password"));
            }
            match &auth.method {
                AuthMethod::FormBased {
                    login_url,
                    username_param,
                    password_param,
                    ..
                } => {
                    if login_url.trim().is_empty() {
                        return Err(ConfigError::EmptyField("auth.method.login_url"));
                    }
                    if username_param.trim().is_empty() {
                        return Err(ConfigError::EmptyField("auth.method.username_param"));
                    }
                    if password_param.trim().is_empty() {
                        return Err(ConfigError::EmptyField("auth.method.password_param"));
                    }
                }
                AuthMethod::ScriptBased { script_name, .. } => {
                    if script_name.trim().is_empty() {
                        return Err(ConfigError::EmptyField("auth.method.script_name"));
                    }
                }
            }
        }

        if let Some(reports) = &config.reports {
            if reports.filename.trim().is_empty() {
                return Err(ConfigError::EmptyField("reports.filename"));
            }
            let formats = match &reports.method {
                ReportMethod::Builtin { formats } | ReportMethod::Export { formats, .. } => formats,
            };
            if formats.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "reports.method.formats cannot be empty".to_string(),
                ));
            }
        }

        if let Some(tracker) = &config.tracker {
            if tracker.base_url.trim().is_empty() {
                return Err(ConfigError::EmptyField("tracker.base_url"));
            }
            if tracker.project_key.trim().is_empty() {
                return Err(ConfigError::EmptyField("tracker.project_key"));
            }
        }

        Ok(())
    }
}

/// Replace every `${VAR}` whose variable the lookup resolves; unresolved
/// placeholders are kept verbatim for the caller to flag.
fn expand_str<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::ContextConfig;

    fn minimal_config() -> ScanConfig {
        ScanConfig {
            scanner: crate::domain::models::config::ScannerConfig {
                install_dir: Some("/opt/zaproxy".into()),
                ..Default::default()
            },
            context: ContextConfig {
                name: "ci".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn default_config_fails_without_install_source() {
        let config = ScanConfig {
            context: ContextConfig {
                name: "ci".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::NoInstallSource)
        ));
    }

    #[test]
    fn minimal_config_validates() {
        ConfigLoader::validate(&minimal_config()).expect("minimal config should be valid");
    }

    #[test]
    fn empty_context_name_is_rejected() {
        let mut config = minimal_config();
        config.context.name = "  ".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyField("context.name"))
        ));
    }

    #[test]
    fn phases_require_a_target_url() {
        let mut config = minimal_config();
        config.phases.spider = Some(Default::default());
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyField("target_url"))
        ));
        config.target_url = "https://example.com".into();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn auto_install_needs_a_registered_tool() {
        let mut config = minimal_config();
        config.scanner.install_dir = None;
        config.scanner.auto_install = true;
        config.scanner.tool_name = Some("zap-2.12".into());
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::UnknownTool(_))
        ));
        config
            .tools
            .insert("zap-2.12".into(), "/opt/tools/zap-2.12".into());
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn placeholders_expand_from_lookup() {
        let mut config = minimal_config();
        config.target_url = "https://${STAGING_HOST}/app".into();
        config
            .scanner
            .env
            .insert("JAVA_HOME".into(), "${BUILD_JDK}".into());
        ConfigLoader::expand(&mut config, |name| match name {
            "STAGING_HOST" => Some("stage.example.com".to_string()),
            "BUILD_JDK" => Some("/opt/jdk17".to_string()),
            _ => None,
        })
        .expect("expansion should succeed");
        assert_eq!(config.target_url, "https://stage.example.com/app");
        assert_eq!(
            config.scanner.env.get("JAVA_HOME").map(String::as_str),
            Some("/opt/jdk17")
        );
    }

    #[test]
    fn unresolved_placeholder_names_the_field() {
        let mut config = minimal_config();
        config.context.include_urls = "https://${NOPE}/.*".into();
        let err = ConfigLoader::expand(&mut config, |_| None).unwrap_err();
        match err {
            ConfigError::UnexpandedPlaceholder { field, value } => {
                assert_eq!(field, "context.include_urls");
                assert!(value.contains("${NOPE}"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn expand_str_handles_multiple_and_literal_text() {
        let out = expand_str("${A}-mid-${B}", &|name: &str| Some(name.to_lowercase()));
        assert_eq!(out, "a-mid-b");
        let out = expand_str("no placeholders", &|_| None);
        assert_eq!(out, "no placeholders");
    }

    #[test]
    fn yaml_parses_into_scan_config() {
        let yaml = r"
scanner:
  install_dir: /opt/zaproxy
  host: 127.0.0.1
  port: 8090
context:
  name: ci
  include_urls: |
    https://example.com/.*
target_url: https://example.com
phases:
  spider:
    recurse: true
";
        let config: ScanConfig = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.scanner.port, 8090);
        assert!(config.phases.spider.is_some());
        ConfigLoader::validate(&config).expect("parsed config should be valid");
    }
}
