//! Context, scope, and authentication setup.
//!
//! Setup order is fixed: create the context, add the include and exclude
//! patterns, push alert filters, then configure authentication and the
//! forced user. Context creation and authentication are fatal when they
//! fail; individual scope patterns are logged and skipped.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::errors::{ScanError, ScanResult};
use crate::domain::models::config::{pattern_lines, AuthConfig, AuthMethod, ContextConfig};
use crate::domain::ports::control_api::{ApiCategory, ControlApi};
use crate::services::alert_filters;

/// IDs produced by context and user setup, consumed by the phase runner.
#[derive(Debug, Clone, Default)]
pub struct ContextIds {
    pub context_id: String,
    pub user_id: Option<String>,
    /// False when a non-fatal setup step failed.
    pub clean: bool,
}

pub struct ContextService {
    api: Arc<dyn ControlApi>,
}

impl ContextService {
    pub fn new(api: Arc<dyn ControlApi>) -> Self {
        Self { api }
    }

    /// Create the context and configure its scope, filters, and auth.
    pub async fn configure(
        &self,
        context: &ContextConfig,
        auth: Option<&AuthConfig>,
        settings_dir: Option<&str>,
        filter_file: Option<(&std::path::Path, String)>,
    ) -> ScanResult<ContextIds> {
        let mut clean = true;

        let context_id = self.create_context(&context.name).await?;
        info!(context = %context.name, context_id, "context created");

        clean &= self
            .apply_patterns("includeInContext", &context.name, &context.include_urls)
            .await;
        clean &= self
            .apply_patterns("excludeFromContext", &context.name, &context.exclude_urls)
            .await;

        match (&context.alert_filters, filter_file) {
            (Some(_name), Some((path, content))) => {
                let rules = alert_filters::parse_rules(path, &content)?;
                info!(path = %path.display(), count = rules.len(), "applying alert filters");
                alert_filters::apply_rules(self.api.as_ref(), &context_id, &rules).await?;
            }
            (Some(name), None) => {
                // Config names a filter file but no settings dir was given.
                warn!(filter = %name, ?settings_dir, "alert filter file not available, skipping");
                clean = false;
            }
            (None, _) => info!("no alert filters configured"),
        }

        let user_id = match auth {
            Some(auth) => Some(self.configure_auth(&context_id, auth).await?),
            None => None,
        };

        Ok(ContextIds {
            context_id,
            user_id,
            clean,
        })
    }

    async fn create_context(&self, name: &str) -> ScanResult<String> {
        let response = self
            .api
            .call(
                "context",
                ApiCategory::Action,
                "newContext",
                &[("contextName", name.to_string())],
            )
            .await?;
        Ok(response.element_value()?.to_string())
    }

    /// Apply one include or exclude call per non-blank trimmed line.
    /// Failed lines are logged and skipped; returns false if any failed.
    async fn apply_patterns(&self, method: &str, context_name: &str, block: &str) -> bool {
        let mut clean = true;
        for pattern in pattern_lines(block) {
            let result = self
                .api
                .call(
                    "context",
                    ApiCategory::Action,
                    method,
                    &[
                        ("contextName", context_name.to_string()),
                        ("regex", pattern.to_string()),
                    ],
                )
                .await;
            match result {
                Ok(_) => info!(method, pattern, "scope pattern applied"),
                Err(e) => {
                    warn!(method, pattern, error = %e, "scope pattern rejected, continuing");
                    clean = false;
                }
            }
        }
        clean
    }

    /// Configure the authentication method, credentials, and forced user.
    /// Any failure here is fatal: a half-authenticated scan is worthless.
    async fn configure_auth(&self, context_id: &str, auth: &AuthConfig) -> ScanResult<String> {
        let (method_name, config_string) = auth_method_config(&auth.method)?;
        info!(method = method_name, "configuring authentication");

        self.api
            .call(
                "authentication",
                ApiCategory::Action,
                "setAuthenticationMethod",
                &[
                    ("contextId", context_id.to_string()),
                    ("authMethodName", method_name.to_string()),
                    ("authMethodConfigParams", config_string),
                ],
            )
            .await?;

        if !auth.logged_in_indicator.trim().is_empty() {
            self.api
                .call(
                    "authentication",
                    ApiCategory::Action,
                    "setLoggedInIndicator",
                    &[
                        ("contextId", context_id.to_string()),
                        ("loggedInIndicatorRegex", auth.logged_in_indicator.clone()),
                    ],
                )
                .await?;
        }
        if !auth.logged_out_indicator.trim().is_empty() {
            self.api
                .call(
                    "authentication",
                    ApiCategory::Action,
                    "setLoggedOutIndicator",
                    &[
                        ("contextId", context_id.to_string()),
                        ("loggedOutIndicatorRegex", auth.logged_out_indicator.clone()),
                    ],
                )
                .await?;
        }

        let user_id = self
            .api
            .call(
                "users",
                ApiCategory::Action,
                "newUser",
                &[
                    ("contextId", context_id.to_string()),
                    ("name", auth.username.clone()),
                ],
            )
            .await?
            .element_value()?
            .to_string();
        info!(user = %auth.username, user_id, "scan user created");

        self.api
            .call(
                "users",
                ApiCategory::Action,
                "setAuthenticationCredentials",
                &[
                    ("contextId", context_id.to_string()),
                    ("userId", user_id.clone()),
                    (
                        "authCredentialsConfigParams",
                        credentials_config(&auth.method, &auth.username, &auth.password),
                    ),
                ],
            )
            .await?;

        self.api
            .call(
                "users",
                ApiCategory::Action,
                "setUserEnabled",
                &[
                    ("contextId", context_id.to_string()),
                    ("userId", user_id.clone()),
                    ("enabled", "true".to_string()),
                ],
            )
            .await?;

        self.api
            .call(
                "forcedUser",
                ApiCategory::Action,
                "setForcedUser",
                &[
                    ("contextId", context_id.to_string()),
                    ("userId", user_id.clone()),
                ],
            )
            .await?;
        self.api
            .call(
                "forcedUser",
                ApiCategory::Action,
                "setForcedUserModeEnabled",
                &[("boolean", "true".to_string())],
            )
            .await?;

        Ok(user_id)
    }
}

/// Build the authentication-method name and its URL-encoded config string.
fn auth_method_config(method: &AuthMethod) -> ScanResult<(&'static str, String)> {
    match method {
        AuthMethod::FormBased {
            login_url,
            username_param,
            password_param,
            extra_post_data,
        } => {
            if login_url.trim().is_empty() {
                return Err(ScanError::MissingField("auth.method.login_url"));
            }
            let mut request_data =
                format!("{username_param}={{%username%}}&{password_param}={{%password%}}");
            if !extra_post_data.trim().is_empty() {
                request_data.push('&');
                request_data.push_str(extra_post_data);
            }
            let config = format!(
                "loginUrl={}&loginRequestData={}",
                urlencoding::encode(login_url),
                urlencoding::encode(&request_data)
            );
            Ok(("formBasedAuthentication", config))
        }
        AuthMethod::ScriptBased {
            script_name,
            params,
        } => {
            if script_name.trim().is_empty() {
                return Err(ScanError::MissingField("auth.method.script_name"));
            }
            let mut config = format!("scriptName={}", urlencoding::encode(script_name));
            for param in params {
                config.push('&');
                config.push_str(&urlencoding::encode(&param.name));
                config.push('=');
                config.push_str(&urlencoding::encode(&param.value));
            }
            Ok(("scriptBasedAuthentication", config))
        }
    }
}

/// Credentials config string. The key casing differs per method: the
/// form-based authenticator expects lowercase keys, the script-based one
/// capitalized keys.
fn credentials_config(method: &AuthMethod, username: &str, password: &str) -> String {
    let (user_key, pass_key) = match method {
        AuthMethod::FormBased { .. } => ("username", "password"),
        AuthMethod::ScriptBased { .. } => ("Username", "Password"),
    };
    format!(
        "{user_key}={}&{pass_key}={}",
        urlencoding::encode(username),
        urlencoding::encode(password)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::ScriptParam;

    #[test]
    fn form_config_string_encodes_url_and_request_data() {
        let method = AuthMethod::FormBased {
            login_url: "https://example.com/login?next=/home".into(),
            username_param: "user".into(),
            password_param: "pass".into(),
            extra_post_data: String::new(),
        };
        let (name, config) = auth_method_config(&method).unwrap();
        assert_eq!(name, "formBasedAuthentication");
        assert!(config.starts_with("loginUrl=https%3A%2F%2Fexample.com%2Flogin%3Fnext%3D%2Fhome"));
        assert!(config.contains("loginRequestData=user%3D%7B%25username%25%7D%26pass%3D%7B%25password%25%7D"));
    }

    #[test]
    fn form_config_appends_extra_post_data() {
        let method = AuthMethod::FormBased {
            login_url: "https://example.com/login".into(),
            username_param: "u".into(),
            password_param: "p".into(),
            extra_post_data: "csrf=token".into(),
        };
        let (_, config) = auth_method_config(&method).unwrap();
        let decoded = urlencoding::decode(config.split("loginRequestData=").nth(1).unwrap())
            .unwrap()
            .into_owned();
        assert_eq!(decoded, "u={%username%}&p={%password%}&csrf=token");
    }

    #[test]
    fn script_config_string_encodes_each_param() {
        let method = AuthMethod::ScriptBased {
            script_name: "login script.js".into(),
            params: vec![ScriptParam {
                name: "realm".into(),
                value: "staging env".into(),
            }],
        };
        let (name, config) = auth_method_config(&method).unwrap();
        assert_eq!(name, "scriptBasedAuthentication");
        assert_eq!(config, "scriptName=login%20script.js&realm=staging%20env");
    }

    #[test]
    fn credential_key_casing_differs_per_method() {
        let form = AuthMethod::FormBased {
            login_url: "x".into(),
            username_param: "u".into(),
            password_param: "p".into(),
            extra_post_data: String::new(),
        };
        let script = AuthMethod::ScriptBased {
            script_name: "s".into(),
            params: vec![],
        };
        assert_eq!(
            credentials_config(&form, "ci", "secret"),
            "username=ci&password=secret"
        );
        assert_eq!(
            credentials_config(&script, "ci", "secret"),
            "Username=ci&Password=secret"
        );
    }

    #[test]
    fn empty_login_url_is_a_missing_field() {
        let method = AuthMethod::FormBased {
            login_url: " ".into(),
            username_param: "u".into(),
            password_param: "p".into(),
            extra_post_data: String::new(),
        };
        assert!(matches!(
            auth_method_config(&method),
            Err(ScanError::MissingField("auth.method.login_url"))
        ));
    }
}
