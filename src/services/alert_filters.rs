//! Alert-filter rule files.
//!
//! A rule file lives at `<settings_dir>/alertfilters/<name>.alertfilter`
//! and holds repeated `<alertfilter>` elements, each with `ruleId`,
//! `newLevel`, `url`, `urlIsRegex`, `parameter`, and `enabled` children.
//! Each parsed rule becomes one `alertFilter/addAlertFilter` action call.

use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::info;

use crate::domain::errors::{ScanError, ScanResult};
use crate::domain::ports::control_api::{ApiCategory, ControlApi};

/// Directory under the scanner settings dir holding rule files.
pub const ALERT_FILTERS_DIR: &str = "alertfilters";

/// Extension of a rule file.
pub const ALERT_FILTER_EXTENSION: &str = ".alertfilter";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertFilterRule {
    pub rule_id: String,
    pub new_level: String,
    pub url: String,
    pub url_is_regex: String,
    pub parameter: String,
    pub enabled: String,
}

/// Location of the rule file named by the context configuration.
pub fn rule_file_path(settings_dir: &str, name: &str) -> PathBuf {
    Path::new(settings_dir)
        .join(ALERT_FILTERS_DIR)
        .join(format!("{name}{ALERT_FILTER_EXTENSION}"))
}

/// Parse every `<alertfilter>` element of a rule file.
pub fn parse_rules(path: &Path, content: &str) -> ScanResult<Vec<AlertFilterRule>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut rules = Vec::new();
    let mut current: Option<AlertFilterRule> = None;
    let mut field: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "alertfilter" {
                    current = Some(AlertFilterRule::default());
                } else if current.is_some() {
                    field = Some(name);
                }
            }
            Ok(Event::Text(ref t)) => {
                if let (Some(rule), Some(name)) = (current.as_mut(), field.as_deref()) {
                    let text = t.unescape().map_err(|e| ScanError::AlertFilterParse {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    })?;
                    let value = text.trim().to_string();
                    match name {
                        "ruleId" => rule.rule_id = value,
                        "newLevel" => rule.new_level = value,
                        "url" => rule.url = value,
                        "urlIsRegex" => rule.url_is_regex = value,
                        "parameter" => rule.parameter = value,
                        "enabled" => rule.enabled = value,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "alertfilter" {
                    if let Some(rule) = current.take() {
                        if rule.rule_id.is_empty() || rule.new_level.is_empty() {
                            return Err(ScanError::AlertFilterParse {
                                path: path.to_path_buf(),
                                reason: "alertfilter element is missing ruleId or newLevel"
                                    .to_string(),
                            });
                        }
                        rules.push(rule);
                    }
                } else {
                    field = None;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ScanError::AlertFilterParse {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
        buf.clear();
    }
    Ok(rules)
}

/// Push every parsed rule into the scanner for the given context.
pub async fn apply_rules(
    api: &dyn ControlApi,
    context_id: &str,
    rules: &[AlertFilterRule],
) -> ScanResult<()> {
    for (i, rule) in rules.iter().enumerate() {
        info!(
            index = i + 1,
            rule_id = %rule.rule_id,
            new_level = %rule.new_level,
            url = %rule.url,
            "adding alert filter"
        );
        api.call(
            "alertFilter",
            ApiCategory::Action,
            "addAlertFilter",
            &[
                ("contextId", context_id.to_string()),
                ("ruleId", rule.rule_id.clone()),
                ("newLevel", rule.new_level.clone()),
                ("url", rule.url.clone()),
                ("urlIsRegex", rule.url_is_regex.clone()),
                ("parameter", rule.parameter.clone()),
                ("enabled", rule.enabled.clone()),
            ],
        )
        .await?;
    }
    Ok(())
}
