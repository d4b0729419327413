//! Raw `[hosts.<id>]` tables as they appear in TOML, and their validation
//! into [`HostDescriptor`]s.

use std::collections::BTreeMap;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::descriptor::{
    AuthKind, BodyFormat, Endpoints, FormFields, HostDescriptor, PollSettings, ProtocolShape,
    ResponseRules,
};
use crate::error::{HostError, Result};
use crate::rule::ResponseRule;

const DEFAULT_MAX_CONNECTIONS_PER_HOST: i64 = 2;
const DEFAULT_GLOBAL_HINT: i64 = 3;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct HostEntry {
    display_name: Option<String>,
    auth_kind: Option<AuthKind>,
    protocol: Option<ProtocolShape>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default)]
    max_file_size: i64,
    #[serde(default = "default_global_hint")]
    max_connections_global_hint: i64,
    #[serde(default = "default_per_host")]
    max_connections_per_host: i64,
    #[serde(default)]
    token_ttl: i64,
    #[serde(default)]
    stale_auth_patterns: Vec<String>,
    api_key_header: Option<String>,
    session_cookie: Option<String>,
    #[serde(default)]
    init_format: BodyFormat,
    #[serde(default)]
    send_hash: bool,
    #[serde(default)]
    verifies_hash: bool,
    #[serde(default)]
    supports_gallery: bool,
    #[serde(default)]
    endpoints: EndpointsEntry,
    #[serde(default)]
    fields: FieldsEntry,
    #[serde(default)]
    rules: RulesEntry,
    #[serde(default)]
    poll: PollEntry,
}

fn enabled_by_default() -> bool {
    true
}

fn default_global_hint() -> i64 {
    DEFAULT_GLOBAL_HINT
}

fn default_per_host() -> i64 {
    DEFAULT_MAX_CONNECTIONS_PER_HOST
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EndpointsEntry {
    upload: Option<String>,
    gallery_create: Option<String>,
    login: Option<String>,
    login_page: Option<String>,
    upload_page: Option<String>,
    init: Option<String>,
    poll: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldsEntry {
    file: Option<String>,
    username: Option<String>,
    password: Option<String>,
    api_key: Option<String>,
    token: Option<String>,
    session_id: Option<String>,
    captcha: Option<String>,
    gallery_id: Option<String>,
    gallery_name: Option<String>,
    file_name: Option<String>,
    file_size: Option<String>,
    file_hash: Option<String>,
    upload_id: Option<String>,
    #[serde(default)]
    extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RuleEntry {
    Json(String),
    Pattern(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesEntry {
    download_url: Option<RuleEntry>,
    download_url_format: Option<String>,
    file_id: Option<RuleEntry>,
    error: Option<RuleEntry>,
    token: Option<RuleEntry>,
    token_ttl: Option<RuleEntry>,
    session_id: Option<RuleEntry>,
    upload_url: Option<RuleEntry>,
    upload_id: Option<RuleEntry>,
    transfer_fields: Option<RuleEntry>,
    dedupe_url: Option<RuleEntry>,
    poll_status: Option<RuleEntry>,
    #[serde(default)]
    poll_done: Vec<String>,
    #[serde(default)]
    poll_failed: Vec<String>,
    gallery_id: Option<RuleEntry>,
    remote_hash: Option<RuleEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PollEntry {
    interval_ms: Option<u64>,
    max_attempts: Option<u32>,
}

impl HostEntry {
    /// Validate this entry into a descriptor for host `id`.
    pub(crate) fn into_descriptor(self, id: &str) -> Result<HostDescriptor> {
        if id.trim().is_empty() {
            return Err(HostError::invalid(id, "empty host id"));
        }
        let auth_kind = self
            .auth_kind
            .ok_or_else(|| HostError::invalid(id, "missing auth_kind"))?;
        let protocol = self
            .protocol
            .ok_or_else(|| HostError::invalid(id, "missing protocol"))?;

        let max_file_size = non_negative(id, "max_file_size", self.max_file_size)?;
        let token_ttl = non_negative(id, "token_ttl", self.token_ttl)?;
        let global_hint = non_negative(id, "max_connections_global_hint", self.max_connections_global_hint)?;
        let per_host = non_negative(id, "max_connections_per_host", self.max_connections_per_host)?;
        if per_host == 0 {
            return Err(HostError::invalid(id, "max_connections_per_host must be at least 1"));
        }

        let endpoints = Endpoints {
            upload: self.endpoints.upload,
            gallery_create: self.endpoints.gallery_create,
            login: self.endpoints.login,
            login_page: self.endpoints.login_page,
            upload_page: self.endpoints.upload_page,
            init: self.endpoints.init,
            poll: self.endpoints.poll,
        };
        let rules = compile_rules(id, self.rules)?;

        require_shape(id, auth_kind, protocol, &endpoints, &rules, self.supports_gallery)?;

        let stale_auth_patterns = self
            .stale_auth_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| HostError::invalid(id, format!("stale_auth_patterns: {e}")))
            })
            .collect::<Result<Vec<Regex>>>()?;

        let defaults = FormFields::default();
        let f = self.fields;
        let fields = FormFields {
            file: f.file.unwrap_or(defaults.file),
            username: f.username.unwrap_or(defaults.username),
            password: f.password.unwrap_or(defaults.password),
            api_key: f.api_key,
            token: f.token,
            session_id: f.session_id,
            captcha: f.captcha,
            gallery_id: f.gallery_id,
            gallery_name: f.gallery_name,
            file_name: f.file_name.unwrap_or(defaults.file_name),
            file_size: f.file_size.unwrap_or(defaults.file_size),
            file_hash: f.file_hash.unwrap_or(defaults.file_hash),
            upload_id: f.upload_id.unwrap_or(defaults.upload_id),
            extra: f.extra,
        };

        if auth_kind == AuthKind::ApiKey && self.api_key_header.is_none() && fields.api_key.is_none() {
            return Err(HostError::invalid(
                id,
                "api_key hosts need api_key_header or fields.api_key",
            ));
        }

        let poll_defaults = PollSettings::default();
        let poll = PollSettings {
            interval: self
                .poll
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(poll_defaults.interval),
            max_attempts: self.poll.max_attempts.unwrap_or(poll_defaults.max_attempts),
        };
        if protocol == ProtocolShape::MultiStepWithPolling && poll.max_attempts == 0 {
            return Err(HostError::invalid(id, "poll.max_attempts must be at least 1"));
        }

        Ok(HostDescriptor {
            id: id.to_string(),
            display_name: self.display_name.unwrap_or_else(|| id.to_string()),
            auth_kind,
            protocol,
            enabled: self.enabled,
            max_file_size,
            max_connections_global_hint: clamp_u32(global_hint),
            max_connections_per_host: clamp_u32(per_host),
            token_ttl,
            endpoints,
            fields,
            rules,
            stale_auth_patterns,
            poll,
            api_key_header: self.api_key_header,
            session_cookie: self.session_cookie,
            init_format: self.init_format,
            send_hash: self.send_hash,
            verifies_hash: self.verifies_hash,
            supports_gallery: self.supports_gallery,
        })
    }
}

fn non_negative(id: &str, field: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| HostError::invalid(id, format!("{field} must not be negative")))
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn compile_rule(id: &str, name: &str, rule: RuleEntry) -> Result<ResponseRule> {
    match rule {
        RuleEntry::Json(pointer) if pointer.is_empty() || pointer.starts_with('/') => {
            Ok(ResponseRule::Json(pointer))
        }
        RuleEntry::Json(pointer) => Err(HostError::invalid(
            id,
            format!("rules.{name}: JSON pointer '{pointer}' must start with '/'"),
        )),
        RuleEntry::Pattern(pattern) => Regex::new(&pattern)
            .map(ResponseRule::Pattern)
            .map_err(|e| HostError::invalid(id, format!("rules.{name}: {e}"))),
    }
}

fn compile_opt(id: &str, name: &str, rule: Option<RuleEntry>) -> Result<Option<ResponseRule>> {
    rule.map(|r| compile_rule(id, name, r)).transpose()
}

fn compile_rules(id: &str, r: RulesEntry) -> Result<ResponseRules> {
    let download_url = r
        .download_url
        .ok_or_else(|| HostError::invalid(id, "missing rules.download_url"))?;

    Ok(ResponseRules {
        download_url: compile_rule(id, "download_url", download_url)?,
        download_url_format: r.download_url_format,
        file_id: compile_opt(id, "file_id", r.file_id)?,
        error: compile_opt(id, "error", r.error)?,
        token: compile_opt(id, "token", r.token)?,
        token_ttl: compile_opt(id, "token_ttl", r.token_ttl)?,
        session_id: compile_opt(id, "session_id", r.session_id)?,
        upload_url: compile_opt(id, "upload_url", r.upload_url)?,
        upload_id: compile_opt(id, "upload_id", r.upload_id)?,
        transfer_fields: compile_opt(id, "transfer_fields", r.transfer_fields)?,
        dedupe_url: compile_opt(id, "dedupe_url", r.dedupe_url)?,
        poll_status: compile_opt(id, "poll_status", r.poll_status)?,
        poll_done: r.poll_done,
        poll_failed: r.poll_failed,
        gallery_id: compile_opt(id, "gallery_id", r.gallery_id)?,
        remote_hash: compile_opt(id, "remote_hash", r.remote_hash)?,
    })
}

/// Check that the endpoints and rules needed by the auth kind and protocol
/// shape are all present.
fn require_shape(
    id: &str,
    auth: AuthKind,
    protocol: ProtocolShape,
    endpoints: &Endpoints,
    rules: &ResponseRules,
    supports_gallery: bool,
) -> Result<()> {
    let need = |present: bool, what: &str| {
        if present {
            Ok(())
        } else {
            Err(HostError::invalid(id, format!("{auth} / {protocol} host requires {what}")))
        }
    };

    match auth {
        AuthKind::ApiKey => {}
        AuthKind::TokenLogin => {
            need(endpoints.login.is_some(), "endpoints.login")?;
            need(rules.token.is_some(), "rules.token")?;
        }
        AuthKind::SessionLogin => {
            need(endpoints.login_page.is_some(), "endpoints.login_page")?;
            need(endpoints.login.is_some(), "endpoints.login")?;
            need(endpoints.upload_page.is_some(), "endpoints.upload_page")?;
            need(rules.session_id.is_some(), "rules.session_id")?;
        }
    }

    match protocol {
        ProtocolShape::SingleStep => need(endpoints.upload.is_some(), "endpoints.upload")?,
        ProtocolShape::MultiStep => {
            need(endpoints.init.is_some(), "endpoints.init")?;
            need(rules.upload_url.is_some(), "rules.upload_url")?;
        }
        ProtocolShape::MultiStepWithPolling => {
            need(endpoints.init.is_some(), "endpoints.init")?;
            need(endpoints.poll.is_some(), "endpoints.poll")?;
            need(rules.upload_url.is_some(), "rules.upload_url")?;
            need(rules.upload_id.is_some(), "rules.upload_id")?;
            need(rules.poll_status.is_some(), "rules.poll_status")?;
            need(!rules.poll_done.is_empty(), "rules.poll_done")?;
        }
    }

    if supports_gallery {
        need(
            endpoints.gallery_create.is_some() || endpoints.upload.is_some(),
            "endpoints.gallery_create",
        )?;
        need(rules.gallery_id.is_some(), "rules.gallery_id")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(toml_src: &str) -> HostEntry {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn minimal_api_key_single_step_validates() {
        let e = entry(
            r#"
            auth_kind = "api_key"
            protocol = "single_step"
            api_key_header = "X-Key"
            endpoints.upload = "https://h/upload"
            rules.download_url = { json = "/url" }
            "#,
        );
        let d = e.into_descriptor("h").unwrap();
        assert_eq!(d.display_name, "h");
        assert_eq!(d.max_connections_per_host, 2);
        assert_eq!(d.fields.file, "file");
        assert!(d.enabled);
    }

    #[test]
    fn negative_size_is_rejected() {
        let e = entry(
            r#"
            auth_kind = "api_key"
            protocol = "single_step"
            api_key_header = "X-Key"
            max_file_size = -1
            endpoints.upload = "https://h/upload"
            rules.download_url = { json = "/url" }
            "#,
        );
        let err = e.into_descriptor("h").unwrap_err();
        assert!(err.to_string().contains("max_file_size"), "{err}");
    }

    #[test]
    fn token_login_requires_token_rule() {
        let e = entry(
            r#"
            auth_kind = "token_login"
            protocol = "single_step"
            endpoints.upload = "https://h/upload"
            endpoints.login = "https://h/login"
            rules.download_url = { json = "/url" }
            "#,
        );
        let err = e.into_descriptor("h").unwrap_err();
        assert!(err.to_string().contains("rules.token"), "{err}");
    }

    #[test]
    fn polling_requires_done_states() {
        let e = entry(
            r#"
            auth_kind = "api_key"
            api_key_header = "X-Key"
            protocol = "multi_step_with_polling"
            endpoints.init = "https://h/init"
            endpoints.poll = "https://h/poll"
            rules.download_url = { json = "/url" }
            rules.upload_url = { json = "/upload_url" }
            rules.upload_id = { json = "/id" }
            rules.poll_status = { json = "/state" }
            "#,
        );
        let err = e.into_descriptor("h").unwrap_err();
        assert!(err.to_string().contains("poll_done"), "{err}");
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let e = entry(
            r#"
            auth_kind = "api_key"
            protocol = "single_step"
            api_key_header = "X-Key"
            endpoints.upload = "https://h/upload"
            rules.download_url = { pattern = "(unclosed" }
            "#,
        );
        assert!(e.into_descriptor("h").is_err());
    }

    #[test]
    fn stale_patterns_match_case_insensitively() {
        let e = entry(
            r#"
            auth_kind = "api_key"
            protocol = "single_step"
            api_key_header = "X-Key"
            stale_auth_patterns = ["session expired"]
            endpoints.upload = "https://h/upload"
            rules.download_url = { json = "/url" }
            "#,
        );
        let d = e.into_descriptor("h").unwrap();
        assert!(d.matches_stale_auth("Error: SESSION EXPIRED, please log in"));
        assert!(!d.matches_stale_auth("quota exceeded"));
    }

    #[test]
    fn unknown_auth_kind_fails_to_parse() {
        let parsed: std::result::Result<HostEntry, _> = toml::from_str(
            r#"
            auth_kind = "oauth"
            protocol = "single_step"
            "#,
        );
        assert!(parsed.is_err());
    }
}
