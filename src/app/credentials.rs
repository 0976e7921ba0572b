//! `taskwatch login`, `logout` and `token`.

use taskwatch::auth::{unix_now_secs, CredentialFile, CredentialHealth, StoredCredential};
use taskwatch::channel::StreamEndpoint;
use taskwatch::config::Config;
use taskwatch::render::Notices;

/// Credential-store record for the configured backend.
pub(crate) fn credential_file(config: &Config) -> Result<CredentialFile, String> {
    let backend = StreamEndpoint::from_backend(&config.backend).authority();
    CredentialFile::for_backend(backend).map_err(|err| err.to_string())
}

pub(crate) fn run_login_flow(
    notices: &Notices,
    config: &Config,
    token: Option<&str>,
    refresh_token: Option<&str>,
    expires_in: Option<i64>,
) -> Result<(), String> {
    let file = credential_file(config)?;
    let access_token = match token {
        Some(token) => token.to_string(),
        None => rpassword::prompt_password(format!("access token for {}: ", file.backend()))
            .map_err(|err| format!("failed to read access token: {err}"))?,
    };
    let credential = build_credential(&access_token, refresh_token, expires_in)?;
    file.save(credential)
        .map_err(|err| format!("failed to save credentials: {err}"))?;

    notices.section("login saved");
    notices.field("backend", file.backend());
    notices.field("store", &file.path().display().to_string());
    Ok(())
}

pub(crate) fn run_logout_flow(notices: &Notices, config: &Config) -> Result<(), String> {
    let file = credential_file(config)?;
    let removed = file
        .remove()
        .map_err(|err| format!("failed to update credentials: {err}"))?;
    if removed {
        notices.section("login removed");
    } else {
        notices.section("no stored login");
    }
    notices.field("backend", file.backend());
    Ok(())
}

pub(crate) fn run_token_flow(notices: &Notices, config: &Config) -> Result<(), String> {
    let file = credential_file(config)?;
    let health = file
        .health()
        .map_err(|err| format!("failed to read credentials: {err}"))?;
    notices.section("stored login");
    for (key, value) in health_fields(&health, unix_now_secs()) {
        notices.field(key, &value);
    }
    Ok(())
}

fn build_credential(
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in: Option<i64>,
) -> Result<StoredCredential, String> {
    let access_token = access_token.trim();
    if access_token.is_empty() {
        return Err("access token must not be empty".to_string());
    }
    let mut credential = StoredCredential::new(access_token);
    if let Some(refresh) = refresh_token.map(str::trim).filter(|value| !value.is_empty()) {
        credential = credential.with_refresh_token(refresh);
    }
    if let Some(secs) = expires_in {
        if secs <= 0 {
            return Err(format!("--expires-in must be positive, got {secs}"));
        }
        credential = credential.expiring_in(secs);
    }
    Ok(credential)
}

fn health_fields(health: &CredentialHealth, now: i64) -> Vec<(&'static str, String)> {
    let mut fields = vec![("backend", health.backend.clone())];
    if !health.has_token {
        fields.push(("status", "not logged in".to_string()));
        return fields;
    }
    let status = if health.expires_at_unix.is_some_and(|at| at <= now) {
        "expired"
    } else if health.expiring_soon {
        "expiring soon"
    } else {
        "ok"
    };
    fields.push(("status", status.to_string()));
    fields.push(("refreshable", health.refreshable.to_string()));
    let expiry = match health.expires_at_unix {
        Some(at) if at > now => format!("in {}", human_duration(at.saturating_sub(now))),
        Some(at) => format!("{} ago", human_duration(now.saturating_sub(at))),
        None => "unknown".to_string(),
    };
    fields.push(("expires", expiry));
    fields
}

fn human_duration(secs: i64) -> String {
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h {}m", s / 3_600, (s % 3_600) / 60),
        s => format!("{}d", s / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_tokens_are_rejected() {
        assert!(build_credential("  ", None, None).is_err());
        assert!(build_credential("a", None, Some(0)).is_err());
    }

    #[test]
    fn credential_carries_optional_fields() {
        let credential = build_credential(" a ", Some("r"), Some(3600)).expect("credential");
        assert_eq!(credential.access_token, "a");
        assert!(credential.can_refresh());
        assert!(!credential.is_expiring_soon());

        let bare = build_credential("a", Some(" "), None).expect("credential");
        assert_eq!(bare.refresh_token, None);
        assert_eq!(bare.expires_at_unix, None);
    }

    #[test]
    fn health_fields_describe_expiry() {
        let health = CredentialHealth {
            backend: "localhost:8080".into(),
            has_token: true,
            refreshable: true,
            expiring_soon: false,
            expires_at_unix: Some(10_000 + 7_260),
        };
        let fields = health_fields(&health, 10_000);
        assert!(fields.contains(&("status", "ok".to_string())));
        assert!(fields.contains(&("expires", "in 2h 1m".to_string())));

        let expired = CredentialHealth {
            expires_at_unix: Some(9_970),
            expiring_soon: true,
            ..health
        };
        let fields = health_fields(&expired, 10_000);
        assert!(fields.contains(&("status", "expired".to_string())));
        assert!(fields.contains(&("expires", "30s ago".to_string())));
    }

    #[test]
    fn extreme_expiry_values_do_not_overflow() {
        let health = CredentialHealth {
            backend: "b".into(),
            has_token: true,
            refreshable: false,
            expiring_soon: true,
            expires_at_unix: Some(i64::MIN),
        };
        let fields = health_fields(&health, 10_000);
        assert!(fields.contains(&("status", "expired".to_string())));
        assert!(fields.contains(&("expires", format!("{}d ago", i64::MAX / 86_400))));

        let far = CredentialHealth {
            expires_at_unix: Some(i64::MAX),
            expiring_soon: false,
            ..health
        };
        let fields = health_fields(&far, -10_000);
        assert!(fields.contains(&("expires", format!("in {}d", i64::MAX / 86_400))));
    }

    #[test]
    fn missing_login_is_reported_plainly() {
        let health = CredentialHealth {
            backend: "b".into(),
            has_token: false,
            refreshable: false,
            expiring_soon: false,
            expires_at_unix: None,
        };
        assert_eq!(
            health_fields(&health, 0),
            vec![("backend", "b".to_string()), ("status", "not logged in".to_string())]
        );
    }
}
