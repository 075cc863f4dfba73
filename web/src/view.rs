//! Minimal HTML pages for the browser-facing routes.

use axum::response::Html;
use broker_auth::oauth::token::Record;
use broker_auth::oauth::UserInfo;
use chrono::{DateTime, Utc};

const NAV: &str = r#"<p><a href="/">Status</a> | <a href="/login">Authorize</a> | <a href="/refresh">Refresh token</a> | <a href="/permissions">Account</a></p>"#;

pub(crate) fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n{NAV}\n{body}\n</body>\n</html>\n",
        title = escape(title),
    ))
}

/// Escapes text for inclusion in HTML element content or a quoted attribute.
pub(crate) fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Describes the cached record without revealing either token.
pub(crate) fn token_status(record: Option<&Record>, fresh: bool, now: DateTime<Utc>) -> String {
    let Some(record) = record else {
        return "<p>No token has been obtained yet. Use <a href=\"/login\">Authorize</a> to start.</p>"
            .to_string();
    };

    let state = if fresh {
        let minutes = record.time_until_expiry(now).num_minutes();
        format!("valid for about {minutes} more minutes")
    } else {
        "expired, it will be refreshed on the next request".to_string()
    };

    let mut rows = vec![
        row("Status", &state),
        row("Expires at", &record.expires_at.to_rfc3339()),
        row("Token type", &record.token_type),
        row(
            "Refresh token",
            if record.can_refresh() { "cached" } else { "none" },
        ),
    ];
    if let Some(scope) = &record.scope {
        rows.push(row("Scope", scope));
    }
    if let Some(user_id) = record.user_id {
        rows.push(row("User ID", &user_id.to_string()));
    }

    format!("<table>\n{}\n</table>", rows.join("\n"))
}

pub(crate) fn user_info(user: &UserInfo) -> String {
    let mut rows = vec![row("User ID", &user.id.to_string())];
    let optional = [
        ("Nickname", &user.nickname),
        ("First name", &user.first_name),
        ("Last name", &user.last_name),
        ("Email", &user.email),
        ("Site", &user.site_id),
        ("Profile", &user.permalink),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            rows.push(row(label, value));
        }
    }
    format!("<table>\n{}\n</table>", rows.join("\n"))
}

pub(crate) fn message(text: &str) -> String {
    format!("<p>{}</p>", escape(text))
}

fn row(label: &str, value: &str) -> String {
    format!("<tr><th>{}</th><td>{}</td></tr>", escape(label), escape(value))
}
