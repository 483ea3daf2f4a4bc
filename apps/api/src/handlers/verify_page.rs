//! Browser-facing email verification page.

use axum::extract::{Query, State};
use axum::response::Html;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyPageQuery {
    #[serde(default)]
    token: String,
}

/// `GET /verify-email?token=...`, the link target from verification
/// emails. Always renders HTML; the outcome is in the page body.
pub async fn verify_email_page(
    State(state): State<AppState>,
    Query(query): Query<VerifyPageQuery>,
) -> Html<String> {
    let (title, body) = if query.token.is_empty() {
        (
            "Verification link is incomplete",
            "The link is missing its token. Open the most recent verification email and use \
             the full link."
                .to_owned(),
        )
    } else {
        match state.auth_service.verify_email(&query.token).await {
            Ok(()) => (
                "Email verified",
                format!(
                    "Your email address is now verified. You can return to {} and sign in.",
                    state.server_name
                ),
            ),
            Err(_) => (
                "Verification failed",
                "This link is invalid or has expired. Request a new verification email from \
                 your account settings."
                    .to_owned(),
            ),
        }
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} · {server}</title>
<style>
body {{ font-family: system-ui, sans-serif; background: #1e1f22; color: #dbdee1;
        display: grid; place-items: center; min-height: 100vh; margin: 0; }}
main {{ background: #2b2d31; border-radius: 8px; padding: 2.5rem 3rem; max-width: 28rem; }}
h1 {{ font-size: 1.25rem; margin-top: 0; }}
</style>
</head>
<body>
<main>
<h1>{title}</h1>
<p>{body}</p>
</main>
</body>
</html>
"#,
        title = title,
        body = body,
        server = state.server_name,
    ))
}
