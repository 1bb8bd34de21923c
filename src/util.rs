use base64::{engine::general_purpose, Engine as _};
use url::Url;

pub fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{}:{}", client_id, client_secret))
    )
}

/// The redirect URL without query and fragment, so a reload cannot resubmit
/// the authorization code.
pub fn strip_query(url: &Url) -> Url {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.set_fragment(None);
    clean
}

/// First value of a query parameter, ignoring empty values.
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Short prefix of a secret-ish value for log lines.
pub fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(4).collect();
    format!("{}…({} chars)", prefix, value.chars().count())
}
