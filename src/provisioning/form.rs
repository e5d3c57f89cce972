//! Portal request handling.
//!
//! Pure request-to-reply mapping, independent of the HTTP server so it can
//! be tested without sockets.

use super::PortalError;
use crate::config::NetworkIdentity;
use tiny_http::Method;

/// Path of the credential form.
pub const FORM_PATH: &str = "/";

/// Path the form submits to.
pub const SUBMIT_PATH: &str = "/savewifi";

const FORM_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Invernadero - Configurar WiFi</title>
</head>
<body>
<h2>Configurar WiFi</h2>
<form action="/savewifi" method="post">
<label>SSID</label><br><input name="ssid" maxlength="31" required><br>
<label>Contrase&ntilde;a</label><br><input name="password" type="password" maxlength="63"><br><br>
<input type="submit" value="Guardar">
</form>
</body>
</html>
"#;

const SAVED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Invernadero</title></head>
<body><h2>Credenciales guardadas. Reiniciando...</h2></body>
</html>
"#;

const STORE_FAILED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Invernadero</title></head>
<body><h2>No se pudieron guardar las credenciales. Intente de nuevo.</h2></body>
</html>
"#;

/// Reply to a portal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalReply {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header value.
    pub content_type: &'static str,
    /// Response body.
    pub body: String,
    /// Identity accepted by this request.
    pub identity: Option<NetworkIdentity>,
}

impl PortalReply {
    fn html(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            body: body.to_string(),
            identity: None,
        }
    }

    /// Confirmation sent once a submitted identity is stored.
    pub fn saved() -> Self {
        Self::html(200, SAVED_PAGE)
    }

    /// Error sent when a valid submission could not be stored.
    pub fn store_failed() -> Self {
        Self::html(500, STORE_FAILED_PAGE)
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
            identity: None,
        }
    }
}

/// Map a request to its reply.
pub fn handle_request(
    method: &Method,
    url: &str,
    content_type: Option<&str>,
    body: &[u8],
) -> PortalReply {
    let path = url.split_once('?').map_or(url, |(path, _)| path);

    match (method, path) {
        (Method::Get, FORM_PATH) => PortalReply::html(200, FORM_PAGE),
        (Method::Post, SUBMIT_PATH) => match parse_submission(content_type, body) {
            Ok(identity) => PortalReply {
                identity: Some(identity),
                ..PortalReply::saved()
            },
            Err(e) => PortalReply::text(400, e.to_string()),
        },
        _ => PortalReply::text(404, "Not Found"),
    }
}

/// Decode a credential submission.
///
/// JSON bodies (`{"ssid": .., "password": ..}`) are accepted when the
/// content type says so; everything else is treated as a urlencoded form.
/// A missing `password` means an open network.
pub fn parse_submission(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<NetworkIdentity, PortalError> {
    let is_json = content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);
    if is_json {
        return Ok(NetworkIdentity::from_json(body)?);
    }

    let text = std::str::from_utf8(body).map_err(|_| PortalError::BadForm("body is not UTF-8"))?;
    let mut ssid = None;
    let mut password = None;
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match url_decode(key)?.as_str() {
            "ssid" => ssid = Some(url_decode(value)?),
            "password" => password = Some(url_decode(value)?),
            _ => {}
        }
    }

    let ssid = ssid.ok_or(PortalError::BadForm("missing ssid"))?;
    Ok(NetworkIdentity::new(ssid, password.unwrap_or_default())?)
}

/// Decode one `application/x-www-form-urlencoded` component.
fn url_decode(input: &str) -> Result<String, PortalError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or(PortalError::BadForm("bad percent escape"))?;
                out.push(hex);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).map_err(|_| PortalError::BadForm("field is not UTF-8"))
}
