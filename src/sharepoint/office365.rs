//! Office 365 claims sign-in
//!
//! The user name and password go to the security token service inside a
//! WS-Trust request. The returned binary security token is then posted to the
//! tenant's sign-in form, which answers with the `FedAuth` and `rtFa` cookies
//! used on every later request.

use super::ClientError;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::fmt;
use tracing::{debug, warn};

const FED_AUTH: &str = "FedAuth";
const RT_FA: &str = "rtFa";

#[derive(Clone, PartialEq, Eq)]
pub struct AuthCookies {
    fed_auth: String,
    rt_fa: String,
}

impl fmt::Debug for AuthCookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCookies").finish_non_exhaustive()
    }
}

impl AuthCookies {
    pub fn new(fed_auth: impl Into<String>, rt_fa: impl Into<String>) -> Self {
        Self {
            fed_auth: fed_auth.into(),
            rt_fa: rt_fa.into(),
        }
    }

    /// Value for the `Cookie` request header
    pub fn header_value(&self) -> String {
        format!("{}={}; {}={}", FED_AUTH, self.fed_auth, RT_FA, self.rt_fa)
    }
}

/// Sign in at `root_url` and collect the session cookies.
pub(crate) async fn sign_in(
    http: &Client,
    sts_url: &str,
    root_url: &str,
    username: &str,
    password: &str,
) -> Result<AuthCookies, ClientError> {
    let root_url = root_url.trim_end_matches('/');
    let token = request_security_token(http, sts_url, root_url, username, password).await?;
    debug!("Received security token for {}", root_url);

    let form_url = format!("{}/_forms/default.aspx?wa=wsignin1.0", root_url);
    let response = http
        .post(&form_url)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(token)
        .send()
        .await?;

    if !(response.status().is_success() || response.status().is_redirection()) {
        warn!("Sign-in form returned HTTP {}", response.status());
    }

    let mut fed_auth = None;
    let mut rt_fa = None;
    for cookie in response.cookies() {
        match cookie.name() {
            FED_AUTH => fed_auth = Some(cookie.value().to_string()),
            RT_FA => rt_fa = Some(cookie.value().to_string()),
            _ => {}
        }
    }

    Ok(AuthCookies {
        fed_auth: fed_auth.ok_or(ClientError::MissingCookie(FED_AUTH))?,
        rt_fa: rt_fa.ok_or(ClientError::MissingCookie(RT_FA))?,
    })
}

async fn request_security_token(
    http: &Client,
    sts_url: &str,
    root_url: &str,
    username: &str,
    password: &str,
) -> Result<String, ClientError> {
    let envelope = token_request(sts_url, root_url, username, password);
    let response = http
        .post(sts_url)
        .header(CONTENT_TYPE, "application/soap+xml; charset=utf-8")
        .body(envelope)
        .send()
        .await?;

    // Faults come back with a 500 and a SOAP body, so read the body first
    let status = response.status();
    let body = response.text().await?;
    match parse_token_response(&body) {
        Err(ClientError::MissingToken) if !status.is_success() => Err(ClientError::Status {
            status: status.as_u16(),
            url: sts_url.to_string(),
        }),
        other => other,
    }
}

fn token_request(sts_url: &str, root_url: &str, username: &str, password: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://www.w3.org/2005/08/addressing" xmlns:u="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">
  <s:Header>
    <a:Action s:mustUnderstand="1">http://schemas.xmlsoap.org/ws/2005/02/trust/RST/Issue</a:Action>
    <a:MessageID>urn:uuid:{message_id}</a:MessageID>
    <a:ReplyTo><a:Address>http://www.w3.org/2005/08/addressing/anonymous</a:Address></a:ReplyTo>
    <a:To s:mustUnderstand="1">{sts}</a:To>
    <o:Security s:mustUnderstand="1" xmlns:o="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">
      <o:UsernameToken>
        <o:Username>{username}</o:Username>
        <o:Password>{password}</o:Password>
      </o:UsernameToken>
    </o:Security>
  </s:Header>
  <s:Body>
    <t:RequestSecurityToken xmlns:t="http://schemas.xmlsoap.org/ws/2005/02/trust">
      <wsp:AppliesTo xmlns:wsp="http://schemas.xmlsoap.org/ws/2004/09/policy">
        <a:EndpointReference><a:Address>{address}</a:Address></a:EndpointReference>
      </wsp:AppliesTo>
      <t:KeyType>http://schemas.xmlsoap.org/ws/2005/05/identity/NoProofKey</t:KeyType>
      <t:RequestType>http://schemas.xmlsoap.org/ws/2005/02/trust/Issue</t:RequestType>
      <t:TokenType>urn:oasis:names:tc:SAML:1.0:assertion</t:TokenType>
    </t:RequestSecurityToken>
  </s:Body>
</s:Envelope>"#,
        message_id = uuid::Uuid::new_v4(),
        sts = escape(sts_url),
        username = escape(username),
        password = escape(password),
        address = escape(root_url),
    )
}

/// Pull the `BinarySecurityToken` out of a WS-Trust response, or the fault text.
fn parse_token_response(xml: &str) -> Result<String, ClientError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut in_token = false;
    let mut fault_depth = 0usize;
    let mut fault_text: Vec<String> = Vec::new();
    let mut token = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => {
                let name = e.local_name();
                if name.as_ref() == b"Fault" || fault_depth > 0 {
                    fault_depth += 1;
                }
                if name.as_ref() == b"BinarySecurityToken" {
                    in_token = true;
                }
            }
            Event::Text(ref e) => {
                let text = e.unescape()?;
                if in_token {
                    token.push_str(&text);
                } else if fault_depth > 0 {
                    fault_text.push(text.into_owned());
                }
            }
            Event::End(ref e) => {
                if e.local_name().as_ref() == b"BinarySecurityToken" {
                    in_token = false;
                }
                if fault_depth > 0 {
                    fault_depth -= 1;
                    if fault_depth == 0 {
                        return Err(ClientError::Fault(fault_text.join(" ")));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if token.is_empty() {
        Err(ClientError::MissingToken)
    } else {
        Ok(token)
    }
}
