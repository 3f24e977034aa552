//! NTLMv2 credential for on-premises SharePoint
//!
//! Every request runs the three-message handshake:
//! 1. Client sends Type 1 (Negotiate)
//! 2. Server answers 401 with Type 2 (Challenge)
//! 3. Client resends the request with Type 3 (Authenticate)
//!
//! The handshake is bound to the TCP connection, so the HTTP client must keep
//! at most one idle connection per host and the 401 body must be drained
//! before the final leg.

use super::ClientError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode};
use std::fmt;
use tracing::debug;

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NEGOTIATE_OEM: u32 = 0x0000_0002;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
const NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
const NEGOTIATE_128: u32 = 0x2000_0000;
const NEGOTIATE_56: u32 = 0x8000_0000;

const AUTHENTICATE_FLAGS: u32 = NEGOTIATE_UNICODE
    | NEGOTIATE_NTLM
    | NEGOTIATE_ALWAYS_SIGN
    | NEGOTIATE_EXTENDED_SESSIONSECURITY
    | NEGOTIATE_TARGET_INFO
    | NEGOTIATE_128
    | NEGOTIATE_56;

/// Fixed part of the Type 3 message: signature, type, six security buffers, flags.
const AUTHENTICATE_HEADER_LEN: u32 = 64;

/// 100ns intervals between 1601-01-01 and 1970-01-01
const FILETIME_UNIX_OFFSET: u64 = 116_444_736_000_000_000;

type HmacMd5 = Hmac<Md5>;

#[derive(Clone)]
pub struct NtlmCredential {
    domain: String,
    username: String,
    password: String,
    workstation: String,
}

impl fmt::Debug for NtlmCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NtlmCredential")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("workstation", &self.workstation)
            .finish_non_exhaustive()
    }
}

/// Server Type 2 message fields needed for the response
#[derive(Debug)]
struct Challenge {
    server_challenge: [u8; 8],
    target_info: Vec<u8>,
}

impl NtlmCredential {
    /// Accepts `DOMAIN\user` or a bare user name (empty domain).
    pub fn new(username: &str, password: &str) -> Result<Self, ClientError> {
        let (domain, user) = match username.split_once('\\') {
            Some((domain, user)) => (domain, user),
            None => ("", username),
        };
        if user.is_empty() {
            return Err(ClientError::Ntlm(format!(
                "no user name in '{}'",
                username
            )));
        }

        let workstation = std::env::var("COMPUTERNAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "WORKSTATION".to_string())
            .to_uppercase();

        Ok(Self {
            domain: domain.to_string(),
            username: user.to_string(),
            password: password.to_string(),
            workstation,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Build NTLM Type 1 (Negotiate) message.
    pub fn negotiate_message(&self) -> Vec<u8> {
        let mut msg = Vec::with_capacity(32);
        msg.extend_from_slice(SIGNATURE);
        msg.extend_from_slice(&1u32.to_le_bytes());
        let flags = NEGOTIATE_UNICODE
            | NEGOTIATE_OEM
            | REQUEST_TARGET
            | NEGOTIATE_NTLM
            | NEGOTIATE_ALWAYS_SIGN
            | NEGOTIATE_EXTENDED_SESSIONSECURITY
            | NEGOTIATE_TARGET_INFO
            | NEGOTIATE_128
            | NEGOTIATE_56;
        msg.extend_from_slice(&flags.to_le_bytes());
        // Empty domain and workstation buffers
        push_security_buffer(&mut msg, 0, 0);
        push_security_buffer(&mut msg, 0, 0);
        msg
    }

    /// Build NTLM Type 3 (Authenticate) message answering a Type 2 challenge.
    pub fn authenticate_message(&self, challenge: &[u8]) -> Result<Vec<u8>, ClientError> {
        let client_challenge: [u8; 8] = rand::random();
        self.build_authenticate(challenge, client_challenge, filetime_now())
    }

    fn build_authenticate(
        &self,
        challenge: &[u8],
        client_challenge: [u8; 8],
        timestamp: u64,
    ) -> Result<Vec<u8>, ClientError> {
        let challenge = parse_challenge(challenge)?;
        let key = ntowf_v2(&self.password, &self.username, &self.domain)?;

        let lm_response = lm_v2_response(&key, &challenge.server_challenge, &client_challenge)?;

        let mut temp = Vec::with_capacity(32 + challenge.target_info.len());
        temp.extend_from_slice(&[0x01, 0x01, 0x00, 0x00]);
        temp.extend_from_slice(&[0x00; 4]);
        temp.extend_from_slice(&timestamp.to_le_bytes());
        temp.extend_from_slice(&client_challenge);
        temp.extend_from_slice(&[0x00; 4]);
        temp.extend_from_slice(&challenge.target_info);
        temp.extend_from_slice(&[0x00; 4]);

        let nt_proof = hmac_md5(&key, &[&challenge.server_challenge[..], &temp[..]])?;
        let mut nt_response = nt_proof.to_vec();
        nt_response.extend_from_slice(&temp);

        let domain = utf16le(&self.domain);
        let user = utf16le(&self.username);
        let workstation = utf16le(&self.workstation);

        let payloads: [&[u8]; 6] = [
            &lm_response,
            &nt_response,
            &domain,
            &user,
            &workstation,
            &[], // no session key
        ];

        let mut msg = Vec::new();
        msg.extend_from_slice(SIGNATURE);
        msg.extend_from_slice(&3u32.to_le_bytes());

        let mut offset = AUTHENTICATE_HEADER_LEN;
        for payload in payloads {
            let len = u16::try_from(payload.len())
                .map_err(|_| ClientError::Ntlm("authenticate field too long".to_string()))?;
            push_security_buffer(&mut msg, len, offset);
            offset += u32::from(len);
        }
        msg.extend_from_slice(&AUTHENTICATE_FLAGS.to_le_bytes());

        for payload in payloads {
            msg.extend_from_slice(payload);
        }
        Ok(msg)
    }

    /// GET `url`, authenticating with the NTLM handshake.
    pub(crate) async fn get(
        &self,
        http: &Client,
        url: &str,
        accept: &str,
    ) -> Result<Response, ClientError> {
        let negotiate = format!("NTLM {}", BASE64.encode(self.negotiate_message()));
        let first = http
            .get(url)
            .header(ACCEPT, accept)
            .header(AUTHORIZATION, negotiate)
            .send()
            .await?;

        if first.status() != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }

        let token = first
            .headers()
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| value.strip_prefix("NTLM "))
            .map(|value| value.trim().to_string())
            .ok_or_else(|| ClientError::Ntlm("server did not send an NTLM challenge".to_string()))?;

        // Release the connection back to the pool for the final leg
        first.bytes().await?;

        let challenge = BASE64
            .decode(token)
            .map_err(|e| ClientError::Ntlm(format!("failed to decode challenge: {}", e)))?;
        let authenticate = self.authenticate_message(&challenge)?;
        debug!("Answering NTLM challenge for {}", url);

        let response = http
            .get(url)
            .header(ACCEPT, accept)
            .header(AUTHORIZATION, format!("NTLM {}", BASE64.encode(authenticate)))
            .send()
            .await?;
        Ok(response)
    }
}

fn parse_challenge(bytes: &[u8]) -> Result<Challenge, ClientError> {
    if bytes.len() < 32 || &bytes[..8] != SIGNATURE {
        return Err(ClientError::Ntlm("invalid Type 2 message".to_string()));
    }
    if read_u32(bytes, 8) != 2 {
        return Err(ClientError::Ntlm("expected a Type 2 message".to_string()));
    }

    let mut server_challenge = [0u8; 8];
    server_challenge.copy_from_slice(&bytes[24..32]);

    let target_info = if bytes.len() >= 48 {
        let len = u16::from_le_bytes([bytes[40], bytes[41]]) as usize;
        let offset = read_u32(bytes, 44) as usize;
        bytes
            .get(offset..offset + len)
            .ok_or_else(|| ClientError::Ntlm("target info out of bounds".to_string()))?
            .to_vec()
    } else {
        Vec::new()
    };

    Ok(Challenge {
        server_challenge,
        target_info,
    })
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn push_security_buffer(msg: &mut Vec<u8>, len: u16, offset: u32) {
    msg.extend_from_slice(&len.to_le_bytes());
    msg.extend_from_slice(&len.to_le_bytes());
    msg.extend_from_slice(&offset.to_le_bytes());
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

/// MD4 of the UTF-16LE password
fn nt_hash(password: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Md4::digest(utf16le(password)));
    out
}

fn ntowf_v2(password: &str, username: &str, domain: &str) -> Result<[u8; 16], ClientError> {
    let identity = utf16le(&format!("{}{}", username.to_uppercase(), domain));
    hmac_md5(&nt_hash(password), &[identity.as_slice()])
}

fn lm_v2_response(
    key: &[u8; 16],
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
) -> Result<Vec<u8>, ClientError> {
    let mut response = hmac_md5(key, &[&server_challenge[..], &client_challenge[..]])?.to_vec();
    response.extend_from_slice(client_challenge);
    Ok(response)
}

fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 16], ClientError> {
    let mut mac = <HmacMd5 as Mac>::new_from_slice(key)
        .map_err(|e| ClientError::Ntlm(format!("HMAC error: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Current time as a Windows FILETIME
fn filetime_now() -> u64 {
    let now = chrono::Utc::now();
    let secs = now.timestamp().max(0) as u64;
    let hundred_nanos = u64::from(now.timestamp_subsec_nanos()) / 100;
    FILETIME_UNIX_OFFSET + secs * 10_000_000 + hundred_nanos
}
