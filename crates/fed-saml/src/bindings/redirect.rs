//! HTTP-Redirect Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-Redirect binding for sending SAML messages
//! via URL query parameters with DEFLATE compression.

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::{decode_base64, encode_base64, SamlBinding};

use super::{DetachedSignature, ReceivedMessage, SamlMessageType};

/// HTTP-Redirect binding encoder/decoder.
#[derive(Debug, Clone, Copy)]
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes a SAML message for HTTP-Redirect binding.
    ///
    /// Returns a URL with the encoded message in query parameters. With a
    /// signer, `SigAlg` and a detached `Signature` are appended.
    ///
    /// # Errors
    ///
    /// Returns an error if compression or signing fails.
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<String> {
        let encoded = encode_base64(&deflate_compress(xml.as_bytes())?);
        let param_name = message_type.form_param();
        let separator = if destination.contains('?') { '&' } else { '?' };

        let query = match signer {
            Some(signer) => {
                let (query, signature) = signer.sign_redirect(param_name, &encoded, relay_state)?;
                format!("{query}&Signature={}", urlencoding::encode(&signature))
            }
            None => {
                let mut query = format!("{param_name}={}", urlencoding::encode(&encoded));
                if let Some(rs) = relay_state {
                    query.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
                }
                query
            }
        };

        Ok(format!("{destination}{separator}{query}"))
    }

    /// Decodes a SAML message from a raw (still percent-encoded) query string.
    ///
    /// When a `Signature` is present, the signed octets are rebuilt from the
    /// raw `SAMLRequest`/`SAMLResponse`, `RelayState` and `SigAlg` parameters
    /// exactly as received.
    ///
    /// # Errors
    ///
    /// Returns an error if no message parameter is present or the message
    /// cannot be decoded and parsed.
    pub fn decode_query(raw_query: &str) -> SamlResult<ReceivedMessage> {
        let mut message = None;
        let mut relay_state = None;
        let mut signature = None;
        let mut sig_alg = None;
        let mut raw_message = None;
        let mut raw_relay_state = None;
        let mut raw_sig_alg = None;

        for part in raw_query.split('&').filter(|p| !p.is_empty()) {
            let (raw_key, raw_value) = part.split_once('=').unwrap_or((part, ""));
            let value = form_decode(raw_value);
            match raw_key {
                "SAMLRequest" => {
                    message = Some((value, SamlMessageType::Request));
                    raw_message = Some(part);
                }
                "SAMLResponse" => {
                    message = Some((value, SamlMessageType::Response));
                    raw_message = Some(part);
                }
                "RelayState" => {
                    relay_state = Some(value);
                    raw_relay_state = Some(part);
                }
                "Signature" => signature = Some(value),
                "SigAlg" => {
                    sig_alg = Some(value);
                    raw_sig_alg = Some(part);
                }
                _ => {}
            }
        }

        let (encoded, message_type) = message.ok_or_else(|| {
            SamlError::InvalidMessage("no SAMLRequest or SAMLResponse parameter".to_string())
        })?;
        let xml = String::from_utf8(deflate_decompress(&decode_base64(&encoded)?)?)
            .map_err(|e| SamlError::InvalidMessage(format!("invalid UTF-8 in message: {e}")))?;

        let mut received = ReceivedMessage::new(xml, message_type, SamlBinding::HttpRedirect, relay_state)?;
        if let Some(signature) = signature {
            let sig_alg = sig_alg.ok_or_else(|| {
                SamlError::InvalidMessage("Signature parameter without SigAlg".to_string())
            })?;
            let signed_query = [raw_message, raw_relay_state, raw_sig_alg]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join("&");
            received.detached_signature = Some(DetachedSignature {
                signed_query,
                sig_alg,
                signature,
            });
        }
        Ok(received)
    }

    /// Decodes a message from a full URL.
    ///
    /// # Errors
    ///
    /// Same as [`decode_query`](Self::decode_query), plus invalid URLs.
    pub fn decode_url(url: &str) -> SamlResult<ReceivedMessage> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SamlError::InvalidMessage(format!("invalid URL: {e}")))?;
        Self::decode_query(parsed.query().unwrap_or_default())
    }
}

fn form_decode(raw: &str) -> String {
    url::form_urlencoded::parse(format!("v={raw}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("compression finish error: {e}")))
}

/// Decompresses DEFLATE data.
fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Deflate(format!("decompression error: {e}")))?;
    Ok(decompressed)
}
