//! HTTP-POST Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-POST binding for sending SAML messages
//! via HTML form POST.

use crate::error::{SamlError, SamlResult};
use crate::types::{decode_base64, encode_base64, SamlBinding};

use super::{ReceivedMessage, SamlMessageType};

/// HTTP-POST binding encoder/decoder.
#[derive(Debug, Clone, Copy)]
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Encodes a SAML message for HTTP-POST binding.
    ///
    /// Returns an HTML form that will auto-submit to the destination.
    #[must_use]
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> String {
        let message = encode_base64(xml.as_bytes());
        let fields = std::iter::once((message_type.form_param(), message.as_str()))
            .chain(relay_state.map(|rs| ("RelayState", rs)))
            .map(|(name, value)| format!(r#"<input type="hidden" name="{name}" value="{}"/>"#, html_escape(value)))
            .collect::<Vec<_>>()
            .join("\n      ");

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
  <head><meta charset="utf-8"><title>Submit this form</title></head>
  <body onload="document.getElementById('saml-post').submit()">
    <form id="saml-post" method="post" action="{action}">
      {fields}
      <noscript><button type="submit">Submit</button></noscript>
    </form>
  </body>
</html>"#,
            action = html_escape(destination),
        )
    }

    /// Decodes a SAML message from HTTP-POST form data.
    ///
    /// # Errors
    ///
    /// Returns an error if neither parameter is present or the message cannot
    /// be decoded and parsed.
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
    ) -> SamlResult<ReceivedMessage> {
        let (encoded, message_type) = if let Some(req) = saml_request {
            (req, SamlMessageType::Request)
        } else if let Some(resp) = saml_response {
            (resp, SamlMessageType::Response)
        } else {
            return Err(SamlError::InvalidMessage(
                "no SAMLRequest or SAMLResponse parameter".to_string(),
            ));
        };

        let xml = String::from_utf8(decode_base64(encoded)?)
            .map_err(|e| SamlError::InvalidMessage(format!("invalid UTF-8 in message: {e}")))?;

        ReceivedMessage::new(xml, message_type, SamlBinding::HttpPost, relay_state.map(String::from))
    }
}

/// Escapes HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
