//! SOAP client for the e-invoice user list service
//!
//! Sends a single `getPartialUserList` request and returns the base64
//! `binaryData` of every `userListPart` in the response, decoded.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use quick_xml::escape::escape;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, info, instrument};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::extract::XmlElement;
use crate::models::PartitionBlob;
use crate::provider::{PartitionQuery, PartitionSource};

const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const REQUEST_ELEMENT: &str = "getPartialUserListRequest";
const USER_LIST_PART: &str = "userListPart";
const BINARY_DATA: &str = "binaryData";
const FAULT: &str = "Fault";

/// Longest response body excerpt kept in an error
const MAX_ERROR_BODY: usize = 512;

/// Partition source backed by the provider's SOAP endpoint
pub struct SoapPartitionSource {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
    namespace: String,
    action: String,
}

impl SoapPartitionSource {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            username: config.username.clone(),
            password: config.password.expose().to_string(),
            namespace: config.soap_namespace.clone(),
            action: config.soap_action.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the request envelope for `query`
    pub fn envelope(&self, query: &PartitionQuery) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<soapenv:Envelope xmlns:soapenv="{envelope_ns}" xmlns:ein="{ns}">"#,
                "<soapenv:Header/>",
                "<soapenv:Body>",
                "<ein:{request}>",
                "<Identifier>{identifier}</Identifier>",
                "<VKN_TCKN>{vkn_tckn}</VKN_TCKN>",
                "<Role>{role}</Role>",
                "<IncludeBinary>{include_binary}</IncludeBinary>",
                "</ein:{request}>",
                "</soapenv:Body>",
                "</soapenv:Envelope>",
            ),
            envelope_ns = SOAP_ENVELOPE_NS,
            ns = escape(self.namespace.as_str()),
            request = REQUEST_ELEMENT,
            identifier = escape(query.identifier.as_str()),
            vkn_tckn = escape(query.vkn_tckn.as_str()),
            role = query.role.as_str(),
            include_binary = query.include_binary,
        )
    }
}

#[async_trait]
impl PartitionSource for SoapPartitionSource {
    #[instrument(skip(self, query), fields(endpoint = %self.endpoint, role = %query.role))]
    async fn fetch_partitions(
        &self,
        query: &PartitionQuery,
    ) -> Result<Vec<PartitionBlob>, ProviderError> {
        info!("Requesting user list partitions");

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{}\"", self.action))
            .body(self.envelope(query))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "Received provider response");

        if !status.is_success() {
            // SOAP 1.1 services report faults with HTTP 500
            return Err(match parse_response(&body) {
                Err(fault @ ProviderError::Fault { .. }) => fault,
                _ => ProviderError::Status {
                    status: status.as_u16(),
                    body: excerpt(&body),
                },
            });
        }

        let partitions = parse_response(&body)?;
        info!(partitions = partitions.len(), "Fetched user list partitions");
        Ok(partitions)
    }
}

/// Decode the partitions carried by a `getPartialUserList` response body
pub fn parse_response(body: &[u8]) -> Result<Vec<PartitionBlob>, ProviderError> {
    let root = XmlElement::parse(body)
        .map_err(|e| ProviderError::Response(format!("unreadable SOAP envelope: {e}")))?;

    if let Some(fault) = root.descendants(FAULT).next() {
        return Err(ProviderError::Fault {
            code: fault.child_text("faultcode").unwrap_or_default().to_string(),
            message: fault.child_text("faultstring").unwrap_or_default().to_string(),
        });
    }

    root.descendants(USER_LIST_PART)
        .enumerate()
        .map(|(index, part)| {
            let encoded: String = part
                .child_text(BINARY_DATA)
                .unwrap_or_default()
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();

            STANDARD
                .decode(encoded)
                .map(PartitionBlob::new)
                .map_err(|source| ProviderError::Base64 {
                    index: index + 1,
                    source,
                })
        })
        .collect()
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    }
}
