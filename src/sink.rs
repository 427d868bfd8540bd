use crate::error::ExportError;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::io::Write;
use tracing::{info, warn};

pub const STDOUT_SENTINEL: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    Http(Url),
}

impl Destination {
    /// `-` selects stdout; anything else must be an absolute http(s) URL.
    pub fn parse(input: &str) -> Result<Self, ExportError> {
        if input == STDOUT_SENTINEL {
            return Ok(Destination::Stdout);
        }
        let url = Url::parse(input).map_err(|err| ExportError::Validation {
            input: input.to_string(),
            reason: err.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ExportError::Validation {
                    input: input.to_string(),
                    reason: format!("unsupported scheme '{other}'"),
                })
            }
        }
        if !url.has_host() {
            return Err(ExportError::Validation {
                input: input.to_string(),
                reason: "missing host".to_string(),
            });
        }
        Ok(Destination::Http(url))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub status: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Printed,
    Posted(DeliveryReport),
}

pub fn write_stdout<W: Write>(out: &mut W, document: &str) -> Result<(), ExportError> {
    writeln!(out, "{document}")?;
    out.flush()?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
}

impl HttpSink {
    pub fn new(user_agent: &str) -> Result<Self, ExportError> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }

    /// One POST, no retries. Any HTTP status counts as delivered.
    pub async fn post(&self, url: &Url, document: String) -> Result<DeliveryReport, ExportError> {
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(document)
            .send()
            .await?;

        let status = response.status();
        let status_line = match status.canonical_reason() {
            Some(reason) => format!("{} {}", status.as_u16(), reason),
            None => status.as_u16().to_string(),
        };
        info!(url = %url, status = %status_line, "snapshot delivered");
        if !status.is_success() {
            warn!(url = %url, status = %status_line, "endpoint answered with non-success status");
        }

        let body = response.text().await?;
        Ok(DeliveryReport {
            status: status_line,
            body,
        })
    }
}

/// Performs exactly one delivery: either the stdout write or the POST.
/// The HTTP client is only built when the destination needs it.
pub async fn deliver<W: Write>(
    destination: &Destination,
    document: String,
    out: &mut W,
    user_agent: &str,
) -> Result<Delivery, ExportError> {
    match destination {
        Destination::Stdout => {
            write_stdout(out, &document)?;
            Ok(Delivery::Printed)
        }
        Destination::Http(url) => {
            let http = HttpSink::new(user_agent)?;
            Ok(Delivery::Posted(http.post(url, document).await?))
        }
    }
}
