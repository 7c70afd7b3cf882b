//! HTTP transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use crate::reporter::ReporterConfig;
use crate::transport::{EventReport, EvidenceReport, ViolationTransport};
use crate::ReportError;

/// Sends events as JSON and evidence as multipart form data
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    event_url: String,
    upload_url: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ReporterConfig) -> Result<Self, ReportError> {
        let (Some(event_url), Some(upload_url)) = (&config.event_url, &config.upload_url) else {
            return Err(ReportError::Config("event_url and upload_url are required".into()));
        };
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(concat!("proctor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            event_url: event_url.clone(),
            upload_url: upload_url.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Multipart body: `violation_type`, JSON `meta`, binary `file`
    fn evidence_form(report: EvidenceReport) -> Result<Form, ReportError> {
        let meta = serde_json::to_string(&Value::Object(report.meta))?;
        let file_name = report.evidence.file_name();
        let file = Part::bytes(report.evidence.data)
            .file_name(file_name)
            .mime_str(&report.evidence.mime_type)?;
        Ok(Form::new()
            .text("violation_type", report.violation_type)
            .text("meta", meta)
            .part("file", file))
    }
}

async fn check_status(response: Response) -> Result<(), ReportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let message = response.text().await.unwrap_or_default();
    Err(ReportError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ViolationTransport for HttpTransport {
    async fn send_event(&self, report: EventReport) -> Result<(), ReportError> {
        debug!("POST {} ({})", self.event_url, report.violation_type);
        let request = self.authorize(self.client.post(&self.event_url)).json(&report);
        check_status(request.send().await?).await
    }

    async fn send_evidence(&self, report: EvidenceReport) -> Result<(), ReportError> {
        debug!(
            "POST {} ({}, {} bytes)",
            self.upload_url,
            report.violation_type,
            report.evidence.len()
        );
        let form = Self::evidence_form(report)?;
        let request = self.authorize(self.client.post(&self.upload_url)).multipart(form);
        check_status(request.send().await?).await
    }
}
