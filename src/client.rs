use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{
    header::{HeaderName, HeaderValue, ACCEPT},
    Method, Url,
};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    errors::{Error, Result, TransportError},
    generate::GenerateClient,
    http::{parse_api_error_parts, HeaderList, RequestOptions},
    models::ModelsClient,
    runs::RunsClient,
    telemetry::{HttpRequestMetrics, MetricsCallbacks, RequestContext, Telemetry},
    CLIENT_HEADER, DEFAULT_BASE_URL, DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT,
};

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// API root including the `/api` prefix (defaults to [`DEFAULT_BASE_URL`]).
    pub base_url: Option<String>,
    pub client_header: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Default extra headers applied to all requests.
    pub default_headers: Option<HeaderList>,
    /// Optional metrics callbacks (HTTP latency and outcome).
    pub metrics: Option<MetricsCallbacks>,
}

/// Handle to the pipeline backend. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    base_url: Url,
    client_header: Option<String>,
    http: reqwest::Client,
    request_timeout: Duration,
    default_headers: Option<HeaderList>,
    telemetry: Telemetry,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let base = cfg
            .base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(base.trim().trim_end_matches('/'))
            .map_err(|err| Error::Config(format!("invalid base url: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("invalid base url: {base}")));
        }

        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let request_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(TransportError::from_reqwest)?,
        };

        let client_header = cfg
            .client_header
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(DEFAULT_CLIENT_HEADER.to_string()));

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url,
                client_header,
                http,
                request_timeout,
                default_headers: cfg.default_headers,
                telemetry: Telemetry::new(cfg.metrics),
            }),
        })
    }

    /// Client pointed at `base_url` with every other setting defaulted.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Self::new(Config {
            base_url: Some(base_url.into()),
            ..Default::default()
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn models(&self) -> ModelsClient {
        ModelsClient {
            inner: self.inner.clone(),
        }
    }

    pub fn runs(&self) -> RunsClient {
        RunsClient {
            inner: self.inner.clone(),
        }
    }

    pub fn generate(&self) -> GenerateClient {
        GenerateClient {
            inner: self.inner.clone(),
        }
    }

    /// `GET /health`; true when the backend reports `ok`.
    pub async fn health(&self) -> Result<bool> {
        #[derive(Deserialize)]
        struct Health {
            #[serde(default)]
            status: String,
        }

        let builder = self.inner.request(Method::GET, &["health"])?;
        let health: Health = self
            .inner
            .execute_json(builder, &RequestOptions::default())
            .await?;
        Ok(health.status.eq_ignore_ascii_case("ok"))
    }
}

fn apply_header_list(
    mut builder: reqwest::RequestBuilder,
    headers: &HeaderList,
) -> Result<reqwest::RequestBuilder> {
    for entry in headers.iter() {
        if !entry.is_valid() {
            continue;
        }
        let name = HeaderName::from_bytes(entry.key.trim().as_bytes())
            .map_err(|err| Error::Config(format!("invalid header name: {err}")))?;
        let val = HeaderValue::from_str(entry.value.trim())
            .map_err(|err| Error::Config(format!("invalid header value: {err}")))?;
        builder = builder.header(name, val);
    }
    Ok(builder)
}

impl ClientInner {
    /// URL for `segments` under the base path. Segments are percent-encoded.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config("base url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) fn request(&self, method: Method, segments: &[&str]) -> Result<reqwest::RequestBuilder> {
        let url = self.endpoint(segments)?;
        Ok(self.http.request(method, url))
    }

    fn with_headers(
        &self,
        mut builder: reqwest::RequestBuilder,
        headers: &HeaderList,
    ) -> Result<reqwest::RequestBuilder> {
        builder = builder.header(ACCEPT, "application/json");
        if let Some(client_header) = self.client_header.as_deref() {
            builder = builder.header(CLIENT_HEADER, client_header);
        }
        if let Some(defaults) = &self.default_headers {
            builder = apply_header_list(builder, defaults)?;
        }
        apply_header_list(builder, headers)
    }

    fn with_timeout(
        &self,
        builder: reqwest::RequestBuilder,
        timeout: Option<Duration>,
    ) -> reqwest::RequestBuilder {
        builder.timeout(timeout.unwrap_or(self.request_timeout))
    }

    pub(crate) async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        options: &RequestOptions,
    ) -> Result<T> {
        let resp = self.send(builder, options).await?;
        let bytes = resp.bytes().await.map_err(TransportError::from_reqwest)?;
        let parsed = serde_json::from_slice::<T>(&bytes)?;
        Ok(parsed)
    }

    /// Send once. Non-2xx responses become [`Error::Api`].
    pub(crate) async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        options: &RequestOptions,
    ) -> Result<reqwest::Response> {
        let builder = self.with_headers(builder, &options.headers)?;
        let builder = self.with_timeout(builder, options.timeout);
        let request = builder.build().map_err(TransportError::from_reqwest)?;
        let ctx = RequestContext::new(request.method().as_str(), request.url().path());
        let start = Instant::now();

        match self.http.execute(request).await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        method = %ctx.method,
                        path = %ctx.path,
                        status = %status,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "request completed"
                    );
                    self.record(&ctx, start, Some(status.as_u16()), None);
                    return Ok(resp);
                }

                #[cfg(feature = "tracing")]
                tracing::warn!(
                    method = %ctx.method,
                    path = %ctx.path,
                    status = %status,
                    "request failed"
                );
                self.record(
                    &ctx,
                    start,
                    Some(status.as_u16()),
                    Some(format!("http {}", status.as_u16())),
                );
                let body = resp.text().await.unwrap_or_default();
                Err(parse_api_error_parts(status, body))
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(method = %ctx.method, path = %ctx.path, error = %err, "transport error");
                self.record(&ctx, start, None, Some(err.to_string()));
                Err(TransportError::from_reqwest(err).into())
            }
        }
    }

    fn record(&self, ctx: &RequestContext, start: Instant, status: Option<u16>, error: Option<String>) {
        if self.telemetry.http_enabled() {
            self.telemetry.record_http(HttpRequestMetrics {
                latency: start.elapsed(),
                status,
                error,
                context: ctx.clone(),
            });
        }
    }
}
