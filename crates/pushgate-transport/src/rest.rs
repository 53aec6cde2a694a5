//! REST client, used by the gateway only to discover its endpoint.

use std::fmt;

use async_trait::async_trait;
use pushgate_core::{DiscoveryError, GatewayResolver};
use reqwest::{StatusCode, header::HeaderMap};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Default REST API base URL.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Default user agent.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/pushgate/pushgate, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// HTTP method of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// A REST route template. `{}` placeholders are filled in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub path: &'static str,
}

impl Route {
    pub const GET_GATEWAY: Self = Self::new(Method::Get, "/gateway");
    pub const GET_GATEWAY_BOT: Self = Self::new(Method::Get, "/gateway/bot");

    /// Create a route.
    #[must_use]
    pub const fn new(method: Method, path: &'static str) -> Self {
        Self { method, path }
    }

    /// Fill the placeholders with `args`.
    ///
    /// Missing arguments leave the placeholder in place; extra arguments are ignored.
    #[must_use]
    pub fn compile(&self, args: &[&(dyn fmt::Display + Sync)]) -> String {
        let mut out = String::with_capacity(self.path.len());
        let mut args = args.iter();
        let mut rest = self.path;
        while let Some(pos) = rest.find("{}") {
            out.push_str(&rest[..pos]);
            match args.next() {
                Some(arg) => out.push_str(&arg.to_string()),
                None => out.push_str("{}"),
            }
            rest = &rest[pos + 2..];
        }
        out.push_str(rest);
        out
    }
}

/// Rate-limit details from a 429 response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimit {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// Seconds until the bucket resets.
    pub reset_after: Option<f64>,
    pub bucket: Option<String>,
    pub global: bool,
    /// Seconds to wait, from the response body.
    pub retry_after: Option<f64>,
}

impl RateLimit {
    fn from_response(headers: &HeaderMap, body: &[u8]) -> Self {
        fn header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers.get(name)?.to_str().ok()?.parse().ok()
        }

        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Body {
            retry_after: Option<f64>,
            global: bool,
        }
        let body: Body = serde_json::from_slice(body).unwrap_or_default();

        Self {
            limit: header(headers, "x-ratelimit-limit"),
            remaining: header(headers, "x-ratelimit-remaining"),
            reset_after: header(headers, "x-ratelimit-reset-after"),
            bucket: header(headers, "x-ratelimit-bucket"),
            global: header::<bool>(headers, "x-ratelimit-global").unwrap_or(false) || body.global,
            retry_after: body.retry_after,
        }
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "limit: {:?}, remaining: {:?}, reset after: {:?}s, bucket: {:?}, global: {}",
            self.limit, self.remaining, self.reset_after, self.bucket, self.global
        )
    }
}

/// REST error.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("Too many requests ({0})")]
    RateLimited(RateLimit),
    #[error("The provided token is invalid")]
    Unauthorized,
    #[error("Bad gateway: could not reach the API")]
    BadGateway,
    #[error("Request to {url} failed. status: {status}, code: {code}, message: {message}")]
    Status {
        url: String,
        status: u16,
        code: u64,
        message: String,
    },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ErrorBody {
    code: u64,
    message: String,
}

/// REST client with bot authentication.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    user_agent: String,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Create a client for the default API base.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Override the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Use a preconfigured HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Make a request and decode the response into `T`.
    ///
    /// A 204 response decodes `T` from `null`, so `()` and `Option<_>` work
    /// as targets for bodiless routes.
    ///
    /// # Errors
    /// Returns error on transport failure or a non-success status.
    pub async fn request<B, T>(
        &self,
        route: &Route,
        args: &[&(dyn fmt::Display + Sync)],
        body: Option<&B>,
    ) -> Result<T, RestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, route.compile(args));
        let mut request = self
            .http
            .request(route.method.into(), &url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;

        match status {
            StatusCode::OK | StatusCode::CREATED => Ok(serde_json::from_slice(&bytes)?),
            StatusCode::NO_CONTENT => Ok(serde_json::from_value(Value::Null)?),
            StatusCode::TOO_MANY_REQUESTS => {
                let limit = RateLimit::from_response(&headers, &bytes);
                tracing::warn!(%url, %limit, "Rate limited");
                Err(RestError::RateLimited(limit))
            }
            StatusCode::BAD_GATEWAY => Err(RestError::BadGateway),
            StatusCode::UNAUTHORIZED => Err(RestError::Unauthorized),
            other => {
                let error: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_else(|_| ErrorBody {
                    code: 0,
                    message: String::from_utf8_lossy(&bytes).into_owned(),
                });
                Err(RestError::Status {
                    url,
                    status: other.as_u16(),
                    code: error.code,
                    message: error.message,
                })
            }
        }
    }
}

#[derive(Deserialize)]
struct GatewayInfo {
    url: String,
}

#[async_trait]
impl GatewayResolver for RestClient {
    async fn gateway_url(&self) -> Result<String, DiscoveryError> {
        let info: GatewayInfo = self
            .request::<(), _>(&Route::GET_GATEWAY_BOT, &[], None)
            .await
            .map_err(|e| match e {
                RestError::Unauthorized => DiscoveryError::Unauthorized,
                other => DiscoveryError::Failed(other.to_string()),
            })?;
        tracing::debug!(url = %info.url, "Discovered gateway endpoint");
        Ok(info.url)
    }
}
