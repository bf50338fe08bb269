// ============================================================================
// Application Dispatcher
// ============================================================================
//
// Request-handling façade. The dispatcher is the only place where errors
// become wire responses; components below it raise typed errors and never
// build responses themselves.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use futures::FutureExt;
use http::{HeaderValue, StatusCode, header};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::storage::LayeredStorage;
use crate::web::env::{Environment, Localizer, RequestContext, UrlResolver};

lazy_static! {
    static ref HOSTNAME_REGEX: Regex = Regex::new(
        r"^(([a-zA-Z]|[a-zA-Z][a-zA-Z0-9\-]*[a-zA-Z0-9])\.)*([A-Za-z]|[A-Za-z][A-Za-z0-9\-]*[A-Za-z0-9])(:\d+)?$"
    )
    .expect("hostname pattern");
    static ref IP_REGEX: Regex = Regex::new(
        r"^(([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])\.){3}([0-9]|[1-9][0-9]|1[0-9]{2}|2[0-4][0-9]|25[0-5])(:\d+)?$"
    )
    .expect("ip pattern");
}

/// HTTP-level control-flow signal. Handlers raise it through the error
/// channel to short-circuit with a finished status; the dispatcher passes
/// it through verbatim instead of treating it as a failure.
#[derive(Debug, Clone)]
pub struct HttpException {
    status: StatusCode,
    message: Option<String>,
}

impl HttpException {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: None,
        }
    }

    pub fn with_message(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn to_response(&self) -> Response {
        let body = self
            .message
            .clone()
            .unwrap_or_else(|| canonical_reason(self.status));
        plain_response(self.status, body)
    }
}

impl fmt::Display for HttpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", canonical_reason(self.status))?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpException {}

/// Handler result ready for wire conversion. JSON bodies are serialized at
/// the outermost boundary so a failure there still maps to a clean
/// internal-error reply.
pub enum WebResponse {
    /// Already-built response, passed through as is.
    Ready(Response),
    /// Plain-text body.
    Text(StatusCode, String),
    /// JSON body, encoded during wire conversion.
    Json(StatusCode, serde_json::Value),
}

impl WebResponse {
    pub fn text(body: impl Into<String>) -> Self {
        WebResponse::Text(StatusCode::OK, body.into())
    }

    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Self, anyhow::Error> {
        Ok(WebResponse::Json(status, serde_json::to_value(body)?))
    }

    fn into_wire(self) -> Result<Response, anyhow::Error> {
        match self {
            WebResponse::Ready(response) => Ok(response),
            WebResponse::Text(status, body) => Ok(plain_response(status, body)),
            WebResponse::Json(status, value) => {
                let bytes = serde_json::to_vec(&value)?;
                let mut response = Response::new(Body::from(bytes));
                *response.status_mut() = status;
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                Ok(response)
            }
        }
    }
}

pub type HandlerResult = Result<Option<WebResponse>, anyhow::Error>;

/// The composed application handler invoked once per request.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, env: &mut Environment, data: &mut LayeredStorage) -> HandlerResult;
}

/// Unhandled-error hook. Deployments override it to forward crashes to
/// their monitoring; the default logs the full context.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, request: Option<&RequestContext>, error: &anyhow::Error);
}

/// Default reporter logging method, URL and the error chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, request: Option<&RequestContext>, error: &anyhow::Error) {
        match request {
            Some(request) => log::error!(
                "unhandled error for {} {}: {:#}",
                request.method(),
                request.url(),
                error
            ),
            None => log::error!("unhandled error: {:#}", error),
        }
    }
}

/// Application entry point wrapping a [`RequestHandler`].
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use webloom::storage::LayeredStorage;
/// use webloom::web::{Application, Environment, HandlerResult, RequestHandler, WebResponse};
///
/// struct Hello;
///
/// #[async_trait]
/// impl RequestHandler for Hello {
///     async fn handle(&self, _env: &mut Environment, _data: &mut LayeredStorage) -> HandlerResult {
///         Ok(Some(WebResponse::text("hello")))
///     }
/// }
///
/// # async fn serve() -> Result<(), Box<dyn std::error::Error>> {
/// let app = Application::new(Hello).into_router();
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    handler: Arc<dyn RequestHandler>,
    root: UrlResolver,
    reporter: Arc<dyn ErrorReporter>,
    localizer: Arc<dyn Localizer>,
}

impl Application {
    pub fn new(handler: impl RequestHandler + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            root: UrlResolver::root(),
            reporter: Arc::new(LogReporter),
            localizer: Arc::new(crate::web::env::PassthroughLocalizer),
        }
    }

    pub fn with_root(mut self, root: UrlResolver) -> Self {
        self.root = root;
        self
    }

    pub fn with_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn with_localizer(mut self, localizer: impl Localizer + 'static) -> Self {
        self.localizer = Arc::new(localizer);
        self
    }

    /// A host is acceptable when it looks like a DNS hostname or a numeric
    /// IPv4 address, optionally with a port. Anything else would let a
    /// forged Host header leak into generated URLs.
    pub fn is_host_valid(host: &str) -> bool {
        HOSTNAME_REGEX.is_match(host) || IP_REGEX.is_match(host)
    }

    /// Invokes the handler and maps its outcome:
    /// an [`HttpException`] becomes the response verbatim, `None` maps to
    /// not-found, any other error is reported once and becomes a generic
    /// internal error. Panics are contained the same way.
    async fn handle(&self, env: &mut Environment, data: &mut LayeredStorage) -> WebResponse {
        let outcome = AssertUnwindSafe(self.handler.handle(env, data))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(anyhow::anyhow!("handler panicked: {}", panic_text(&panic))));

        match outcome {
            Ok(Some(response)) => response,
            Ok(None) => {
                debug!("handler returned no response, mapping to not found");
                WebResponse::Text(
                    StatusCode::NOT_FOUND,
                    canonical_reason(StatusCode::NOT_FOUND),
                )
            }
            Err(error) => match error.downcast_ref::<HttpException>() {
                Some(exception) => WebResponse::Ready(exception.to_response()),
                None => {
                    self.reporter.report(env.request(), &error);
                    WebResponse::Text(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        canonical_reason(StatusCode::INTERNAL_SERVER_ERROR),
                    )
                }
            },
        }
    }

    /// Serves one request: validates the Host header, builds the
    /// environment and data bag, dispatches, and converts the outcome to a
    /// wire reply. This method never fails; the last-resort path is a plain
    /// internal-error response.
    pub async fn respond(&self, request: Request) -> Response {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if !Self::is_host_valid(host) {
            warn!("unusual header \"Host: {}\", returning not found", host);
            return plain_response(
                StatusCode::NOT_FOUND,
                canonical_reason(StatusCode::NOT_FOUND),
            );
        }

        let (parts, _body) = request.into_parts();
        let context = RequestContext::new(&parts);
        let mut env = Environment::new(Some(context), self.root.clone())
            .with_localizer(self.localizer.clone());
        let mut data = LayeredStorage::new();

        let response = self.handle(&mut env, &mut data).await;
        match response.into_wire() {
            Ok(response) => response,
            Err(error) => {
                self.reporter.report(env.request(), &error);
                plain_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    canonical_reason(StatusCode::INTERNAL_SERVER_ERROR),
                )
            }
        }
    }

    /// Wraps the application into an axum router serving every path.
    pub fn into_router(self) -> Router {
        let app = Arc::new(self);
        Router::new()
            .fallback(move |request: Request| {
                let app = Arc::clone(&app);
                async move { app.respond(request).await }
            })
            .layer(TraceLayer::new_for_http())
    }
}

fn canonical_reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Unknown Status")
        .to_owned()
}

fn plain_response(status: StatusCode, body: impl Into<String>) -> Response {
    let mut response = Response::new(Body::from(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn panic_text(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostnames_accepted() {
        for host in [
            "example.com",
            "example.com:8080",
            "sub.domain.example.com",
            "localhost",
            "127.0.0.1",
            "127.0.0.1:8000",
        ] {
            assert!(Application::is_host_valid(host), "expected valid: {}", host);
        }
    }

    #[test]
    fn test_hostnames_rejected() {
        for host in [
            "",
            "not a host!!",
            "exa mple.com",
            "-leading.example.com",
            "example.com:port",
            "256.1.1.1",
        ] {
            assert!(
                !Application::is_host_valid(host),
                "expected invalid: {}",
                host
            );
        }
    }

    #[test]
    fn test_http_exception_display() {
        let exception = HttpException::with_message(StatusCode::FORBIDDEN, "nope");
        assert_eq!(exception.to_string(), "Forbidden: nope");
    }
}
