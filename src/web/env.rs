// ============================================================================
// Request Environment
// ============================================================================

use std::borrow::Cow;
use std::sync::Arc;

use http::{HeaderMap, Method, Uri, header, request::Parts};

use crate::storage::{LayeredStorage, StoredValue};

/// Request data the environment carries: method, URI and headers extracted
/// from the parsed inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    host: String,
}

impl RequestContext {
    pub fn new(parts: &Parts) -> Self {
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            host,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Full URL for diagnostics.
    pub fn url(&self) -> String {
        if self.uri.authority().is_some() {
            self.uri.to_string()
        } else {
            let path_and_query = self
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            format!("http://{}{}", self.host, path_and_query)
        }
    }
}

/// Routing state derived from the inbound request: the path still to be
/// matched plus the namespace and URL name filled in by the routing layer.
#[derive(Debug, Clone, Default)]
pub struct RouteState {
    path: String,
    namespace: String,
    url_name: String,
}

impl RouteState {
    pub fn new(request: &RequestContext) -> Self {
        Self {
            path: request.path().to_owned(),
            namespace: String::new(),
            url_name: String::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn url_name(&self) -> &str {
        &self.url_name
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace = namespace.into();
    }

    pub fn set_url_name(&mut self, url_name: impl Into<String>) {
        self.url_name = url_name.into();
    }
}

/// Root reverse-URL resolver. URL building itself belongs to the routing
/// layer; the environment only needs a resolver it can bind per request
/// without mutating the shared root.
#[derive(Debug, Clone, Default)]
pub struct UrlResolver {
    namespace: String,
    bound_path: Option<String>,
}

impl UrlResolver {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            bound_path: None,
        }
    }

    /// Produces a copy bound to the given request route state. The original
    /// resolver is left untouched.
    pub fn bind_to_env(&self, state: &RouteState) -> Self {
        Self {
            namespace: self.namespace.clone(),
            bound_path: Some(state.path().to_owned()),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound_path.is_some()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Localization seam. The defaults are deliberate pass-throughs so that a
/// deployment without translations keeps working.
pub trait Localizer: Send + Sync {
    fn gettext<'a>(&self, message: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(message)
    }

    fn ngettext<'a>(&self, singular: &'a str, plural: &'a str, count: u64) -> Cow<'a, str> {
        Cow::Borrowed(if count == 1 { singular } else { plural })
    }
}

/// Identity localization installed when a deployment configures nothing
/// else.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughLocalizer;

impl Localizer for PassthroughLocalizer {}

/// Per-request environment: a layered storage frame rooted at request
/// start, carrying the request context, route state and the bound root
/// resolver.
///
/// Deployments extend it through the storage frames; nested routing scopes
/// push frames that shadow attributes without touching the request root.
pub struct Environment {
    storage: LayeredStorage,
    request: Option<Arc<RequestContext>>,
    route_state: Option<RouteState>,
    root: UrlResolver,
    localizer: Arc<dyn Localizer>,
}

impl Environment {
    pub fn new(request: Option<RequestContext>, root: UrlResolver) -> Self {
        let mut storage = LayeredStorage::new();
        storage
            .root_mut()
            .set_lazy("current_location", current_location);

        let (request, route_state, root) = match request {
            Some(request) => {
                let request = Arc::new(request);
                let state = RouteState::new(&request);
                let bound = root.bind_to_env(&state);
                (Some(request), Some(state), bound)
            }
            // No live request: tooling and introspection get the root
            // resolver unchanged.
            None => (None, None, root),
        };

        Self {
            storage,
            request,
            route_state,
            root,
            localizer: Arc::new(PassthroughLocalizer),
        }
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = localizer;
        self
    }

    pub fn request(&self) -> Option<&RequestContext> {
        self.request.as_deref()
    }

    pub fn route_state(&self) -> Option<&RouteState> {
        self.route_state.as_ref()
    }

    pub fn route_state_mut(&mut self) -> Option<&mut RouteState> {
        self.route_state.as_mut()
    }

    pub fn root(&self) -> &UrlResolver {
        &self.root
    }

    pub fn storage(&self) -> &LayeredStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut LayeredStorage {
        &mut self.storage
    }

    pub fn gettext<'a>(&self, message: &'a str) -> Cow<'a, str> {
        self.localizer.gettext(message)
    }

    pub fn ngettext<'a>(&self, singular: &'a str, plural: &'a str, count: u64) -> Cow<'a, str> {
        self.localizer.ngettext(singular, plural, count)
    }

    /// Dotted location of the request within the routing tree, derived from
    /// the `namespace` and `current_url_name` storage attributes. Computed
    /// on first access and cached on the defining frame.
    pub fn current_location(&self) -> String {
        self.storage
            .get::<String>("current_location")
            .map(|location| (*location).clone())
            .unwrap_or_default()
    }
}

fn current_location(storage: &LayeredStorage) -> StoredValue {
    let mut parts: Vec<String> = Vec::new();
    for name in ["namespace", "current_url_name"] {
        if let Some(value) = storage.try_get::<String>(name) {
            if !value.is_empty() {
                parts.push((*value).clone());
            }
        }
    }
    Arc::new(parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, host: &str) -> RequestContext {
        let request = http::Request::builder()
            .uri(uri)
            .header(header::HOST, host)
            .body(())
            .expect("request");
        let (parts, _) = request.into_parts();
        RequestContext::new(&parts)
    }

    #[test]
    fn test_binds_root_when_request_present() {
        let env = Environment::new(Some(request("/docs/1", "example.com")), UrlResolver::root());
        assert!(env.root().is_bound());
        assert_eq!(env.request().map(|r| r.path()), Some("/docs/1"));
    }

    #[test]
    fn test_root_passed_through_without_request() {
        let env = Environment::new(None, UrlResolver::root());
        assert!(!env.root().is_bound());
        assert!(env.request().is_none());
    }

    #[test]
    fn test_gettext_defaults() {
        let env = Environment::new(None, UrlResolver::root());
        assert_eq!(env.gettext("hello"), "hello");
        assert_eq!(env.ngettext("one", "many", 1), "one");
        assert_eq!(env.ngettext("one", "many", 2), "many");
    }

    #[test]
    fn test_current_location_joins_non_empty_parts() {
        let mut env = Environment::new(None, UrlResolver::root());
        env.storage_mut().set("namespace", "docs".to_string());
        env.storage_mut()
            .set("current_url_name", "show".to_string());
        assert_eq!(env.current_location(), "docs.show");
    }

    #[test]
    fn test_current_location_empty_by_default() {
        let env = Environment::new(None, UrlResolver::root());
        assert_eq!(env.current_location(), "");
    }

    #[test]
    fn test_request_url_for_diagnostics() {
        let ctx = request("/a/b?q=1", "example.com");
        assert_eq!(ctx.url(), "http://example.com/a/b?q=1");
    }
}
