pub mod app;
pub mod env;

pub use app::{
    Application, ErrorReporter, HandlerResult, HttpException, LogReporter, RequestHandler,
    WebResponse,
};
pub use env::{Environment, Localizer, PassthroughLocalizer, RequestContext, RouteState, UrlResolver};
