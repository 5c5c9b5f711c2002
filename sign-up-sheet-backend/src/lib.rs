#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    reason = "not yet ready for that"
)]

pub mod bidding;
pub mod context;
pub mod error;
pub mod flash;
pub mod forms;
pub mod outcome;
pub mod routes;
pub mod session;
pub mod telemetry;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use cookie::Key;
use futures_util::{pin_mut, Future};
use headers::HeaderMapExt as _;
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use sign_up_sheet_config::{Config, ConfigError, MIN_SESSION_SECRET_LEN};
use sign_up_sheet_database::get_database_connection;
use sign_up_sheet_database::repo::{DieselRepo, MemoryRepo, Repo, UsersRepo as _};
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument as _};

use crate::context::RequestContext;
use crate::error::AppError;
use crate::forms::Params;
use crate::routes::Route;
use crate::session::{user_cookie, Session};

pub trait ResponseTypedHeaderExt {
    #[must_use]
    fn typed_header<H: headers::Header>(self, header: H) -> Self;
}

impl ResponseTypedHeaderExt for http::response::Builder {
    fn typed_header<H: headers::Header>(mut self, header: H) -> Self {
        if let Some(headers) = self.headers_mut() {
            headers.typed_insert(header);
        }
        self
    }
}

#[derive(Clone)]
pub struct AppState {
    repo: Arc<dyn Repo>,
    key: Key,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, session_secret: &[u8]) -> Result<Self, ConfigError> {
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::SessionSecretTooShort(session_secret.len()));
        }
        Ok(Self {
            repo,
            key: Key::derive_from(session_secret),
        })
    }

    /// The in-memory repository starts out with demo data, the login cookies of its
    /// users are logged so requests can be made by hand.
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        let secret = config.session_secret.as_bytes();
        if !config.uses_memory_database() {
            info!("using postgres repository");
            let pool = get_database_connection(&config.database_url)?;
            return Ok(Self::new(Arc::new(DieselRepo::new(pool)), secret)?);
        }
        let (repo, assignment, users) = MemoryRepo::with_demo_data().await?;
        let state = Self::new(Arc::new(repo), secret)?;
        info!(
            assignment = assignment.id,
            list = %format!("/sign_up_sheet/list?id={}", assignment.id),
            "using in-memory repository with demo data"
        );
        for user in &users {
            info!(
                user = %user.name,
                role = %user.role,
                cookie = %user_cookie(&state.key, user.id).stripped(),
                "demo login"
            );
        }
        Ok(state)
    }

    #[must_use]
    pub const fn key(&self) -> &Key {
        &self.key
    }

    #[must_use]
    pub fn repo(&self) -> &dyn Repo {
        self.repo.as_ref()
    }
}

/// Serves one request. Failures become error responses, so this never fails itself.
pub async fn handle<B>(state: &AppState, request: Request<B>) -> Response<Full<Bytes>>
where
    B: http_body::Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let session = Session::new(&request, &state.key);
    let span = tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path()
    );
    let result = async {
        let outcome = serve(state, &session, request).await?;
        outcome.into_response(session.clone())
    }
    .instrument(span)
    .await;
    result.unwrap_or_else(|err| err.build_error_response(session))
}

async fn serve<B>(
    state: &AppState,
    session: &Session,
    request: Request<B>,
) -> Result<outcome::Outcome, AppError>
where
    B: http_body::Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let path = request.uri().path().to_owned();
    let route = Route::from_path(&path).ok_or_else(|| AppError::NoRoute {
        method: request.method().clone(),
        path: path.clone(),
    })?;
    if !route.accepts(request.method()) {
        return Err(AppError::MethodNotAllowed {
            method: request.method().clone(),
            path,
        });
    }
    let user_id = session.user_id().ok_or(AppError::Unauthenticated)?;
    let user = state
        .repo
        .user_try_load(user_id)
        .await?
        .ok_or(AppError::Unauthenticated)?;
    debug!(user_id = user.id, action = route.action(), "dispatching");
    let ctx = RequestContext::new(user, Utc::now());
    let params = Params::from_request(request).await?;
    routes::dispatch(state.repo.as_ref(), &ctx, session, route, &params).await
}

#[allow(clippy::cognitive_complexity)]
pub async fn run_server(
    config: &Config,
) -> Result<impl Future<Output = Result<(), AppError>>, AppError> {
    info!("starting up server...");
    let state = AppState::from_config(config).await?;

    let listener = TcpListener::bind(config.listen_address).await?;

    // tell the connections to shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let shutdown_tx = Arc::new(shutdown_tx);

    // wait for the connections to finish shutdown
    let (closed_tx, closed_rx) = watch::channel(());

    info!(address = %config.listen_address, "started up server...");

    Ok(async move {
        #[allow(clippy::redundant_pub_crate)]
        loop {
            select! {
                accept = listener.accept() => {
                    let (socket, remote_addr): (_, SocketAddr) = match accept {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!("failed to accept connection: {err}");
                            continue;
                        }
                    };

                    let state = state.clone();
                    let shutdown_tx = Arc::clone(&shutdown_tx);
                    let closed_rx = closed_rx.clone();

                    let fut = async move {
                        let socket = TokioIo::new(socket);

                        let hyper_service = hyper::service::service_fn(move |request: Request<Incoming>| {
                            let state = state.clone();
                            async move {
                                Ok::<_, std::convert::Infallible>(handle(&state, request).await)
                            }
                        });

                        let builder = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new());
                        let connection = builder.serve_connection(socket, hyper_service);
                        pin_mut!(connection);

                        loop {
                            select! {
                                connection_result = connection.as_mut() => {
                                    if let Err(err) = connection_result {
                                        error!("failed to serve connection: {err:#}");
                                    }
                                    break; // (gracefully) finished connection
                                }
                                () = shutdown_tx.closed() => {
                                    connection.as_mut().graceful_shutdown();
                                }
                            }
                        }

                        drop(closed_rx);
                    };

                    let span = tracing::debug_span!("connection", %remote_addr);
                    tokio::spawn(fut.instrument(span));
                }
                () = shutdown_signal() => {
                    warn!("shutting down");
                    drop(shutdown_rx); // initiate shutdown
                    drop(closed_rx);
                    closed_tx.closed().await;
                    break;
                }
            }
        }

        Ok(())
    })
}

#[allow(clippy::redundant_pub_crate)]
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
