use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{event, Level};
use url::Url;

use crate::auth::error::AuthorizationException;
use crate::auth::{
    AuthorizationRequest, EndSessionRequest, ManagementRequest, ManagementResponse, RedirectOutcome,
    RegistrationRequest, TokenRequest,
};
use crate::core::{error::UsageError, models::AuthorizationServiceConfiguration, types::response_type};
use crate::http::client::ReqwestTransport;
use crate::oidc::{Display, Prompt};
use crate::provider::{AuthorizationService, ServiceConfig};
use crate::state::{AuthState, AuthStateManager, FileStateStore, StateError, StateStore, StoreError};
use crate::util::params::AdditionalParameters;

#[derive(Parser)]
#[clap(
    name = "tomiko-client",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
pub struct Options {
    /// Where the session is kept between runs.
    #[clap(long, env = "TOMIKO_CLIENT_STATE", default_value = "tomiko-client.json")]
    state: PathBuf,
    #[clap(long, env = "TOMIKO_CLIENT_ID")]
    client_id: Option<String>,
    #[clap(long, env = "TOMIKO_CLIENT_REDIRECT_URI")]
    redirect_uri: Option<Url>,
    /// Accept ID tokens from plain-http issuers.
    #[clap(long)]
    allow_http_issuer: bool,
    /// Per-request timeout in seconds.
    #[clap(long, default_value = "30")]
    timeout: u64,
    #[clap(subcommand)]
    command: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    Discover(Discover),
    Register(Register),
    Authorize(Authorize),
    Callback(Callback),
    Exchange(Exchange),
    Refresh(Refresh),
    Show(Show),
    Logout(Logout),
}

/// Fetch the provider's configuration and start a new session with it.
#[derive(Parser)]
struct Discover {
    #[clap(long, env = "TOMIKO_CLIENT_DISCOVERY_URI")]
    discovery_uri: Option<Url>,
    #[clap(long)]
    issuer: Option<Url>,
}

/// Register this client dynamically.
#[derive(Parser)]
struct Register {
    #[clap(long)]
    client_name: Option<String>,
}

/// Print the authorization URI to open in a browser.
#[derive(Parser)]
struct Authorize {
    #[clap(short, long, default_value = "openid")]
    scope: String,
    /// May be repeated, e.g. `--prompt login --prompt consent`.
    #[clap(long, multiple_occurrences = true)]
    prompt: Vec<Prompt>,
    #[clap(long)]
    display: Option<Display>,
    #[clap(long)]
    login_hint: Option<String>,
    #[clap(long)]
    no_pkce: bool,
}

/// Complete the pending browser round trip with the URI the provider redirected to.
#[derive(Parser)]
struct Callback {
    uri: Url,
}

/// Exchange the received authorization code for tokens.
#[derive(Parser)]
struct Exchange;

#[derive(Parser)]
struct Refresh {
    /// Refresh even if the access token is still fresh.
    #[clap(short, long)]
    force: bool,
}

#[derive(Parser)]
struct Show;

/// End the session, at the provider too when it supports RP-initiated logout.
#[derive(Parser)]
struct Logout {
    #[clap(long)]
    local: bool,
    #[clap(long)]
    post_logout_redirect_uri: Option<Url>,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Authorization(#[from] AuthorizationException),
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("stored request is unreadable: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Missing(&'static str),
}

struct Context {
    options: Options,
    manager: AuthStateManager<FileStateStore>,
    pending: FileStateStore,
    service: AuthorizationService<ReqwestTransport>,
}

impl Context {
    fn new(options: Options) -> Result<Self, CliError> {
        let manager = AuthStateManager::load(FileStateStore::new(&options.state))?;
        let pending = FileStateStore::new(options.state.with_extension("pending.json"));
        let config = ServiceConfig::default()
            .with_skip_issuer_https_check(options.allow_http_issuer)
            .with_request_timeout(Duration::from_secs(options.timeout));
        let service = AuthorizationService::with_config(ReqwestTransport::new(), config);
        Ok(Self {
            options,
            manager,
            pending,
            service,
        })
    }

    // An explicit client id wins over one obtained by registration.
    fn client_id(&self, state: &AuthState) -> Result<String, CliError> {
        self.options
            .client_id
            .clone()
            .or_else(|| {
                state
                    .last_registration_response()
                    .map(|r| r.client_id().to_string())
            })
            .ok_or(CliError::Missing("no client id; pass --client-id or run `register`"))
    }

    fn redirect_uri(&self) -> Result<Url, CliError> {
        self.options
            .redirect_uri
            .clone()
            .ok_or(CliError::Missing("no redirect URI; pass --redirect-uri"))
    }

    fn save_pending(&self, request: &ManagementRequest) -> Result<(), CliError> {
        self.pending.save(&request.to_json()?)?;
        Ok(())
    }

    async fn run_token_request(&self, request: TokenRequest) -> Result<Arc<AuthState>, CliError> {
        match self.service.perform_token_request(request).await {
            Ok(response) => Ok(self.manager.update_after_token_response(Some(response), None)?),
            Err(ex) => {
                self.manager.update_after_token_response(None, Some(ex.clone()))?;
                Err(ex.into())
            }
        }
    }
}

fn configuration_of(state: &AuthState) -> Result<AuthorizationServiceConfiguration, CliError> {
    state
        .authorization_service_configuration()
        .cloned()
        .ok_or(CliError::Missing("no provider configured; run `discover` first"))
}

async fn discover(c: &Discover, ctx: &Context) -> Result<(), CliError> {
    let configuration = match (&c.discovery_uri, &c.issuer) {
        (Some(uri), _) => ctx.service.fetch_configuration(uri).await?,
        (None, Some(issuer)) => ctx.service.fetch_from_issuer(issuer).await?,
        (None, None) => return Err(CliError::Missing("pass --discovery-uri or --issuer")),
    };
    println!("authorization endpoint: {}", configuration.authorization_endpoint);
    println!("token endpoint: {}", configuration.token_endpoint);
    ctx.manager.replace(AuthState::with_configuration(configuration))?;
    ctx.pending.clear()?;
    Ok(())
}

async fn register(c: &Register, ctx: &Context) -> Result<(), CliError> {
    let state = ctx.manager.current();
    let mut extra = AdditionalParameters::new();
    if let Some(name) = &c.client_name {
        extra.insert("client_name".to_string(), name.clone());
    }
    let request = RegistrationRequest::builder(configuration_of(&state)?, vec![ctx.redirect_uri()?])
        .additional_parameters(extra)
        .build()?;

    match ctx.service.perform_registration_request(request).await {
        Ok(response) => {
            println!("registered client {}", response.client_id());
            ctx.manager.update_after_registration(Some(response), None)?;
            Ok(())
        }
        Err(ex) => {
            ctx.manager.update_after_registration(None, Some(ex.clone()))?;
            Err(ex.into())
        }
    }
}

fn authorize(c: &Authorize, ctx: &Context) -> Result<(), CliError> {
    let state = ctx.manager.current();
    let mut builder = AuthorizationRequest::builder(
        configuration_of(&state)?,
        ctx.client_id(&state)?,
        ctx.redirect_uri()?,
        response_type::CODE,
    )
    .scope(&c.scope);
    if !c.prompt.is_empty() {
        builder = builder.prompt(Prompt::join(&c.prompt));
    }
    if let Some(display) = c.display {
        builder = builder.display(display);
    }
    if let Some(hint) = &c.login_hint {
        builder = builder.login_hint(hint.as_str());
    }
    if c.no_pkce {
        builder = builder.without_code_verifier();
    }
    let request = ManagementRequest::from(builder.build()?);

    ctx.save_pending(&request)?;
    if let Some(uri) = request.request_uri() {
        println!("{}", uri);
    }
    Ok(())
}

fn callback(c: &Callback, ctx: &Context) -> Result<(), CliError> {
    let json = ctx
        .pending
        .load()?
        .ok_or(CliError::Missing("no pending request; run `authorize` or `logout` first"))?;
    let request = ManagementRequest::from_json(&json)?;
    let is_authorization = matches!(request, ManagementRequest::Authorization(_));
    let outcome = request.complete(RedirectOutcome::Completed(c.uri.clone()), ctx.service.clock());
    ctx.pending.clear()?;

    match outcome {
        Ok(ManagementResponse::Authorization(response)) => {
            let has_code = response.authorization_code().is_some();
            ctx.manager.update_after_authorization(Some(response), None)?;
            if has_code {
                println!("authorization code received; run `exchange`");
            } else {
                println!("authorized");
            }
            Ok(())
        }
        Ok(ManagementResponse::EndSession(_)) => {
            ctx.manager.logout()?;
            println!("logged out");
            Ok(())
        }
        Err(ex) => {
            if is_authorization {
                ctx.manager.update_after_authorization(None, Some(ex.clone()))?;
            }
            Err(ex.into())
        }
    }
}

async fn exchange(_c: &Exchange, ctx: &Context) -> Result<(), CliError> {
    let state = ctx.manager.current();
    let authorization = state
        .last_authorization_response()
        .ok_or(CliError::Missing("no authorization response; run `authorize` first"))?;
    let request = authorization.create_token_exchange_request(AdditionalParameters::new())?;
    let state = ctx.run_token_request(request).await?;
    println!("authorized: {}", state.is_authorized());
    Ok(())
}

async fn refresh(c: &Refresh, ctx: &Context) -> Result<(), CliError> {
    let state = ctx.manager.current();
    if !c.force && !state.needs_token_refresh(ctx.service.clock()) {
        println!("access token is still fresh");
        return Ok(());
    }
    let request = state.create_token_refresh(AdditionalParameters::new())?;
    let state = ctx.run_token_request(request).await?;
    event!(Level::DEBUG, expires = ?state.access_token_expiration_time(), "refreshed");
    println!("refreshed");
    Ok(())
}

fn show(_c: &Show, ctx: &Context) -> Result<(), CliError> {
    let state = ctx.manager.current();
    let clock = ctx.service.clock();
    let summary = serde_json::json!({
        "authorized": state.is_authorized(),
        "issuer": state.authorization_service_configuration().and_then(|c| c.issuer.clone()),
        "scope": state.scope(),
        "subject": state.parsed_id_token().map(|t| t.subject),
        "access_token_expiration_time": state.access_token_expiration_time(),
        "needs_token_refresh": state.needs_token_refresh(clock),
        "has_refresh_token": state.refresh_token().is_some(),
        "client_secret_expired": state.has_client_secret_expired(clock),
        "authorization_exception": state.authorization_exception().map(ToString::to_string),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn logout(c: &Logout, ctx: &Context) -> Result<(), CliError> {
    let state = ctx.manager.current();
    let configuration = state.authorization_service_configuration().cloned();
    let remote = configuration.filter(|conf| !c.local && conf.end_session_endpoint.is_some());

    match remote {
        Some(configuration) => {
            let request = EndSessionRequest::builder(configuration)
                .id_token_hint(state.id_token().map(str::to_string))
                .post_logout_redirect_uri(c.post_logout_redirect_uri.clone())
                .build()?;
            let request = ManagementRequest::from(request);
            ctx.save_pending(&request)?;
            if let Some(uri) = request.request_uri() {
                println!("{}", uri);
            }
        }
        None => {
            ctx.manager.logout()?;
            ctx.pending.clear()?;
            println!("logged out");
        }
    }
    Ok(())
}

pub async fn run_cli_action(opts: Options) -> Result<(), CliError> {
    let ctx = Context::new(opts)?;
    match &ctx.options.command {
        SubCommand::Discover(c) => discover(c, &ctx).await,
        SubCommand::Register(c) => register(c, &ctx).await,
        SubCommand::Authorize(c) => authorize(c, &ctx),
        SubCommand::Callback(c) => callback(c, &ctx),
        SubCommand::Exchange(c) => exchange(c, &ctx).await,
        SubCommand::Refresh(c) => refresh(c, &ctx).await,
        SubCommand::Show(c) => show(c, &ctx),
        SubCommand::Logout(c) => logout(c, &ctx),
    }
}
