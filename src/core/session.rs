//! Request-scoped session resolution
//!
//! A [`SessionManager`] is built for each inbound request and owns at most one
//! [`Session`]. Resolution follows a fixed precedence:
//!
//! ```text
//! email + password  ─────────────►  login call  ─► Authenticated (new session)
//! explicit token    ─┐
//! x-authorization   ─┼─ first hit ─►  Authenticated
//! session cookie    ─┘
//! nothing           ─────────────►  RedirectPending (IamError::LoginRequired)
//! ```
//!
//! Every outbound call goes through [`SessionManager::call_api`], which attaches
//! the session headers and applies the status gate.

use crate::core::cipher::OverloadCodec;
use crate::core::config::IamConfig;
use crate::core::request::{InboundRequest, ResponseEffects, HEADER_OVERRIDE_IP};
use crate::core::transport::{ApiResponse, Header, HttpClient, Method};
use crate::error::{IamError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const PATH_API_LOGIN: &str = "api/iam/user/login";

pub const HEADER_APPLICATION: &str = "x-application";
pub const HEADER_AUTHORIZATION: &str = "x-authorization";
pub const HEADER_OVERLOAD: &str = "x-overload";

/// Scheme prefix of the authorization header value
pub const AUTHORIZATION_TYPE: &str = "Bearer";

/// Query parameter carrying the return URL on the IAM login page
pub const HTTP_LOGIN: &str = "login";

const FIELD_AUTHORIZATION: &str = "authorization";

/// Per-call behaviour flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallFlags(u8);

impl CallFlags {
    pub const NONE: CallFlags = CallFlags(0);
    /// Hand failed replies back to the caller instead of halting
    pub const SKIP_STATUS: CallFlags = CallFlags(0x1);

    pub fn contains(self, other: CallFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CallFlags {
    type Output = CallFlags;

    fn bitor(self, rhs: CallFlags) -> CallFlags {
        CallFlags(self.0 | rhs.0)
    }
}

/// Credentials offered to [`SessionManager::get_session`]
///
/// Empty strings count as absent.
#[derive(Clone, Copy, Default)]
pub struct Credentials<'a> {
    token: Option<&'a str>,
    email: Option<&'a str>,
    password: Option<&'a str>,
}

impl<'a> Credentials<'a> {
    /// No credentials: reuse the cached session or resolve from the request
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(token: Option<&'a str>, email: Option<&'a str>, password: Option<&'a str>) -> Self {
        let present = |v: Option<&'a str>| v.filter(|s| !s.is_empty());
        Credentials {
            token: present(token),
            email: present(email),
            password: present(password),
        }
    }

    pub fn token(token: &'a str) -> Self {
        Self::new(Some(token), None, None)
    }

    pub fn login(email: &'a str, password: &'a str) -> Self {
        Self::new(None, Some(email), Some(password))
    }

    pub fn with_token(self, token: &'a str) -> Self {
        Self::new(Some(token), self.email, self.password)
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.email.is_none() && self.password.is_none()
    }

    fn login_pair(&self) -> Option<(&'a str, &'a str)> {
        self.email.zip(self.password)
    }
}

impl fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.map(|_| "<redacted>"))
            .field("email", &self.email)
            .field("password", &self.password.map(|_| "<redacted>"))
            .finish()
    }
}

/// Prefix `token` with `Bearer ` unless it already carries the scheme
///
/// The scheme counts only as a whole word, so `BearerXYZ` is a token.
pub fn normalize_bearer(token: &str) -> String {
    let token = token.trim();
    match token.strip_prefix(AUTHORIZATION_TYPE) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
            format!("{} {}", AUTHORIZATION_TYPE, rest.trim_start())
        }
        _ => format!("{} {}", AUTHORIZATION_TYPE, token),
    }
}

/// Login resolution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    /// Transient while credentials are being resolved
    Resolving,
    Authenticated,
    /// No credential source resolved; a login redirect was issued
    RedirectPending,
}

/// An authenticated session
pub struct Session {
    id: u64,
    token: Option<String>,
    overload: Option<Vec<String>>,
    headers: Vec<Header>,
    transport: Arc<dyn HttpClient>,
}

impl Session {
    /// Identifier unique within the owning manager
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bearer token, always carrying the `Bearer ` prefix
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn overload(&self) -> Option<&[String]> {
        self.overload.as_deref()
    }

    /// Headers attached to every outbound call, in wire order
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    fn rebuild_headers(
        &mut self,
        application_key: &str,
        client_ip: &str,
        codec: &OverloadCodec,
    ) -> Result<()> {
        let mut headers = vec![
            Header::new(HEADER_OVERRIDE_IP, client_ip),
            Header::new(HEADER_APPLICATION, application_key),
        ];
        if let Some(token) = &self.token {
            headers.push(Header::new(HEADER_AUTHORIZATION, normalize_bearer(token)));
        }
        if let Some(overload) = &self.overload {
            headers.push(Header::new(HEADER_OVERLOAD, codec.encode(overload)?));
        }
        self.headers = headers;
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("overload", &self.overload)
            .field(
                "headers",
                &self.headers.iter().map(|h| h.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Owns the session of one inbound request
pub struct SessionManager {
    config: IamConfig,
    request: InboundRequest,
    transport: Arc<dyn HttpClient>,
    codec: OverloadCodec,
    session: Option<Session>,
    pending_overload: Option<Vec<String>>,
    state: SessionState,
    effects: ResponseEffects,
    next_id: u64,
}

impl SessionManager {
    /// Create a manager whose overload codec is keyed by the client IP
    pub fn new(config: IamConfig, request: InboundRequest, transport: Arc<dyn HttpClient>) -> Self {
        let codec = OverloadCodec::for_client(request.client_ip(config.trust_override_ip));
        SessionManager {
            config,
            request,
            transport,
            codec,
            session: None,
            pending_overload: None,
            state: SessionState::NoSession,
            effects: ResponseEffects::default(),
            next_id: 1,
        }
    }

    /// Replace the overload codec
    pub fn with_codec(mut self, codec: OverloadCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Return the session, creating or replacing it as the credentials require
    ///
    /// - no credentials and a cached session: the cached session
    /// - no credentials, nothing cached: token from the request, else
    ///   [`IamError::LoginRequired`]
    /// - a token: a new session carrying that token
    /// - email and password: a new session authenticated by the login call
    pub fn get_session(&mut self, credentials: Credentials<'_>) -> Result<&Session> {
        if !(credentials.is_empty() && self.session.is_some()) {
            if let Err(err) = self.establish(credentials) {
                if self.state == SessionState::Resolving {
                    self.session = None;
                    self.state = SessionState::NoSession;
                }
                return Err(err);
            }
        }
        self.session.as_ref().ok_or_else(|| self.login_required())
    }

    fn establish(&mut self, credentials: Credentials<'_>) -> Result<()> {
        self.state = SessionState::Resolving;

        let overload = self
            .session
            .as_ref()
            .and_then(|s| s.overload.clone())
            .or_else(|| self.pending_overload.take());

        let id = self.next_id;
        self.next_id += 1;

        let mut session = Session {
            id,
            token: None,
            overload,
            headers: Vec::new(),
            transport: Arc::clone(&self.transport),
        };

        if let Some((email, password)) = credentials.login_pair() {
            session.rebuild_headers(&self.config.application_key, self.client_ip(), &self.codec)?;
            self.session = Some(session);
            return self.login(email, password);
        }

        let bearer = credentials
            .token
            .or_else(|| self.request.header(HEADER_AUTHORIZATION))
            .or_else(|| self.request.cookie(&self.config.cookie_name))
            .map(normalize_bearer);

        if bearer.is_none() && credentials.is_empty() {
            self.state = SessionState::RedirectPending;
            let err = self.login_required();
            if let Some(location) = err.redirect_location() {
                info!("No credentials for session {}; redirecting to {}", id, location);
            }
            return Err(err);
        }

        session.token = bearer;
        session.rebuild_headers(&self.config.application_key, self.client_ip(), &self.codec)?;
        debug!(
            "Session {} created (token present: {})",
            id,
            session.token.is_some()
        );

        self.session = Some(session);
        self.state = SessionState::Authenticated;
        Ok(())
    }

    fn login(&mut self, email: &str, password: &str) -> Result<()> {
        let url = self.config.endpoint(PATH_API_LOGIN);
        let body = json!({ "email": email, "password": password });
        let response = self.call_api(&url, Some(&body), CallFlags::NONE)?;

        let token = response
            .field(FIELD_AUTHORIZATION)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| IamError::MissingField {
                endpoint: PATH_API_LOGIN.to_string(),
                field: FIELD_AUTHORIZATION.to_string(),
            })?;

        self.set_token(token)?;
        self.state = SessionState::Authenticated;
        info!("Logged in as {}", email);
        Ok(())
    }

    fn set_token(&mut self, token: &str) -> Result<()> {
        let client_ip = self.request.client_ip(self.config.trust_override_ip);
        if let Some(session) = self.session.as_mut() {
            session.token = Some(normalize_bearer(token));
            session.rebuild_headers(&self.config.application_key, client_ip, &self.codec)?;
        }
        Ok(())
    }

    /// Replace the overload list and rebuild the headers
    ///
    /// Without a session the list is held and applied to the next one.
    pub fn set_overload(&mut self, policies: Vec<String>) -> Result<()> {
        let client_ip = self.request.client_ip(self.config.trust_override_ip);
        match self.session.as_mut() {
            Some(session) => {
                session.overload = Some(policies);
                session.rebuild_headers(&self.config.application_key, client_ip, &self.codec)
            }
            None => {
                self.pending_overload = Some(policies);
                Ok(())
            }
        }
    }

    pub fn overload(&self) -> Option<&[String]> {
        match &self.session {
            Some(session) => session.overload(),
            None => self.pending_overload.as_deref(),
        }
    }

    /// Adopt the overload list carried by the inbound `x-overload` header
    ///
    /// Returns `true` when a list was decoded and applied.
    pub fn adopt_inbound_overload(&mut self) -> Result<bool> {
        let decoded = self
            .request
            .header(HEADER_OVERLOAD)
            .and_then(|header| self.codec.decode(header));

        match decoded {
            Some(policies) => {
                debug!("Adopting {} overload policies from request", policies.len());
                self.set_overload(policies)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Perform a call with the session headers
    ///
    /// GET without a body, POST with one. A reply carrying `status: false`
    /// becomes [`IamError::UpstreamFailure`] unless `flags` has
    /// [`CallFlags::SKIP_STATUS`].
    pub fn call_api(
        &mut self,
        url: &str,
        body: Option<&Value>,
        flags: CallFlags,
    ) -> Result<ApiResponse> {
        let session = self.get_session(Credentials::none())?;
        let method = if body.is_some() {
            Method::Post
        } else {
            Method::Get
        };

        debug!("{} {} (session {})", method, url, session.id);
        let reply = session.transport.request(method, url, body, &session.headers)?;
        let response = ApiResponse::new(reply);

        if response.is_failure() && !flags.contains(CallFlags::SKIP_STATUS) {
            warn!("{} {} answered with a failure status", method, url);
            return Err(IamError::UpstreamFailure {
                url: url.to_string(),
                body: response.into_body(),
            });
        }

        Ok(response)
    }

    /// Queue expiry of the session cookie
    pub fn logout(&mut self) {
        info!("Expiring session cookie '{}'", self.config.cookie_name);
        self.effects.expire_cookie(&self.config.cookie_name);
    }

    /// Queue the session cookie with `value`
    pub fn remember(&mut self, value: &str) {
        self.effects.set_cookie(&self.config.cookie_name, value);
    }

    /// Logout and build the redirect for a bootstrap call that lost its payload
    pub fn reject_session(&mut self, endpoint: &str) -> IamError {
        warn!("{} returned no data; dropping session", endpoint);
        self.logout();
        IamError::SessionRejected {
            endpoint: endpoint.to_string(),
            location: self.login_location(),
        }
    }

    /// Login page URL carrying the current URL as return target
    pub fn login_location(&self) -> String {
        format!(
            "{}?{}={}",
            self.config.host,
            HTTP_LOGIN,
            URL_SAFE_NO_PAD.encode(self.request.url())
        )
    }

    fn login_required(&self) -> IamError {
        IamError::LoginRequired {
            location: self.login_location(),
        }
    }

    fn client_ip(&self) -> &str {
        self.request.client_ip(self.config.trust_override_ip)
    }

    /// Hand the queued cookie changes to the edge
    pub fn take_effects(&mut self) -> ResponseEffects {
        std::mem::take(&mut self.effects)
    }

    pub fn effects(&self) -> &ResponseEffects {
        &self.effects
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &IamConfig {
        &self.config
    }

    pub fn request(&self) -> &InboundRequest {
        &self.request
    }

    pub fn codec(&self) -> &OverloadCodec {
        &self.codec
    }
}
