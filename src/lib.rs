//! # iam-sso - Client SDK for an IAM single sign-on service
//!
//! `iam-sso` lets a web application delegate authentication and authorization
//! to a central IAM service:
//!
//! - **Session resolution** from login credentials, an explicit token, the
//!   `x-authorization` header or the session cookie, with a login redirect
//!   when nothing resolves
//! - **Signed outbound calls** carrying the client IP, application key, bearer
//!   token and an encrypted policy overload
//! - **Policy matching** with `%` wildcard filters
//! - **Identity reads**: whoami, users, applications, hierarchy, escalation
//!
//! Every object is built per inbound request. The web framework stays outside:
//! the edge fills an [`InboundRequest`], turns halting [`IamError`]s into
//! redirects or failure replies, and applies the queued [`ResponseEffects`].
//!
//! ## Quick Start
//!
//! ```rust
//! use iam_sso::{IamConfig, IdentityFacade, InboundRequest, ScriptedTransport, SessionManager};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn main() -> iam_sso::Result<()> {
//! let config = IamConfig::from_toml_str(
//!     r#"
//!     host = "https://iam.example.com"
//!     cookie_name = "iam_session"
//!     application_key = "app-123"
//!     application_basename = "orders"
//!     policy_separator = "::"
//!     "#,
//! )?;
//!
//! let transport = Arc::new(ScriptedTransport::new());
//! transport.respond(
//!     "https://iam.example.com/api/iam/user/rules",
//!     json!({"status": true, "data": ["orders/invoice/read"]}),
//! );
//!
//! let request = InboundRequest::new("192.0.2.10", "https://orders.example.com/")
//!     .with_cookie("iam_session", "token");
//! let mut identity = IdentityFacade::new(SessionManager::new(config, request, transport));
//!
//! assert!(!identity.you_have_no_policies(&["orders/%/read"])?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Handling halts
//!
//! ```rust,no_run
//! use iam_sso::{IamError, IdentityFacade};
//!
//! fn guard(identity: &mut IdentityFacade) -> Result<(), String> {
//!     match identity.you_have_no_policies(&["orders/%"]) {
//!         Ok(false) => Ok(()),
//!         Ok(true) => Err("forbidden".to_string()),
//!         Err(err) => match err.redirect_location() {
//!             Some(location) => Err(format!("302 {}", location)),
//!             None => Err(err.to_string()),
//!         },
//!     }
//! }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use core::{cipher, config, error, gateway, iam, identity, request, session, transport};

// Re-export core types that users need
pub use crate::core::{
    cipher::{AesGcmCipher, Cipher, OverloadCodec},
    config::{ConfigSource, EnvSource, IamConfig},
    error::{IamError, Result},
    gateway::Gateway,
    iam::{PatternCache, PatternMatcher, PolicyEngine},
    identity::{AuthRedirect, IdentityFacade, KeyedRecords},
    request::{CookieDirective, InboundRequest, ResponseEffects},
    session::{normalize_bearer, CallFlags, Credentials, Session, SessionManager, SessionState},
    transport::{
        ApiResponse, Header, HttpClient, Method, RecordedCall, ScriptedTransport, TransportError,
    },
};

#[cfg(feature = "http")]
pub use crate::core::transport::ReqwestTransport;
