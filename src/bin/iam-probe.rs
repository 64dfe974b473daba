//! IAM probe
//!
//! Resolves a session against a live IAM service, prints the whoami profile
//! and checks a set of required policy filters.

use anyhow::{bail, Context};
use clap::Parser;
use iam_sso::{
    ConfigSource, Credentials, EnvSource, IamConfig, IdentityFacade, InboundRequest,
    ReqwestTransport, SessionManager,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "iam-probe")]
#[command(about = "Resolve an IAM session and check required policies")]
struct Args {
    /// TOML configuration file (top-level keys or an [iam] table)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// IAM host URL (falls back to IAM_HOST)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Application key sent in x-application (falls back to IAM_APPLICATION_KEY)
    #[arg(short = 'a', long)]
    application_key: Option<String>,

    /// Application basename (falls back to IAM_APPLICATION_BASENAME, then "iam-probe")
    #[arg(long)]
    basename: Option<String>,

    /// Session cookie name (falls back to IAM_COOKIE_NAME, then "iam_session")
    #[arg(long)]
    cookie_name: Option<String>,

    /// Policy separator (falls back to IAM_POLICY_SEPARATOR, then "::")
    #[arg(long)]
    policy_separator: Option<String>,

    /// Bearer token
    #[arg(short = 't', long, conflicts_with_all = ["email", "password"])]
    token: Option<String>,

    /// Login email
    #[arg(short = 'e', long, requires = "password")]
    email: Option<String>,

    /// Login password
    #[arg(short = 'p', long, requires = "email")]
    password: Option<String>,

    /// Client address reported in x-override-ip
    #[arg(long, default_value = "127.0.0.1")]
    client_ip: String,

    /// URL of the simulated inbound request
    #[arg(long, default_value = "http://localhost/")]
    url: String,

    /// Required policy filters (`%` is a wildcard)
    filters: Vec<String>,
}

/// Used when neither a flag nor the environment sets the key
const DEFAULTS: &[(&str, &str)] = &[
    ("application_basename", "iam-probe"),
    ("cookie_name", "iam_session"),
    ("policy_separator", "::"),
];

/// Command-line values first, then the environment, then [`DEFAULTS`]
struct ArgsSource<E> {
    values: HashMap<String, String>,
    env: E,
}

impl<E: ConfigSource> ConfigSource for ArgsSource<E> {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| self.env.get(key))
            .or_else(|| {
                DEFAULTS
                    .iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, value)| value.to_string())
            })
    }
}

fn flag_values(args: &Args) -> HashMap<String, String> {
    [
        ("host", &args.host),
        ("application_key", &args.application_key),
        ("application_basename", &args.basename),
        ("cookie_name", &args.cookie_name),
        ("policy_separator", &args.policy_separator),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.clone().map(|v| (key.to_string(), v)))
    .collect()
}

fn load_config(args: &Args) -> anyhow::Result<IamConfig> {
    if let Some(path) = &args.config {
        return IamConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()));
    }

    let source = ArgsSource {
        values: flag_values(args),
        env: EnvSource::new(),
    };
    Ok(IamConfig::from_source(&source)?)
}

fn run(args: Args) -> anyhow::Result<bool> {
    let config = load_config(&args)?;
    info!("Probing {}", config.host);

    let transport = Arc::new(ReqwestTransport::new()?);
    let request = InboundRequest::new(args.client_ip.as_str(), args.url.as_str());
    let mut identity = IdentityFacade::new(SessionManager::new(config, request, transport));

    let credentials = Credentials::new(
        args.token.as_deref(),
        args.email.as_deref(),
        args.password.as_deref(),
    );
    if credentials.is_empty() {
        bail!("no credentials: pass --token or --email/--password");
    }
    identity.get_session(credentials)?;

    let whoami = identity.whoami()?;
    println!("{}", serde_json::to_string_pretty(whoami)?);

    let matched = identity.get_policies(args.filters.as_slice())?;
    for policy in &matched {
        println!("granted: {}", policy);
    }

    let missing = identity.you_have_no_policies(args.filters.as_slice())?;
    println!(
        "verdict: {}",
        if missing { "missing policies" } else { "authorized" }
    );
    Ok(!missing)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            match err
                .downcast_ref::<iam_sso::IamError>()
                .and_then(|e| e.redirect_location())
            {
                Some(location) => eprintln!("login required: {}", location),
                None => eprintln!("error: {:#}", err),
            }
            ExitCode::from(2)
        }
    }
}
