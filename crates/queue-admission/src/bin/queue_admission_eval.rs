#![expect(clippy::print_stdout)]

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use queue_admission::{
    AJAX_REDIRECT_HEADER, ConnectorSettings, CustomerIntegration, KnownUser, MemoryHttpContext,
    split_queueit_token,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "queue-admission-eval")]
#[command(about = "Evaluate one request against a waiting-room integration document")]
struct Args {
    /// Integration document (JSON) as published by the waiting-room service.
    #[arg(long)]
    config: PathBuf,
    /// Full request URL. A `queueittoken` parameter is split off and used as the token.
    #[arg(long)]
    url: String,
    /// Admission token; overrides any token found on the URL.
    #[arg(long)]
    token: Option<String>,
    /// Request cookie as name=value, value percent-encoded as sent by a browser. Repeatable.
    #[arg(long = "cookie")]
    cookies: Vec<String>,
    /// Request header as name=value. Repeatable.
    #[arg(long = "header")]
    headers: Vec<String>,
    #[arg(long)]
    user_agent: Option<String>,
    #[arg(long)]
    client_ip: Option<String>,
    #[arg(long, env = "QUEUE_ADMISSION_CUSTOMER_ID")]
    customer_id: Option<String>,
    #[arg(long, env = "QUEUE_ADMISSION_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = ConnectorSettings::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.as_str())),
        )
        .init();

    if let Some(customer_id) = args.customer_id {
        settings.customer_id = customer_id;
    }
    if let Some(secret_key) = args.secret_key {
        settings.secret_key = secret_key;
    }

    let raw = fs::read_to_string(&args.config)
        .with_context(|| format!("read integration document {}", args.config.display()))?;
    let integration = CustomerIntegration::from_json(&raw)?;

    let (current_url, url_token) = split_queueit_token(&args.url);
    let token = args.token.or(url_token);

    let mut context = MemoryHttpContext::new().with_absolute_uri(&args.url);
    for cookie in &args.cookies {
        let (name, value) = split_pair(cookie)?;
        let value = urlencoding::decode(value)
            .with_context(|| format!("cookie '{name}' is not valid percent-encoding"))?;
        context = context.with_cookie(name, &value);
    }
    for header in &args.headers {
        let (name, value) = split_pair(header)?;
        context = context.with_header(name, value);
    }
    if let Some(user_agent) = args.user_agent.as_deref() {
        context = context.with_header("User-Agent", user_agent);
    }
    if let Some(client_ip) = args.client_ip.as_deref() {
        context = context.with_user_host_address(client_ip);
    }

    let known_user = KnownUser::new(settings);
    let result = known_user.validate_request_by_integration_config(
        &mut context,
        &current_url,
        token.as_deref(),
        Some(&integration),
    )?;

    let set_cookie: Vec<String> = context
        .written_cookies()
        .iter()
        .map(|cookie| cookie.to_header_value())
        .collect();
    let mut response_headers = serde_json::Map::new();
    if result.is_ajax_result() && result.do_redirect() {
        response_headers.insert(
            AJAX_REDIRECT_HEADER.to_string(),
            json!(result.ajax_redirect_url()),
        );
    }

    let do_redirect = result.do_redirect();
    let report = json!({
        "decision": &result,
        "doRedirect": do_redirect,
        "responseHeaders": response_headers,
        "setCookie": set_cookie,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| anyhow!("expected name=value, got '{raw}'"))
}
