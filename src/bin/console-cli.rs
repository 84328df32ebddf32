use std::collections::BTreeSet;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use proxy_console::auth::CredentialValidator;

#[derive(Parser)]
#[command(name = "console-cli")]
#[command(about = "Management CLI for the proxy console", long_about = None)]
struct Cli {
    #[arg(short, long, env = "CONSOLE_URL", default_value = "http://localhost:8081")]
    url: String,

    /// Bearer token for authenticated commands.
    #[arg(short, long, env = "CONSOLE_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exchange email and password for a token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CONSOLE_PASSWORD")]
        password: String,
    },
    /// Mint a token offline with the signing secret
    Token {
        #[arg(long, env = "CONSOLE_JWT_SECRET")]
        secret: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long = "role")]
        roles: Vec<String>,
        #[arg(long, default_value = "proxy-console")]
        issuer: String,
        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },
    /// Check console status (admin)
    Status,
    /// Show limiter tiers and visitor counts (admin)
    Limiter,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    }

    match cli.command {
        Commands::Login { email, password } => {
            let res = client
                .post(format!("{}/api/tokens", cli.url))
                .json(&serde_json::json!({ "identity": email, "secret": password }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Token {
            secret,
            subject,
            email,
            roles,
            issuer,
            ttl_secs,
        } => {
            let validator = CredentialValidator::new(&secret, issuer, Duration::from_secs(ttl_secs));
            let roles: BTreeSet<String> = roles.into_iter().collect();
            let (token, claims) = validator.issue(&subject, &email, &roles)?;
            let out = serde_json::json!({ "token": token, "claims": claims });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Limiter => {
            let res = client
                .get(format!("{}/admin/limiter", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: console returned status {}", status);
        if let Some(retry) = res.headers().get("retry-after").and_then(|v| v.to_str().ok()) {
            eprintln!("Retry after: {}s", retry);
        }
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
