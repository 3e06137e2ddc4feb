//! kirkidata - inspect and drive Kirkidata API sessions from the terminal

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kirkidata_client::{
    ApiClient, AuthApi, ClientConfig, Credentials, JsonFileStore, RequestOptions, Role,
    SessionEventBus, Sessions, TokenClaims,
};

#[derive(Parser)]
#[command(name = "kirkidata")]
#[command(about = "Manage Kirkidata API sessions")]
#[command(version)]
struct Cli {
    /// Override the log filter (RUST_LOG still wins when set)
    #[arg(short = 'l', long, global = true)]
    log_level: Option<LogLevel>,

    /// JSON config file; environment defaults are used otherwise
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// API base URL, e.g. https://api.kirkidata.com/api/v1
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Where sessions are persisted
    #[arg(long, global = true)]
    session_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show both sessions and when their access tokens expire
    Status,
    /// Log in and persist the new session
    Login {
        #[arg(short, long, value_enum, default_value = "user")]
        role: RoleArg,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Log out and clear the persisted session
    Logout {
        #[arg(short, long, value_enum, default_value = "user")]
        role: RoleArg,
    },
    /// Force a token refresh for a session
    Refresh {
        #[arg(short, long, value_enum, default_value = "user")]
        role: RoleArg,
    },
    /// GET an endpoint under a session and print the JSON body
    Get {
        /// Endpoint path relative to the base URL, e.g. /users/me
        endpoint: String,
        #[arg(short, long, value_enum, default_value = "user")]
        role: RoleArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    User,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => Role::User,
            RoleArg::Admin => Role::Admin,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "kirkidata_client=error,kirkidata=error,warn",
            LogLevel::Warn => "kirkidata_client=warn,kirkidata=warn,warn",
            LogLevel::Info => "kirkidata_client=info,kirkidata=info,warn",
            LogLevel::Debug => "kirkidata_client=debug,kirkidata=debug,warn",
            LogLevel::Trace => "kirkidata_client=trace,kirkidata=trace,warn",
        }
    }
}

fn init_tracing(level: Option<LogLevel>) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
            Some(level) => level.as_filter().into(),
            None if cfg!(debug_assertions) => "kirkidata_client=debug,kirkidata=debug,warn".into(),
            None => "kirkidata_client=info,kirkidata=info,warn".into(),
        }))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load_from_file(path).await?,
        None => ClientConfig::from_env()?,
    };
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(path) = &cli.session_path {
        config.session_path = path.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn print_status(sessions: &Sessions) -> Result<()> {
    for role in Role::ALL {
        let session = sessions.get(role);
        let status = session.status().await?;
        println!("{}:", role);
        println!("  authenticated:     {}", status.authenticated);
        println!("  refresh token:     {}", status.has_refresh_token);
        println!("  cached profile:    {}", status.has_profile);

        let Some(token) = session.access_token().await? else {
            continue;
        };
        match TokenClaims::decode(&token) {
            Ok(claims) => {
                if let Some(sub) = &claims.sub {
                    println!("  subject:           {}", sub);
                }
                if let Some(issued) = claims.issued_at() {
                    println!("  issued at:         {}", issued.to_rfc3339());
                }
                match (claims.expires_at(), claims.seconds_until_expiration()) {
                    (Some(exp), Some(secs)) if secs > 0 => {
                        println!("  expires at:        {} (in {}s)", exp.to_rfc3339(), secs)
                    }
                    (Some(exp), _) => println!("  expires at:        {} (expired)", exp.to_rfc3339()),
                    _ => println!("  expires at:        unknown"),
                }
            }
            Err(e) => {
                debug!(role = %role, error = %e, "Access token is not a decodable JWT");
                println!("  expires at:        unknown (opaque token)");
            }
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli).await?;
    debug!(base_url = %config.base_url(), session_path = %config.session_path.display(), "Loaded configuration");

    let store = JsonFileStore::open(&config.session_path).await?;
    let events = SessionEventBus::default();
    let sessions = Sessions::new(Arc::new(store), events.clone());
    let client = ApiClient::from_config(&config, sessions.clone())?;

    // Surface session changes the client makes behind the scenes
    let mut receiver = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            info!(role = %event.role, event = ?event.kind, "Session changed");
        }
    });

    match cli.command {
        Command::Status => print_status(&sessions).await?,
        Command::Login {
            role,
            email,
            password,
        } => {
            let role = Role::from(role);
            let auth = AuthApi::new(client);
            auth.login(role, &Credentials::new(email, password)).await?;
            println!("Logged in as {}", role);
        }
        Command::Logout { role } => {
            let role = Role::from(role);
            AuthApi::new(client).logout(role).await?;
            println!("Logged out of {} session", role);
        }
        Command::Refresh { role } => {
            let role = Role::from(role);
            client.renew_session(role).await?;
            println!("Refreshed {} session", role);
        }
        Command::Get { endpoint, role } => {
            let body = client
                .request_value(&endpoint, RequestOptions::get().role(role.into()))
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_level);

    run(cli).await.map_err(|e| {
        error!("Command failed: {e}");
        e
    })
}
