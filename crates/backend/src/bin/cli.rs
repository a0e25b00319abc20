use anyhow::{bail, Context};
use backend::db;
use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared_types::{
    AuthUrlResponse, ErrorResponse, LogoutResponse, TokenValidationResponse, User,
};

#[derive(Parser)]
#[command(name = "auth-cli")]
#[command(about = "CLI for the OAuth login backend: inspect sessions and manage the database")]
#[command(
    long_about = "A command-line interface for the OAuth login backend.\n\n\
    Fetches the Google login URL, checks session tokens, reads the current\n\
    user's profile, and applies or reverts the database schema."
)]
struct Cli {
    /// Backend server URL to connect to.
    ///
    /// The CLI will make HTTP requests to this server's `/api/v1` endpoints.
    #[arg(
        short,
        long,
        default_value = "http://localhost:8000",
        env = "AUTH_API_URL"
    )]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Google authorization URL to open in a browser
    LoginUrl,

    /// Check a session token and show its subject and expiry
    Validate {
        /// The session token (the value of the access_token cookie).
        #[arg(short, long, env = "AUTH_TOKEN")]
        token: String,
    },

    /// Show the profile of the user a token belongs to
    Me {
        /// The session token (the value of the access_token cookie).
        #[arg(short, long, env = "AUTH_TOKEN")]
        token: String,
    },

    /// Log out; the token is optional since sessions are not tracked server-side
    Logout {
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Manage the database schema
    Db {
        /// Postgres connection string.
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,

        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Apply all pending migrations
    Migrate,

    /// Revert the most recently applied migration
    ///
    /// Reverting the initial migration drops the users table and everything
    /// in it. This action cannot be undone.
    Revert,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let client = Client::new();
    let api = format!("{}/api/v1", cli.base_url.trim_end_matches('/'));

    match cli.command {
        Commands::LoginUrl => {
            let body: AuthUrlResponse =
                send(client.get(format!("{}/auth/login/google", api))).await?;
            println!("{}", body.authorization_url);
        }
        Commands::Validate { token } => {
            let body: TokenValidationResponse = send(
                client
                    .get(format!("{}/auth/validate", api))
                    .bearer_auth(&token),
            )
            .await?;
            let expires = chrono::DateTime::from_timestamp(body.expires_at, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| body.expires_at.to_string());
            println!("Valid: {}", body.valid);
            println!("User:  {}", body.user_id.as_deref().unwrap_or("(none)"));
            println!("Expires: {}", expires);
        }
        Commands::Me { token } => {
            let user: User =
                send(client.get(format!("{}/users/me", api)).bearer_auth(&token)).await?;
            let status = if user.is_active { "active" } else { "inactive" };
            println!("[{}] {} ({})", user.id, user.email, status);
            if let Some(name) = &user.full_name {
                println!("    {}", name);
            }
        }
        Commands::Logout { token } => {
            let mut request = client.post(format!("{}/auth/logout", api));
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            let body: LogoutResponse = send(request).await?;
            println!("{}", body.message);
        }
        Commands::Db {
            database_url,
            action,
        } => {
            match action {
                DbAction::Migrate => {
                    let applied = db::run_migrations(&database_url)
                        .await
                        .context("Failed to apply migrations")?;
                    if applied.is_empty() {
                        println!("Database schema is up to date.");
                    }
                    for version in applied {
                        println!("Applied migration {}", version);
                    }
                }
                DbAction::Revert => {
                    let version = db::revert_last_migration(&database_url)
                        .await
                        .context("Failed to revert migration")?;
                    println!("Reverted migration {}", version);
                }
            }
        }
    }

    Ok(())
}

/// Send a request and decode the JSON body, surfacing API errors.
async fn send<T: DeserializeOwned>(request: RequestBuilder) -> anyhow::Result<T> {
    let response = request.send().await.context("Request failed")?;
    decode(response).await
}

async fn decode<T: DeserializeOwned>(response: Response) -> anyhow::Result<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| status.to_string());
        bail!("{} ({})", message, status);
    }
    response.json().await.context("Invalid response body")
}
