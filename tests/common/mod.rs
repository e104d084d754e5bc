use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use uuid::Uuid;

use carelink_api::auth::{generate_jwt, Claims};
use carelink_api::database::DatabaseManager;

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Spawn the already-built binary to keep start fast during tests
        // Assumes debug profile; adjust if you run tests with --release
        let mut cmd = Command::new("target/debug/carelink-api");
        cmd.env("CARELINK_API_PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Inherit environment so the server can see DATABASE_URL and JWT_SECRET from .env (loaded by the server)
        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self {
            port,
            base_url,
            child,
        })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            match client.get(&url).send().await {
                Ok(resp) => {
                    // Consider server ready on any non-404 response
                    if resp.status() == StatusCode::OK
                        || resp.status() == StatusCode::SERVICE_UNAVAILABLE
                    {
                        return Ok(());
                    }
                }
                Err(_) => {}
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!(
            "server did not become ready on {} within {:?}",
            self.base_url,
            timeout
        )
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let _ = dotenvy::dotenv();
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Insert a throwaway profile and return its id.
pub async fn seed_profile(kind: &str, display_name: &str, care_types: &[&str]) -> Result<Uuid> {
    let pool = DatabaseManager::pool().await?;
    let id = Uuid::new_v4();
    let care_types: Vec<String> = care_types.iter().map(|s| s.to_string()).collect();

    sqlx::query(
        "INSERT INTO profiles (id, account_id, display_name, kind, care_types)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(Uuid::new_v4())
    .bind(display_name)
    .bind(kind)
    .bind(&care_types)
    .execute(&pool)
    .await?;

    Ok(id)
}

/// Mint a token acting as the given profile, the way the upstream
/// identity resolver would.
pub fn token_for(profile_id: Uuid) -> Result<String> {
    let claims = Claims::new(Uuid::new_v4(), profile_id);
    Ok(generate_jwt(claims)?)
}
