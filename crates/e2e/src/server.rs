//! Application under test: optional spawning and health checking

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::poll::wait_until;

/// Handle to the application, spawned by us or already running
pub struct AppServer {
    child: Option<Child>,
    base_url: String,
}

impl AppServer {
    /// Use an application that is already running at `base_url`.
    pub async fn attach(base_url: impl Into<String>, startup_timeout: Duration) -> E2eResult<Self> {
        let server = AppServer {
            child: None,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        };
        server.wait_for_healthy(startup_timeout).await?;
        info!("Application is healthy at {}", server.base_url);
        Ok(server)
    }

    /// Spawn the application binary and wait for it to become healthy.
    pub async fn spawn(config: ServerConfig) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://127.0.0.1:{}", port);

        info!("Spawning application on port {}", port);

        let mut cmd = Command::new(&config.binary_path);
        cmd.args(&config.args)
            .env("PORT", port.to_string())
            .env("HOST", "127.0.0.1");
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        cmd.stdout(Stdio::null()).stderr(Stdio::inherit());

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!(
                "Failed to spawn {}: {}",
                config.binary_path.display(),
                e
            ))
        })?;

        let server = AppServer {
            child: Some(child),
            base_url,
        };
        server.wait_for_healthy(config.startup_timeout).await?;

        info!("Application is healthy at {}", server.base_url);
        Ok(server)
    }

    /// Wait for `GET /health` to succeed
    async fn wait_for_healthy(&self, timeout_duration: Duration) -> E2eResult<()> {
        let health_url = format!("{}/health", self.base_url);
        let client = reqwest::Client::builder().timeout(Duration::from_secs(2)).build()?;
        let client = &client;
        let health_url = health_url.as_str();

        let polled = wait_until(timeout_duration, Duration::from_millis(100), move || async move {
            match client.get(health_url).send().await {
                Ok(resp) if resp.status().is_success() => Ok(true),
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                    Ok(false)
                }
                Err(e) => {
                    // Connection refused is expected while the app is starting
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                    Ok(false)
                }
            }
        })
        .await?;

        if polled.is_ready() {
            Ok(())
        } else {
            Err(E2eError::ServerHealthCheck(polled.attempts() as usize))
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the application if we spawned it
    pub fn stop(&mut self) -> E2eResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        info!("Stopping application (pid: {})", child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        let _ = child.kill();
        let _ = child.wait();
        Ok(())
    }
}

impl Drop for AppServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Configuration for spawning the application
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub binary_path: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Port to listen on (None = find free port)
    pub port: Option<u16>,
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("target/debug/notes-server"),
            args: Vec::new(),
            env: Vec::new(),
            port: None,
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// Find a free port to use
pub fn find_free_port() -> E2eResult<u16> {
    use std::net::TcpListener;

    Ok(TcpListener::bind("127.0.0.1:0")?.local_addr()?.port())
}
