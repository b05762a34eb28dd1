//! Health check command

use anyhow::Result;
use std::time::Duration;

use notes_e2e::server::AppServer;
use notes_e2e::E2eConfig;

use crate::output::{print_error, print_success};

pub async fn execute(config: &E2eConfig) -> Result<()> {
    match AppServer::attach(config.base_url.as_str(), Duration::from_secs(5)).await {
        Ok(server) => {
            print_success(&format!("Application is up at {}", server.base_url()));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Application is not responding at {}: {}", config.base_url, e));
            std::process::exit(1);
        }
    }
}
