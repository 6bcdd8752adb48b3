//! 将已有用户设为管理员（或用 `--revoke` 取消）
//!
//! ```text
//! promote-staff <username> [--revoke]
//! ```

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use blog_platform::{config::Config, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut username = None;
    let mut revoke = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--revoke" => revoke = true,
            _ if username.is_none() => username = Some(arg),
            _ => anyhow::bail!("unexpected argument: {}", arg),
        }
    }
    let username = username.context("usage: promote-staff <username> [--revoke]")?;

    if config.uses_memory_store() {
        anyhow::bail!("DATABASE_URL points at the in-process store; nothing to promote");
    }

    let state = AppState::new(config).await?;
    let user = state.user_service.set_staff(&username, !revoke).await?;

    info!("User {} is_staff = {}", user.username, user.is_staff);
    println!("{}: is_staff = {}", user.username, user.is_staff);
    Ok(())
}
