use anyhow::Context as _;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reywen_welcome::{
    config::TOKEN_ENV,
    login::{login, StdinCredentials},
    plugins::welcome::text::Typeface,
    revolt::{Http, Revolt},
    Conf, Context,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let conf = Conf::load().context("loading config")?;
    info!("booting...");

    let token = match &conf.auth.token {
        Some(token) => token.clone(),
        None => {
            let session = login(
                &Http::new(&conf.auth),
                &StdinCredentials::default(),
                &conf.auth.session_name,
            )
            .await
            .context("logging in")?;
            // save this to skip the login next time
            println!("{TOKEN_ENV}={}", session.token);
            session.token
        }
    };

    let revolt = Arc::new(Revolt::connect(&conf.auth, &token).context("connecting")?);
    let me = revolt.http.me().await.context("checking session")?;
    info!(user = %me.username, "session restored");

    let font = conf.welcome.font.clone();
    let mut ctx = Context::new(revolt.clone(), conf, me.id);
    if let Some(path) = font {
        match Typeface::open(&path) {
            Ok(typeface) => ctx = ctx.with_typeface(typeface),
            Err(e) => warn!("could not load font {path}, using the bundled one: {e}"),
        }
    }

    tokio::select! {
        _ = revolt.listen(ctx) => {},
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    info!("disconnected");
    Ok(())
}
