use std::time::Duration;

use mirror_engine_http::{RequestEngine, RequestOptions, RetryPolicy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let link = std::env::args().nth(1).unwrap_or_else(|| {
        "https://raw.githubusercontent.com/rust-lang/rust/master/README.md".to_owned()
    });

    let engine = RequestEngine::from_env()?;
    let options = RequestOptions::new().with_retry(RetryPolicy::tokio(Duration::from_secs(2)));
    let result = engine.get(&link, options).await;

    match result.text() {
        Some(text) => println!("{text}"),
        None if result.redirect_refused() => anyhow::bail!("redirect refused for {link}"),
        None => anyhow::bail!("no text for {link} (status {:?})", result.status()),
    }

    Ok(())
}
