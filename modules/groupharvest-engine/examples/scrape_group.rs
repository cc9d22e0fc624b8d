//! Scrape one group feed end-to-end.
//!
//! ```sh
//! GH_USERNAME=me@example.com GH_PASSWORD=secret GH_GROUP=368560043222216 \
//!     cargo run --example scrape_group
//! ```

use groupharvest_engine::{HarvestConfig, HarvestError, Post, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let username = std::env::var("GH_USERNAME")?;
    let password = std::env::var("GH_PASSWORD")?;
    let group_id = std::env::var("GH_GROUP")?;

    let config = HarvestConfig::builder()
        .username(username.as_str())
        .password(password.as_str())
        .output_dir("out")
        .build();

    let session = Session::init(config).await?;
    match session.login(&username, &password).await {
        Ok(()) => {}
        Err(HarvestError::TwoFactorRequired) => {
            eprintln!("Second-factor code: ");
            let mut code = String::new();
            std::io::stdin().read_line(&mut code)?;
            session.submit_second_factor_code(code.trim()).await?;
        }
        Err(e) => {
            session.close().await?;
            return Err(e.into());
        }
    }

    let mut on_post = |post: &Post| {
        println!("{} | {}", post.author_name, post.permalink);
    };
    let posts = session
        .group(group_id)
        .get_posts(None, Some(&mut on_post), true)
        .await?;
    println!("{} posts collected this pass", posts.len());

    session.close().await?;
    Ok(())
}
