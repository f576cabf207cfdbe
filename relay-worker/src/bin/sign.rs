//! PageRelay Sign - compute the `X-Hub-Signature-256` value for a body.
//!
//! Reads the body from stdin exactly as it will be sent and the secret from
//! `FB_APP_SECRET`, then prints `sha256=<hex>`. Handy for exercising the
//! web server with curl.

use std::io::Read;

use anyhow::{bail, Context, Result};

use pagerelay::web::sign_payload;

fn main() -> Result<()> {
    let secret = std::env::var("FB_APP_SECRET").unwrap_or_default();
    let secret = secret.trim();
    if secret.is_empty() {
        bail!("FB_APP_SECRET is not set");
    }

    let mut body = Vec::new();
    std::io::stdin()
        .read_to_end(&mut body)
        .context("Failed to read body from stdin")?;

    println!("{}", sign_payload(secret, &body));

    Ok(())
}
