//! Creates a share link for the signed-in user's first wishlist and opens it
//! the way another viewer would.
//!
//! Needs SUPABASE_URL, SUPABASE_ANON_KEY, GIFTFUL_EMAIL and GIFTFUL_PASSWORD.

use std::env;

use dotenv::dotenv;
use giftful::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let email = env::var("GIFTFUL_EMAIL")?;
    let password = env::var("GIFTFUL_PASSWORD")?;

    let giftful = Giftful::new(GiftfulConfig::from_env()?)?;
    giftful.init().await?;
    giftful.session().sign_in(&email, &password).await?;

    let user_id = giftful.api().current_user_id()?;
    let Some(wishlist) = giftful
        .api()
        .wishlists()
        .get_by_user_id(&user_id)
        .await?
        .into_iter()
        .next()
    else {
        println!("No wishlist yet; run wishlist_demo first");
        return Ok(());
    };

    let share = giftful.api().share_tokens().get_or_create(&wishlist.id).await?;
    println!(
        "Share link: /profile/{}?wishlist={}&token={} (opened {} times)",
        user_id, wishlist.id, share.token, share.access_count
    );

    // An anonymous viewer holding the link
    let gate = giftful.access_gate();
    let shared = gate
        .check(None, &user_id, Some(&wishlist.id), Some(&share.token))
        .await?;
    println!(
        "Token access: {} ({} items)",
        shared.has_access,
        shared.wishlist_items.len()
    );

    let forged = gate
        .check(None, &user_id, Some(&wishlist.id), Some("not-a-token"))
        .await?;
    println!("Forged token access: {}", forged.has_access);

    giftful.teardown().await;
    Ok(())
}
