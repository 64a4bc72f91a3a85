//! Signs in, creates a wishlist with a few items, pins one and prints the
//! resulting order.
//!
//! Needs SUPABASE_URL, SUPABASE_ANON_KEY, GIFTFUL_EMAIL and GIFTFUL_PASSWORD.

use std::env;

use dotenv::dotenv;
use giftful::models::{NewItem, NewProfile, NewWishlist};
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

    let snapshot = giftful.session().sign_in(&email, &password).await?;
    println!("Signed in, phase {:?}", snapshot.phase());

    let user_id = giftful.api().current_user_id()?;
    if snapshot.phase() == SessionPhase::AuthenticatedNoProfile {
        let profile = giftful
            .session()
            .complete_onboarding(NewProfile::new(&user_id, "Demo user"))
            .await?;
        println!("Created profile {}", profile.name);
    }

    let api = giftful.api();
    let wishlist = match api.wishlists().get_by_user_id(&user_id).await?.into_iter().next() {
        Some(wishlist) => wishlist,
        None => {
            api.wishlists()
                .create(&NewWishlist::new(&user_id, "My wishlist"))
                .await?
        }
    };
    for name in ["Teapot", "Headphones", "Bike bell"] {
        api.items().create(&NewItem::new(&wishlist.id, name)).await?;
    }

    let view = giftful.wishlist_view(&user_id);
    view.fetch().await?;
    let actions = giftful.item_actions(view.clone());

    if let Some(last) = view.items().last().cloned() {
        println!("Pinning {}", last.name);
        actions.toggle_pin(&last).await?;
    }

    for item in view.items() {
        println!("{:>2} {:?} {}", item.order, item.status, item.name);
    }

    view.teardown();
    giftful.session().sign_out().await?;
    giftful.teardown().await;
    Ok(())
}
