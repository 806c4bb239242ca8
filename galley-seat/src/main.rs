use anyhow::Context;
use galley_core::{Category, MenuDocument, MenuSource};
use galley_order::{CartEvent, ReservationOutcome};
use galley_seat::{FileSeatIdProvider, SeatSession};
use galley_store::{Config, HttpInventoryClient};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "galley_seat=debug,galley_order=debug,galley_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    let cabin = config.cabin.class;
    tracing::info!(
        %cabin,
        base_url = %config.store.base_url,
        database = %config.store.database,
        "Starting galley seat session"
    );

    let seats = FileSeatIdProvider::load_or_create(&config.seat.id_file)?;
    let client = Arc::new(HttpInventoryClient::new(&config.store, &config.feed, cabin)?);
    let session = SeatSession::new(
        cabin,
        &seats,
        client.clone(),
        client.clone(),
        &config.reservation,
        &config.feed,
    );
    tracing::info!(seat = %session.seat_id(), "Seat ready");

    if let Err(e) = session.refresh().await {
        tracing::warn!("Initial inventory load failed, waiting for the change feed: {}", e);
    }

    let menu = match client.fetch_menu().await {
        Ok(menu) => Some(menu),
        Err(e) => {
            tracing::warn!("Menu unavailable, meals are named by id: {}", e);
            None
        }
    };

    let mut cart_events = session.subscribe_cart().await;
    tokio::spawn(async move {
        while let Ok(event) = cart_events.recv().await {
            if let CartEvent::Evicted(evicted) = event {
                tracing::warn!(
                    meal = %evicted.name,
                    category = %evicted.category,
                    "Selection removed, another seat took the last one"
                );
            }
        }
    });

    session
        .start_feed(|update| {
            tracing::debug!(
                meal_id = %update.meal_id,
                category = %update.category,
                available = update.available,
                "Inventory changed"
            );
        })
        .await;

    // Selections given as `category=mealId` are reserved right away.
    let selections = parse_selections(std::env::args().skip(1))?;
    if !selections.is_empty() {
        for (category, meal_id) in selections {
            let name = display_name(menu.as_ref(), category, &meal_id);
            session.select(meal_id, category, name).await?;
        }
        match session.confirm().await? {
            ReservationOutcome::Confirmed(document) => {
                tracing::info!(revision = %document.revision, "Meal order confirmed");
            }
            ReservationOutcome::OutOfStock(items) => {
                for item in items {
                    tracing::warn!(
                        meal = item.name.as_deref().unwrap_or(&item.meal_id),
                        category = %item.category,
                        "Out of stock"
                    );
                }
            }
        }
    }

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutting down");
    session.stop_feed().await;
    Ok(())
}

fn parse_selections(args: impl Iterator<Item = String>) -> anyhow::Result<Vec<(Category, String)>> {
    args.map(|arg| {
        let (category, meal_id) = arg
            .split_once('=')
            .with_context(|| format!("Expected category=mealId, got {:?}", arg))?;
        Ok((category.parse()?, meal_id.to_string()))
    })
    .collect()
}

fn display_name(menu: Option<&MenuDocument>, category: Category, meal_id: &str) -> String {
    match menu {
        Some(menu) => menu.display_name(category, meal_id),
        None => meal_id.to_string(),
    }
}
