use clap::Parser;
use log::{error, info};
use server::config::Args;
use server::game::GameState;
use server::network::{Server, ServerMessage};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    args.validate()?;

    let world = args.world_config()?;
    let game_state = GameState::from_world(&world)?;
    info!(
        "World loaded: {} pickups, {} slots / {:.0} weight per player",
        game_state.pickups.len(),
        world.player.inventory_capacity,
        world.player.weight_capacity
    );

    let tick_duration = Duration::from_nanos(1_000_000_000 / args.tick_rate as u64);
    let mut server = Server::new(
        &args.bind_address(),
        tick_duration,
        args.max_clients,
        game_state,
    )
    .await?
    .with_resync_interval(args.resync_interval);

    info!(
        "Starting server at {}Hz with up to {} clients",
        args.tick_rate, args.max_clients
    );

    let control = server.control_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            if let Err(e) = control.send(ServerMessage::Shutdown) {
                error!("Failed to request shutdown: {}", e);
            }
        }
    });

    server.run().await?;

    Ok(())
}
