mod net;

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use arena::event::EventBus;

use net::{ClientConfig, GameClient};

#[derive(Parser)]
#[command(name = "arena-client")]
#[command(about = "Headless arena client harness")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    #[arg(short, long, default_value_t = arena::DEFAULT_PORT)]
    port: u16,

    /// How long to stay in the match before disconnecting.
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,

    /// Strafe in a circle instead of standing still.
    #[arg(long)]
    orbit: bool,

    /// Fire roughly twice a second.
    #[arg(long)]
    trigger_happy: bool,

    /// Write the flight recorder export to this file on exit.
    #[arg(long)]
    record: Option<std::path::PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = ClientConfig {
        server_addr: format!("{}:{}", args.server, args.port),
        ..Default::default()
    };
    let tick_interval = Duration::from_secs_f64(1.0 / config.tick_rate as f64);

    let mut bus = EventBus::new();
    bus.subscribe_all(|envelope| {
        log::debug!("[{:.1}] {}", envelope.timestamp_ms, envelope.event.type_name());
    });

    let mut client = GameClient::new(config);
    let start = Instant::now();
    let now_ms = |start: Instant| start.elapsed().as_secs_f64() * 1000.0;
    bus.publish(0.0, arena::event::GameEvent::SystemReady { system: "client" });

    if let Err(err) = client.connect(now_ms(start), &mut bus) {
        bus.publish(
            now_ms(start),
            arena::event::GameEvent::InitializationFailed {
                error: err.to_string(),
            },
        );
        return Err(err.into());
    }
    bus.publish(now_ms(start), arena::event::GameEvent::SystemsReady);
    log::info!("connected to {}", args.server);
    client.input_mut().lock_pointer(now_ms(start), &mut bus);

    let deadline = start + Duration::from_secs(args.duration_secs);
    let mut next_tick = Instant::now();
    let mut last_fire = Instant::now();
    let mut last_report = Instant::now();

    while Instant::now() < deadline {
        let now = now_ms(start);
        client.update(now, &mut bus);

        if client.is_connected() && client.local_id().is_some() {
            if args.orbit {
                let phase = start.elapsed().as_secs_f32() * 0.8;
                client
                    .input_mut()
                    .set_movement(phase.cos(), phase.sin());
                client.input_mut().add_look_delta(3, 0);
            }

            if args.trigger_happy && last_fire.elapsed() >= Duration::from_millis(500) {
                last_fire = Instant::now();
                client.pull_trigger();
            }

            client.send_input(now, &mut bus);
            client.release_trigger();

            if last_report.elapsed() >= Duration::from_secs(1) {
                last_report = Instant::now();
                for view in client.remote_views(now) {
                    log::info!(
                        "entity {} at {} (extrapolating: {}, stale: {})",
                        view.entity_id,
                        view.position,
                        view.is_extrapolating,
                        view.is_stale
                    );
                }
            }
        }

        next_tick += tick_interval;
        let now_instant = Instant::now();
        if next_tick > now_instant {
            std::thread::sleep(next_tick - now_instant);
        } else {
            next_tick = now_instant;
        }
    }

    let final_now = now_ms(start);
    log::info!(
        "session over: phase {:?}, predicted at {}",
        client.match_phase(),
        client.predicted_state().position
    );

    if let Some(path) = args.record {
        let export = client.export_diagnostics(final_now);
        std::fs::write(&path, serde_json::to_string_pretty(&export)?)?;
        log::info!("flight recording written to {}", path.display());
    }

    client.input_mut().release_pointer(final_now, &mut bus);
    client.disconnect(final_now, &mut bus);
    Ok(())
}
