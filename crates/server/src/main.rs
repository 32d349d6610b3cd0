mod config;
mod server;

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use arena::net::EndpointConfig;
use arena::sim::SchedulerConfig;

use config::ServerConfig;
use server::GameServer;

#[derive(Parser)]
#[command(name = "arena-server")]
#[command(about = "Authoritative arena server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = arena::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = arena::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 2)]
    max_clients: usize,

    /// Stop after this many seconds; 0 runs until killed.
    #[arg(long, default_value_t = 0)]
    duration_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = ServerConfig {
        scheduler: SchedulerConfig {
            tick_rate: args.tick_rate,
            ..Default::default()
        },
        endpoint: EndpointConfig {
            max_clients: args.max_clients,
            ..Default::default()
        },
        ..Default::default()
    };

    let bind_addr = format!("{}:{}", args.bind, args.port);
    let mut server = GameServer::new(&bind_addr, config)?;
    log::info!("server listening on {}", server.local_addr());

    server.bus_mut().subscribe_all(|envelope| {
        log::debug!(
            "[{:.1}] {}",
            envelope.timestamp_ms,
            envelope.event.type_name()
        );
    });
    server
        .bus_mut()
        .publish(0.0, arena::event::GameEvent::SystemsReady);

    let start = Instant::now();
    let deadline = (args.duration_secs > 0)
        .then(|| start + Duration::from_secs(args.duration_secs));

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        let now_ms = start.elapsed().as_secs_f64() * 1000.0;
        server.update(now_ms);
        std::thread::sleep(Duration::from_millis(1));
    }

    log::info!(
        "server shutting down at tick {} with {} client(s)",
        server.current_tick(),
        server.client_count()
    );
    Ok(())
}
