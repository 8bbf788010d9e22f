use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use contracts::{AmmoStack, GameConfig, WeaponProfile};
use racket_api::{serve, EngineApi};
use racket_core::combat::AttackRequest;

fn print_usage() {
    println!("racket <command>");
    println!("commands:");
    println!("  serve [addr] [sqlite_path]");
    println!("    default addr: 127.0.0.1:8080");
    println!("  demo <seed> [sqlite_path]");
    println!("    runs a deterministic bounty-hunt scenario and persists it");
    println!("  status [sqlite_path]");
    println!("    prints persisted world counters");
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn parse_seed(value: Option<&String>) -> Result<u64, String> {
    let raw = value.ok_or_else(|| "missing seed".to_string())?;
    raw.parse::<u64>()
        .map_err(|_| format!("invalid seed: {raw}"))
}

fn default_sqlite_path() -> String {
    std::env::var("RACKET_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "racket_world.sqlite".to_string())
}

fn parse_sqlite_path(value: Option<&String>) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path)
}

fn run_demo(args: &[String]) -> Result<(), String> {
    let seed = parse_seed(args.get(2))?;
    let sqlite_path = parse_sqlite_path(args.get(3));

    let mut config = GameConfig::default();
    config.seed = seed;

    let mut api = EngineApi::from_config(config);
    api.attach_sqlite_store(PathBuf::from(&sqlite_path))
        .map_err(|err| format!("failed to attach sqlite store: {err}"))?;

    let engine = api.engine();
    engine
        .synchronize_clock()
        .map_err(|err| format!("clock sync failed: {err}"))?;

    let hunter = engine
        .create_actor("Hunter", "downtown")
        .map_err(|err| format!("create failed: {err}"))?;
    let mark = engine
        .create_actor("Mark", "downtown")
        .map_err(|err| format!("create failed: {err}"))?;
    let boss = engine
        .create_actor("Boss", "harbor")
        .map_err(|err| format!("create failed: {err}"))?;

    engine
        .grant_cash(&boss.actor_id, 5_000)
        .map_err(|err| format!("grant failed: {err}"))?;
    engine
        .post_bounty(&boss.actor_id, &mark.actor_id, 1_000)
        .map_err(|err| format!("bounty failed: {err}"))?;

    engine
        .equip_weapon(
            &hunter.actor_id,
            WeaponProfile {
                catalog_id: "wpn:magnum".to_string(),
                power: 20,
                capacity: 6,
                uses_ammo: true,
            },
        )
        .map_err(|err| format!("equip failed: {err}"))?;
    engine
        .add_ammo(
            &hunter.actor_id,
            AmmoStack {
                catalog_id: "ammo:44".to_string(),
                power: 5,
                quantity: 12,
            },
        )
        .map_err(|err| format!("ammo failed: {err}"))?;

    let report = engine
        .attack(&AttackRequest {
            attacker_id: hunter.actor_id.clone(),
            target_name: "Mark".to_string(),
            ammo_id: Some("ammo:44".to_string()),
            shots: 6,
        })
        .map_err(|err| format!("attack failed: {err}"))?;

    api.flush_persistence_checked()
        .map_err(|err| format!("persistence flush failed: {err}"))?;

    println!(
        "demo seed={} fatal={} damage={} payout={} sqlite={}",
        seed, report.fatal, report.damage, report.bounty_payout, sqlite_path
    );
    Ok(())
}

fn print_status(args: &[String]) -> Result<(), String> {
    let sqlite_path = parse_sqlite_path(args.get(2));

    let mut api = EngineApi::from_config(GameConfig::default());
    api.attach_sqlite_store(PathBuf::from(&sqlite_path))
        .map_err(|err| format!("failed to attach sqlite store: {err}"))?;

    let events = api
        .load_events_range(0, u64::MAX)
        .map_err(|err| format!("failed to load events: {err}"))?;
    let actors = api
        .load_actor_snapshots()
        .map_err(|err| format!("failed to load snapshots: {err}"))?;
    let alive = actors.iter().filter(|actor| actor.alive).count();

    println!(
        "world sqlite={} events={} actors={} alive={}",
        sqlite_path,
        events.len(),
        actors.len(),
        alive
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                let sqlite_path = parse_sqlite_path(args.get(3));
                let mut api = EngineApi::from_config(GameConfig::default());
                if let Err(err) = api.attach_sqlite_store(PathBuf::from(&sqlite_path)) {
                    eprintln!("failed to attach sqlite store: {err}");
                    std::process::exit(1);
                }
                if let Err(err) = api.engine().synchronize_clock() {
                    eprintln!("clock sync failed: {err}");
                    std::process::exit(1);
                }

                println!("serving api on http://{addr} (sqlite={sqlite_path})");
                if let Err(err) = serve(addr, api).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
            }
            Err(err) => {
                eprintln!("error: {}", err);
                print_usage();
                std::process::exit(2);
            }
        },
        Some("demo") => {
            if let Err(err) = run_demo(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        Some("status") => {
            if let Err(err) = print_status(&args) {
                eprintln!("error: {err}");
                std::process::exit(2);
            }
        }
        _ => {
            print_usage();
        }
    }
}
