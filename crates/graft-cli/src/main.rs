use std::env;
use std::net::SocketAddr;

use contracts::GraftConfig;
use graft_api::{serve, GraftApi};

fn print_usage() {
    println!("graft-cli <command>");
    println!("commands:");
    println!("  status");
    println!("  step [n]");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
    println!("  simulate <run_id> <seed> [ticks] [sqlite_path]");
    println!("    drives a simulated host until the graft completes and persists the audit trail");
}

fn parse_u64(value: Option<&String>, label: &str) -> Result<u64, String> {
    let raw = value.ok_or_else(|| format!("missing {}", label))?;
    raw.parse::<u64>()
        .map_err(|_| format!("invalid {}: {}", label, raw))
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn default_sqlite_path() -> String {
    std::env::var("GRAFT_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "graft_runs.sqlite".to_string())
}

fn parse_sqlite_path(value: Option<&String>) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path)
}

fn run_simulation(args: &[String]) -> Result<(), String> {
    let run_id = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing run_id".to_string())?;
    let seed = parse_u64(args.get(3), "seed")?;
    let target_ticks = args
        .get(4)
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|_| format!("invalid ticks: {value}"))
        })
        .transpose()?
        .unwrap_or(720);
    let sqlite_path = parse_sqlite_path(args.get(5));

    let mut config = GraftConfig::default();
    config.run_id = run_id.clone();
    config.seed = seed;
    config.max_ticks = target_ticks.max(1);

    let mut api = GraftApi::from_config(config);
    api.attach_sqlite_store(&sqlite_path)
        .map_err(|err| format!("failed to attach sqlite store: {err}"))?;
    api.initialize_run_storage(true)
        .map_err(|err| format!("failed to initialize run storage: {err}"))?;

    let (status, committed) = api.step_ticks(target_ticks);

    let (_, household) = api.draw_household(None);
    match household {
        Some(household) => {
            let members = household
                .occupied_members()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            println!(
                "drew household {} with members [{}]",
                household.household_id, members
            );
        }
        None => println!("no household available to draw"),
    }

    if let Some(error) = api.last_persistence_error() {
        return Err(format!("persistence error after simulation: {error}"));
    }

    let migration = api.migration_report();
    println!(
        "simulated run_id={} seed={} committed={} migration_done={} events={} sqlite={}",
        run_id,
        seed,
        committed,
        migration.done,
        api.events().len(),
        sqlite_path
    );
    println!("final: {status}");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let mut api = GraftApi::from_config(GraftConfig::default());

    match command {
        Some("status") => {
            println!("{}", api.status());
        }
        Some("step") => {
            let steps = args.get(2).and_then(|v| v.parse::<u64>().ok()).unwrap_or(1);
            let (status, committed) = api.step_ticks(steps);
            println!("stepped={} {}", committed, status);
        }
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                println!("serving api on http://{addr}");
                if let Err(err) = serve(addr).await {
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
        Some("simulate") => {
            if let Err(err) = run_simulation(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        _ => {
            print_usage();
        }
    }
}
