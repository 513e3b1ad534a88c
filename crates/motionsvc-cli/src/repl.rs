//! REPL – the interactive operator shell.
//!
//! Lines are parsed into a [`Command`] by [`parse_command`] and executed
//! against the shared [`MotionService`].  `/parallel` runs in the
//! background so `/cancel` can reach it; everything else completes before
//! the next prompt.

use colored::Colorize;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use motionsvc_runtime::{DeviceResults, MotionService, PositionUpdate};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

const HELP: &[(&str, &str)] = &[
    ("/help", "show this list"),
    ("/devices", "list devices, connection state and current position"),
    ("/graphs", "list loaded routing graphs"),
    ("/destinations <dev>", "graph nodes reachable by a device"),
    ("/path <graph> <from> <to>", "shortest path and its cost"),
    ("/where <dev>", "live coordinates and matched position"),
    ("/move <dev> <pos>", "move directly to a taught position"),
    ("/goto <dev> <dest>", "route through the device's graph"),
    ("/jog <dev> <dx> [dy ..]", "relative move, up to six axes"),
    ("/home <dev>", "move to the device's home"),
    ("/stop <dev>", "halt one device"),
    ("/stopall", "halt every device"),
    ("/speed <dev> [value]", "read or set the device speed"),
    ("/teach <dev> <name>", "teach the live position under a name"),
    ("/save", "persist taught positions"),
    ("/reload", "reload taught positions from disk"),
    ("/parallel <dev>=<dest> ..", "route several devices at once (background)"),
    ("/cancel", "cancel the running coordinated move"),
    ("/monitor on|off", "stream position changes"),
    ("/quit | /exit", "stop all devices and leave"),
];

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Devices,
    Graphs,
    Destinations(String),
    Path { graph: String, from: String, to: String },
    Where(String),
    Move { device: String, position: String },
    Goto { device: String, destination: String },
    Jog { device: String, delta: Vec<f64> },
    Home(String),
    Stop(String),
    StopAll,
    Speed { device: String, value: Option<f64> },
    Teach { device: String, name: String },
    Save,
    Reload,
    Parallel(Vec<(String, String)>),
    Cancel,
    Monitor(bool),
    Quit,
}

fn usage(form: &str) -> String {
    format!("Usage: {form}")
}

fn number(raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("'{raw}' is not a number"))
}

/// Parse one input line.  `Err` carries the message shown to the operator.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("Empty command".to_string());
    };
    let args: Vec<&str> = words.collect();
    let owned = |i: usize| args[i].to_string();

    let command = match (head, args.len()) {
        ("/help", 0) => Command::Help,
        ("/devices", 0) => Command::Devices,
        ("/graphs", 0) => Command::Graphs,
        ("/destinations", 1) => Command::Destinations(owned(0)),
        ("/destinations", _) => return Err(usage("/destinations <dev>")),
        ("/path", 3) => Command::Path {
            graph: owned(0),
            from: owned(1),
            to: owned(2),
        },
        ("/path", _) => return Err(usage("/path <graph> <from> <to>")),
        ("/where", 1) => Command::Where(owned(0)),
        ("/where", _) => return Err(usage("/where <dev>")),
        ("/move", 2) => Command::Move {
            device: owned(0),
            position: owned(1),
        },
        ("/move", _) => return Err(usage("/move <dev> <pos>")),
        ("/goto", 2) => Command::Goto {
            device: owned(0),
            destination: owned(1),
        },
        ("/goto", _) => return Err(usage("/goto <dev> <dest>")),
        ("/jog", 2..=7) => Command::Jog {
            device: owned(0),
            delta: args[1..].iter().map(|raw| number(raw)).collect::<Result<_, _>>()?,
        },
        ("/jog", _) => return Err(usage("/jog <dev> <dx> [dy dz du dv dw]")),
        ("/home", 1) => Command::Home(owned(0)),
        ("/home", _) => return Err(usage("/home <dev>")),
        ("/stop", 1) => Command::Stop(owned(0)),
        ("/stop", _) => return Err(usage("/stop <dev>")),
        ("/stopall", 0) => Command::StopAll,
        ("/speed", 1) => Command::Speed {
            device: owned(0),
            value: None,
        },
        ("/speed", 2) => Command::Speed {
            device: owned(0),
            value: Some(number(args[1])?),
        },
        ("/speed", _) => return Err(usage("/speed <dev> [value]")),
        ("/teach", 2) => Command::Teach {
            device: owned(0),
            name: owned(1),
        },
        ("/teach", _) => return Err(usage("/teach <dev> <name>")),
        ("/save", 0) => Command::Save,
        ("/reload", 0) => Command::Reload,
        ("/parallel", n) if n > 0 => Command::Parallel(parse_targets(&args)?),
        ("/parallel", _) => return Err(usage("/parallel <dev>=<dest> ..")),
        ("/cancel", 0) => Command::Cancel,
        ("/monitor", 1) if args[0] == "on" => Command::Monitor(true),
        ("/monitor", 1) if args[0] == "off" => Command::Monitor(false),
        ("/monitor", _) => return Err(usage("/monitor on|off")),
        ("/quit" | "/exit", 0) => Command::Quit,
        _ => return Err(format!("Unknown command: '{line}'. Type /help for available commands.")),
    };
    Ok(command)
}

/// `dev=dest` pairs; a device may appear only once.
fn parse_targets(args: &[&str]) -> Result<Vec<(String, String)>, String> {
    let mut targets: Vec<(String, String)> = Vec::new();
    for arg in args {
        let Some((device, destination)) = arg.split_once('=') else {
            return Err(format!("'{arg}' is not <dev>=<dest>"));
        };
        if device.is_empty() || destination.is_empty() {
            return Err(format!("'{arg}' is not <dev>=<dest>"));
        }
        if targets.iter().any(|(d, _)| d == device) {
            return Err(format!("device '{device}' listed twice"));
        }
        targets.push((device.to_string(), destination.to_string()));
    }
    Ok(targets)
}

/// Entry point for the interactive REPL.
///
/// Returns on `/quit`, end of input, or when `shutdown` flips to `true`.
pub async fn run(
    service: Arc<MotionService>,
    mut shutdown: watch::Receiver<bool>,
    monitor_interval: Duration,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if *shutdown.borrow() {
            break;
        }

        print!("{} ", "motionsvc>".bold().cyan());
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line,
            Ok(()) = shutdown.changed() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break, // EOF
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_command(line) {
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                break;
            }
            Ok(command) => execute(&service, command, monitor_interval).await,
            Err(message) => println!("{}", message.red()),
        }
    }
}

/// Execute one command other than [`Command::Quit`].
pub async fn execute(service: &Arc<MotionService>, command: Command, monitor_interval: Duration) {
    match command {
        Command::Help => cmd_help(),
        Command::Devices => cmd_devices(service).await,
        Command::Graphs => cmd_graphs(service),
        Command::Destinations(device) => {
            let destinations = service.available_destinations(&device).await;
            if destinations.is_empty() {
                println!("  {}", "No destinations (unknown device or no graph).".yellow());
            } else {
                println!("  {}", destinations.join(", "));
            }
        }
        Command::Path { graph, from, to } => {
            let path = service.find_path(&graph, &from, &to);
            if path.is_empty() {
                println!("  {}", "No path.".yellow());
            } else {
                let cost = service.planner().path_cost(&graph, &path).unwrap_or(f64::NAN);
                println!("  {}  (cost {cost})", path.join(" → ").bold());
            }
        }
        Command::Where(device) => cmd_where(service, &device).await,
        Command::Move { device, position } => report(
            service.move_to_named_position(&device, &position).await,
            &format!("{device} → {position}"),
        ),
        Command::Goto { device, destination } => report(
            service.move_to_destination_via_path(&device, &destination).await,
            &format!("{device} routed to {destination}"),
        ),
        Command::Jog { device, delta } => report(
            service.move_relative(&device, &delta).await,
            &format!("{device} jogged"),
        ),
        Command::Home(device) => report(service.home(&device).await, &format!("{device} homed")),
        Command::Stop(device) => report(service.stop(&device).await, &format!("{device} stopped")),
        Command::StopAll => report(service.stop_all().await, "all devices stopped"),
        Command::Speed { device, value: None } => match service.speed(&device).await {
            Some(speed) => println!("  {device}: speed {speed}"),
            None => println!("  {}", format!("Speed of {device} unavailable.").yellow()),
        },
        Command::Speed { device, value: Some(speed) } => report(
            service.set_speed(&device, speed).await,
            &format!("{device} speed set to {speed}"),
        ),
        Command::Teach { device, name } => report(
            service.teach_current_position(&device, &name).await,
            &format!("{device} taught '{name}'"),
        ),
        Command::Save => report(service.save_positions().await, "positions saved"),
        Command::Reload => report(service.reload_positions().await, "positions reloaded"),
        Command::Parallel(targets) => spawn_parallel(service.clone(), targets),
        Command::Cancel => {
            if service.cancel_operation() {
                println!("  {}", "Cancellation requested.".yellow());
            } else {
                println!("  Nothing to cancel.");
            }
        }
        Command::Monitor(true) => {
            let updates = service.start_position_monitor(monitor_interval).await;
            tokio::spawn(print_position_changes(updates));
            println!("  {}", "Position monitor on.".green());
        }
        Command::Monitor(false) => {
            if service.stop_position_monitor().await {
                println!("  Position monitor off.");
            } else {
                println!("  Position monitor was not running.");
            }
        }
        Command::Quit => {}
    }
}

fn report(ok: bool, what: &str) {
    if ok {
        println!("  {} {}", "✓".green(), what);
    } else {
        println!("  {} {} {}", "✗".red(), what, "failed (see log)".red());
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Available commands:".bold().underline());
    for (form, text) in HELP {
        println!("  {:<28} {}", form.cyan(), text);
    }
    println!();
}

async fn cmd_devices(service: &MotionService) {
    for device in service.devices().await {
        let state = if service.is_connected(&device.id).await {
            "connected".green()
        } else if device.enabled {
            "offline".red()
        } else {
            "disabled".dimmed()
        };
        let at = service
            .current_position_name(&device.id)
            .await
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<16} {:<18} {:<8} {:<10} at {}",
            device.id.bold(),
            device.name,
            device.device_class,
            state,
            at
        );
    }
}

fn cmd_graphs(service: &MotionService) {
    let ids = service.available_graphs();
    if ids.is_empty() {
        println!("  {}", "No graphs loaded.".yellow());
    }
    for id in ids {
        let nodes = service.planner().graph(&id).map(|g| g.nodes().len()).unwrap_or(0);
        println!("  {:<16} {} node(s)", id.bold(), nodes);
    }
}

async fn cmd_where(service: &MotionService, device: &str) {
    let Some(position) = service.current_position(device).await else {
        println!("  {}", format!("Position of {device} unavailable.").yellow());
        return;
    };
    let named = service.current_position_name(device).await;
    let node = service.planner().current_node(device).await;
    println!("  {device}: {position}");
    println!(
        "    position: {}   graph node: {}",
        named.as_deref().unwrap_or("-"),
        node.as_deref().unwrap_or("-")
    );
}

fn spawn_parallel(service: Arc<MotionService>, targets: Vec<(String, String)>) {
    println!("  {} {} device(s) in the background.", "Routing".cyan(), targets.len());
    tokio::spawn(async move {
        let results = service.move_to_destinations_in_parallel(&targets).await;
        print_results(&results);
    });
}

fn print_results(results: &DeviceResults) {
    let mut devices: Vec<_> = results.iter().collect();
    devices.sort();
    println!();
    for (device, ok) in devices {
        report(*ok, &format!("{device} (parallel)"));
    }
}

/// Print a line whenever a device's matched position changes.  Ends when
/// the monitor is stopped.
async fn print_position_changes(mut updates: mpsc::Receiver<PositionUpdate>) {
    let mut last: HashMap<String, Option<String>> = HashMap::new();
    while let Some(update) = updates.recv().await {
        if last.get(&update.device_id) == Some(&update.position_name) {
            continue;
        }
        println!(
            "  {} {} {} ({})",
            update.sampled_at.format("%H:%M:%S%.3f").to_string().dimmed(),
            update.device_id.bold(),
            update.position_name.as_deref().unwrap_or("between positions"),
            update.position
        );
        last.insert(update.device_id, update.position_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motionsvc_hal::SimBackend;
    use motionsvc_kernel::{MemoryPositionStore, MotionKernel};
    use motionsvc_types::{DeviceClass, DeviceConfig, EdgeDefinition, GraphCollection, GraphDefinition, Position};

    #[test]
    fn parses_device_commands() {
        assert_eq!(
            parse_command("/goto gantry Load"),
            Ok(Command::Goto {
                device: "gantry".into(),
                destination: "Load".into()
            })
        );
        assert_eq!(
            parse_command("  /jog hex  0.5 -1  "),
            Ok(Command::Jog {
                device: "hex".into(),
                delta: vec![0.5, -1.0]
            })
        );
        assert_eq!(
            parse_command("/speed hex"),
            Ok(Command::Speed {
                device: "hex".into(),
                value: None
            })
        );
        assert_eq!(parse_command("/exit"), Ok(Command::Quit));
        assert_eq!(parse_command("/monitor off"), Ok(Command::Monitor(false)));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_command("/goto gantry").is_err());
        assert!(parse_command("/jog hex").is_err());
        assert!(parse_command("/jog hex 1 2 3 4 5 6 7").is_err());
        assert!(parse_command("/jog hex NaN").is_err());
        assert!(parse_command("/speed hex fast").is_err());
        assert!(parse_command("/monitor maybe").is_err());
        assert!(parse_command("/devices extra").is_err());
        assert!(parse_command("/launch").is_err());
    }

    #[test]
    fn parses_parallel_targets() {
        assert_eq!(
            parse_command("/parallel hex=B gantry=Load"),
            Ok(Command::Parallel(vec![
                ("hex".into(), "B".into()),
                ("gantry".into(), "Load".into()),
            ]))
        );
        assert!(parse_command("/parallel hex").is_err());
        assert!(parse_command("/parallel =B").is_err());
        assert!(parse_command("/parallel hex=A hex=B").is_err());
        assert!(parse_command("/parallel").is_err());
    }

    #[tokio::test]
    async fn executes_against_the_service() {
        let backend = SimBackend::new();
        let device = DeviceConfig::new("gantry", "Gantry", DeviceClass::Gantry)
            .with_endpoint("10.0.0.30", 702)
            .with_position("Home", Position::ZERO)
            .with_position("Load", Position::linear(50.0, 0.0, 0.0));
        let mut graphs = GraphCollection::new();
        graphs.insert(
            "Gantry".into(),
            GraphDefinition {
                nodes: vec!["Home".into(), "Load".into()],
                edges: vec![EdgeDefinition::new("Home", "Load", 1.0)],
            },
        );
        let factory = backend.factory().with_poll_interval(Duration::from_millis(1));
        let kernel = MotionKernel::new(vec![device], Arc::new(factory), Arc::new(MemoryPositionStore::new()));
        let service = Arc::new(MotionService::new(kernel, graphs));
        assert_eq!(service.initialize_all().await, 1);

        let interval = Duration::from_millis(10);
        let goto = parse_command("/goto gantry Load").unwrap();
        execute(&service, goto, interval).await;
        assert_eq!(service.current_position_name("gantry").await.as_deref(), Some("Load"));

        execute(&service, parse_command("/teach gantry Spare").unwrap(), interval).await;
        assert!(service.kernel().position("gantry", "Spare").await.is_some());

        execute(&service, Command::Home("gantry".into()), interval).await;
        assert_eq!(service.current_position_name("gantry").await.as_deref(), Some("Home"));

        execute(&service, Command::Monitor(true), interval).await;
        assert!(service.stop_position_monitor().await);
    }
}
