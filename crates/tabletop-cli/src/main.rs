//! Headless tabletop client.
//!
//! Connects to the board server and reads commands from stdin, one per line:
//!
//! ```text
//! place <icon> <x> <y>    drop a new entity from the catalog
//! move <id> <x> <y>       move an entity
//! drag <x0> <y0> <x1> <y1>  press at one point, release at another
//! remove <x> <y>          delete everything in the cell (right click)
//! list                    print the board
//! json                    print the board as JSON
//! ping                    send a keepalive
//! quit
//! ```

use std::io::BufRead;
use std::sync::mpsc::{Receiver, TryRecvError, channel};
use std::thread;
use std::time::Duration;

use kurbo::Point;
use tabletop_core::{
    BoardState, ConnectionEvent, Engine, EngineConfig, EntityId, InputEvent, WsTransport,
};

const CONFIG_ENV: &str = "TABLETOP_CONFIG";
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Place { icon: String, at: Point },
    Move { id: String, to: Point },
    Drag { from: Point, to: Point },
    Remove { at: Point },
    List,
    Json,
    Ping,
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let number = |s: &str| {
        s.parse::<f64>()
            .map_err(|_| format!("not a number: {s}"))
    };
    let point = |x: &str, y: &str| -> Result<Point, String> { Ok(Point::new(number(x)?, number(y)?)) };

    match words.as_slice() {
        ["place", icon, x, y] => Ok(Command::Place {
            icon: icon.to_string(),
            at: point(*x, *y)?,
        }),
        ["move", id, x, y] => Ok(Command::Move {
            id: id.to_string(),
            to: point(*x, *y)?,
        }),
        ["drag", x0, y0, x1, y1] => Ok(Command::Drag {
            from: point(*x0, *y0)?,
            to: point(*x1, *y1)?,
        }),
        ["remove", x, y] => Ok(Command::Remove { at: point(*x, *y)? }),
        ["list"] => Ok(Command::List),
        ["json"] => Ok(Command::Json),
        ["ping"] => Ok(Command::Ping),
        ["quit"] | ["exit"] => Ok(Command::Quit),
        [] => Err("empty command".to_string()),
        [other, ..] => Err(format!("unknown command: {other}")),
    }
}

fn load_config() -> Result<EngineConfig, tabletop_core::ConfigError> {
    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            log::info!("Loading config from {path}");
            EngineConfig::from_file(path)?
        }
        Err(_) => EngineConfig::default(),
    };
    config.with_env_overrides()
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_board(state: &BoardState) {
    println!("{} entities", state.len());
    for entity in state.sorted() {
        println!(
            "  {} {:?} {} at {}",
            entity.id, entity.kind, entity.icon, entity.position
        );
    }
}

/// Run one command. Returns false to stop.
fn execute(engine: &mut Engine<WsTransport>, command: Command) -> bool {
    match command {
        Command::Place { icon, at } => match engine.catalog().get(&icon).cloned() {
            Some(template) => {
                let id = engine.place(&template, at);
                println!("placed {id}");
            }
            None => println!("no template named {icon}"),
        },
        Command::Move { id, to } => {
            if !engine.move_entity(&EntityId::from(id.as_str()), to) {
                println!("no entity {id}");
            }
        }
        Command::Drag { from, to } => {
            engine.handle_input(InputEvent::down(from.x, from.y));
            engine.handle_input(InputEvent::move_to(to.x, to.y));
            if engine.handle_input(InputEvent::up(to.x, to.y)).is_none() {
                println!("nothing to drag at ({}, {})", from.x, from.y);
            }
        }
        Command::Remove { at } => {
            let removed = engine.remove_at(at);
            println!("removed {removed}");
        }
        Command::List => print_board(engine.state()),
        Command::Json => {
            let entities = engine.state().sorted();
            match serde_json::to_string_pretty(&entities) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Failed to serialize board: {e}"),
            }
        }
        Command::Ping => engine.ping(),
        Command::Quit => return false,
    }
    true
}

fn main() {
    env_logger::init();
    log::info!("Starting tabletop client");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    let transport = WsTransport::new().with_connect_timeout(config.discovery_timeout());
    let mut engine = Engine::new(config, transport);
    engine.add_connection_observer(|event| match event {
        ConnectionEvent::StateChanged(state) => println!("connection: {state:?}"),
        ConnectionEvent::Error(e) => eprintln!("connection error: {e}"),
        ConnectionEvent::Rejected(reason) => eprintln!("rejected: {reason}"),
    });
    engine.subscribe(|state| println!("board changed: {} entities", state.len()));
    engine.connect_default();

    let commands = spawn_stdin_reader();
    loop {
        engine.poll();

        match commands.try_recv() {
            Ok(line) => match parse_command(&line) {
                Ok(command) => {
                    if !execute(&mut engine, command) {
                        break;
                    }
                }
                Err(e) => eprintln!("{e}"),
            },
            Err(TryRecvError::Empty) => {}
            // stdin closed
            Err(TryRecvError::Disconnected) => break,
        }

        thread::sleep(FRAME_INTERVAL);
    }

    engine.disconnect();
    log::info!("Bye");
}
