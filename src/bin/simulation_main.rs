// simulation_main.rs
use grid_signal_agents::monitoring::console::{parse_command, render_grid, Command, HELP};
use grid_signal_agents::monitoring::recorder::SnapshotRecorder;
use grid_signal_agents::{PhaseOverride, Simulation, SimulationConfig};
use log::{error, info, warn};
use std::env;
use std::process::ExitCode;
use tokio::io::{self, AsyncBufReadExt, BufReader};

struct Args {
    config: Option<String>,
    record: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        record: None,
    };
    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--record" => {
                args.record = Some(it.next().ok_or("--record needs a path")?);
            }
            "-h" | "--help" => {
                return Err("usage: simulation_main [config.json] [--record snapshots.csv]".into())
            }
            _ if args.config.is_none() => args.config = Some(arg),
            _ => return Err(format!("unexpected argument '{}'", arg)),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}", msg);
            return ExitCode::FAILURE;
        }
    };

    let config = match &args.config {
        Some(path) => match SimulationConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("cannot load {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            info!("no configuration given, running the default 3x3 grid");
            SimulationConfig::default()
        }
    };

    let mut recorder = match &args.record {
        Some(path) => match SnapshotRecorder::create(path) {
            Ok(recorder) => Some(recorder),
            Err(e) => {
                error!("cannot open {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let simulation = match Simulation::start(config) {
        Ok(simulation) => simulation,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut feed = simulation.snapshots();
    println!("{}", HELP);

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("stdin: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Command::Override(node, phase) => {
                        match simulation.request_override(PhaseOverride { node, phase }) {
                            Ok(()) => println!("override queued"),
                            Err(e) => println!("rejected: {}", e),
                        }
                    }
                    Command::Show => print!("{}", render_grid(&feed.latest())),
                    Command::Help => println!("{}", HELP),
                    Command::Quit => break,
                    Command::Unknown(reason) => println!("{}; {}", reason, HELP),
                }
            }
            grid = feed.changed(), if recorder.is_some() => {
                let outcome = match (grid, recorder.as_mut()) {
                    (Some(grid), Some(rec)) => rec.record(&grid).map(|_| ()).map_err(|e| e.to_string()),
                    _ => Err("snapshot feed closed".to_string()),
                };
                if let Err(e) = outcome {
                    warn!("recording stopped: {}", e);
                    recorder = None;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    match simulation.stop().await {
        Ok(last) => {
            if let Some(rec) = recorder.as_mut() {
                if let Err(e) = rec.record(&last) {
                    warn!("final snapshot not recorded: {}", e);
                }
            }
            print!("{}", render_grid(&last));
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
