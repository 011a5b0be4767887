use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{
    env,
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
    process::Command,
    sync::{Arc, Mutex, atomic::AtomicBool},
};

use crate::actions::{Fanout, FrameObserver, JsonLinesObserver, LogObserver};
use crate::config::ConfigState;
use crate::input::{FrameSource, JsonLinesSource};
use crate::ipc;
use crate::state::HandsState;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("handctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some(op @ ("stop" | "status" | "state" | "reload" | "list" | "doctor")) => {
            let op = if op == "stop" { "shutdown" } else { op };
            let r = ipc::client_request(serde_json::json!({ "op": op }))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("replay") => {
            let profile: Option<String> = pargs.opt_value_from_str("--profile")?;
            let input: Option<PathBuf> = pargs.opt_free_from_str().unwrap_or(None);
            replay(profile.as_deref(), input)
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

/// Run recorded detector output through the reducer, one state per line on stdout.
fn replay(profile_name: Option<&str>, input: Option<PathBuf>) -> Result<()> {
    let cfg = ConfigState::load_or_install_default()?;
    let profile = match profile_name {
        Some(name) => cfg.load_profile(name)?,
        None => cfg.profile.clone(),
    };

    let mut source: Box<dyn FrameSource> = match input {
        Some(path) if path.as_os_str() != "-" => {
            let f = File::open(&path)
                .map_err(|e| anyhow!("failed to open {}: {e}", path.display()))?;
            Box::new(JsonLinesSource::new(BufReader::new(f)))
        }
        _ => Box::new(JsonLinesSource::new(io::stdin().lock())),
    };

    let store = HandsState::shared(&profile.targets);
    let capture = profile.capture.frame_size();
    let profile = Arc::new(Mutex::new(profile));
    let observers: Vec<Box<dyn FrameObserver + Send>> = vec![
        Box::new(LogObserver),
        Box::new(JsonLinesObserver::new(io::stdout())),
    ];
    let mut observer = Fanout(observers);
    let stop = AtomicBool::new(false);

    ipc::run_frame_loop(source.as_mut(), &store, &profile, capture, &mut observer, &stop)?;
    Ok(())
}

fn print_help() {
    println!(
        r#"handctl — webcam hand gesture state daemon

USAGE:
  handctl help [command]                  Show general or command-specific help
  handctl start                           Start the daemon
  handctl stop                            Stop the daemon
  handctl status                          Show daemon status
  handctl state                           Print current hand state (JSON)
  handctl reload                          Reload active profile
  handctl use <name>                      Switch active profile
  handctl list                            List profiles
  handctl doctor                          Check detector and configuration
  handctl replay [--profile <name>] [<file>|-]
                                          Reduce recorded detector output offline

TIPS:
  - Profiles: ~/.config/handctl/profiles
  - Active profile pointer: ~/.config/handctl/active
  - Log filter: HANDCTL_LOG=debug
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: handctl start\nStarts the background daemon and its detector."),
        "stop" => println!("usage: handctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: handctl status\nShows active profile, capture size, socket and frame count."
        ),
        "state" => println!(
            "usage: handctl state\nPrints active/touching/velocity/target for both hands as JSON."
        ),
        "reload" => println!(
            "usage: handctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: handctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: handctl list\nLists available profiles."),
        "doctor" => println!(
            "usage: handctl doctor\nShows configuration paths and whether the detector command is found."
        ),
        "replay" => println!(
            "usage: handctl replay [--profile <name>] [<file>|-]\nReads detector JSON lines from <file> or stdin and prints one hand state per frame."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
