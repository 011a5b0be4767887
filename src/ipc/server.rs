use anyhow::{Result, anyhow};
use log::{error, info, warn};
use notify::{EventKind, RecursiveMode, Watcher};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
    },
    thread,
    time::Duration,
};

use super::dispatch::handle_request;
use super::pipeline::run_frame_loop;
use super::runtime::socket_path;
use crate::actions::LogObserver;
use crate::config::{ConfigState, Profile};
use crate::input::DetectorProcess;
use crate::state::{HandsState, SharedState};

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path()?;
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let mut state = DaemonState::new(sock.clone())?;
    info!("daemon: active profile '{}'", state.cfg.active_name);
    let store = HandsState::shared(&state.cfg.profile.targets);

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGTERM, Arc::clone(&stop))?;
    signal_hook::flag::register(SIGINT, Arc::clone(&stop))?;

    // channels
    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();

    let _watcher = watch_profiles(&state.cfg, tx_req.clone())
        .inspect_err(|e| warn!("profile watch disabled: {e}"))
        .ok();

    // frame thread
    let mut frame_thread =
        FrameThread::start(state.cfg.profile.clone(), store.clone(), stop.clone());

    // accept loop
    listener.set_nonblocking(true)?;
    while !stop.load(Ordering::Relaxed) {
        if let Ok((stream, _)) = listener.accept() {
            let tx = tx_req.clone();
            let st_snapshot = state.clone_shallow();
            let store = store.clone();
            thread::spawn(move || {
                if let Err(e) = handle_client(stream, &st_snapshot, &store, &tx) {
                    error!("ipc client error: {e}");
                }
            });
        }

        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload => {
                    if let Err(e) = state.cfg.reload() {
                        error!("reload failed: {e}");
                    } else {
                        frame_thread.update_profile(state.cfg.profile.clone());
                        info!("profile reloaded");
                    }
                }
                IpcMsg::UseProfile(name) => {
                    if let Err(e) = state.cfg.set_active(&name) {
                        error!("use profile failed: {e}");
                    } else {
                        frame_thread.update_profile(state.cfg.profile.clone());
                        info!("switched active profile to {}", state.cfg.active_name);
                    }
                }
                IpcMsg::Shutdown => stop.store(true, Ordering::Relaxed),
            }
        }

        thread::sleep(Duration::from_millis(5));
    }

    // an in-flight detector read is abandoned, not joined
    info!("daemon: shutting down");
    let _ = std::fs::remove_file(&sock);
    Ok(())
}

fn handle_client(
    mut stream: UnixStream,
    st: &DaemonState,
    store: &SharedState,
    tx: &Sender<IpcMsg>,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let resp = handle_request(&req, st, store, tx);
    writeln!(stream, "{resp}")?;
    Ok(())
}

fn watch_profiles(cfg: &ConfigState, tx: Sender<IpcMsg>) -> Result<notify::RecommendedWatcher> {
    let active = cfg.active_path();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let Ok(event) = res else { return };
        let touched_active = event.paths.iter().any(|p| p.file_name() == active.file_name());
        if touched_active && matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            let _ = tx.send(IpcMsg::Reload);
        }
    })?;
    watcher.watch(&cfg.profiles_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

pub struct DaemonState {
    pub cfg: ConfigState,
    pub socket: PathBuf,
}

impl DaemonState {
    fn new(socket: PathBuf) -> Result<Self> {
        let cfg = ConfigState::load_or_install_default()?;
        Ok(Self { cfg, socket })
    }

    fn clone_shallow(&self) -> Self {
        Self {
            cfg: self.cfg.clone(),
            socket: self.socket.clone(),
        }
    }
}

pub enum IpcMsg {
    Reload,
    UseProfile(String),
    Shutdown,
}

struct FrameThread {
    profile: Arc<Mutex<Profile>>,
    _thread: thread::JoinHandle<()>,
}

impl FrameThread {
    fn start(profile: Profile, store: SharedState, stop: Arc<AtomicBool>) -> Self {
        let profile_arc = Arc::new(Mutex::new(profile));
        let prof_clone = profile_arc.clone();
        let handle = thread::spawn(move || {
            if let Err(e) = frame_worker(&prof_clone, &store, &stop) {
                error!("frame loop failed: {e}");
            }
        });
        Self {
            profile: profile_arc,
            _thread: handle,
        }
    }

    fn update_profile(&mut self, new_profile: Profile) {
        if let Ok(mut p) = self.profile.lock() {
            *p = new_profile;
        }
    }
}

fn frame_worker(
    profile: &Arc<Mutex<Profile>>,
    store: &SharedState,
    stop: &AtomicBool,
) -> Result<()> {
    let (detector, capture) = {
        let p = profile.lock().map_err(|_| anyhow!("profile lock poisoned"))?;
        (p.detector.clone(), p.capture.frame_size())
    };
    let mut source = DetectorProcess::spawn(&detector, capture)?;
    let n = run_frame_loop(&mut source, store, profile, capture, &mut LogObserver, stop)?;
    info!("frame loop stopped after {n} frames");
    Ok(())
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "handctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}
