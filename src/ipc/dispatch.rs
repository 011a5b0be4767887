use serde_json::{Value, json};
use std::sync::mpsc::Sender;

use super::server::{DaemonState, IpcMsg};
use crate::state::SharedState;

fn ok(data: Value) -> Value {
    json!({"ok": true, "data": data})
}

fn err(msg: impl Into<String>) -> Value {
    json!({"ok": false, "error": msg.into()})
}

/// Answer one request. Anything that changes daemon state is forwarded to
/// the main loop over `tx`.
pub fn handle_request(
    req: &Value,
    st: &DaemonState,
    store: &SharedState,
    tx: &Sender<IpcMsg>,
) -> Value {
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    match op {
        "status" => {
            let frames = store.lock().map(|s| s.frames).unwrap_or_default();
            ok(json!({
                "active_profile": st.cfg.active_name,
                "profile_name": st.cfg.profile.meta.name,
                "socket": st.socket,
                "capture": st.cfg.profile.capture.frame_size(),
                "frames": frames,
            }))
        }
        "state" => match store.lock() {
            Ok(s) => match serde_json::to_value(&*s) {
                Ok(v) => ok(v),
                Err(e) => err(e.to_string()),
            },
            Err(_) => err("hand state lock poisoned"),
        },
        "reload" => {
            let _ = tx.send(IpcMsg::Reload);
            ok(json!({"active_profile": st.cfg.active_name}))
        }
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            if name.is_empty() {
                return err("use: missing profile name");
            }
            if !st.cfg.list_profiles().iter().any(|p| p == name) {
                return err(format!("profile not found: {name}"));
            }
            let _ = tx.send(IpcMsg::UseProfile(name.to_string()));
            ok(json!({"active_profile": name}))
        }
        "list" => ok(json!({
            "profiles": st.cfg.list_profiles(),
            "active": st.cfg.active_name,
        })),
        "doctor" => ok(st.cfg.doctor_report()),
        "shutdown" => {
            let _ = tx.send(IpcMsg::Shutdown);
            ok(json!("shutting down"))
        }
        _ => err(format!("unknown op: {op}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigState;
    use crate::state::HandsState;
    use std::{fs, path::PathBuf, sync::mpsc};

    fn daemon(tag: &str) -> (DaemonState, PathBuf) {
        let dir = std::env::temp_dir().join(format!("handctl-ipc-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let cfg = ConfigState::load_or_install_in(dir.clone()).unwrap();
        let st = DaemonState {
            cfg,
            socket: dir.join("handctl.sock"),
        };
        (st, dir)
    }

    #[test]
    fn state_op_returns_both_hands() {
        let (st, dir) = daemon("state");
        let store = HandsState::shared(&st.cfg.profile.targets);
        let (tx, _rx) = mpsc::channel();

        let resp = handle_request(&json!({"op": "state"}), &st, &store, &tx);
        assert_eq!(resp["ok"], true);
        assert_eq!(resp["data"]["left"]["active"], false);
        assert_eq!(resp["data"]["right"]["touching"], false);
        assert!(resp["data"]["parameters"]["filter_cutoff"].is_number());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn mutating_ops_are_forwarded() {
        let (st, dir) = daemon("fwd");
        let store = HandsState::shared(&st.cfg.profile.targets);
        let (tx, rx) = mpsc::channel();

        let resp = handle_request(&json!({"op": "use", "profile": "default"}), &st, &store, &tx);
        assert_eq!(resp["ok"], true);
        assert!(matches!(rx.try_recv(), Ok(IpcMsg::UseProfile(name)) if name == "default"));

        let resp = handle_request(&json!({"op": "use", "profile": "nope"}), &st, &store, &tx);
        assert_eq!(resp["ok"], false);
        assert!(rx.try_recv().is_err());

        handle_request(&json!({"op": "shutdown"}), &st, &store, &tx);
        assert!(matches!(rx.try_recv(), Ok(IpcMsg::Shutdown)));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn status_reports_profile_and_frames() {
        let (st, dir) = daemon("status");
        let store = HandsState::shared(&st.cfg.profile.targets);
        store.lock().unwrap().frames = 7;
        let (tx, _rx) = mpsc::channel();

        let resp = handle_request(&json!({"op": "status"}), &st, &store, &tx);
        assert_eq!(resp["ok"], true);
        assert_eq!(resp["data"]["active_profile"], "default");
        assert_eq!(resp["data"]["profile_name"], "default");
        assert_eq!(resp["data"]["frames"], 7);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_op_is_an_error() {
        let (st, dir) = daemon("unknown");
        let store = HandsState::shared(&st.cfg.profile.targets);
        let (tx, _rx) = mpsc::channel();
        let resp = handle_request(&json!({"op": "dance"}), &st, &store, &tx);
        assert_eq!(resp["ok"], false);
        assert_eq!(resp["error"], "unknown op: dance");
        let _ = fs::remove_dir_all(&dir);
    }
}
