use env_logger::Env;

/// Filter is read from `HANDCTL_LOG`, e.g. `HANDCTL_LOG=handctl=debug`.
pub fn init() {
    let _ = env_logger::Builder::from_env(Env::default().filter_or("HANDCTL_LOG", "info"))
        .format_timestamp_millis()
        .try_init();
}
