fn main() {
    // Load .env file if present (for development convenience)
    // Silently ignore if not found - production uses system env vars
    let _ = dotenvy::dotenv();

    app_lib::init_logging();

    if let Err(e) = app_lib::run() {
        log::error!("Recycle Assistant failed: {}", e);
        std::process::exit(1);
    }
}
