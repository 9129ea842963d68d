use directories::ProjectDirs;
use flexi_logger::Logger;
use log::{debug, error};

use tablebook::cli::Cli;
use tablebook::config::Config;

fn main() {
    let Some(project_dirs) = ProjectDirs::from("", "", "tablebook") else {
        eprintln!("Could not determine the project data directory");
        std::process::exit(1);
    };
    let config = Config::load_config(&project_dirs);

    // RUST_LOG overrides the configured level, e.g. RUST_LOG=tablebook=trace
    let log_spec = format!("tablebook={}", config.logging.tablebook);
    let _logger = match Logger::try_with_env_or_str(&log_spec).and_then(|logger| logger.start()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Failed to start logger: {}", e);
            None
        }
    };
    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());

    if let Err(err) = Cli::handle_command_line(&project_dirs, &config) {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
