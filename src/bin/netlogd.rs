use clap::Parser;
use netlog::cli::{log_level_from_verbosity_flag_count, netlogd::NetlogdOpts};

#[tokio::main]
async fn main() {
    let opts = NetlogdOpts::parse();

    netlog::init_logger(Some(log_level_from_verbosity_flag_count(opts.verbose)));

    match netlog::netlogd::netlog_daemon_run(&opts).await {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            netlog::utils::report_error(&e);
            std::process::exit(1);
        }
    }
}
