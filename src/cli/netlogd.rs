use clap::{ArgAction, Parser};

pub const NAME: &str = "netlogd";

#[derive(Parser, Debug, Clone)]
#[clap(name = NAME)]
#[clap(about = "Netlog daemon: audit trail of the network activity of every process")]
#[clap(version = crate::metadata::VERSION)]
#[clap(disable_help_subcommand = true)]
pub struct NetlogdOpts {
    #[clap(long)]
    pub config_file: Option<String>,

    /// Pass many times for a more verbose output. Passing `-v` adds debug logs, `-vv` enables trace logging
    #[clap(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}
