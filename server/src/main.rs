use clap::Parser;
use log::info;
use server::shutdown::EXIT_COMMAND;
use server::{Server, ServerConfig, Timeouts};
use std::io::{self, BufReader};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Timeout for machine-paced replies such as the join request
    #[arg(long)]
    short_timeout_secs: Option<u64>,

    /// Timeout for human-paced replies and for waiting on an opponent
    #[arg(long)]
    long_timeout_secs: Option<u64>,

    /// How long each accept poll blocks before checking for shutdown
    #[arg(long)]
    accept_poll_ms: Option<u64>,

    /// How long workers get to finish after `exit`
    #[arg(long)]
    exit_grace_secs: Option<u64>,
}

impl Args {
    fn timeouts(&self) -> Timeouts {
        let mut timeouts = Timeouts::default();
        if let Some(secs) = self.short_timeout_secs {
            timeouts.short_receive = Duration::from_secs(secs);
        }
        if let Some(secs) = self.long_timeout_secs {
            timeouts.long_receive = Duration::from_secs(secs);
        }
        if let Some(ms) = self.accept_poll_ms {
            timeouts.accept_poll = Duration::from_millis(ms);
        }
        if let Some(secs) = self.exit_grace_secs {
            timeouts.exit_grace = Duration::from_secs(secs);
        }
        timeouts
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let config =
        ServerConfig::new(format!("{}:{}", args.host, args.port)).with_timeouts(args.timeouts());

    let server = Server::bind(config)?;
    info!("Server listening on {}", server.local_addr()?);
    println!("Type '{}' to stop the server", EXIT_COMMAND);

    let summary = server.run(Some(BufReader::new(io::stdin())));

    if summary.succeeded() {
        println!("Server finished successfully");
        Ok(())
    } else {
        eprintln!(
            "Server finished with errors ({} forced terminations, error raised: {})",
            summary.forced_terminations, summary.error_raised
        );
        std::process::exit(1);
    }
}
