use clap::Parser;
use client::game::{Client, ClientConfig};
use client::input::Terminal;
use log::info;
use shared::{is_valid_player_name, MAX_PLAYER_NAME_LEN};
use tokio::io::{stdin, stdout, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    server: String,

    /// Server port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Player name shown to the opponent
    #[arg(short, long)]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    if !is_valid_player_name(args.name.as_bytes()) {
        return Err(format!(
            "player name must be 1 to {} bytes without ';'",
            MAX_PLAYER_NAME_LEN
        )
        .into());
    }

    info!("Starting client as {}", args.name);
    info!("Connecting to: {}:{}", args.server, args.port);

    let client = Client::new(ClientConfig::new(args.server, args.port, args.name));
    let mut terminal = Terminal::new(BufReader::new(stdin()), stdout());
    client.run(&mut terminal).await?;

    Ok(())
}
