use std::collections::VecDeque;
use std::error::Error;
use std::io::Write;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use keyer_core::{KeyerError, OUTBOUND_CAPACITY};
use log::{info, warn};
use station::{parse_line, Cli, Command, Station};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

/// Move queued characters into the keyer while it has room
fn feed_keyer(station: &Station, backlog: &mut VecDeque<char>) {
    while station.control().pending() < OUTBOUND_CAPACITY {
        let Some(c) = backlog.front().copied() else {
            break;
        };
        match station.control().send(c) {
            Ok(_) => {
                backlog.pop_front();
            }
            Err(KeyerError::QueueFull) => break,
            Err(e) => {
                warn!("dropping {:?}: {}", c, e);
                backlog.pop_front();
            }
        }
    }
}

fn run_command(station: &mut Station, backlog: &mut VecDeque<char>, command: Command) -> bool {
    let result = match command {
        Command::Send(text) => {
            backlog.extend(text.chars());
            backlog.push_back(' ');
            feed_keyer(station, backlog);
            Ok(())
        }
        Command::Speed(wpm) => station.set_speed(wpm),
        Command::Mode(mode) => station.control().set_mode(mode),
        Command::Frequency(freq) => station.set_frequency(freq),
        Command::Mute(muted) => {
            station.set_muted(muted);
            Ok(())
        }
        Command::Clear => {
            backlog.clear();
            station.clear_text();
            Ok(())
        }
        Command::Quit => return false,
    };
    if let Err(e) = result {
        eprintln!("{}", e);
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut station = Station::new(cli.keyer_config()?, cli.synth_params()?, cli.decoder_config()?)?;
    info!("station {} (keyer-core {})", env!("CARGO_PKG_VERSION"), keyer_core::VERSION);

    let (notify, mut decoded) = watch::channel(0usize);
    station.start_decoder(notify)?;
    station.start_audio(!cli.no_audio)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut backlog = VecDeque::new();
    let mut tick = tokio::time::interval(Duration::from_millis(50));
    let mut printed = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(line.trim_end()) {
                    Ok(command) => {
                        if !run_command(&mut station, &mut backlog, command) {
                            break;
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
            _ = tick.tick(), if !backlog.is_empty() => {
                feed_keyer(&station, &mut backlog);
            }
            changed = decoded.changed() => {
                if changed.is_err() {
                    break;
                }
                let text = station.decoder().get_text();
                if let Some(new) = text.get(printed..) {
                    print!("{}", new);
                    std::io::stdout().flush()?;
                }
                printed = text.len();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    station.stop();
    println!();
    Ok(())
}
