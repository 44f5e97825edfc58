//! Command-line front end for `pulseq`: list available output ports, or
//! load a Standard MIDI File and play it out one of them in real time.

use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::info;

use pulseq::backend::midir_backend::MidirOutput;
use pulseq::backend::MidiApi;
use pulseq::event::EventBody;
use pulseq::track::PlaybackSink;
use pulseq::track_data::RunningStatusPolicy;
use pulseq::types::Channel;
use pulseq::{File, Player};

#[derive(Parser)]
#[command(name = "pulseq-cli", about = "Load and play Standard MIDI Files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the output ports the midir backend can see.
    ListPorts,
    /// Load a .mid file and play it on an output port.
    Play {
        /// Path to a Standard MIDI File.
        path: String,
        /// Output port index (see `list-ports`); omitted opens a virtual port.
        #[arg(long)]
        port: Option<usize>,
        /// Play SMF0 files as one interleaved track instead of splitting by channel.
        #[arg(long)]
        no_split: bool,
    },
}

/// Arms tracks before the real `MasterBus`-backed sink exists; arming
/// itself never emits anything.
struct NoOpSink;

impl PlaybackSink for NoOpSink {
    fn send_channel_event(&mut self, _bus: u32, _channel: Channel, _event: &EventBody) {}
    fn publish_tempo(&mut self, _us_per_quarter_note: u32) {}
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::ListPorts => list_ports(),
        Command::Play {
            path,
            port,
            no_split,
        } => {
            if let Err(message) = play(&path, port, !no_split) {
                eprintln!("error: {}", message);
                std::process::exit(1);
            }
        }
    }
}

fn list_ports() {
    match MidirOutput::new() {
        Ok(api) => {
            let count = api.get_port_count();
            if count == 0 {
                println!("no output ports found");
                return;
            }
            for index in 0..count {
                match api.get_port_name(index) {
                    Ok(name) => println!("{}: {}", index, name),
                    Err(e) => println!("{}: <error: {}>", index, e),
                }
            }
        }
        Err(e) => eprintln!("error opening midir output: {}", e),
    }
}

fn play(path: &str, port: Option<usize>, split: bool) -> Result<(), String> {
    let bytes = std::fs::read(path).map_err(|e| format!("reading {}: {}", path, e))?;
    let parsed = File::parse(bytes, RunningStatusPolicy::Recover, split)
        .map_err(|e| format!("parsing {}: {}", path, e))?;

    info!(
        "loaded {:?} file: {} tracks, PPQN {}",
        parsed.format,
        parsed.tracks.len(),
        parsed.ppqn.get()
    );

    let bpm = parsed
        .tracks
        .first()
        .map(|t| t.info().tempo.bpm())
        .unwrap_or(120.0);
    let total_ticks = parsed
        .tracks
        .iter()
        .map(|t| t.info().length)
        .max()
        .unwrap_or(0);

    let mut player = Player::new();
    {
        let transport = player.transport();
        let mut transport = transport.lock().unwrap();
        transport.set_ppqn(parsed.ppqn);
        transport.set_bpm(bpm);
    }

    let mut sink = NoOpSink;
    for mut track in parsed.tracks {
        track.set_armed(true, &mut sink);
        player.add_track(track);
    }

    let port_name = "pulseq-cli";
    player.launch(
        Some(Box::new(move || {
            let mut api = MidirOutput::new()?;
            match port {
                Some(index) => api.open_port(index, port_name)?,
                None => api.open_virtual_port(port_name)?,
            }
            Ok(Box::new(api) as Box<dyn MidiApi>)
        })),
        None,
    );
    player.start();

    let ppqn = parsed.ppqn.get() as f64;
    let seconds = (total_ticks as f64 / ppqn) * (60.0 / bpm);
    thread::sleep(Duration::from_secs_f64(seconds.max(0.0) + 0.5));

    player.stop_playback();
    player.finish();
    Ok(())
}
