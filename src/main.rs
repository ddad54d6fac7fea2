// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mixgraph::{
    asset::AssetRequest, audio, config, player::PlayerState, spatial::Transform, EffectRegistry,
    SoundSystem,
};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A player, effect and bus audio graph."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the effects players can attach.
    Effects {},
    /// Plays a file through a player until it finishes or Ctrl-C is pressed.
    Play {
        /// The audio file to play.
        file: PathBuf,
        /// The bus to route the player into.
        #[arg(short, long, default_value = mixgraph::DEFAULT_BUS)]
        bus: String,
        /// Effects to attach by name. May be repeated.
        #[arg(short, long)]
        effect: Vec<String>,
        /// The player gain.
        #[arg(short, long, default_value_t = 1.0)]
        gain: f32,
        /// Extra repetitions. Negative loops until stopped.
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        loops: i32,
        /// The system config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Prints the audio graph in nomnoml syntax once the player is wired.
        #[arg(long)]
        dump_graph: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Effects {} => {
            let registry = EffectRegistry::new();
            println!("Effects:");
            for effect in registry.all_effects() {
                println!("- {} ({}): {}", effect.key, effect.order, effect.description);
            }
        }
        Commands::Play {
            file,
            bus,
            effect,
            gain,
            loops,
            config,
            dump_graph,
        } => {
            let config = match config {
                Some(path) => config::System::deserialize(&path)?,
                None => config::System::default(),
            };
            play(&config, file, &bus, &effect, gain, loops, dump_graph).await?;
        }
    }

    Ok(())
}

async fn play(
    config: &config::System,
    file: PathBuf,
    bus: &str,
    effects: &[String],
    gain: f32,
    loops: i32,
    dump_graph: bool,
) -> Result<(), Box<dyn Error>> {
    let mut system = SoundSystem::new(config)?;
    if !system.has_output() {
        warn!("No audio output, nothing will be heard.");
    }

    let asset = system.assets().load_file(&file);
    let id = system.create_player();
    let player = system.player(id).ok_or("player vanished after creation")?;
    {
        let mut player = player.lock();
        player.set_bus(bus);
        player.set_gain(gain);
        for name in effects {
            if !player.add_effect(name).is_valid() {
                return Err(format!("unable to attach effect {}", name).into());
            }
        }
        player.set_asset(asset);
        player.play_looping(loops, 0.0);
    }
    info!(file = %file.display(), bus, "Playing.");

    let mut interval = tokio::time::interval(config.audio().tick_interval()?);
    let mut started = false;
    let mut dumped = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping.");
                break;
            }
            _ = interval.tick() => {
                system.tick(&Transform::default());

                let player = player.lock();
                match player.state() {
                    PlayerState::AssetBound => {
                        if dump_graph && !dumped {
                            println!("{}", system.graph_dump());
                            dumped = true;
                        }
                        let playing = player.is_playing();
                        if started && !playing {
                            info!("Playback finished.");
                            break;
                        }
                        started |= playing;
                        // Without an output nothing advances the cursor.
                        if !system.has_output() {
                            break;
                        }
                    }
                    PlayerState::AssetPending => {
                        if matches!(system.assets().request(asset), AssetRequest::Unknown) {
                            return Err(format!("unable to load {}", file.display()).into());
                        }
                    }
                    PlayerState::NoAsset => {
                        return Err(format!("unable to load {}", file.display()).into());
                    }
                }
            }
        }
    }

    system.destroy_player(id);
    Ok(())
}
