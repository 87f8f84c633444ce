use std::env;

use tracing::info;

use tracklane::library::naming::MAX_ORDINAL;
use tracklane::{PlaybackEngine, TrackRepository};

mod commands;
mod player;
mod settings;

use commands::{Command, USAGE};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let command = match Command::parse(env::args().skip(1)) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("tracklane: {msg}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let settings = settings::load_settings();
    if command == Command::Config {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    let repo = TrackRepository::from_settings(&settings)?;

    match command {
        Command::List => {
            let tracks = repo.scan();
            if tracks.is_empty() {
                println!("playlist is empty ({})", repo.dir().display());
            }
            for t in tracks {
                println!("{}  {}", t.display_string(), t.formatted_size());
            }
        }
        Command::Upload(files) => {
            for file in files {
                match repo.upload(&file) {
                    Ok(t) => println!("added {}", t.display_string()),
                    Err(e) => eprintln!("{}: {e}", file.display()),
                }
            }
        }
        Command::Delete(ordinal) => {
            let Some(track) = find(&repo, ordinal) else {
                eprintln!("no track {ordinal:03}");
                return Ok(());
            };
            if repo.delete(&track)? {
                println!("deleted {track}");
            }
        }
        Command::Move { from, to } => {
            let mut tracks = repo.scan();
            let (from, to) = (from as usize, to as usize);
            if from > tracks.len() || to > tracks.len() {
                eprintln!("playlist has {} tracks", tracks.len());
                return Ok(());
            }
            let moved = tracks.remove(from - 1);
            tracks.insert(to - 1, moved);
            for t in repo.reorder(&tracks)? {
                println!("{}", t.display_string());
            }
        }
        Command::Clear => {
            let n = repo.track_count();
            if repo.clear_all() {
                info!(tracks = n, "cleared playlist");
                println!("removed {n} tracks");
            } else {
                eprintln!("some tracks could not be removed");
            }
        }
        Command::Info => {
            print!("{}", repo.directory_info());
            let used = repo.track_count() as u32;
            println!("Free ordinals: {}", MAX_ORDINAL.saturating_sub(used));
        }
        Command::Play(start) => {
            let tracks = repo.scan();
            if tracks.is_empty() {
                println!("playlist is empty");
                return Ok(());
            }
            let index = match start {
                Some(n) => match tracks.iter().position(|t| t.ordinal == n) {
                    Some(i) => i,
                    None => {
                        eprintln!("no track {n:03}");
                        return Ok(());
                    }
                },
                None => 0,
            };
            let engine = PlaybackEngine::new(&settings);
            player::Session::new(engine, tracks, index).run()?;
        }
        Command::Config => {}
    }

    Ok(())
}

fn find(repo: &TrackRepository, ordinal: u32) -> Option<tracklane::Track> {
    repo.scan().into_iter().find(|t| t.ordinal == ordinal)
}
