use std::path::PathBuf;

pub const USAGE: &str = "\
usage: tracklane <command>

commands:
  list                 list the playlist
  upload <file>...     add files to the end of the playlist
  delete <ordinal>     remove a track and renumber the rest
  move <from> <to>     move a track to another position
  clear                remove every track
  info                 show the playlist directory
  play [ordinal]       play from a track (default 1), controlled from stdin
  config               print the effective configuration";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Upload(Vec<PathBuf>),
    Delete(u32),
    Move { from: u32, to: u32 },
    Clear,
    Info,
    Play(Option<u32>),
    Config,
}

impl Command {
    /// Parse the arguments after the program name. No arguments means `list`.
    pub fn parse<I, S>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let Some((name, rest)) = args.split_first() else {
            return Ok(Self::List);
        };

        let cmd = match name.as_str() {
            "list" | "ls" => Self::List,
            "upload" | "add" => {
                if rest.is_empty() {
                    return Err("upload needs at least one file".to_string());
                }
                Self::Upload(rest.iter().map(PathBuf::from).collect())
            }
            "delete" | "rm" => Self::Delete(ordinal_arg(rest, 0)?),
            "move" | "mv" => Self::Move {
                from: ordinal_arg(rest, 0)?,
                to: ordinal_arg(rest, 1)?,
            },
            "clear" => Self::Clear,
            "info" => Self::Info,
            "play" => match rest.first() {
                Some(_) => Self::Play(Some(ordinal_arg(rest, 0)?)),
                None => Self::Play(None),
            },
            "config" => Self::Config,
            other => return Err(format!("unknown command: {other}")),
        };
        Ok(cmd)
    }
}

fn ordinal_arg(args: &[String], i: usize) -> Result<u32, String> {
    let raw = args
        .get(i)
        .ok_or_else(|| "missing track ordinal".to_string())?;
    match raw.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("invalid track ordinal: {raw}")),
    }
}
