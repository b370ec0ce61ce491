use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use decksync::library::{CompatibilityQuery, TrackRecord};
use decksync::scoring::Scorer;
use decksync::{Error, logging};

mod dry_run;
mod settings;
mod startup;

const USAGE: &str = "usage: decksync [SOURCE] [--seed PATH] [--limit N] [--simulate]

SOURCE   JSON export, music directory or index cache (default: [library].source, then .)
--seed   track path to suggest follow-ups for
--limit  number of suggestions to print (default 10)
--simulate  exercise a session against the in-memory mixer";

#[derive(Debug, Default, PartialEq)]
struct Args {
    source: Option<PathBuf>,
    seed: Option<PathBuf>,
    limit: Option<usize>,
    simulate: bool,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut out = Args::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => out.help = true,
            "--simulate" => out.simulate = true,
            "--seed" => {
                let v = it.next().ok_or("--seed needs a path")?;
                out.seed = Some(PathBuf::from(v));
            }
            "--limit" => {
                let v = it.next().ok_or("--limit needs a number")?;
                out.limit = Some(v.parse().map_err(|_| format!("bad --limit {v:?}"))?);
            }
            flag if flag.starts_with("--") => return Err(format!("unknown option {flag}")),
            _ if out.source.is_none() => out.source = Some(PathBuf::from(arg)),
            _ => return Err(format!("unexpected argument {arg:?}")),
        }
    }
    Ok(out)
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(env::args().skip(1)).map_err(|e| format!("{e}\n\n{USAGE}"))?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let (settings, problem) = settings::load_settings();
    logging::init(&settings.logging)?;
    if let Some(msg) = problem {
        warn!("{msg}");
    }

    let source = args
        .source
        .or_else(|| settings.library.source.clone())
        .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let index = Arc::new(startup::open_index(&source, &settings)?);
    startup::print_summary(&index);

    let scorer = Scorer::from_settings(&settings.scoring);
    let query = CompatibilityQuery {
        tempo_tolerance: Some(settings.scoring.tempo_tolerance),
        key_strictness: settings.scoring.key_strictness,
        limit: Some(args.limit.unwrap_or(10)),
    };

    let seed: Option<TrackRecord> = match &args.seed {
        Some(path) => Some(
            index
                .lookup(path)
                .cloned()
                .ok_or_else(|| Error::TrackNotFound(path.display().to_string()))?,
        ),
        None => None,
    };
    if let Some(seed) = &seed {
        startup::print_suggestions(&index, seed, &scorer, &query);
    }

    if args.simulate {
        if index.is_empty() {
            return Err("cannot simulate with an empty library".into());
        }
        let start = seed.map(|t| t.position).unwrap_or(0);
        dry_run::run(Arc::clone(&index), &settings, start)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Result<Args, String> {
        parse_args(v.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_source_and_flags() {
        let a = args(&["lib.json", "--seed", "/m/a.mp3", "--limit", "3", "--simulate"]).unwrap();
        assert_eq!(a.source, Some(PathBuf::from("lib.json")));
        assert_eq!(a.seed, Some(PathBuf::from("/m/a.mp3")));
        assert_eq!(a.limit, Some(3));
        assert!(a.simulate);
        assert_eq!(args(&[]).unwrap(), Args::default());
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(args(&["--seed"]).is_err());
        assert!(args(&["--limit", "many"]).is_err());
        assert!(args(&["--bogus"]).is_err());
        assert!(args(&["a", "b"]).is_err());
    }
}
