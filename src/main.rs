use clap::Parser;
use infrared::nmf::NmfData;
use infrared::Session;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::exit;

/// Compile a score script and NMF input into a Standard MIDI File.
///
/// The NMF input is read from stdin and the MIDI file is written to
/// stdout.
#[derive(Parser)]
#[command(name = "infrared", version)]
struct Args {
    /// Write a section map file: one `<section>:<delta_ticks>` line per
    /// NMF section.
    #[arg(long = "map", value_name = "PATH")]
    map: Option<PathBuf>,

    /// Skip the keyboard non-overlap pass.
    #[arg(long = "no-keyboard")]
    no_keyboard: bool,

    /// Path of the score script.
    script: PathBuf,
}

fn run(args: &Args) -> Result<(), String> {
    let script = fs::read_to_string(&args.script)
        .map_err(|e| format!("Failed to open script file {}: {}", args.script.display(), e))?;

    let stdin = io::stdin();
    let nmf = NmfData::read(stdin.lock()).map_err(|e| format!("{}", e))?;

    let mut session = Session::new(nmf).map_err(|e| format!("{}", e))?;
    session.set_keyboard(!args.no_keyboard);
    session.run_script(&script).map_err(|e| format!("{}", e))?;
    session.render().map_err(|e| format!("{}", e))?;
    session.track_controllers().map_err(|e| format!("{}", e))?;

    if let Some(path) = &args.map {
        let mut map = fs::File::create(path)
            .map_err(|e| format!("Failed to create file {}: {}", path.display(), e))?;
        session.write_map(&mut map).map_err(|e| format!("{}", e))?;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    session.compile(&mut out).map_err(|e| format!("{}", e))?;
    out.flush().map_err(|e| format!("I/O error during output: {}", e))?;
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(msg) = run(&args) {
        eprintln!("infrared: {}", msg);
        exit(1);
    }
}
