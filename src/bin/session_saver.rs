use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use zufangfinder::{browser, debug, session};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Capture an authenticated Lianjia session via Chrome")]
struct Args {
    /// Where to write the captured session
    #[clap(short, long, default_value = session::DEFAULT_SESSION_FILE)]
    output: PathBuf,

    /// Run Chrome without a window (human verification becomes impossible)
    #[clap(long)]
    headless: bool,

    /// Enable debug output
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.debug {
        debug::enable();
    }

    let chrome = browser::launch(args.headless)?;
    let state = browser::capture_session(&chrome)?;
    session::save_session(&state, &args.output)?;

    println!(
        "Session saved to {} ({} cookies). You can run the crawler now.",
        args.output.display(),
        state.cookies.len()
    );

    Ok(())
}
