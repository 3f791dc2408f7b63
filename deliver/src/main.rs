mod logging;

use std::{
    fs::File,
    io::{self, Read, Write},
    path::PathBuf,
};

use anyhow::{bail, Context};
use clap::Parser;
use maildrop_dispatch::{build_factory, load_config, HandlerFactory, Reply};
use tracing::info;

/// Drives a single SMTP transaction through the dispatcher.
#[derive(Parser, Debug)]
#[command(name = "maildrop-deliver")]
#[command(about = "Deliver one message through the maildrop dispatcher", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the dispatcher configuration file
    #[arg(short, long, default_value = "maildrop.toml")]
    config: PathBuf,

    /// Envelope sender
    #[arg(short, long)]
    from: String,

    /// Envelope recipient, may be repeated
    #[arg(short, long = "to", required = true)]
    to: Vec<String>,

    /// File holding the message, read from stdin when absent
    #[arg(short, long)]
    input: Option<PathBuf>,
}

/// Runs one transaction, writing the reply of every step to `out`.
///
/// Returns whether the message was delivered.
fn run(
    factory: &HandlerFactory,
    from: &str,
    recipients: &[String],
    body: &mut dyn Read,
    out: &mut dyn Write,
) -> io::Result<bool> {
    let mut handler = factory.create();

    handler.set_sender(from);
    writeln!(out, "{}", Reply::new(250, "OK"))?;

    let mut accepted = 0;
    for recipient in recipients {
        match handler.add_recipient(recipient) {
            Ok(()) => {
                accepted += 1;
                writeln!(out, "{}", Reply::new(250, "OK"))?;
            }
            Err(err) => writeln!(out, "{}", err.reply())?,
        }
    }

    if accepted == 0 {
        writeln!(out, "{}", Reply::new(554, "No valid recipients"))?;
        handler.complete();
        return Ok(false);
    }

    let delivered = match handler.deliver_body(body) {
        Ok(()) => {
            writeln!(out, "{}", Reply::new(250, "Message accepted"))?;
            true
        }
        Err(err) => {
            writeln!(out, "{}", err.reply())?;
            false
        }
    };
    handler.complete();
    Ok(delivered)
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("Unable to load {}", cli.config.display()))?;
    let factory = build_factory(&config.dispatch)?;
    info!(
        config = %cli.config.display(),
        deferred_size = factory.deferred_size(),
        "Dispatcher ready"
    );

    let mut body: Box<dyn Read> = match &cli.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("Unable to open {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let delivered = run(&factory, &cli.from, &cli.to, &mut body, &mut io::stdout().lock())?;
    if !delivered {
        bail!("Message was not delivered");
    }
    Ok(())
}
