mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use sequencer_core::config::ControllerConfig;
use session::{Session, SessionConfig};

const USAGE: &str =
    "Usage: sequencer-emulator [--interval <ms>] [--floor <ms>] [--transcript <path>]";

fn main() -> io::Result<()> {
    let config = parse_config().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(&config)?;
    let mut line = String::new();

    for banner in session.banner()? {
        writeln!(writer, "{banner}")?;
    }
    writeln!(
        writer,
        "Relay Sequencer Emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_config() -> Result<SessionConfig, String> {
    let mut controller = ControllerConfig::default();
    let mut transcript = SessionConfig::DEFAULT_TRANSCRIPT.to_string();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };

        match flag.as_str() {
            "--interval" => {
                let raw = value()?;
                let interval = raw
                    .parse::<u32>()
                    .map_err(|_| format!("Invalid interval `{raw}`"))?;
                controller = controller.with_base_interval(interval);
            }
            "--floor" => {
                let raw = value()?;
                let floor = raw
                    .parse::<u64>()
                    .map_err(|_| format!("Invalid delay floor `{raw}`"))?;
                controller = controller.with_delay_floor(floor);
            }
            "--transcript" => transcript = value()?,
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }

    Ok(SessionConfig::new(controller, transcript))
}
