use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use sequencer_core::config::ControllerConfig;
use session::{Session, SessionConfig};

fn main() -> io::Result<()> {
    record_decrease_sweep()?;
    record_manual_session()?;
    Ok(())
}

fn record_decrease_sweep() -> io::Result<()> {
    let config = SessionConfig::new(
        ControllerConfig::default(),
        "transcripts/emulator-decrease-sweep.log",
    )
    .with_header("Relay Sequencer Emulator decrease sweep transcript");
    let mut session = Session::new(&config)?;

    let _ = session.banner()?;
    let _ = session.handle_command("<254>")?;
    let _ = session.handle_command("step")?;
    let _ = session.handle_command("send 200 150")?;
    let _ = session.handle_command("step 2")?;
    let _ = session.handle_command("send 100")?;
    let _ = session.handle_command("run")?;
    let _ = session.handle_command("log 12")?;
    let _ = session.handle_command("send 101")?;
    let _ = session.handle_command("step 3")?;
    let _ = session.handle_command("status")?;
    Ok(())
}

fn record_manual_session() -> io::Result<()> {
    let config = SessionConfig::new(
        ControllerConfig::default().with_base_interval(1_000),
        "transcripts/emulator-manual.log",
    )
    .with_header("Relay Sequencer Emulator manual control transcript");
    let mut session = Session::new(&config)?;

    let _ = session.banner()?;
    let _ = session.handle_command("help")?;
    let _ = session.handle_command("send 0 4 8")?;
    let _ = session.handle_command("step 3")?;
    let _ = session.handle_command("send 102")?;
    let _ = session.handle_command("step")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("<>")?;
    let _ = session.handle_command("<12345678>")?;
    let _ = session.handle_command("send 42 103 111")?;
    let _ = session.handle_command("step 5")?;
    let _ = session.handle_command("log 8")?;
    Ok(())
}
