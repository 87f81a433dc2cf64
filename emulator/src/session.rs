use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant as HostInstant};

use embedded_hal::delay::DelayNs;
use sequencer_core::config::{ControllerConfig, STARTUP_BANNER};
use sequencer_core::io::{ByteLink, LatchedOutputs};
use sequencer_core::mux::{CommandMultiplexer, CycleReport};
use sequencer_core::protocol::encode_frame;
use sequencer_core::sequencer::StepOutcome;
use sequencer_core::telemetry::{
    TelemetryInstant, TelemetryPayload, TelemetryRecord, TelemetryRecorder,
};

/// Cycles executed by `run` when no limit is given.
const DEFAULT_RUN_LIMIT: usize = 1_024;
/// Records printed by `log` when no count is given.
const DEFAULT_LOG_COUNT: usize = 10;
/// Telemetry entries retained by the emulator.
const EMULATOR_TELEMETRY_CAPACITY: usize = 256;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "send",
        "send <code> [code...]         - queue framed codes on the link",
    ),
    (
        "raw",
        "<...>                         - queue raw bytes verbatim (e.g. `<254>`)",
    ),
    (
        "step",
        "step [count]                  - run control cycles",
    ),
    (
        "run",
        "run [max-cycles]              - cycle until the end of travel",
    ),
    (
        "status",
        "status                        - display sequencer state",
    ),
    (
        "log",
        "log [count]                   - show recent telemetry",
    ),
    (
        "help",
        "help [topic]                  - show help for a command",
    ),
];

/// Emulator settings gathered from the command line.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub controller: ControllerConfig,
    pub transcript: PathBuf,
    pub header: &'static str,
}

impl SessionConfig {
    pub const DEFAULT_TRANSCRIPT: &'static str = "transcripts/emulator-session.log";

    pub fn new(controller: ControllerConfig, transcript: impl Into<PathBuf>) -> Self {
        Self {
            controller,
            transcript: transcript.into(),
            header: "Relay Sequencer Emulator session transcript",
        }
    }

    #[must_use]
    pub fn with_header(mut self, header: &'static str) -> Self {
        self.header = header;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(ControllerConfig::default(), Self::DEFAULT_TRANSCRIPT)
    }
}

pub struct Session {
    mux: CommandMultiplexer<'static>,
    link: HostLink,
    relays: LatchedOutputs,
    clock: VirtualClock,
    telemetry: TelemetryRecorder<VirtualInstant, EMULATOR_TELEMETRY_CAPACITY>,
    transcript: TranscriptLogger,
    started_at: HostInstant,
}

impl Session {
    pub fn new(config: &SessionConfig) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(&config.transcript, config.header)?;

        Ok(Self {
            mux: CommandMultiplexer::with_config(config.controller),
            link: HostLink::default(),
            relays: LatchedOutputs::new(),
            clock: VirtualClock::default(),
            telemetry: TelemetryRecorder::new(),
            transcript,
            started_at: HostInstant::now(),
        })
    }

    pub fn banner(&mut self) -> io::Result<Vec<String>> {
        let lines = vec![
            STARTUP_BANNER.to_string(),
            format!(
                "base-interval={}ms delay-floor={}ms",
                self.mux.config().base_interval_ms,
                self.mux.config().delay_floor_ms
            ),
        ];
        self.record_output(self.started_at.elapsed(), &lines)?;
        Ok(lines)
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let mut words = trimmed.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        let lines = if trimmed.starts_with('<') {
            self.link.inject(trimmed.as_bytes());
            vec![format!("queued {} raw byte(s)", trimmed.len())]
        } else {
            match verb.to_ascii_lowercase().as_str() {
                "help" => handle_help(args.first().copied()),
                "send" => self.handle_send(&args),
                "step" => self.handle_step(args.first().copied()),
                "run" => self.handle_run(args.first().copied()),
                "status" => vec![self.mux.status(&self.relays).to_string()],
                "log" => self.handle_log(args.first().copied()),
                other => vec![format!("ERR unknown command `{other}` (try `help`)")],
            }
        };

        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    fn handle_send(&mut self, args: &[&str]) -> Vec<String> {
        if args.is_empty() {
            return vec!["ERR syntax send expects at least one code".to_string()];
        }

        let mut codes = Vec::with_capacity(args.len());
        for arg in args {
            match arg.parse::<u16>() {
                Ok(code) => codes.push(code),
                Err(_) => return vec![format!("ERR syntax `{arg}` is not a code (0-65535)")],
            }
        }

        for code in &codes {
            self.link.inject(&encode_frame(*code));
        }
        vec![format!(
            "queued {} frame(s), {} byte(s) pending",
            codes.len(),
            self.link.pending()
        )]
    }

    fn handle_step(&mut self, count: Option<&str>) -> Vec<String> {
        let count = match parse_count(count, 1) {
            Ok(count) => count,
            Err(message) => return vec![message],
        };

        let mut lines = Vec::new();
        for _ in 0..count {
            let report = self.cycle();
            lines.push(self.describe_cycle(&report));
            lines.extend(self.drain_outbound());
        }
        lines
    }

    fn handle_run(&mut self, limit: Option<&str>) -> Vec<String> {
        let limit = match parse_count(limit, DEFAULT_RUN_LIMIT) {
            Ok(limit) => limit,
            Err(message) => return vec![message],
        };

        let started_ms = self.clock.now().0;
        let mut lines = Vec::new();
        let mut cycles = 0;
        let mut moves = 0;
        while cycles < limit {
            let report = self.cycle();
            cycles += 1;
            if report.dispatch.is_some() {
                lines.push(self.describe_cycle(&report));
            }
            lines.extend(self.drain_outbound());
            match report.step {
                StepOutcome::Moved { end_reached, .. } => {
                    moves += 1;
                    if end_reached {
                        break;
                    }
                }
                StepOutcome::Stopped => break,
                StepOutcome::Held | StepOutcome::Finished => {
                    if !self.link.available() {
                        break;
                    }
                }
            }
        }

        lines.push(format!(
            "ran {cycles} cycle(s), {moves} step(s), {}ms virtual",
            self.clock.now().0 - started_ms
        ));
        lines.push(self.mux.status(&self.relays).to_string());
        lines
    }

    fn handle_log(&self, count: Option<&str>) -> Vec<String> {
        let count = match parse_count(count, DEFAULT_LOG_COUNT) {
            Ok(count) => count,
            Err(message) => return vec![message],
        };

        let records: Vec<_> = self.telemetry.oldest_first().collect();
        if records.is_empty() {
            return vec!["telemetry empty".to_string()];
        }
        let skip = records.len().saturating_sub(count);
        records
            .into_iter()
            .skip(skip)
            .map(describe_record)
            .collect()
    }

    fn cycle(&mut self) -> CycleReport {
        let now = self.clock.now();
        self.mux.step_blocking(
            &mut self.link,
            &mut self.relays,
            &mut self.clock,
            &mut self.telemetry,
            now,
        )
    }

    fn describe_cycle(&self, report: &CycleReport) -> String {
        let mut line = format!("[t={}ms]", self.clock.now().0);
        if let Some(command) = report.command {
            line.push_str(&format!(" rx={}", command.code));
            if command.malformed {
                line.push_str(" (malformed)");
            }
            if command.truncated {
                line.push_str(" (truncated)");
            }
        }
        if let Some(dispatch) = report.dispatch {
            line.push_str(&format!(" -> {dispatch}"));
        }
        let step = match report.step {
            StepOutcome::Moved { index, end_reached } => {
                format!(" step={index}{}", if end_reached { " end" } else { "" })
            }
            StepOutcome::Stopped => " stopped".to_string(),
            StepOutcome::Finished => " finished".to_string(),
            StepOutcome::Held => " held".to_string(),
        };
        line.push_str(&step);
        let relays: String = self
            .relays
            .levels()
            .iter()
            .map(|on| if *on { '1' } else { '0' })
            .collect();
        line.push_str(&format!(
            " delay={}ms wait={}ms relays={relays}",
            report.delay_ms,
            report.wait.as_millis(),
        ));
        line
    }

    fn drain_outbound(&mut self) -> Option<String> {
        if self.link.outbound.is_empty() {
            return None;
        }
        let bytes: Vec<u8> = self.link.outbound.drain(..).collect();
        Some(format!("link tx {}", String::from_utf8_lossy(&bytes)))
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

/// In-memory byte link; the operator injects bytes and reads the replies.
#[derive(Default)]
struct HostLink {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
}

impl HostLink {
    fn inject(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    fn pending(&self) -> usize {
        self.inbound.len()
    }
}

impl ByteLink for HostLink {
    type Error = std::convert::Infallible;

    fn available(&self) -> bool {
        !self.inbound.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.inbound.pop_front()
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.outbound.push(byte);
        Ok(())
    }
}

/// Millisecond timestamp on the emulator's virtual clock.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
struct VirtualInstant(u64);

impl TelemetryInstant for VirtualInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Delay provider that advances virtual time instead of sleeping.
#[derive(Default)]
struct VirtualClock {
    elapsed_ns: u64,
}

impl VirtualClock {
    fn now(&self) -> VirtualInstant {
        VirtualInstant(self.elapsed_ns / 1_000_000)
    }
}

impl DelayNs for VirtualClock {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns = self.elapsed_ns.saturating_add(u64::from(ns));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ns = self
            .elapsed_ns
            .saturating_add(u64::from(ms).saturating_mul(1_000_000));
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(header)?;
        Ok(logger)
    }

    fn write_header(&mut self, header: &str) -> io::Result<()> {
        writeln!(self.writer, "# {header}")?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

fn handle_help(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_count(arg: Option<&str>, default: usize) -> Result<usize, String> {
    match arg {
        None => Ok(default),
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| format!("ERR syntax `{value}` is not a count")),
    }
}

fn describe_record(record: &TelemetryRecord<VirtualInstant>) -> String {
    let mut line = format!(
        "#{:<4} t={}ms {}",
        record.id, record.timestamp.0, record.event
    );
    if let TelemetryPayload::Step(step) = record.details {
        line.push_str(&format!(
            " delay={}ms locked={:#05x}",
            step.delay_ms, step.locked_mask
        ));
        if let Some(elapsed) = step.elapsed_since_previous {
            line.push_str(&format!(" since-last={}ms", elapsed.as_millis()));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: &str) -> Session {
        let path = std::env::temp_dir()
            .join("sequencer-emulator-tests")
            .join(format!("{name}-{}.log", std::process::id()));
        Session::new(&SessionConfig::new(ControllerConfig::default(), path)).unwrap()
    }

    #[test]
    fn hello_frame_is_acknowledged_on_the_link() {
        let mut session = session("hello");
        session.handle_command("<254>").unwrap();
        let lines = session.handle_command("step").unwrap();
        assert!(lines[0].contains("rx=254 -> hello acknowledged"));
        assert_eq!(lines[1], "link tx <253>");
    }

    #[test]
    fn send_and_run_reach_end_of_travel() {
        let mut session = session("run");
        session.handle_command("send 100").unwrap();
        let lines = session.handle_command("run").unwrap();
        let status = lines.last().unwrap();
        assert!(status.starts_with("state 511/511 mode=decrease-index end=yes"));
        assert!(lines.iter().any(|line| line.starts_with("ran 511 cycle(s), 511 step(s)")));
    }

    #[test]
    fn switch_time_changes_reported_base() {
        let mut session = session("switch");
        session.handle_command("send 200 250").unwrap();
        session.handle_command("step 2").unwrap();
        let lines = session.handle_command("status").unwrap();
        assert!(lines[0].contains("base=1000ms"));
    }

    #[test]
    fn status_reports_directly_toggled_relay() {
        let mut session = session("toggle-status");
        session.handle_command("send 4").unwrap();
        session.handle_command("step").unwrap();
        let lines = session.handle_command("status").unwrap();
        assert!(lines[0].ends_with("relays 000010000"));
    }

    #[test]
    fn bad_arguments_are_reported() {
        let mut session = session("errors");
        assert_eq!(
            session.handle_command("send x").unwrap(),
            vec!["ERR syntax `x` is not a code (0-65535)".to_string()]
        );
        assert_eq!(
            session.handle_command("jump").unwrap(),
            vec!["ERR unknown command `jump` (try `help`)".to_string()]
        );
    }

    #[test]
    fn log_lists_recent_telemetry() {
        let mut session = session("log");
        session.handle_command("send 3").unwrap();
        session.handle_command("step").unwrap();
        let lines = session.handle_command("log").unwrap();
        assert!(lines[0].contains("command-received 3"));
        assert!(lines[1].contains("relay-toggled R06 on"));
    }
}
