use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reset_core::console;
use reset_core::{DeviceConfig, ResetDevice};

use crate::host::{
    HostLine, HostMutex, HostProperties, HostProvider, HostRegistrar, SimulatedChip, ThreadDelay,
};

pub type HostDevice = ResetDevice<HostMutex, HostLine, ThreadDelay>;

/// Commands handled by the session itself rather than the device console.
pub const SESSION_TOPICS: &[(&str, &str)] = &[
    (
        "attach",
        "attach                         - bring the device up from the properties",
    ),
    (
        "detach",
        "detach                         - unpublish the device and release its lines",
    ),
    (
        "lines",
        "lines                          - show simulated line levels and target state",
    ),
];

/// Startup options collected from the command line.
#[derive(Debug, Default)]
pub struct SessionOptions {
    pub properties: HostProperties,
    pub refuse_line: Option<String>,
    pub transcript: Option<PathBuf>,
}

pub struct Session {
    chip: SimulatedChip,
    provider: HostProvider,
    registrar: HostRegistrar,
    properties: HostProperties,
    device: Option<HostDevice>,
    transcript: Option<TranscriptLogger>,
    started_at: Instant,
}

impl Session {
    pub fn new(options: SessionOptions) -> io::Result<Self> {
        let transcript = options
            .transcript
            .as_deref()
            .map(TranscriptLogger::create)
            .transpose()?;

        let polarity = DeviceConfig::from_properties(&options.properties).asserted_polarity;
        let chip = SimulatedChip::new(polarity);
        let provider = HostProvider::new(chip.clone(), options.refuse_line);

        Ok(Self {
            chip,
            provider,
            registrar: HostRegistrar::default(),
            properties: options.properties,
            device: None,
            transcript,
            started_at: Instant::now(),
        })
    }

    pub fn chip(&self) -> &SimulatedChip {
        &self.chip
    }

    pub fn is_attached(&self) -> bool {
        self.device.is_some()
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.log(elapsed, TranscriptRole::Host, trimmed)?;

        let mut lines = match trimmed {
            "attach" => self.attach(),
            "detach" => self.detach(),
            "lines" => vec![self.chip.describe()],
            _ => self.run_console(trimmed),
        };
        lines.extend(self.chip.drain_events().iter().map(ToString::to_string));

        for output in &lines {
            self.log(elapsed, TranscriptRole::Emulator, output)?;
        }
        Ok(lines)
    }

    fn attach(&mut self) -> Vec<String> {
        if self.device.is_some() {
            return vec!["ERR already attached".to_string()];
        }

        match ResetDevice::attach(
            &mut self.provider,
            &mut self.registrar,
            &self.properties,
            ThreadDelay,
        ) {
            Ok(device) => {
                let config = *device.config();
                self.device = Some(device);
                vec![format!(
                    "OK attached duration-ms={} asserted-state={:?} auto={} published=[{}]",
                    config.duration_ms,
                    config.asserted_polarity,
                    config.auto_reset_on_attach,
                    self.registrar.published().join(", ")
                )]
            }
            Err(error) => vec![format!("ERR attach {error}")],
        }
    }

    fn detach(&mut self) -> Vec<String> {
        match self.device.take() {
            Some(device) => {
                device.detach(&mut self.provider, &mut self.registrar);
                vec![format!(
                    "OK detached held=[{}] published=[{}]",
                    self.chip.held_lines().join(", "),
                    self.registrar.published().join(", ")
                )]
            }
            None => vec!["ERR not attached".to_string()],
        }
    }

    fn run_console(&mut self, input: &str) -> Vec<String> {
        let command = match console::parse(input) {
            Ok(command) => command,
            Err(error) => return vec![format!("ERR syntax {error}")],
        };

        if command == console::ConsoleCommand::Help {
            return console::HELP_TOPICS
                .iter()
                .chain(SESSION_TOPICS)
                .map(|(_, line)| (*line).to_string())
                .collect();
        }

        let Some(device) = self.device.as_ref() else {
            return vec!["ERR not attached (use `attach`)".to_string()];
        };

        let mut rendered = String::new();
        if console::execute(device, &command, &mut rendered).is_err() {
            return vec!["ERR output formatting failed".to_string()];
        }
        rendered.lines().map(str::to_string).collect()
    }

    fn log(&mut self, elapsed: Duration, role: TranscriptRole, line: &str) -> io::Result<()> {
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_line(elapsed, role, line),
            None => Ok(()),
        }
    }
}

struct TranscriptLogger {
    writer: BufWriter<fs::File>,
}

impl TranscriptLogger {
    fn create(path: &Path) -> io::Result<Self> {
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

        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "# Reset controller emulator transcript")?;
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

#[derive(Copy, Clone)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::BootMode;

    fn session(props: &[&str]) -> Session {
        let mut properties = HostProperties::default();
        for prop in props {
            properties.push(prop);
        }
        Session::new(SessionOptions {
            properties,
            ..SessionOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn isp_write_boots_target_into_loader() {
        let mut session = session(&["duration-ms=5"]);
        let attached = session.handle_command("attach").unwrap();
        assert!(attached[0].starts_with("OK attached duration-ms=5"), "{attached:?}");

        let output = session.handle_command("write isp 1").unwrap();
        assert_eq!(output[0], "OK isp (1 bytes)");
        assert!(output.iter().any(|line| line.ends_with("target booted isp-loader")));
        assert_eq!(session.chip().boot_mode(), Some(BootMode::IspLoader));

        assert_eq!(session.handle_command("read isp").unwrap(), ["isp mode"]);

        session.handle_command("write reset x").unwrap();
        assert_eq!(session.chip().boot_mode(), Some(BootMode::Application));
        assert_eq!(session.handle_command("read isp").unwrap(), ["normal mode"]);
    }

    #[test]
    fn auto_property_resets_on_attach() {
        let mut session = session(&["auto", "duration-ms=1", "asserted-state=low"]);
        let output = session.handle_command("attach").unwrap();

        assert!(output[0].contains("asserted-state=ActiveLow"), "{output:?}");
        assert!(output.iter().any(|line| line.ends_with("target booted application")));
    }

    #[test]
    fn refused_line_leaves_nothing_held() {
        let mut session = Session::new(SessionOptions {
            refuse_line: Some("isp".to_string()),
            ..SessionOptions::default()
        })
        .unwrap();

        let output = session.handle_command("attach").unwrap();
        assert!(output[0].starts_with("ERR attach cannot acquire isp line"), "{output:?}");
        assert!(!session.is_attached());
        assert!(session.chip().held_lines().is_empty());
    }

    #[test]
    fn detach_then_reattach() {
        let mut session = session(&["duration-ms=1"]);
        session.handle_command("attach").unwrap();

        let output = session.handle_command("detach").unwrap();
        assert_eq!(output, ["OK detached held=[] published=[]"]);
        assert_eq!(
            session.handle_command("read isp").unwrap(),
            ["ERR not attached (use `attach`)"]
        );
        assert_eq!(session.handle_command("detach").unwrap(), ["ERR not attached"]);

        let output = session.handle_command("attach").unwrap();
        assert!(output[0].contains("published=[isp-reset, reset, isp]"), "{output:?}");
    }

    #[test]
    fn syntax_errors_report_position() {
        let mut session = session(&[]);
        let output = session.handle_command("rc explode").unwrap();
        assert_eq!(output.len(), 1);
        assert!(output[0].starts_with("ERR syntax unexpected input at column"), "{output:?}");
    }

    #[test]
    fn transcript_records_both_sides() {
        let path = std::env::temp_dir().join(format!(
            "reset-emulator-transcript-{}.log",
            std::process::id()
        ));
        let mut session = Session::new(SessionOptions {
            transcript: Some(path.clone()),
            ..SessionOptions::default()
        })
        .unwrap();

        session.handle_command("help").unwrap();
        drop(session);

        let transcript = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(transcript.starts_with("# Reset controller emulator transcript"));
        assert!(transcript.contains("HOST> help"));
        assert!(transcript.contains("EMU < lines "));
    }
}
